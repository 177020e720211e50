use std::collections::HashMap;
use std::sync::LazyLock;

use serde::Deserialize;

use super::Field;
use crate::utils::fold;

const SYNONYMS_JSON: &str = include_str!("../../data/synonyms.json");
const LEXICON_JSON: &str = include_str!("../../data/lexicon.json");

/// Word lists used by the value-scan and cleaning rules.
#[derive(Debug, Deserialize)]
pub struct Lexicon {
    pub prefectures: Vec<String>,
    pub legal_suffixes: Vec<String>,
    pub industry_keywords: Vec<String>,
    pub placeholders: Vec<String>,
    pub honorifics: Vec<String>,
    pub address_noise: Vec<String>,
}

static LEXICON: LazyLock<Lexicon> = LazyLock::new(|| {
    let mut lex: Lexicon = serde_json::from_str(LEXICON_JSON).expect("data/lexicon.json is valid");
    lex.placeholders = lex.placeholders.iter().map(|p| fold(p)).collect();
    // Longest title first so "代表取締役社長" is stripped before "代表取締役".
    lex.honorifics.sort_by_key(|h| std::cmp::Reverse(h.chars().count()));
    lex
});

/// Folded synonyms per canonical field, in `Field::ALL` order.
static SYNONYMS: LazyLock<Vec<(Field, Vec<String>)>> = LazyLock::new(|| {
    let raw: HashMap<String, Vec<String>> =
        serde_json::from_str(SYNONYMS_JSON).expect("data/synonyms.json is valid");
    Field::ALL
        .iter()
        .map(|field| {
            let list = raw
                .get(field.key())
                .map(|s| s.iter().map(|v| fold(v)).collect())
                .unwrap_or_default();
            (*field, list)
        })
        .collect()
});

pub fn lexicon() -> &'static Lexicon {
    &LEXICON
}

pub fn synonyms() -> &'static [(Field, Vec<String>)] {
    &SYNONYMS
}

/// The prefecture named in `text`, if any. Short forms ("東京", "大阪") at the
/// start of the text are expanded to the full name.
pub fn find_prefecture(text: &str) -> Option<&'static str> {
    if let Some(p) = full_prefecture_in(text) {
        return Some(p);
    }
    lexicon()
        .prefectures
        .iter()
        .find(|p| {
            let short = p.strip_suffix(['都', '府', '県']).unwrap_or(p);
            short != p.as_str() && short.chars().count() >= 2 && text.starts_with(short)
        })
        .map(|p| p.as_str())
}

/// The earliest full prefecture name ("東京都", not "東京") in `text`.
pub fn full_prefecture_in(text: &str) -> Option<&'static str> {
    lexicon()
        .prefectures
        .iter()
        .filter_map(|p| text.find(p.as_str()).map(|at| (at, p.as_str())))
        .min_by_key(|(at, _)| *at)
        .map(|(_, p)| p)
}

pub fn has_legal_suffix(text: &str) -> bool {
    lexicon().legal_suffixes.iter().any(|s| text.contains(s.as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_field_has_synonyms() {
        for (field, list) in synonyms() {
            assert!(!list.is_empty(), "no synonyms for {}", field);
        }
    }

    #[test]
    fn lexicon_has_all_prefectures() {
        assert_eq!(lexicon().prefectures.len(), 47);
    }

    #[test]
    fn prefecture_lookup() {
        assert_eq!(find_prefecture("東京都渋谷区1-1-1"), Some("東京都"));
        assert_eq!(find_prefecture("大阪市北区梅田"), Some("大阪府"));
        assert_eq!(find_prefecture("渋谷区道玄坂"), None);
        assert_eq!(find_prefecture("北海道札幌市"), Some("北海道"));
        assert_eq!(find_prefecture("京都市中京区"), Some("京都府"));
        assert_eq!(find_prefecture("神奈川県横浜市"), Some("神奈川県"));
    }

    #[test]
    fn earliest_prefecture_in_text_wins() {
        assert_eq!(full_prefecture_in("大阪府大阪市北区（東京都にも支店）"), Some("大阪府"));
        assert_eq!(full_prefecture_in("北海道札幌市 本社:東京都港区"), Some("北海道"));
        assert_eq!(full_prefecture_in("渋谷区"), None);
    }

    #[test]
    fn legal_suffix_detection() {
        assert!(has_legal_suffix("株式会社テスト"));
        assert!(has_legal_suffix("テスト(株)"));
        assert!(!has_legal_suffix("テスト商店"));
    }
}
