use std::time::Duration;

use unicode_normalization::UnicodeNormalization;

use crate::schema::lexicon;

/// Fold a header or value for comparison: NFKC (full-width to half-width),
/// lowercase, BOM and all whitespace removed.
pub fn fold(raw: &str) -> String {
    raw.nfkc()
        .filter(|c| !c.is_whitespace() && *c != '\u{feff}')
        .flat_map(char::to_lowercase)
        .collect()
}

/// NFKC + trim, keeping inner spacing collapsed to single ASCII spaces.
pub fn clean_cell(raw: &str) -> String {
    let nfkc: String = raw.trim_start_matches('\u{feff}').nfkc().collect();
    nfkc.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed value, or None for blanks and placeholder tokens.
pub fn non_empty(raw: &str) -> Option<String> {
    let cleaned = clean_cell(raw);
    if cleaned.is_empty() || is_placeholder(&cleaned) {
        None
    } else {
        Some(cleaned)
    }
}

pub fn is_placeholder(val: &str) -> bool {
    let folded = fold(val);
    lexicon().placeholders.iter().any(|p| *p == folded)
}

pub fn char_len(s: &str) -> usize {
    s.chars().count()
}

pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fold_widths_and_case() {
        assert_eq!(fold("\u{feff}電話番号（窓口）"), "電話番号(窓口)");
        assert_eq!(fold(" ＵＲＬ "), "url");
        assert_eq!(fold("業種 (大)"), "業種(大)");
    }

    #[test]
    fn placeholders_are_empty() {
        assert_eq!(non_empty("  －  "), None);
        assert_eq!(non_empty("N/A"), None);
        assert_eq!(non_empty("不明"), None);
        assert_eq!(non_empty(""), None);
        assert_eq!(non_empty(" 株式会社テスト "), Some("株式会社テスト".to_string()));
    }

    #[test]
    fn clean_cell_collapses_spaces() {
        assert_eq!(clean_cell("東京都　渋谷区  1-1-1"), "東京都 渋谷区 1-1-1");
    }

    #[test]
    fn truncate_long_text() {
        assert_eq!(truncate("abcdef", 3), "abc...");
        assert_eq!(truncate("abc", 3), "abc");
    }
}
