//! Typed validators for single cells. Every function takes the raw cell and
//! returns `None` when the value is blank or fails its pattern.

use std::sync::LazyLock;

use regex::Regex;

use crate::schema::{find_prefecture, lexicon};
use crate::utils::{clean_cell, fold, non_empty};

static POSTAL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{3})-?(\d{4})$").unwrap());
static POSTAL_PREFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^〒?\s*(\d{3}-?\d{4})(\D.*)?$").unwrap());
static EXPONENT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d(?:\.\d+)?[eE]\+?\d{1,2}$").unwrap());
static CORP_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{13})(?:\D|$)").unwrap());
static PHONE_NOTE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\s*[(（][^0-9()（）]*[)）])+\s*$").unwrap());
static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^0\d{1,4}-?\d{1,4}-?\d{3,4}$").unwrap());
static DATE_LIKE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d{4}\s*[年/]\s*\d{1,2}").unwrap());
static URL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"https?://[A-Za-z0-9\-._~:/?#\[\]@!$&'()*+,;=%]+").unwrap()
});
static MAP_TAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(/地図|Google\s*マップ).*$").unwrap());
static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)(兆|億|千万|百万|万|千)?").unwrap());
static ERA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(明治|大正|昭和|平成|令和)\s*(\d{1,2}|元)\s*年").unwrap());
static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?:^|\D)(\d{4})(?:\D|$)").unwrap());
static MONTH_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d{1,2})\s*月").unwrap());

const HYPHENS: [char; 6] = ['‐', '‑', '–', '—', '−', 'ー'];

fn unify_hyphens(s: &str) -> String {
    s.chars()
        .map(|c| if HYPHENS.contains(&c) { '-' } else { c })
        .collect()
}

/// `1500001`, `150-0001`, `〒150-0001` -> `150-0001`.
pub fn normalize_postal_code(raw: &str) -> Option<String> {
    let s = unify_hyphens(&non_empty(raw)?);
    let s: String = s
        .trim_start_matches('〒')
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    let caps = POSTAL_RE.captures(&s)?;
    Some(format!("{}-{}", &caps[1], &caps[2]))
}

/// Split a leading postal code off an address cell.
pub fn split_postal_prefix(address: &str) -> (Option<String>, String) {
    let s = unify_hyphens(address.trim());
    match POSTAL_PREFIX_RE.captures(&s) {
        Some(caps) if s.starts_with('〒') || caps[1].contains('-') => {
            let postal = normalize_postal_code(&caps[1]);
            let rest = caps.get(2).map_or("", |m| m.as_str());
            (postal, rest.trim().to_string())
        }
        _ => (None, address.trim().to_string()),
    }
}

/// Accepts exactly 13 ASCII digits outside the known-invalid set: a single
/// repeated digit, or a zero body around the first or last digit.
pub fn validate_corporate_number(s: &str) -> Option<String> {
    if s.len() != 13 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let bytes = s.as_bytes();
    if bytes.iter().all(|b| *b == bytes[0]) {
        return None;
    }
    if bytes[1..].iter().all(|b| *b == b'0') || bytes[..12].iter().all(|b| *b == b'0') {
        return None;
    }
    Some(s.to_string())
}

/// Full-width digits, separators and spreadsheet exponent notation are
/// normalized first, then the strict 13-digit check applies.
pub fn normalize_corporate_number(raw: &str) -> Option<String> {
    let s = clean_cell(raw);
    if s.is_empty() {
        return None;
    }
    let expanded = if EXPONENT_RE.is_match(&s) {
        let n: f64 = s.parse().ok()?;
        if n.fract() != 0.0 || !(1e12..1e13).contains(&n) {
            return None;
        }
        format!("{:013}", n as u64)
    } else {
        s.chars()
            .filter(|c| !matches!(c, '-' | ' ' | ',') && !HYPHENS.contains(c))
            .collect()
    };
    validate_corporate_number(&expanded)
}

/// First valid 13-digit run anywhere in the text.
pub fn find_corporate_number(text: &str) -> Option<String> {
    let s = clean_cell(text);
    CORP_RUN_RE
        .captures_iter(&s)
        .find_map(|c| validate_corporate_number(&c[1]))
}

/// Japan-style grouped phone number, original grouping kept.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let s = non_empty(raw)?;
    if DATE_LIKE_RE.is_match(&s) {
        return None;
    }
    let mut s = unify_hyphens(&PHONE_NOTE_RE.replace(&s, ""));
    for prefix in ["電話番号:", "電話番号", "tel:", "tel", "電話:", "電話"] {
        if s.to_lowercase().starts_with(prefix) {
            s = s[prefix.len()..].to_string();
            break;
        }
    }
    let mut s: String = s
        .replace(['(', ')'], "-")
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect();
    if let Some(rest) = s.strip_prefix("+81") {
        s = format!("0{}", rest.trim_start_matches('-'));
    }
    while s.contains("--") {
        s = s.replace("--", "-");
    }
    let s = s.trim_matches('-').to_string();
    let digits = s.chars().filter(|c| c.is_ascii_digit()).count();
    if !(10..=11).contains(&digits) || !PHONE_RE.is_match(&s) {
        return None;
    }
    Some(s)
}

/// The first http(s) URL inside the cell.
pub fn extract_url(raw: &str) -> Option<String> {
    let s = clean_cell(raw);
    URL_RE.find(&s).map(|m| m.as_str().trim_end_matches(['.', ',', ')']).to_string())
}

/// Address with map-link noise removed.
pub fn clean_address(raw: &str) -> Option<String> {
    let mut s = non_empty(raw)?;
    s = MAP_TAIL_RE.replace(&s, "").to_string();
    for noise in &lexicon().address_noise {
        s = s.replace(noise.as_str(), "");
    }
    non_empty(&s)
}

pub fn normalize_prefecture(raw: &str) -> Option<String> {
    let s = non_empty(raw)?;
    find_prefecture(&s).map(str::to_string)
}

/// Scale implied by a header such as `資本金(千円)` or `売上(百万)`.
pub fn header_money_scale(header: &str) -> Option<i64> {
    let h = fold(header);
    if h.contains("千万") {
        Some(10_000_000)
    } else if h.contains("百万") {
        Some(1_000_000)
    } else if h.contains("千円") {
        Some(1_000)
    } else if h.contains("万円") {
        Some(10_000)
    } else {
        None
    }
}

fn unit_multiplier(unit: &str) -> f64 {
    match unit {
        "兆" => 1e12,
        "億" => 1e8,
        "千万" => 1e7,
        "百万" => 1e6,
        "万" => 1e4,
        "千" => 1e3,
        _ => 1.0,
    }
}

/// Unit-aware amount parser. `1,500万円` -> 15000000, `1億5000万` -> 150000000,
/// `△300` -> -300. `scale` multiplies values written without any unit.
pub fn parse_money(raw: &str, scale: i64) -> Option<i64> {
    let s = non_empty(raw)?;
    if DATE_LIKE_RE.is_match(&s) {
        return None;
    }
    let mut s: String = s.chars().filter(|c| !c.is_whitespace() && *c != ',').collect();
    let negative = s.starts_with(['-', '△', '▲', '−']);
    if negative {
        s = s.chars().skip(1).collect();
    }
    if let Some(idx) = s.find(['~', '〜']) {
        s.truncate(idx);
    }

    let mut total = 0f64;
    let mut saw_number = false;
    let mut saw_unit = false;
    for caps in AMOUNT_RE.captures_iter(&s) {
        let n: f64 = caps[1].parse().ok()?;
        saw_number = true;
        match caps.get(2) {
            Some(unit) => {
                saw_unit = true;
                total += n * unit_multiplier(unit.as_str());
            }
            None => total += n,
        }
    }
    if !saw_number {
        return None;
    }
    if !saw_unit {
        total *= scale as f64;
    }
    let value = total.round() as i64;
    Some(if negative { -value } else { value })
}

/// Head counts: `約1,200名`, `1.2万人`.
pub fn parse_count(raw: &str) -> Option<i64> {
    parse_money(raw, 1).filter(|n| *n >= 0)
}

/// Western year or Japanese era year (`昭和45年` -> 1970, `令和元年` -> 2019).
pub fn parse_year(raw: &str) -> Option<i64> {
    let s = non_empty(raw)?;
    if let Some(caps) = ERA_RE.captures(&s) {
        let base = match &caps[1] {
            "明治" => 1868,
            "大正" => 1912,
            "昭和" => 1926,
            "平成" => 1989,
            _ => 2019,
        };
        let n: i64 = if &caps[2] == "元" { 1 } else { caps[2].parse().ok()? };
        return Some(base + n - 1);
    }
    YEAR_RE
        .captures(&s)
        .and_then(|c| c[1].parse::<i64>().ok())
        .filter(|y| (1800..=2100).contains(y))
}

/// Fiscal month: `3月`, `3月末`, `3`.
pub fn parse_month(raw: &str) -> Option<i64> {
    let s = non_empty(raw)?;
    let n = match MONTH_RE.captures(&s) {
        Some(caps) => caps[1].parse::<i64>().ok()?,
        None => s.parse::<i64>().ok()?,
    };
    (1..=12).contains(&n).then_some(n)
}

/// Split a list cell on `,` `、` `;` and newlines.
pub fn parse_list(raw: &str) -> Vec<String> {
    let nfkc = clean_cell(&raw.replace('\n', ";"));
    nfkc.split([',', '、', ';'])
        .filter_map(non_empty)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postal_codes_normalize_to_grouped_form() {
        for raw in ["1500001", "150-0001", "〒150-0001", "１５０－０００１", "〒 1500001"] {
            assert_eq!(normalize_postal_code(raw).as_deref(), Some("150-0001"), "{}", raw);
        }
        assert_eq!(normalize_postal_code("150-00011"), None);
        assert_eq!(normalize_postal_code("東京都"), None);
        assert_eq!(normalize_postal_code(""), None);
    }

    #[test]
    fn every_seven_digit_string_groups() {
        for n in [0u32, 1234567, 9999999, 1000001] {
            let raw = format!("{:07}", n);
            let expected = format!("{}-{}", &raw[..3], &raw[3..]);
            assert_eq!(normalize_postal_code(&raw), Some(expected));
        }
    }

    #[test]
    fn postal_prefix_splits_from_address() {
        let (postal, rest) = split_postal_prefix("〒150-0001 東京都渋谷区神宮前1-1");
        assert_eq!(postal.as_deref(), Some("150-0001"));
        assert_eq!(rest, "東京都渋谷区神宮前1-1");

        let (postal, rest) = split_postal_prefix("東京都渋谷区神宮前1-1");
        assert_eq!(postal, None);
        assert_eq!(rest, "東京都渋谷区神宮前1-1");

        let (postal, rest) = split_postal_prefix("〒1500001東京都渋谷区神宮前1-1");
        assert_eq!(postal.as_deref(), Some("150-0001"));
        assert_eq!(rest, "東京都渋谷区神宮前1-1");

        let (postal, rest) = split_postal_prefix("530-0001大阪府大阪市北区梅田1-1");
        assert_eq!(postal.as_deref(), Some("530-0001"));
        assert_eq!(rest, "大阪府大阪市北区梅田1-1");

        let (postal, _) = split_postal_prefix("〒15000012東京都");
        assert_eq!(postal, None);
    }

    #[test]
    fn corporate_numbers_are_strict() {
        assert_eq!(validate_corporate_number("1234567890123").as_deref(), Some("1234567890123"));
        assert_eq!(validate_corporate_number("123456789012"), None);
        assert_eq!(validate_corporate_number("12345678901234"), None);
        assert_eq!(validate_corporate_number("0000000000000"), None);
        assert_eq!(validate_corporate_number("7777777777777"), None);
        assert_eq!(validate_corporate_number("1000000000000"), None);
        assert_eq!(validate_corporate_number("0000000000001"), None);
        assert_eq!(validate_corporate_number("12345678901a3"), None);
    }

    #[test]
    fn corporate_number_inputs_are_cleaned() {
        assert_eq!(normalize_corporate_number("１２３４５６７８９０１２３").as_deref(), Some("1234567890123"));
        assert_eq!(normalize_corporate_number("1234-5678-90123").as_deref(), Some("1234567890123"));
        assert_eq!(normalize_corporate_number("1.23456789012E+12").as_deref(), Some("1234567890120"));
        assert_eq!(normalize_corporate_number("4.5E+3"), None);
        assert_eq!(find_corporate_number("法人番号:8011001000000 (東京)").as_deref(), Some("8011001000000"));
        assert_eq!(find_corporate_number("TEL 0312345678"), None);
    }

    #[test]
    fn phones() {
        assert_eq!(normalize_phone("03-1234-5678").as_deref(), Some("03-1234-5678"));
        assert_eq!(normalize_phone("０３（１２３４）５６７８").as_deref(), Some("03-1234-5678"));
        assert_eq!(normalize_phone("TEL: 090-1234-5678").as_deref(), Some("090-1234-5678"));
        assert_eq!(normalize_phone("+81-3-1234-5678").as_deref(), Some("03-1234-5678"));
        assert_eq!(normalize_phone("0312345678").as_deref(), Some("0312345678"));
        assert_eq!(normalize_phone("2020/03/01"), None);
        assert_eq!(normalize_phone("1234-5678"), None);
        assert_eq!(normalize_phone("東京都渋谷区"), None);
        assert_eq!(normalize_phone("03-1234-5678(代)").as_deref(), Some("03-1234-5678"));
        assert_eq!(normalize_phone("03-1234-5678（代表）").as_deref(), Some("03-1234-5678"));
        assert_eq!(normalize_phone("電話番号:06-1111-2222").as_deref(), Some("06-1111-2222"));
    }

    #[test]
    fn urls_are_extracted() {
        assert_eq!(extract_url("HP: https://example.co.jp/top ").as_deref(), Some("https://example.co.jp/top"));
        assert_eq!(extract_url("ｈｔｔｐ://example.com").as_deref(), Some("http://example.com"));
        assert_eq!(extract_url("www.example.com"), None);
    }

    #[test]
    fn address_noise_removed() {
        assert_eq!(clean_address("東京都港区芝公園4-2-8 /地図").as_deref(), Some("東京都港区芝公園4-2-8"));
        assert_eq!(clean_address("大阪府大阪市北区 Googleマップで表示").as_deref(), Some("大阪府大阪市北区"));
        assert_eq!(clean_address("－"), None);
    }

    #[test]
    fn money_units() {
        assert_eq!(parse_money("1,500万円", 1), Some(15_000_000));
        assert_eq!(parse_money("3億", 1), Some(300_000_000));
        assert_eq!(parse_money("250千", 1), Some(250_000));
        assert_eq!(parse_money("1億5000万円", 1), Some(150_000_000));
        assert_eq!(parse_money("1.2兆円", 1), Some(1_200_000_000_000));
        assert_eq!(parse_money("500百万円", 1), Some(500_000_000));
        assert_eq!(parse_money("10,000", 1), Some(10_000));
        assert_eq!(parse_money("10,000", 1000), Some(10_000_000));
        assert_eq!(parse_money("5万", 1000), Some(50_000));
        assert_eq!(parse_money("△300", 1), Some(-300));
        assert_eq!(parse_money("1億~5億", 1), Some(100_000_000));
        assert_eq!(parse_money("2020年3月", 1), None);
        assert_eq!(parse_money("非公開", 1), None);
        assert_eq!(parse_money("abc", 1), None);
    }

    #[test]
    fn money_unit_multipliers_hold_for_any_prefix() {
        for n in [1i64, 7, 42, 999] {
            assert_eq!(parse_money(&format!("{}億", n), 1), Some(n * 100_000_000));
            assert_eq!(parse_money(&format!("{}万", n), 1), Some(n * 10_000));
            assert_eq!(parse_money(&format!("{}千", n), 1), Some(n * 1_000));
        }
    }

    #[test]
    fn header_scales() {
        assert_eq!(header_money_scale("資本金(千円)"), Some(1_000));
        assert_eq!(header_money_scale("売上（百万）"), Some(1_000_000));
        assert_eq!(header_money_scale("資本金"), None);
        assert_eq!(header_money_scale("売上高(千万円)"), Some(10_000_000));
        assert_eq!(header_money_scale("資本金(万円)"), Some(10_000));
    }

    #[test]
    fn counts_years_months() {
        assert_eq!(parse_count("約1,200名"), Some(1_200));
        assert_eq!(parse_count("1.2万人"), Some(12_000));
        assert_eq!(parse_year("1998年4月1日"), Some(1998));
        assert_eq!(parse_year("昭和45年"), Some(1970));
        assert_eq!(parse_year("平成元年"), Some(1989));
        assert_eq!(parse_year("令和3年"), Some(2021));
        assert_eq!(parse_year("123"), None);
        assert_eq!(parse_month("3月"), Some(3));
        assert_eq!(parse_month("12月末"), Some(12));
        assert_eq!(parse_month("13"), None);
    }

    #[test]
    fn lists_split_on_japanese_separators() {
        assert_eq!(parse_list("A社、B社,C社；D社"), vec!["A社", "B社", "C社", "D社"]);
        assert!(parse_list(" － ").is_empty());
    }

    #[test]
    fn prefecture_normalization() {
        assert_eq!(normalize_prefecture("東京").as_deref(), Some("東京都"));
        assert_eq!(normalize_prefecture("大阪府").as_deref(), Some("大阪府"));
        assert_eq!(normalize_prefecture("不明"), None);
    }
}
