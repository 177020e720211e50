//! Header-free inference: every cell is classified by its content alone.

use std::sync::LazyLock;

use regex::Regex;

use crate::schema::{full_prefecture_in, has_legal_suffix, lexicon, CompanyRecord, Field, FieldValue};
use crate::utils::{char_len, non_empty};

use super::values::{
    clean_address, extract_url, find_corporate_number, normalize_phone, normalize_postal_code,
    split_postal_prefix,
};

const MAX_NAME_CHARS: usize = 60;
const MAX_TAG_CHARS: usize = 40;

/// Postal codes need a hyphen or 〒 to be told apart from other numbers.
static POSTAL_CELL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:〒\s*\d{3}-?\d{4}|\d{3}-\d{4})$").unwrap());
static DIGIT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum CellKind {
    Url(String),
    CorporateNumber(String),
    PostalCode(String),
    Phone(String),
    Name(String),
    Address {
        address: String,
        prefecture: &'static str,
        postal: Option<String>,
    },
    IndustryTag(String),
}

fn looks_like_address(cell: &str) -> bool {
    full_prefecture_in(cell).is_some() && DIGIT_RE.is_match(cell)
}

fn classify_cell(cell: &str) -> Option<CellKind> {
    if let Some(url) = extract_url(cell) {
        return Some(CellKind::Url(url));
    }
    if let Some(num) = find_corporate_number(cell) {
        return Some(CellKind::CorporateNumber(num));
    }
    if POSTAL_CELL_RE.is_match(cell) {
        return normalize_postal_code(cell).map(CellKind::PostalCode);
    }
    if let Some(tel) = normalize_phone(cell) {
        return Some(CellKind::Phone(tel));
    }
    if has_legal_suffix(cell) && char_len(cell) <= MAX_NAME_CHARS && !looks_like_address(cell) {
        return Some(CellKind::Name(cell.to_string()));
    }
    if let Some(prefecture) = full_prefecture_in(cell) {
        let (postal, rest) = split_postal_prefix(cell);
        return clean_address(&rest).map(|address| CellKind::Address {
            address,
            prefecture,
            postal,
        });
    }
    let is_tag = char_len(cell) <= MAX_TAG_CHARS
        && lexicon().industry_keywords.iter().any(|k| cell.contains(k.as_str()));
    is_tag.then(|| CellKind::IndustryTag(cell.to_string()))
}

fn fill(record: &mut CompanyRecord, field: Field, value: String) {
    if !record.is_set(field) {
        record.set(field, FieldValue::Text(value));
    }
}

/// Build a record from a row whose header cannot be trusted. Each kind keeps
/// its first occurrence; industry tags are deduplicated and spread over the
/// three taxonomy levels, the remainder going to `industries`.
pub fn scan_row(cells: &[String]) -> CompanyRecord {
    let mut record = CompanyRecord::default();
    let mut tags: Vec<String> = Vec::new();

    for cell in cells.iter().filter_map(|c| non_empty(c)) {
        match classify_cell(&cell) {
            Some(CellKind::Url(v)) => fill(&mut record, Field::HomepageUrl, v),
            Some(CellKind::CorporateNumber(v)) => fill(&mut record, Field::CorporateNumber, v),
            Some(CellKind::PostalCode(v)) => fill(&mut record, Field::PostalCode, v),
            Some(CellKind::Phone(v)) => fill(&mut record, Field::Tel, v),
            Some(CellKind::Name(v)) => fill(&mut record, Field::Name, v),
            Some(CellKind::Address {
                address,
                prefecture,
                postal,
            }) => {
                if !record.is_set(Field::Address) {
                    fill(&mut record, Field::Prefecture, prefecture.to_string());
                    if let Some(p) = postal {
                        fill(&mut record, Field::PostalCode, p);
                    }
                    fill(&mut record, Field::Address, address);
                }
            }
            Some(CellKind::IndustryTag(v)) => {
                if !tags.contains(&v) {
                    tags.push(v);
                }
            }
            None => {}
        }
    }

    let mut tags = tags.into_iter();
    for field in [Field::IndustryLarge, Field::IndustryMiddle, Field::IndustrySmall] {
        match tags.next() {
            Some(tag) => fill(&mut record, field, tag),
            None => break,
        }
    }
    record.set(Field::Industries, FieldValue::List(tags.collect()));
    record
}
