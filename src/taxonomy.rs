//! Fixed industry taxonomy: (large, middle, small) triples.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{ImportError, Result};
use crate::schema::{CompanyRecord, Field, FieldValue};
use crate::utils::{char_len, fold};

const BUILTIN_JSON: &str = include_str!("../data/industries.json");
const SKIP_LABELS: [&str; 5] = ["（—）", "(—)", "—", "（ー）", "-"];
const FORMAT_SAMPLE_LINES: usize = 100;

static NUMBERED_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(\d+)\.\s*(.+)$").unwrap());
static BULLET_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[•*]\s*(?:\d+\s+)?(.+)$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Industry {
    pub large: String,
    pub middle: String,
    pub small: String,
}

impl Industry {
    fn new(large: &str, middle: &str, small: &str) -> Self {
        Industry {
            large: large.trim().to_string(),
            middle: middle.trim().to_string(),
            small: small.trim().to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Large,
    Middle,
    Small,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndustryMatch<'a> {
    pub industry: &'a Industry,
    pub level: Level,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Markdown,
    Numbered,
    Tsv,
    Csv,
}

#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    entries: Vec<Industry>,
    /// Folded (large, middle, small), parallel to `entries`.
    folded: Vec<(String, String, String)>,
}

impl Taxonomy {
    pub fn new(entries: Vec<Industry>) -> Self {
        let folded = entries
            .iter()
            .map(|e| (fold(&e.large), fold(&e.middle), fold(&e.small)))
            .collect();
        Taxonomy { entries, folded }
    }

    pub fn builtin() -> Result<Self> {
        let triples: Vec<[String; 3]> = serde_json::from_str(BUILTIN_JSON)?;
        Ok(Self::new(
            triples
                .iter()
                .map(|[l, m, s]| Industry::new(l, m, s))
                .collect(),
        ))
    }

    /// Replace the built-in list with a user file in any supported format.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Self::builtin();
        };
        if !path.is_file() {
            return Err(ImportError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)?;
        let entries = parse_taxonomy(&text);
        info!(file = %path.display(), entries = entries.len(), "loaded industry taxonomy");
        Ok(Self::new(entries))
    }

    pub fn entries(&self) -> &[Industry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact match on any level first (small, then middle, then large), then
    /// substring containment in the same order.
    pub fn classify(&self, label: &str) -> Option<IndustryMatch<'_>> {
        let f = fold(label);
        if f.is_empty() {
            return None;
        }
        let levels = [Level::Small, Level::Middle, Level::Large];
        let pick = |(l, m, s): &(String, String, String), level: Level| -> String {
            match level {
                Level::Large => l.clone(),
                Level::Middle => m.clone(),
                Level::Small => s.clone(),
            }
        };
        for level in levels {
            if let Some(i) = self.folded.iter().position(|t| pick(t, level) == f) {
                return Some(IndustryMatch {
                    industry: &self.entries[i],
                    level,
                });
            }
        }
        if char_len(&f) < 2 {
            return None;
        }
        for level in levels {
            if let Some(i) = self.folded.iter().position(|t| {
                let known = pick(t, level);
                !known.is_empty() && (f.contains(&known) || known.contains(&f))
            }) {
                return Some(IndustryMatch {
                    industry: &self.entries[i],
                    level,
                });
            }
        }
        None
    }

    /// Normalize the record's industry labels against the taxonomy. The most
    /// specific label that matches is replaced by its canonical name and the
    /// empty levels above it are filled in.
    pub fn complete(&self, record: &mut CompanyRecord) -> bool {
        let candidates = [
            Field::IndustrySmall,
            Field::IndustryDetail,
            Field::IndustryMiddle,
            Field::IndustryLarge,
        ];
        for source in candidates {
            let Some(label) = record.text(source) else {
                continue;
            };
            let Some(m) = self.classify(&label) else {
                continue;
            };
            let levels: &[(Level, Field, &str)] = &[
                (Level::Large, Field::IndustryLarge, m.industry.large.as_str()),
                (Level::Middle, Field::IndustryMiddle, m.industry.middle.as_str()),
                (Level::Small, Field::IndustrySmall, m.industry.small.as_str()),
            ];
            let mut changed = false;
            for (level, field, canonical) in levels {
                let at_or_above = match m.level {
                    Level::Small => true,
                    Level::Middle => *level != Level::Small,
                    Level::Large => *level == Level::Large,
                };
                if !at_or_above || canonical.is_empty() {
                    continue;
                }
                let own_level = *level == m.level && source != Field::IndustryDetail;
                if own_level || !record.is_set(*field) {
                    changed |= record.set(*field, FieldValue::Text(canonical.to_string()));
                }
            }
            return changed;
        }
        false
    }
}

pub fn detect_format(text: &str) -> Option<SourceFormat> {
    let mut scores = [0usize; 4];
    for line in text.lines().take(FORMAT_SAMPLE_LINES) {
        let raw = line.trim_end();
        let stripped = raw.trim();
        if stripped.is_empty() {
            continue;
        }
        if stripped.starts_with("## ") || stripped.starts_with("### ") || stripped.starts_with("- ") {
            scores[0] += 1;
        }
        if NUMBERED_RE.is_match(stripped) || (raw.starts_with('\t') && BULLET_RE.is_match(stripped)) {
            scores[1] += 1;
        }
        let three = |sep: char| {
            let parts: Vec<&str> = stripped.split(sep).collect();
            parts.len() == 3 && parts.iter().all(|p| !p.trim().is_empty())
        };
        if three('\t') {
            scores[2] += 1;
        }
        if three(',') {
            scores[3] += 1;
        }
    }
    let formats = [
        SourceFormat::Markdown,
        SourceFormat::Numbered,
        SourceFormat::Tsv,
        SourceFormat::Csv,
    ];
    let best = *scores.iter().max()?;
    if best == 0 {
        return None;
    }
    scores.iter().position(|s| *s == best).map(|i| formats[i])
}

pub fn parse_taxonomy(text: &str) -> Vec<Industry> {
    match detect_format(text) {
        Some(SourceFormat::Markdown) => parse_markdown(text),
        Some(SourceFormat::Numbered) => parse_numbered(text),
        Some(SourceFormat::Tsv) => parse_delimited(text, b'\t'),
        Some(SourceFormat::Csv) => parse_delimited(text, b','),
        None => Vec::new(),
    }
}

/// `## large` / `### middle` / `- small`.
fn parse_markdown(text: &str) -> Vec<Industry> {
    let mut large: Option<&str> = None;
    let mut middle: Option<&str> = None;
    let mut rows = Vec::new();
    for line in text.lines().map(str::trim) {
        if let Some(rest) = line.strip_prefix("### ") {
            middle = Some(rest.trim());
        } else if let Some(rest) = line.strip_prefix("## ") {
            large = Some(rest.trim());
            middle = None;
        } else if let Some(small) = line.strip_prefix("- ").map(str::trim) {
            if SKIP_LABELS.contains(&small) {
                continue;
            }
            if let (Some(l), Some(m)) = (large, middle) {
                if !small.is_empty() {
                    rows.push(Industry::new(l, m, small));
                }
            }
        }
    }
    rows
}

/// `1. large`, tab-indented `1. middle`, tab-indented `• small`. A small
/// entry without a middle heading uses the large name for both.
fn parse_numbered(text: &str) -> Vec<Industry> {
    let mut large: Option<String> = None;
    let mut middle: Option<String> = None;
    let mut rows = Vec::new();
    for line in text.lines() {
        let indented = line.starts_with('\t') || line.starts_with("  ");
        let content = line.trim();
        if content.is_empty() {
            continue;
        }
        if let Some(caps) = BULLET_RE.captures(content) {
            let small = caps[1].trim();
            if SKIP_LABELS.contains(&small) {
                continue;
            }
            if let Some(l) = &large {
                let m = middle.as_deref().unwrap_or(l);
                rows.push(Industry::new(l, m, small));
            }
        } else if let Some(caps) = NUMBERED_RE.captures(content) {
            let name = caps[2].trim().to_string();
            if indented {
                middle = Some(name);
            } else {
                large = Some(name);
                middle = None;
            }
        }
    }
    rows
}

fn parse_delimited(text: &str, delimiter: u8) -> Vec<Industry> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    reader
        .records()
        .filter_map(|r| r.ok())
        .filter(|r| r.len() >= 3)
        .filter(|r| !(r[0].trim() == "large" && r[1].trim() == "middle"))
        .filter(|r| (0..3).all(|i| !r[i].trim().is_empty()))
        .map(|r| Industry::new(&r[0], &r[1], &r[2]))
        .collect()
}

/// Write `large,middle,small` with a header row.
pub fn write_csv(entries: &[Industry], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let csv_err = |source| ImportError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = csv::Writer::from_path(path).map_err(csv_err)?;
    writer.write_record(["large", "middle", "small"]).map_err(csv_err)?;
    for e in entries {
        writer
            .write_record([&e.large, &e.middle, &e.small])
            .map_err(csv_err)?;
    }
    writer.flush()?;
    Ok(())
}
