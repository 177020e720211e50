//! JSON-backed stores that accumulate what past imports observed.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::Result;
use crate::schema::Field;
use crate::utils::{fold, truncate};

/// Observations needed before a learned mapping is trusted.
pub const MIN_OBSERVATIONS: u32 = 2;
const MAX_SHAPE_CHARS: usize = 24;

fn load_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T> {
    if !path.exists() {
        return Ok(T::default());
    }
    let raw = std::fs::read_to_string(path)?;
    match serde_json::from_str(&raw) {
        Ok(v) => Ok(v),
        Err(e) => {
            let aside = set_aside(path)?;
            warn!(file = %path.display(), moved_to = %aside.display(), "unreadable store, starting empty: {}", e);
            Ok(T::default())
        }
    }
}

/// Move an unreadable store out of the way so the next save cannot clobber it.
fn set_aside(path: &Path) -> Result<PathBuf> {
    let base = path.as_os_str().to_string_lossy();
    let mut aside = PathBuf::from(format!("{}.corrupt", base));
    let mut n = 1;
    while aside.exists() {
        aside = PathBuf::from(format!("{}.corrupt.{}", base, n));
        n += 1;
    }
    std::fs::rename(path, &aside)?;
    Ok(aside)
}

fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

/// normalized header -> field key -> observation count.
#[derive(Debug, Default)]
pub struct HeaderMappingStore {
    path: Option<PathBuf>,
    entries: BTreeMap<String, BTreeMap<String, u32>>,
}

impl HeaderMappingStore {
    pub fn load(path: &Path) -> Result<Self> {
        let entries = load_json(path)?;
        Ok(HeaderMappingStore {
            path: Some(path.to_path_buf()),
            entries,
        })
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    /// The field this header was mapped to most often, once seen twice.
    pub fn learned_field(&self, header: &str) -> Option<Field> {
        let counts = self.entries.get(&fold(header))?;
        counts
            .iter()
            .filter(|(_, n)| **n >= MIN_OBSERVATIONS)
            .filter_map(|(key, n)| Some((key.parse::<Field>().ok()?, *n)))
            .sorted_by_key(|(field, n)| (std::cmp::Reverse(*n), *field))
            .map(|(field, _)| field)
            .next()
    }

    pub fn record(&mut self, header: &str, field: Field) {
        let key = fold(header);
        if key.is_empty() {
            return;
        }
        *self
            .entries
            .entry(key)
            .or_default()
            .entry(field.key().to_string())
            .or_insert(0) += 1;
    }

    pub fn count(&self, header: &str, field: Field) -> u32 {
        self.entries
            .get(&fold(header))
            .and_then(|m| m.get(field.key()))
            .copied()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => {
                save_json(path, &self.entries)?;
                debug!(file = %path.display(), headers = self.entries.len(), "saved header mappings");
                Ok(())
            }
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FieldObservations {
    pub shapes: BTreeMap<String, u32>,
    pub types: BTreeMap<String, u32>,
}

/// Per-field histogram of value shapes, fed to the advisor prompt.
#[derive(Debug, Default)]
pub struct FieldKnowledgeStore {
    path: Option<PathBuf>,
    fields: BTreeMap<String, FieldObservations>,
}

impl FieldKnowledgeStore {
    pub fn load(path: &Path) -> Result<Self> {
        let fields = load_json(path)?;
        Ok(FieldKnowledgeStore {
            path: Some(path.to_path_buf()),
            fields,
        })
    }

    pub fn in_memory() -> Self {
        Self::default()
    }

    pub fn observe(&mut self, field: Field, value: &str) {
        let shape = value_shape(value);
        if shape.is_empty() {
            return;
        }
        let entry = self.fields.entry(field.key().to_string()).or_default();
        *entry.shapes.entry(shape).or_insert(0) += 1;
        *entry.types.entry(type_label(value).to_string()).or_insert(0) += 1;
    }

    pub fn get(&self, field: Field) -> Option<&FieldObservations> {
        self.fields.get(field.key())
    }

    /// One line per field: the most common shapes and type labels.
    pub fn prompt_summary(&self, top: usize) -> String {
        self.fields
            .iter()
            .map(|(field, obs)| {
                let top_of = |m: &BTreeMap<String, u32>| {
                    m.iter()
                        .sorted_by_key(|(k, n)| (std::cmp::Reverse(**n), (*k).clone()))
                        .take(top)
                        .map(|(k, n)| format!("{}({})", k, n))
                        .join(", ")
                };
                format!("{}: shapes [{}] types [{}]", field, top_of(&obs.shapes), top_of(&obs.types))
            })
            .join("\n")
    }

    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => save_json(path, &self.fields),
            None => Ok(()),
        }
    }
}

/// Coarse character-class shape: digits -> 9, ASCII letters -> a, Japanese
/// text -> あ, runs collapsed. `03-1234-5678` -> `9-9-9`.
pub fn value_shape(value: &str) -> String {
    let mut out = String::new();
    for c in value.trim().chars() {
        let class = if c.is_ascii_digit() {
            '9'
        } else if c.is_ascii_alphabetic() {
            'a'
        } else if c.is_whitespace() {
            ' '
        } else if c.is_ascii_punctuation() {
            c
        } else {
            'あ'
        };
        if out.chars().last() != Some(class) {
            out.push(class);
        }
    }
    truncate(&out, MAX_SHAPE_CHARS)
}

fn type_label(value: &str) -> &'static str {
    let v = value.trim();
    if v.starts_with("http://") || v.starts_with("https://") {
        "url"
    } else if v.chars().all(|c| c.is_ascii_digit()) {
        "integer"
    } else if v.chars().all(|c| c.is_ascii_digit() || matches!(c, '-' | ',' | '.')) {
        "numeric"
    } else if v.is_ascii() {
        "ascii"
    } else {
        "text"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learned_field_needs_two_observations() {
        let mut store = HeaderMappingStore::in_memory();
        store.record("取引先名", Field::Name);
        assert_eq!(store.learned_field("取引先名"), None);
        store.record("取引先名 ", Field::Name);
        assert_eq!(store.learned_field("取引先名"), Some(Field::Name));
        assert_eq!(store.count("取引先名", Field::Name), 2);
    }

    #[test]
    fn most_observed_field_wins() {
        let mut store = HeaderMappingStore::in_memory();
        for _ in 0..2 {
            store.record("連絡先", Field::Address);
        }
        for _ in 0..3 {
            store.record("連絡先", Field::Tel);
        }
        assert_eq!(store.learned_field("連絡先"), Some(Field::Tel));
    }

    #[test]
    fn header_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/header_mappings.json");
        let mut store = HeaderMappingStore::load(&path).unwrap();
        assert!(store.is_empty());
        store.record("ＴＥＬ", Field::Tel);
        store.record("tel", Field::Tel);
        store.save().unwrap();

        let reloaded = HeaderMappingStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.learned_field("Tel"), Some(Field::Tel));
    }

    #[test]
    fn shapes() {
        assert_eq!(value_shape("03-1234-5678"), "9-9-9");
        assert_eq!(value_shape("https://example.com"), "a:/a.a");
        assert_eq!(value_shape("株式会社テスト"), "あ");
        assert_eq!(type_label("1234567890123"), "integer");
    }

    #[test]
    fn corrupt_store_is_kept_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("header_mappings.json");
        std::fs::write(&path, "{ not json").unwrap();

        let mut store = HeaderMappingStore::load(&path).unwrap();
        assert!(store.is_empty());
        let aside = dir.path().join("header_mappings.json.corrupt");
        assert_eq!(std::fs::read_to_string(&aside).unwrap(), "{ not json");

        store.record("電話番号", Field::Tel);
        store.save().unwrap();
        assert_eq!(std::fs::read_to_string(&aside).unwrap(), "{ not json");

        std::fs::write(&path, "[]").unwrap();
        FieldKnowledgeStore::load(&path).unwrap();
        assert!(dir.path().join("header_mappings.json.corrupt.1").exists());
    }

    #[test]
    fn knowledge_summary_and_persistence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("field_knowledge.json");
        let mut store = FieldKnowledgeStore::load(&path).unwrap();
        store.observe(Field::Tel, "03-1234-5678");
        store.observe(Field::Tel, "06-1234-5678");
        store.observe(Field::Tel, "0312345678");
        store.save().unwrap();

        let reloaded = FieldKnowledgeStore::load(&path).unwrap();
        let tel = reloaded.get(Field::Tel).unwrap();
        assert_eq!(tel.shapes.get("9-9-9"), Some(&2));
        assert!(reloaded.prompt_summary(1).starts_with("tel: shapes [9-9-9(2)]"));
    }
}
