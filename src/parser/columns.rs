use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::learning::HeaderMappingStore;
use crate::schema::Field;

use super::header::best_field;

/// Confidence an advisor suggestion needs to fill an unmapped column.
pub const FILL_CONFIDENCE: f32 = 0.5;
/// Confidence an advisor suggestion needs to replace a heuristic mapping.
pub const OVERRIDE_CONFIDENCE: f32 = 0.75;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingSource {
    Profile,
    Learned,
    Synonym,
    Advisor,
}

impl fmt::Display for MappingSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MappingSource::Profile => "profile",
            MappingSource::Learned => "learned",
            MappingSource::Synonym => "synonym",
            MappingSource::Advisor => "advisor",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMapping {
    pub field: Field,
    pub header: String,
    pub source: MappingSource,
}

/// One suggested column assignment, as returned by the mapping advisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSuggestion {
    pub index: usize,
    pub field: String,
    #[serde(default)]
    pub confidence: f32,
}

/// Column index -> canonical field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColumnMap {
    columns: BTreeMap<usize, ColumnMapping>,
}

impl ColumnMap {
    pub fn get(&self, index: usize) -> Option<&ColumnMapping> {
        self.columns.get(&index)
    }

    pub fn field_at(&self, index: usize) -> Option<Field> {
        self.columns.get(&index).map(|m| m.field)
    }

    /// First column mapped to `field`.
    pub fn column_of(&self, field: Field) -> Option<usize> {
        self.columns
            .iter()
            .find(|(_, m)| m.field == field)
            .map(|(i, _)| *i)
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &ColumnMapping)> {
        self.columns.iter().map(|(i, m)| (*i, m))
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn insert(&mut self, index: usize, field: Field, header: &str, source: MappingSource) {
        self.columns.insert(
            index,
            ColumnMapping {
                field,
                header: header.to_string(),
                source,
            },
        );
    }

    /// `header=field` pairs, as stored with each record.
    pub fn describe(&self) -> String {
        self.columns
            .iter()
            .map(|(_, m)| format!("{}={}", m.header.trim(), m.field))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Build the column map for one header row. Precedence per column: profile
/// pin, learned store, synonym heuristic; advisor suggestions then fill gaps
/// and, when confident enough, replace heuristic picks.
pub fn map_columns(
    headers: &[String],
    store: &HeaderMappingStore,
    suggestions: &[ColumnSuggestion],
    pinned: &[(usize, Field)],
) -> ColumnMap {
    let mut map = ColumnMap::default();
    let header_at = |i: usize| headers.get(i).map(String::as_str).unwrap_or("");

    for (index, header) in headers.iter().enumerate() {
        if let Some(field) = store.learned_field(header) {
            map.insert(index, field, header, MappingSource::Learned);
        } else if let Some((field, _)) = best_field(header) {
            map.insert(index, field, header, MappingSource::Synonym);
        }
    }

    for s in suggestions {
        let Ok(field) = s.field.parse::<Field>() else {
            debug!(index = s.index, field = %s.field, "ignoring unknown suggested field");
            continue;
        };
        let threshold = match map.field_at(s.index) {
            None => FILL_CONFIDENCE,
            Some(current) if current == field => continue,
            Some(_) => OVERRIDE_CONFIDENCE,
        };
        if s.confidence >= threshold {
            map.insert(s.index, field, header_at(s.index), MappingSource::Advisor);
        }
    }

    for (index, field) in pinned {
        map.insert(*index, *field, header_at(*index), MappingSource::Profile);
    }
    map
}

/// Feed the final mappings back into the learned store.
pub fn record_mappings(map: &ColumnMap, store: &mut HeaderMappingStore) {
    for (_, m) in map.iter() {
        store.record(&m.header, m.field);
    }
}
