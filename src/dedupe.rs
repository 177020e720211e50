use std::fmt;
use std::str::FromStr;

use itertools::Itertools;
use rusqlite::Connection;
use tracing::{debug, info};

use crate::db::{self, StoredCompany};
use crate::error::Result;
use crate::schema::{Field, MergeMode};
use crate::utils::fold;

/// Deletes per transaction.
pub const DELETE_BATCH: usize = 400;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DedupeKey {
    /// name + address + prefecture + representative
    #[default]
    Full,
    NameAddress,
    CorporateNumber,
}

impl FromStr for DedupeKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
            "full" => Ok(DedupeKey::Full),
            "name-address" => Ok(DedupeKey::NameAddress),
            "corporate-number" | "corp" => Ok(DedupeKey::CorporateNumber),
            other => Err(format!("unknown dedupe key: {}", other)),
        }
    }
}

impl fmt::Display for DedupeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            DedupeKey::Full => "full",
            DedupeKey::NameAddress => "name-address",
            DedupeKey::CorporateNumber => "corporate-number",
        })
    }
}

impl DedupeKey {
    fn fields(self) -> &'static [Field] {
        match self {
            DedupeKey::Full => &[
                Field::Name,
                Field::Address,
                Field::Prefecture,
                Field::RepresentativeName,
            ],
            DedupeKey::NameAddress => &[Field::Name, Field::Address],
            DedupeKey::CorporateNumber => &[Field::CorporateNumber],
        }
    }

    /// Folded key, or None when the first component is missing.
    pub fn key_of(self, company: &StoredCompany) -> Option<String> {
        let parts: Vec<String> = self
            .fields()
            .iter()
            .map(|f| company.record.text(*f).map(|v| fold(&v)).unwrap_or_default())
            .collect();
        if parts.first().map_or(true, String::is_empty) {
            return None;
        }
        Some(parts.join("|"))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateGroup {
    pub key: String,
    pub master: String,
    pub duplicates: Vec<String>,
    pub filled: Vec<Field>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DedupeReport {
    pub scanned: usize,
    pub groups: Vec<DuplicateGroup>,
    pub deleted: usize,
}

impl DedupeReport {
    pub fn duplicate_count(&self) -> usize {
        self.groups.iter().map(|g| g.duplicates.len()).sum()
    }
}

/// Master is the record with the most filled fields; the smallest id breaks ties.
fn pick_master(mut members: Vec<StoredCompany>) -> (StoredCompany, Vec<StoredCompany>) {
    members.sort_by(|a, b| {
        b.record
            .filled_count()
            .cmp(&a.record.filled_count())
            .then_with(|| a.id.cmp(&b.id))
    });
    let master = members.remove(0);
    (master, members)
}

/// Group all companies by `key`, fold each group into its master and delete
/// the rest. With `dry_run` nothing is written.
pub fn dedupe(conn: &Connection, key: DedupeKey, dry_run: bool) -> Result<DedupeReport> {
    let companies = db::all(conn)?;
    let scanned = companies.len();
    let grouped = companies
        .into_iter()
        .filter_map(|c| key.key_of(&c).map(|k| (k, c)))
        .into_group_map();

    let mut report = DedupeReport {
        scanned,
        ..Default::default()
    };
    let mut to_delete = Vec::new();
    let now = chrono::Utc::now().to_rfc3339();

    for (group_key, members) in grouped.into_iter().sorted_by(|a, b| a.0.cmp(&b.0)) {
        if members.len() < 2 {
            continue;
        }
        let (mut master, siblings) = pick_master(members);
        let mut filled = Vec::new();
        for sibling in &siblings {
            for f in master.record.merge_from(&sibling.record, MergeMode::FillEmpty, &[]) {
                if !filled.contains(&f) {
                    filled.push(f);
                }
            }
        }
        let duplicates: Vec<String> = siblings.into_iter().map(|s| s.id).collect();
        debug!(key = %group_key, master = %master.id, duplicates = duplicates.len(), "duplicate group");

        if !dry_run {
            if !filled.is_empty() {
                master.record.updated_at = Some(now.clone());
                db::put(conn, &master.id, &master.record)?;
            }
            to_delete.extend(duplicates.iter().cloned());
        }
        report.groups.push(DuplicateGroup {
            key: group_key,
            master: master.id,
            duplicates,
            filled,
        });
    }

    for chunk in to_delete.chunks(DELETE_BATCH) {
        report.deleted += db::delete_batch(conn, chunk)?;
    }
    info!(
        key = %key,
        scanned = report.scanned,
        groups = report.groups.len(),
        deleted = report.deleted,
        dry_run,
        "dedupe finished"
    );
    Ok(report)
}
