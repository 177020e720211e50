use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use rusqlite::{Connection, Transaction};
use strsim::jaro_winkler;
use tracing::{debug, info};

use crate::db::{self, LookupKey, StoredCompany};
use crate::error::Result;
use crate::parser::values::validate_corporate_number;
use crate::schema::{CompanyRecord, Field, MergeMode};
use crate::utils::fold;

/// Name-only lookups consider at most this many candidates.
const NAME_CANDIDATES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MatchKind {
    CorporateNumber,
    NameAddress,
    NamePrefecture,
    NameRepresentative,
    Name,
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            MatchKind::CorporateNumber => "corporate_number",
            MatchKind::NameAddress => "name+address",
            MatchKind::NamePrefecture => "name+prefecture",
            MatchKind::NameRepresentative => "name+representative",
            MatchKind::Name => "name",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    Created(String),
    Updated {
        id: String,
        matched_by: MatchKind,
        fields: Vec<Field>,
    },
    Unchanged {
        id: String,
        matched_by: MatchKind,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub matched_by: BTreeMap<MatchKind, usize>,
}

impl UpsertStats {
    fn record(&mut self, outcome: &UpsertOutcome) {
        match outcome {
            UpsertOutcome::Created(_) => self.created += 1,
            UpsertOutcome::Updated { matched_by, .. } => {
                self.updated += 1;
                *self.matched_by.entry(*matched_by).or_insert(0) += 1;
            }
            UpsertOutcome::Unchanged { matched_by, .. } => {
                self.unchanged += 1;
                *self.matched_by.entry(*matched_by).or_insert(0) += 1;
            }
        }
    }

    pub fn total(&self) -> usize {
        self.created + self.updated + self.unchanged
    }

    /// Counts accumulated after the `earlier` snapshot.
    pub fn since(&self, earlier: &UpsertStats) -> UpsertStats {
        let matched_by = self
            .matched_by
            .iter()
            .map(|(kind, n)| (*kind, n - earlier.matched_by.get(kind).copied().unwrap_or(0)))
            .filter(|(_, n)| *n > 0)
            .collect();
        UpsertStats {
            created: self.created - earlier.created,
            updated: self.updated - earlier.updated,
            unchanged: self.unchanged - earlier.unchanged,
            matched_by,
        }
    }
}

#[derive(Debug, Clone)]
pub struct UpsertOptions {
    pub mode: MergeMode,
    /// Replaced even in fill-empty mode.
    pub always_overwrite: Vec<Field>,
    pub batch_size: usize,
    pub dry_run: bool,
}

impl Default for UpsertOptions {
    fn default() -> Self {
        UpsertOptions {
            mode: MergeMode::FillEmpty,
            always_overwrite: Vec::new(),
            batch_size: 400,
            dry_run: false,
        }
    }
}

/// Walk the lookup chain: corporate number, then name with address,
/// prefecture or representative, then name alone. First hit wins. Once the
/// corporate number missed, stored companies carrying a different number are
/// never matched by name.
pub fn find_existing(conn: &Connection, record: &CompanyRecord) -> Result<Option<(StoredCompany, MatchKind)>> {
    let number = record.corporate_number.as_deref();
    if let Some(num) = number {
        if let Some(hit) = db::find_by(conn, &LookupKey::CorporateNumber(num), 1)?.into_iter().next() {
            return Ok(Some((hit, MatchKind::CorporateNumber)));
        }
    }
    let Some(name) = record.name.as_deref() else {
        return Ok(None);
    };
    let compatible = |c: &StoredCompany| match (number, c.record.corporate_number.as_deref()) {
        (Some(ours), Some(theirs)) => ours == theirs,
        _ => true,
    };

    let mut keyed = Vec::new();
    if let Some(address) = record.address.as_deref() {
        keyed.push((LookupKey::NameAddress { name, address }, MatchKind::NameAddress));
    }
    if let Some(prefecture) = record.prefecture.as_deref() {
        keyed.push((LookupKey::NamePrefecture { name, prefecture }, MatchKind::NamePrefecture));
    }
    if let Some(representative) = record.representative_name.as_deref() {
        keyed.push((
            LookupKey::NameRepresentative { name, representative },
            MatchKind::NameRepresentative,
        ));
    }
    for (key, kind) in keyed {
        let hit = db::find_by(conn, &key, NAME_CANDIDATES)?.into_iter().find(|c| compatible(c));
        if let Some(hit) = hit {
            return Ok(Some((hit, kind)));
        }
    }

    let candidates = db::find_by(conn, &LookupKey::Name(name), NAME_CANDIDATES)?
        .into_iter()
        .filter(|c| compatible(c))
        .collect();
    Ok(pick_by_address(candidates, record.address.as_deref()).map(|hit| (hit, MatchKind::Name)))
}

/// Several same-name companies: prefer the closest address, else the smallest id.
fn pick_by_address(mut candidates: Vec<StoredCompany>, address: Option<&str>) -> Option<StoredCompany> {
    if candidates.len() <= 1 {
        return candidates.pop();
    }
    let Some(address) = address.map(fold) else {
        return candidates.into_iter().next();
    };
    let score = |c: &StoredCompany| {
        c.record
            .address
            .as_deref()
            .map(|a| jaro_winkler(&fold(a), &address))
            .unwrap_or(0.0)
    };
    let mut best = 0;
    let mut best_score = score(&candidates[0]);
    for (i, c) in candidates.iter().enumerate().skip(1) {
        let s = score(c);
        if s > best_score {
            best = i;
            best_score = s;
        }
    }
    Some(candidates.swap_remove(best))
}

pub fn new_id(record: &CompanyRecord, row_index: usize) -> String {
    record
        .corporate_number
        .as_deref()
        .and_then(validate_corporate_number)
        .unwrap_or_else(|| format!("{}_{}", Utc::now().timestamp_millis(), row_index))
}

/// Batched writer. Every lookup goes through the same connection as the open
/// transaction, so rows written earlier in the batch are visible to later ones.
pub struct Upserter<'c> {
    conn: &'c Connection,
    tx: Option<Transaction<'c>>,
    pending: usize,
    options: UpsertOptions,
    stats: UpsertStats,
    committed_batches: usize,
}

impl<'c> Upserter<'c> {
    pub fn new(conn: &'c Connection, mut options: UpsertOptions) -> Self {
        options.batch_size = options.batch_size.clamp(1, 499);
        Upserter {
            conn,
            tx: None,
            pending: 0,
            options,
            stats: UpsertStats::default(),
            committed_batches: 0,
        }
    }

    pub fn stats(&self) -> &UpsertStats {
        &self.stats
    }

    /// Per-source fields that replace stored values regardless of mode.
    pub fn set_always_overwrite(&mut self, fields: Vec<Field>) {
        self.options.always_overwrite = fields;
    }

    fn begin(&mut self) -> Result<()> {
        if self.tx.is_none() {
            self.tx = Some(self.conn.unchecked_transaction()?);
        }
        Ok(())
    }

    pub fn upsert(&mut self, mut incoming: CompanyRecord, row_index: usize) -> Result<UpsertOutcome> {
        self.begin()?;
        let now = Utc::now().to_rfc3339();

        let outcome = match find_existing(self.conn, &incoming)? {
            Some((mut existing, matched_by)) => {
                let fields = existing.record.merge_from(
                    &incoming,
                    self.options.mode,
                    &self.options.always_overwrite,
                );
                if fields.is_empty() {
                    UpsertOutcome::Unchanged {
                        id: existing.id,
                        matched_by,
                    }
                } else {
                    existing.record.updated_at = Some(now);
                    db::put(self.conn, &existing.id, &existing.record)?;
                    self.pending += 1;
                    UpsertOutcome::Updated {
                        id: existing.id,
                        matched_by,
                        fields,
                    }
                }
            }
            None => {
                let mut id = new_id(&incoming, row_index);
                while db::get(self.conn, &id)?.is_some() {
                    id = format!("{}_{}", Utc::now().timestamp_millis() + 1, row_index);
                }
                incoming.created_at = Some(now.clone());
                incoming.updated_at = Some(now);
                db::put(self.conn, &id, &incoming)?;
                self.pending += 1;
                UpsertOutcome::Created(id)
            }
        };
        debug!(row = row_index, ?outcome, "upsert");
        self.stats.record(&outcome);

        if self.pending >= self.options.batch_size && !self.options.dry_run {
            self.commit_batch()?;
        }
        Ok(outcome)
    }

    fn commit_batch(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.commit()?;
            self.committed_batches += 1;
            debug!(writes = self.pending, batch = self.committed_batches, "committed batch");
        }
        self.pending = 0;
        Ok(())
    }

    /// Commit the last partial batch, or roll everything back on a dry run.
    pub fn finish(mut self) -> Result<UpsertStats> {
        match self.tx.take() {
            Some(tx) if self.options.dry_run => {
                tx.rollback()?;
                info!(writes = self.stats.created + self.stats.updated, "dry run, rolled back");
            }
            Some(tx) => {
                self.tx = Some(tx);
                self.commit_batch()?;
            }
            None => {}
        }
        Ok(self.stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str) -> CompanyRecord {
        CompanyRecord {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    fn with_corp(name: &str, corp: &str) -> CompanyRecord {
        CompanyRecord {
            corporate_number: Some(corp.into()),
            ..record(name)
        }
    }

    #[test]
    fn importing_twice_is_idempotent() {
        let conn = db::connect_in_memory().unwrap();
        let mut first = with_corp("株式会社A", "1234567890123");
        first.tel = Some("03-1111-1111".into());

        let mut up = Upserter::new(&conn, UpsertOptions::default());
        assert_eq!(up.upsert(first.clone(), 0).unwrap(), UpsertOutcome::Created("1234567890123".into()));
        let again = up.upsert(first.clone(), 1).unwrap();
        assert!(matches!(again, UpsertOutcome::Unchanged { matched_by: MatchKind::CorporateNumber, .. }));
        up.finish().unwrap();

        let mut second = with_corp("株式会社A（旧）", "1234567890123");
        second.tel = Some("03-9999-9999".into());
        second.employee_count = Some(50);
        let mut up = Upserter::new(&conn, UpsertOptions::default());
        let outcome = up.upsert(second, 0).unwrap();
        let stats = up.finish().unwrap();

        assert_eq!(stats.updated, 1);
        assert!(matches!(outcome, UpsertOutcome::Updated { ref fields, .. } if fields == &[Field::EmployeeCount]));
        assert_eq!(db::count(&conn).unwrap(), 1);
        let stored = db::get(&conn, "1234567890123").unwrap().unwrap().record;
        assert_eq!(stored.name.as_deref(), Some("株式会社A"));
        assert_eq!(stored.tel.as_deref(), Some("03-1111-1111"));
        assert_eq!(stored.employee_count, Some(50));
        assert!(stored.created_at.is_some());
    }

    #[test]
    fn force_overwrite_replaces() {
        let conn = db::connect_in_memory().unwrap();
        let mut up = Upserter::new(&conn, UpsertOptions::default());
        let mut r = with_corp("株式会社A", "1234567890123");
        r.tel = Some("03-1111-1111".into());
        up.upsert(r, 0).unwrap();
        up.finish().unwrap();

        let options = UpsertOptions {
            mode: MergeMode::ForceOverwrite,
            ..Default::default()
        };
        let mut up = Upserter::new(&conn, options);
        let mut r = with_corp("株式会社A", "1234567890123");
        r.tel = Some("03-2222-2222".into());
        up.upsert(r, 0).unwrap();
        up.finish().unwrap();
        let stored = db::get(&conn, "1234567890123").unwrap().unwrap().record;
        assert_eq!(stored.tel.as_deref(), Some("03-2222-2222"));
    }

    #[test]
    fn lookup_chain_order() {
        let conn = db::connect_in_memory().unwrap();
        let mut a = record("株式会社同名");
        a.address = Some("東京都港区1-1".into());
        a.prefecture = Some("東京都".into());
        db::put(&conn, "a", &a).unwrap();
        let mut b = record("株式会社同名");
        b.address = Some("大阪府大阪市北区2-2".into());
        b.prefecture = Some("大阪府".into());
        b.representative_name = Some("山田太郎".into());
        db::put(&conn, "b", &b).unwrap();

        let mut probe = record("株式会社同名");
        probe.prefecture = Some("大阪府".into());
        let (hit, kind) = find_existing(&conn, &probe).unwrap().unwrap();
        assert_eq!((hit.id.as_str(), kind), ("b", MatchKind::NamePrefecture));

        let mut probe = record("株式会社同名");
        probe.representative_name = Some("山田太郎".into());
        let (hit, kind) = find_existing(&conn, &probe).unwrap().unwrap();
        assert_eq!((hit.id.as_str(), kind), ("b", MatchKind::NameRepresentative));

        let mut probe = record("株式会社同名");
        probe.address = Some("大阪府大阪市北区2-3".into());
        let (hit, kind) = find_existing(&conn, &probe).unwrap().unwrap();
        assert_eq!((hit.id.as_str(), kind), ("b", MatchKind::Name));

        let (hit, _) = find_existing(&conn, &record("株式会社同名")).unwrap().unwrap();
        assert_eq!(hit.id, "a");
        assert!(find_existing(&conn, &record("株式会社別")).unwrap().is_none());
    }

    #[test]
    fn different_corporate_numbers_stay_separate() {
        let conn = db::connect_in_memory().unwrap();
        let mut up = Upserter::new(&conn, UpsertOptions::default());
        let mut first = with_corp("株式会社サンプル", "1234567890123");
        first.address = Some("東京都港区1-1".into());
        first.prefecture = Some("東京都".into());
        up.upsert(first, 0).unwrap();

        let mut other = with_corp("株式会社サンプル", "9876543210987");
        other.address = Some("東京都港区1-1".into());
        other.prefecture = Some("東京都".into());
        other.tel = Some("06-1111-2222".into());
        let outcome = up.upsert(other, 1).unwrap();
        assert_eq!(outcome, UpsertOutcome::Created("9876543210987".into()));

        // A record without a number still merges by name.
        let mut bare = record("株式会社サンプル");
        bare.employee_count = Some(12);
        let outcome = up.upsert(bare, 2).unwrap();
        assert!(matches!(outcome, UpsertOutcome::Updated { ref id, matched_by: MatchKind::Name, .. } if id == "1234567890123"));
        up.finish().unwrap();

        assert_eq!(db::count(&conn).unwrap(), 2);
        let kept = db::get(&conn, "1234567890123").unwrap().unwrap().record;
        assert_eq!(kept.tel, None);
        let added = db::get(&conn, "9876543210987").unwrap().unwrap().record;
        assert_eq!(added.tel.as_deref(), Some("06-1111-2222"));
    }

    #[test]
    fn numbered_record_skips_conflicting_candidate() {
        let conn = db::connect_in_memory().unwrap();
        db::put(&conn, "a", &with_corp("株式会社同名", "1234567890123")).unwrap();
        db::put(&conn, "b", &record("株式会社同名")).unwrap();

        let incoming = with_corp("株式会社同名", "9876543210987");
        let (hit, kind) = find_existing(&conn, &incoming).unwrap().unwrap();
        assert_eq!((hit.id.as_str(), kind), ("b", MatchKind::Name));

        db::put(&conn, "b", &with_corp("株式会社同名", "1111111111111")).unwrap();
        assert!(find_existing(&conn, &incoming).unwrap().is_none());
    }

    #[test]
    fn batches_commit_and_dry_run_rolls_back() {
        let conn = db::connect_in_memory().unwrap();
        let options = UpsertOptions {
            batch_size: 2,
            ..Default::default()
        };
        let mut up = Upserter::new(&conn, options);
        for i in 0..5 {
            up.upsert(record(&format!("株式会社{}", i)), i).unwrap();
        }
        assert_eq!(up.committed_batches, 2);
        up.finish().unwrap();
        assert_eq!(db::count(&conn).unwrap(), 5);

        let dry = UpsertOptions {
            dry_run: true,
            batch_size: 2,
            ..Default::default()
        };
        let mut up = Upserter::new(&conn, dry);
        for i in 0..3 {
            up.upsert(record(&format!("新規{}", i)), i).unwrap();
        }
        // Duplicate within the dry run still finds the uncommitted row.
        let dup = up.upsert(record("新規0"), 9).unwrap();
        assert!(matches!(dup, UpsertOutcome::Unchanged { .. }));
        let stats = up.finish().unwrap();
        assert_eq!(stats.created, 3);
        assert_eq!(db::count(&conn).unwrap(), 5);
    }

    #[test]
    fn stats_since_snapshot() {
        let conn = db::connect_in_memory().unwrap();
        let mut up = Upserter::new(&conn, UpsertOptions::default());
        up.upsert(record("株式会社A"), 0).unwrap();
        let before = up.stats().clone();
        up.upsert(record("株式会社A"), 1).unwrap();
        up.upsert(record("株式会社B"), 2).unwrap();
        let delta = up.stats().since(&before);
        assert_eq!((delta.created, delta.unchanged), (1, 1));
        assert_eq!(delta.matched_by.get(&MatchKind::Name), Some(&1));
    }

    #[test]
    fn ids_prefer_clean_corporate_numbers() {
        assert_eq!(new_id(&with_corp("A", "1234567890123"), 3), "1234567890123");
        let generated = new_id(&record("A"), 7);
        assert!(generated.ends_with("_7"));
    }
}
