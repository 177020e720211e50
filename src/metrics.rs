use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rusqlite::Connection;

use crate::db::{self, ImportRunRow};
use crate::error::Result;
use crate::upsert::UpsertStats;
use crate::utils::format_duration;

/// Per-file outcome of an import.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FileStats {
    pub file: String,
    /// "header", "scan" or "profile".
    pub mode: String,
    pub rows_total: usize,
    pub skipped_empty: usize,
    pub skipped_no_name: usize,
    pub rejected_fields: usize,
    pub shift_fallbacks: usize,
    pub bad_records: usize,
    pub upsert: UpsertStats,
    pub advisor: Option<String>,
    pub duration: Duration,
}

impl FileStats {
    pub fn skipped_rows(&self) -> usize {
        self.skipped_empty + self.skipped_no_name
    }
}

pub struct RunTracker {
    run_id: String,
    dry_run: bool,
    files: Vec<FileStats>,
}

impl RunTracker {
    pub fn new(run_id: String, dry_run: bool) -> Self {
        RunTracker {
            run_id,
            dry_run,
            files: Vec::new(),
        }
    }

    pub fn record(&mut self, stats: FileStats) {
        println!(
            "  {}: {} rows -> {} created, {} updated, {} unchanged, {} skipped, {} fields rejected ({})",
            stats.file,
            stats.rows_total,
            stats.upsert.created,
            stats.upsert.updated,
            stats.upsert.unchanged,
            stats.skipped_rows(),
            stats.rejected_fields,
            format_duration(stats.duration),
        );
        self.files.push(stats);
    }

    pub fn files(&self) -> &[FileStats] {
        &self.files
    }

    pub fn totals(&self) -> FileStats {
        let mut t = FileStats {
            file: "total".to_string(),
            ..Default::default()
        };
        for f in &self.files {
            t.rows_total += f.rows_total;
            t.skipped_empty += f.skipped_empty;
            t.skipped_no_name += f.skipped_no_name;
            t.rejected_fields += f.rejected_fields;
            t.shift_fallbacks += f.shift_fallbacks;
            t.bad_records += f.bad_records;
            t.upsert.created += f.upsert.created;
            t.upsert.updated += f.upsert.updated;
            t.upsert.unchanged += f.upsert.unchanged;
            for (kind, n) in &f.upsert.matched_by {
                *t.upsert.matched_by.entry(*kind).or_insert(0) += n;
            }
            t.duration += f.duration;
        }
        t
    }

    pub fn persist(&self, conn: &Connection) -> Result<()> {
        for f in &self.files {
            db::insert_import_run(
                conn,
                &ImportRunRow {
                    run_id: self.run_id.clone(),
                    file: f.file.clone(),
                    mode: f.mode.clone(),
                    rows_total: f.rows_total,
                    created: f.upsert.created,
                    updated: f.upsert.updated,
                    unchanged: f.upsert.unchanged,
                    skipped_rows: f.skipped_rows(),
                    rejected_fields: f.rejected_fields,
                    advisor: f.advisor.clone(),
                    dry_run: self.dry_run,
                    duration_ms: f.duration.as_millis() as i64,
                },
            )?;
        }
        Ok(())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }
}

pub fn new_run_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("run-{}", now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upsert::MatchKind;

    #[test]
    fn totals_and_persistence() {
        let conn = db::connect_in_memory().unwrap();
        let mut tracker = RunTracker::new("run-7".into(), false);
        let mut a = FileStats {
            file: "a.csv".into(),
            mode: "header".into(),
            rows_total: 10,
            skipped_no_name: 2,
            duration: Duration::from_millis(1500),
            ..Default::default()
        };
        a.upsert.created = 8;
        a.upsert.matched_by.insert(MatchKind::Name, 1);
        let mut b = FileStats {
            file: "b.csv".into(),
            mode: "scan".into(),
            rows_total: 4,
            rejected_fields: 3,
            advisor: Some("timeout".into()),
            ..Default::default()
        };
        b.upsert.updated = 4;
        b.upsert.matched_by.insert(MatchKind::Name, 4);
        tracker.record(a);
        tracker.record(b);

        let t = tracker.totals();
        assert_eq!(t.rows_total, 14);
        assert_eq!(t.upsert.total(), 12);
        assert_eq!(t.skipped_rows(), 2);
        assert_eq!(t.upsert.matched_by.get(&MatchKind::Name), Some(&5));

        tracker.persist(&conn).unwrap();
        let runs = db::recent_import_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].file, "b.csv");
        assert_eq!(runs[1].duration_ms, 1500);
        assert!(new_run_id().starts_with("run-"));
        assert_eq!(tracker.run_id(), "run-7");
    }
}
