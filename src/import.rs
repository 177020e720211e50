//! Per-file import: load, classify, map, normalize, upsert.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::advisor::{advise, AdvisorRequest, AdvisorResponse, ColumnAdvisor, GeminiAdvisor};
use crate::config::{Settings, SourceProfile};
use crate::error::{Result, RowSkip};
use crate::learning::{FieldKnowledgeStore, HeaderMappingStore};
use crate::loader::{collect_csv_files, load_csv, LoadedCsv};
use crate::metrics::{new_run_id, FileStats, RunTracker};
use crate::parser::columns::{record_mappings, OVERRIDE_CONFIDENCE};
use crate::parser::header::HeaderRow;
use crate::parser::normalize::RowMode;
use crate::parser::{detect_header, normalize_rows, plan_layout, FileLayout};
use crate::schema::{CompanyRecord, Field, FieldValue, MergeMode};
use crate::taxonomy::Taxonomy;
use crate::upsert::{UpsertOptions, Upserter};

/// Rows handed to the normalizer at a time.
const CHUNK_ROWS: usize = 500;
/// Shapes per field quoted in the advisor prompt.
const KNOWLEDGE_TOP: usize = 3;

#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub force_overwrite: bool,
    /// Profile name used for every file instead of the file stem.
    pub profile: Option<String>,
    pub show_progress: bool,
}

pub struct Importer<'a> {
    conn: &'a Connection,
    settings: &'a Settings,
    options: ImportOptions,
    taxonomy: Taxonomy,
    mappings: HeaderMappingStore,
    knowledge: FieldKnowledgeStore,
    advisor: Option<Box<dyn ColumnAdvisor>>,
    last_advisor_call: Option<Instant>,
}

impl<'a> Importer<'a> {
    /// Loads the learned stores and taxonomy. With `ai.enabled` a missing
    /// API key is fatal.
    pub fn new(conn: &'a Connection, settings: &'a Settings, options: ImportOptions) -> Result<Self> {
        let advisor: Option<Box<dyn ColumnAdvisor>> = if settings.ai.enabled {
            Some(Box::new(GeminiAdvisor::new(&settings.ai)?))
        } else {
            None
        };
        let mappings = HeaderMappingStore::load(&settings.mapping_store_path)?;
        let knowledge = FieldKnowledgeStore::load(&settings.knowledge_store_path)?;
        let taxonomy = Taxonomy::load(settings.taxonomy_path.as_deref())?;
        debug!(learned_headers = mappings.len(), industries = taxonomy.len(), "importer ready");
        Ok(Importer {
            conn,
            settings,
            options,
            taxonomy,
            mappings,
            knowledge,
            advisor,
            last_advisor_call: None,
        })
    }

    pub fn with_advisor(mut self, advisor: Box<dyn ColumnAdvisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    /// Import every CSV under `inputs` in one run. Writes share one batched
    /// upserter, so a dry run rolls back the whole run at the end.
    pub fn run(&mut self, inputs: &[PathBuf]) -> Result<RunTracker> {
        let files = collect_csv_files(inputs)?;
        let dry_run = self.settings.dry_run;
        let mut tracker = RunTracker::new(new_run_id(), dry_run);
        info!(run = tracker.run_id(), files = files.len(), dry_run, "import started");

        let mode = if self.options.force_overwrite {
            MergeMode::ForceOverwrite
        } else {
            MergeMode::FillEmpty
        };
        let mut upserter = Upserter::new(
            self.conn,
            UpsertOptions {
                mode,
                always_overwrite: Vec::new(),
                batch_size: self.settings.batch_size,
                dry_run,
            },
        );

        for path in &files {
            let stats = self.import_file(&mut upserter, path)?;
            tracker.record(stats);
        }
        upserter.finish()?;

        if !dry_run {
            self.mappings.save()?;
            self.knowledge.save()?;
        }
        tracker.persist(self.conn)?;
        Ok(tracker)
    }

    fn import_file(&mut self, upserter: &mut Upserter, path: &Path) -> Result<FileStats> {
        let started = Instant::now();
        let csv = load_csv(path, self.settings.encoding)?;
        let file_name = csv.file_name();
        let profile = self.settings.profile_for(path, self.options.profile.as_deref());
        let pinned = profile.pinned_columns();
        let scan_rows = self.settings.header_scan_rows;

        let (header, headers) = detect_header(&csv.rows, scan_rows);
        let (advice, advisor_label) = self.consult_advisor(&csv, header, &headers);
        let advised_trust = advice
            .as_ref()
            .filter(|a| a.confidence >= OVERRIDE_CONFIDENCE)
            .and_then(|a| a.header_trusted);
        let suggestions = advice.map(|a| a.columns).unwrap_or_default();
        let layout = plan_layout(
            &csv.rows,
            scan_rows,
            &self.mappings,
            &suggestions,
            &pinned,
            profile.header_trusted.or(advised_trust),
        );
        if layout.trusted && layout.header.is_some() {
            record_mappings(&layout.columns, &mut self.mappings);
        }
        info!(
            file = %file_name,
            header_row = ?layout.header.map(|h| h.index),
            trusted = layout.trusted,
            columns = layout.columns.len(),
            "layout planned"
        );

        upserter.set_always_overwrite(profile.overwrite_fields());
        let before = upserter.stats().clone();
        let start = layout.data_start().min(csv.rows.len());
        let limit = self.settings.row_limit.unwrap_or(usize::MAX);
        let data = &csv.rows[start..];
        let data = &data[..data.len().min(limit)];
        let raw_header = raw_header(&layout);

        let mut stats = FileStats {
            file: file_name.clone(),
            mode: mode_label(&layout, &profile).to_string(),
            rows_total: data.len(),
            bad_records: csv.bad_records,
            advisor: advisor_label,
            ..Default::default()
        };

        let pb = self.progress_bar(data.len());
        let ctx = layout.context(&self.taxonomy, profile.money_scale);
        for (chunk_no, chunk) in data.chunks(CHUNK_ROWS).enumerate() {
            let results = normalize_rows(chunk, &ctx);
            for (offset, result) in results.into_iter().enumerate() {
                let row_index = start + chunk_no * CHUNK_ROWS + offset;
                let row = match result {
                    Ok(row) => row,
                    Err(RowSkip::Empty) => {
                        stats.skipped_empty += 1;
                        continue;
                    }
                    Err(RowSkip::MissingName) => {
                        debug!(file = %file_name, row = row_index + 1, "skipping row without a name");
                        stats.skipped_no_name += 1;
                        continue;
                    }
                };
                stats.rejected_fields += row.rejected.len();
                if row.mode == RowMode::ShiftFallback {
                    stats.shift_fallbacks += 1;
                }
                observe(&mut self.knowledge, &row.record);

                let mut record = row.record;
                record.source_file = Some(file_name.clone());
                record.source_row = Some(row_index as i64 + 1);
                record.raw_header = raw_header.clone();
                upserter.upsert(record, row_index)?;
            }
            pb.inc(chunk.len() as u64);
        }
        pb.finish_and_clear();

        if stats.shift_fallbacks > 0 {
            warn!(file = %file_name, rows = stats.shift_fallbacks, "shifted rows re-read by value scan");
        }
        stats.upsert = upserter.stats().since(&before);
        stats.duration = started.elapsed();
        Ok(stats)
    }

    /// One advisor call per file, spaced by `pause_ms`. Returns the answer and
    /// a label for the run metrics ("used" or the fallback reason).
    fn consult_advisor(
        &mut self,
        csv: &LoadedCsv,
        header: Option<HeaderRow>,
        headers: &[String],
    ) -> (Option<AdvisorResponse>, Option<String>) {
        let Some(advisor) = self.advisor.as_deref() else {
            return (None, None);
        };
        if let Some(last) = self.last_advisor_call {
            let pause = Duration::from_millis(self.settings.pause_ms);
            let waited = last.elapsed();
            if waited < pause {
                std::thread::sleep(pause - waited);
            }
        }

        let start = header.map(|h| h.index + 1).unwrap_or(0);
        let sample: Vec<Vec<String>> = csv
            .rows
            .iter()
            .skip(start)
            .take(self.settings.ai.sample_rows)
            .cloned()
            .collect();
        let knowledge = self.knowledge.prompt_summary(KNOWLEDGE_TOP);
        let file_name = csv.file_name();
        let request = AdvisorRequest {
            file_name: &file_name,
            headers,
            sample: &sample,
            knowledge: &knowledge,
        };
        let result = advise(advisor, &request);
        self.last_advisor_call = Some(Instant::now());
        match result {
            Ok(resp) => (Some(resp), Some("used".to_string())),
            Err(reason) => (None, Some(reason.to_string())),
        }
    }

    fn progress_bar(&self, len: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({per_sec})")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-");
        pb.set_style(style);
        pb
    }
}

fn mode_label(layout: &FileLayout, profile: &SourceProfile) -> &'static str {
    if profile.header_trusted.is_some() || !profile.pinned_columns().is_empty() {
        "profile"
    } else if layout.trusted {
        "header"
    } else {
        "scan"
    }
}

fn raw_header(layout: &FileLayout) -> Option<String> {
    if layout.trusted && !layout.columns.is_empty() {
        Some(layout.columns.describe())
    } else if !layout.headers.is_empty() {
        Some(layout.headers.join(","))
    } else {
        None
    }
}

fn observe(knowledge: &mut FieldKnowledgeStore, record: &CompanyRecord) {
    for field in Field::ALL {
        match record.get(field) {
            Some(FieldValue::Text(v)) => knowledge.observe(field, &v),
            Some(FieldValue::Number(n)) => knowledge.observe(field, &n.to_string()),
            Some(FieldValue::List(items)) => {
                for item in &items {
                    knowledge.observe(field, item);
                }
            }
            None => {}
        }
    }
}

/// Header detection and mapping for one file, without touching the store.
pub fn inspect_file(path: &Path, settings: &Settings, profile: Option<&str>) -> Result<(LoadedCsv, FileLayout)> {
    let csv = load_csv(path, settings.encoding)?;
    let profile = settings.profile_for(path, profile);
    let store = HeaderMappingStore::load(&settings.mapping_store_path)?;
    let layout = plan_layout(
        &csv.rows,
        settings.header_scan_rows,
        &store,
        &[],
        &profile.pinned_columns(),
        profile.header_trusted,
    );
    Ok((csv, layout))
}
