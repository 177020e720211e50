use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use company_importer::config::{Encoding, Settings};
use company_importer::db;
use company_importer::dedupe::{self, DedupeKey};
use company_importer::import::{inspect_file, ImportOptions, Importer};
use company_importer::loader::collect_csv_files;
use company_importer::taxonomy::{detect_format, parse_taxonomy, write_csv};
use company_importer::utils::{format_duration, truncate};

#[derive(Parser)]
#[command(name = "company-import", about = "Import Japanese company CSV exports into one collection")]
struct Cli {
    /// Config file (default: company-import.toml or $COMPANY_IMPORT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import CSV files or directories of CSV files
    Import {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Run every lookup and merge, then roll back
        #[arg(long)]
        dry_run: bool,
        /// Max data rows per file
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// utf8 or sjis
        #[arg(long)]
        encoding: Option<String>,
        /// Replace stored values instead of only filling empty ones
        #[arg(long)]
        force_overwrite: bool,
        /// Ask the mapping advisor for column suggestions
        #[arg(long)]
        ai: bool,
        /// Source profile to apply to every file
        #[arg(long)]
        profile: Option<String>,
    },
    /// Merge and delete duplicate companies
    Dedupe {
        /// full, name-address or corporate-number
        #[arg(long, default_value = "full")]
        key: String,
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the detected header row and column mapping
    Headers {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        encoding: Option<String>,
        #[arg(long)]
        profile: Option<String>,
    },
    /// Convert an industry taxonomy outline to CSV
    Industries { input: PathBuf, output: PathBuf },
    /// Collection counts and recent import runs
    Stats {
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    }
    .context("loading configuration")?;

    let result = match cli.command {
        Commands::Import {
            paths,
            dry_run,
            limit,
            encoding,
            force_overwrite,
            ai,
            profile,
        } => {
            settings.dry_run |= dry_run;
            settings.row_limit = limit.or(settings.row_limit);
            settings.ai.enabled |= ai;
            if let Some(enc) = encoding {
                settings.encoding = enc.parse::<Encoding>()?;
            }
            run_import(&settings, &paths, force_overwrite, profile)
        }
        Commands::Dedupe { key, dry_run } => {
            let key: DedupeKey = key.parse().map_err(anyhow::Error::msg)?;
            let conn = db::connect(&settings.db_path)
                .with_context(|| format!("opening {}", settings.db_path.display()))?;
            let report = dedupe::dedupe(&conn, key, dry_run || settings.dry_run)?;
            for g in report.groups.iter().take(20) {
                println!(
                    "  {} <- {} ({} fields filled)",
                    truncate(&g.key, 40),
                    g.duplicates.join(", "),
                    g.filled.len()
                );
            }
            if report.groups.len() > 20 {
                println!("  ... {} more groups", report.groups.len() - 20);
            }
            println!(
                "Scanned {} companies: {} duplicate groups, {} duplicates, {} deleted.",
                report.scanned,
                report.groups.len(),
                report.duplicate_count(),
                report.deleted
            );
            Ok(())
        }
        Commands::Headers {
            paths,
            encoding,
            profile,
        } => {
            if let Some(enc) = encoding {
                settings.encoding = enc.parse::<Encoding>()?;
            }
            for path in collect_csv_files(&paths)? {
                let (csv, layout) = inspect_file(&path, &settings, profile.as_deref())
                    .with_context(|| format!("reading {}", path.display()))?;
                println!("\n{}", csv.file_name());
                match layout.header {
                    Some(h) => println!("  header row {} (score {}), trusted: {}", h.index + 1, h.score, layout.trusted),
                    None => println!("  no header row, value scan"),
                }
                for (i, cell) in layout.headers.iter().enumerate() {
                    let (field, source) = layout
                        .columns
                        .get(i)
                        .map(|m| (m.field.to_string(), m.source.to_string()))
                        .unwrap_or_else(|| ("-".into(), String::new()));
                    println!("  {:>3} | {:<24} | {:<22} | {}", i, truncate(cell.trim(), 24), field, source);
                }
            }
            Ok(())
        }
        Commands::Industries { input, output } => {
            let text = std::fs::read_to_string(&input)
                .with_context(|| format!("reading {}", input.display()))?;
            let entries = parse_taxonomy(&text);
            if entries.is_empty() {
                bail!("no industry entries found in {}", input.display());
            }
            write_csv(&entries, &output)?;
            let format = detect_format(&text)
                .map(|f| format!("{:?}", f).to_lowercase())
                .unwrap_or_else(|| "unknown".into());
            println!(
                "Wrote {} industries ({} input) to {}",
                entries.len(),
                format,
                output.display()
            );
            Ok(())
        }
        Commands::Stats { limit } => {
            let conn = db::connect(&settings.db_path)
                .with_context(|| format!("opening {}", settings.db_path.display()))?;
            let s = db::get_stats(&conn)?;
            println!("Companies:        {}", s.companies);
            println!("Corporate number: {}", s.with_corporate_number);
            println!("With address:     {}", s.with_address);
            println!("Import runs:      {}", s.import_runs);

            let runs = db::recent_import_runs(&conn, limit)?;
            if !runs.is_empty() {
                println!("\n--- Recent imports ---");
                println!(
                    "{:<16} | {:<24} | {:<7} | {:>6} | {:>6} | {:>6} | {:>6} | {:<10}",
                    "Run", "File", "Mode", "Rows", "New", "Upd", "Skip", "Advisor"
                );
                println!("{}", "-".repeat(100));
                for r in &runs {
                    println!(
                        "{:<16} | {:<24} | {:<7} | {:>6} | {:>6} | {:>6} | {:>6} | {:<10}{}",
                        r.run_id,
                        truncate(&r.file, 24),
                        r.mode,
                        r.rows_total,
                        r.created,
                        r.updated,
                        r.skipped_rows,
                        r.advisor.as_deref().unwrap_or("-"),
                        if r.dry_run { " (dry run)" } else { "" }
                    );
                }
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

fn run_import(
    settings: &Settings,
    paths: &[PathBuf],
    force_overwrite: bool,
    profile: Option<String>,
) -> anyhow::Result<()> {
    let conn = db::connect(&settings.db_path)
        .with_context(|| format!("opening {}", settings.db_path.display()))?;
    let options = ImportOptions {
        force_overwrite,
        profile,
        show_progress: true,
    };
    let mut importer = Importer::new(&conn, settings, options)?;
    let tracker = importer.run(paths)?;

    let t = tracker.totals();
    println!(
        "Imported {} files: {} rows -> {} created, {} updated, {} unchanged, {} skipped, {} fields rejected.",
        tracker.files().len(),
        t.rows_total,
        t.upsert.created,
        t.upsert.updated,
        t.upsert.unchanged,
        t.skipped_rows(),
        t.rejected_fields
    );
    for (kind, n) in &t.upsert.matched_by {
        println!("  matched by {:<20} {}", kind.to_string(), n);
    }
    if t.shift_fallbacks > 0 {
        println!("  {} shifted rows re-read by value scan", t.shift_fallbacks);
    }
    if settings.dry_run {
        println!("Dry run: companies and learned mappings left unchanged.");
    }
    Ok(())
}
