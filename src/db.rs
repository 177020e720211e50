use std::path::Path;

use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use crate::error::Result;
use crate::schema::CompanyRecord;

/// Ids per multi-get query.
pub const MULTI_GET_CHUNK: usize = 10;

pub fn connect(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn connect_in_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    init_schema(&conn)?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS companies (
            id                  TEXT PRIMARY KEY,
            corporate_number    TEXT,
            name                TEXT,
            address             TEXT,
            prefecture          TEXT,
            representative_name TEXT,
            body                TEXT NOT NULL,
            updated_at          TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_companies_corp ON companies(corporate_number);
        CREATE INDEX IF NOT EXISTS idx_companies_name ON companies(name);
        CREATE INDEX IF NOT EXISTS idx_companies_name_addr ON companies(name, address);
        CREATE INDEX IF NOT EXISTS idx_companies_name_pref ON companies(name, prefecture);

        CREATE TABLE IF NOT EXISTS import_runs (
            id              INTEGER PRIMARY KEY,
            run_id          TEXT NOT NULL,
            file            TEXT NOT NULL,
            mode            TEXT NOT NULL,
            rows_total      INTEGER NOT NULL,
            created         INTEGER NOT NULL,
            updated         INTEGER NOT NULL,
            unchanged       INTEGER NOT NULL,
            skipped_rows    INTEGER NOT NULL,
            rejected_fields INTEGER NOT NULL,
            advisor         TEXT,
            dry_run         BOOLEAN NOT NULL DEFAULT 0,
            duration_ms     INTEGER NOT NULL,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_import_runs_run ON import_runs(run_id);
        ",
    )?;
    Ok(())
}

/// A company document and its key.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredCompany {
    pub id: String,
    pub record: CompanyRecord,
}

/// Indexed equality lookups, one per step of the upsert chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupKey<'a> {
    CorporateNumber(&'a str),
    NameAddress { name: &'a str, address: &'a str },
    NamePrefecture { name: &'a str, prefecture: &'a str },
    NameRepresentative { name: &'a str, representative: &'a str },
    Name(&'a str),
}

impl LookupKey<'_> {
    fn clause(&self) -> (&'static str, Vec<&str>) {
        match *self {
            LookupKey::CorporateNumber(n) => ("corporate_number = ?1", vec![n]),
            LookupKey::NameAddress { name, address } => ("name = ?1 AND address = ?2", vec![name, address]),
            LookupKey::NamePrefecture { name, prefecture } => {
                ("name = ?1 AND prefecture = ?2", vec![name, prefecture])
            }
            LookupKey::NameRepresentative {
                name,
                representative,
            } => ("name = ?1 AND representative_name = ?2", vec![name, representative]),
            LookupKey::Name(name) => ("name = ?1", vec![name]),
        }
    }
}

fn stored_from_row(row: &Row) -> rusqlite::Result<StoredCompany> {
    let id: String = row.get(0)?;
    let body: String = row.get(1)?;
    let record = serde_json::from_str(&body).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(1, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(StoredCompany { id, record })
}

pub fn get(conn: &Connection, id: &str) -> Result<Option<StoredCompany>> {
    let found = conn
        .query_row("SELECT id, body FROM companies WHERE id = ?1", [id], stored_from_row)
        .optional()?;
    Ok(found)
}

/// Fetch many ids, `MULTI_GET_CHUNK` per query. Missing ids are skipped.
pub fn get_many(conn: &Connection, ids: &[String]) -> Result<Vec<StoredCompany>> {
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(MULTI_GET_CHUNK) {
        let placeholders = (1..=chunk.len()).map(|i| format!("?{}", i)).collect::<Vec<_>>().join(",");
        let sql = format!("SELECT id, body FROM companies WHERE id IN ({}) ORDER BY id", placeholders);
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt
            .query_map(params_from_iter(chunk.iter()), stored_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        out.extend(rows);
    }
    Ok(out)
}

/// Ids matching a lookup key, smallest first.
pub fn find_ids(conn: &Connection, key: &LookupKey, limit: usize) -> Result<Vec<String>> {
    let (clause, values) = key.clause();
    let sql = format!("SELECT id FROM companies WHERE {} ORDER BY id LIMIT {}", clause, limit);
    let mut stmt = conn.prepare_cached(&sql)?;
    let ids = stmt
        .query_map(params_from_iter(values), |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(ids)
}

/// Matches for a lookup key, smallest id first. Bodies come from `get_many`.
pub fn find_by(conn: &Connection, key: &LookupKey, limit: usize) -> Result<Vec<StoredCompany>> {
    let ids = find_ids(conn, key, limit)?;
    get_many(conn, &ids)
}

pub fn put(conn: &Connection, id: &str, record: &CompanyRecord) -> Result<()> {
    let body = serde_json::to_string(record)?;
    let mut stmt = conn.prepare_cached(
        "INSERT OR REPLACE INTO companies
         (id, corporate_number, name, address, prefecture, representative_name, body, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, datetime('now'))",
    )?;
    stmt.execute(params![
        id,
        record.corporate_number,
        record.name,
        record.address,
        record.prefecture,
        record.representative_name,
        body,
    ])?;
    Ok(())
}

/// Delete ids in one transaction. Returns the number of rows removed.
pub fn delete_batch(conn: &Connection, ids: &[String]) -> Result<usize> {
    let tx = conn.unchecked_transaction()?;
    let mut count = 0;
    {
        let mut stmt = tx.prepare("DELETE FROM companies WHERE id = ?1")?;
        for id in ids {
            count += stmt.execute([id])?;
        }
    }
    tx.commit()?;
    Ok(count)
}

/// Every document, ordered by id.
pub fn all(conn: &Connection) -> Result<Vec<StoredCompany>> {
    let mut stmt = conn.prepare("SELECT id, body FROM companies ORDER BY id")?;
    let rows = stmt
        .query_map([], stored_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn count(conn: &Connection) -> Result<usize> {
    let n: usize = conn.query_row("SELECT COUNT(*) FROM companies", [], |r| r.get(0))?;
    Ok(n)
}

// ── Import runs ──

#[derive(Debug, Clone, PartialEq)]
pub struct ImportRunRow {
    pub run_id: String,
    pub file: String,
    pub mode: String,
    pub rows_total: usize,
    pub created: usize,
    pub updated: usize,
    pub unchanged: usize,
    pub skipped_rows: usize,
    pub rejected_fields: usize,
    /// Advisor outcome: "used", a fallback reason, or None when disabled.
    pub advisor: Option<String>,
    pub dry_run: bool,
    pub duration_ms: i64,
}

pub fn insert_import_run(conn: &Connection, r: &ImportRunRow) -> Result<()> {
    conn.execute(
        "INSERT INTO import_runs
         (run_id, file, mode, rows_total, created, updated, unchanged, skipped_rows,
          rejected_fields, advisor, dry_run, duration_ms)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            r.run_id, r.file, r.mode, r.rows_total, r.created, r.updated, r.unchanged,
            r.skipped_rows, r.rejected_fields, r.advisor, r.dry_run, r.duration_ms,
        ],
    )?;
    Ok(())
}

pub fn recent_import_runs(conn: &Connection, limit: usize) -> Result<Vec<ImportRunRow>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, file, mode, rows_total, created, updated, unchanged, skipped_rows,
                rejected_fields, advisor, dry_run, duration_ms
         FROM import_runs ORDER BY id DESC LIMIT ?1",
    )?;
    let rows = stmt
        .query_map([limit], |row| {
            Ok(ImportRunRow {
                run_id: row.get(0)?,
                file: row.get(1)?,
                mode: row.get(2)?,
                rows_total: row.get(3)?,
                created: row.get(4)?,
                updated: row.get(5)?,
                unchanged: row.get(6)?,
                skipped_rows: row.get(7)?,
                rejected_fields: row.get(8)?,
                advisor: row.get(9)?,
                dry_run: row.get(10)?,
                duration_ms: row.get(11)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Stats ──

pub struct Stats {
    pub companies: usize,
    pub with_corporate_number: usize,
    pub with_address: usize,
    pub import_runs: usize,
}

pub fn get_stats(conn: &Connection) -> Result<Stats> {
    let companies = count(conn)?;
    let with_corporate_number: usize = conn.query_row(
        "SELECT COUNT(*) FROM companies WHERE corporate_number IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let with_address: usize = conn.query_row(
        "SELECT COUNT(*) FROM companies WHERE address IS NOT NULL",
        [],
        |r| r.get(0),
    )?;
    let import_runs: usize =
        conn.query_row("SELECT COUNT(DISTINCT run_id) FROM import_runs", [], |r| r.get(0))?;
    Ok(Stats {
        companies,
        with_corporate_number,
        with_address,
        import_runs,
    })
}
