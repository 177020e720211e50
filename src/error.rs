use std::path::PathBuf;

use thiserror::Error;

/// Library-level failures. Anything here that reaches `main` ends the run.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("input not found: {0}")]
    FileNotFound(PathBuf),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("unsupported encoding {0:?} (expected utf8 or sjis)")]
    UnknownEncoding(String),

    #[error("csv error in {path}: {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Db(#[from] rusqlite::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Config(#[from] config::ConfigError),
}

pub type Result<T, E = ImportError> = std::result::Result<T, E>;

/// Why a row produced no record. Counted, never fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RowSkip {
    #[error("row is empty")]
    Empty,
    #[error("no company name found")]
    MissingName,
}
