pub mod advisor;
pub mod config;
pub mod db;
pub mod dedupe;
pub mod error;
pub mod import;
pub mod learning;
pub mod loader;
pub mod metrics;
pub mod parser;
pub mod schema;
pub mod taxonomy;
pub mod upsert;
pub mod utils;

pub use error::{ImportError, Result};
