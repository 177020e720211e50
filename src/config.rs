use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use config::{Config, Environment, File};
use serde::Deserialize;
use tracing::warn;

use crate::error::{ImportError, Result};
use crate::schema::Field;

pub const ENV_PREFIX: &str = "COMPANY_IMPORT";
pub const DEFAULT_CONFIG_FILE: &str = "company-import.toml";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    #[default]
    Utf8,
    Sjis,
}

impl FromStr for Encoding {
    type Err = ImportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "utf8" => Ok(Encoding::Utf8),
            "sjis" | "shiftjis" | "cp932" | "windows31j" => Ok(Encoding::Sjis),
            other => Err(ImportError::UnknownEncoding(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AiSettings {
    pub enabled: bool,
    pub api_key: Option<String>,
    /// File holding the API key; read when `api_key` is unset.
    pub api_key_file: Option<PathBuf>,
    pub model: String,
    pub endpoint: String,
    pub sample_rows: usize,
    pub timeout_secs: u64,
}

impl Default for AiSettings {
    fn default() -> Self {
        AiSettings {
            enabled: false,
            api_key: None,
            api_key_file: None,
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            sample_rows: 5,
            timeout_secs: 20,
        }
    }
}

impl AiSettings {
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_deref().map(str::trim).filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }
        if let Some(path) = &self.api_key_file {
            if !path.exists() {
                return Err(ImportError::FileNotFound(path.clone()));
            }
            let key = std::fs::read_to_string(path)?.trim().to_string();
            if !key.is_empty() {
                return Ok(key);
            }
        }
        Err(ImportError::MissingCredential(format!(
            "set {}_AI__API_KEY or ai.api_key_file",
            ENV_PREFIX
        )))
    }
}

/// Per-source overrides, keyed by lowercase file stem.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SourceProfile {
    /// Flat multiplier for money cells without an explicit unit (e.g. 1000 for
    /// exports denominated in thousands of yen).
    pub money_scale: Option<i64>,
    /// Force header trust on or off instead of detecting it.
    pub header_trusted: Option<bool>,
    /// Fields replaced even when the import runs in fill-empty mode.
    pub overwrite_fields: Vec<String>,
    /// Column index -> field key; wins over every other mapping source.
    pub columns: HashMap<String, String>,
}

impl SourceProfile {
    pub fn overwrite_fields(&self) -> Vec<Field> {
        self.overwrite_fields
            .iter()
            .filter_map(|f| match f.parse::<Field>() {
                Ok(field) => Some(field),
                Err(e) => {
                    warn!("profile overwrite_fields: {}", e);
                    None
                }
            })
            .collect()
    }

    pub fn pinned_columns(&self) -> Vec<(usize, Field)> {
        let mut pinned: Vec<(usize, Field)> = self
            .columns
            .iter()
            .filter_map(|(idx, key)| {
                let idx = idx.trim().parse::<usize>().ok()?;
                match key.parse::<Field>() {
                    Ok(field) => Some((idx, field)),
                    Err(e) => {
                        warn!("profile column {}: {}", idx, e);
                        None
                    }
                }
            })
            .collect();
        pinned.sort();
        pinned
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub db_path: PathBuf,
    pub dry_run: bool,
    pub row_limit: Option<usize>,
    pub encoding: Encoding,
    pub batch_size: usize,
    pub header_scan_rows: usize,
    pub pause_ms: u64,
    pub mapping_store_path: PathBuf,
    pub knowledge_store_path: PathBuf,
    pub taxonomy_path: Option<PathBuf>,
    pub ai: AiSettings,
    pub profiles: HashMap<String, SourceProfile>,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            db_path: PathBuf::from("data/companies.sqlite"),
            dry_run: false,
            row_limit: None,
            encoding: Encoding::Utf8,
            batch_size: 400,
            header_scan_rows: 5,
            pause_ms: 500,
            mapping_store_path: PathBuf::from("data/header_mappings.json"),
            knowledge_store_path: PathBuf::from("data/field_knowledge.json"),
            taxonomy_path: None,
            ai: AiSettings::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Settings {
    /// Defaults, then the optional TOML file, then `COMPANY_IMPORT_*` variables.
    pub fn load() -> Result<Self> {
        let file = std::env::var(format!("{}_CONFIG", ENV_PREFIX))
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::load_from(&file)
    }

    pub fn load_from(file: &Path) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(file.to_path_buf()).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let mut parsed: Settings = settings.try_deserialize()?;
        parsed.batch_size = parsed.batch_size.clamp(1, 499);
        parsed.header_scan_rows = parsed.header_scan_rows.max(1);
        Ok(parsed)
    }

    /// Profile for a CSV path: an explicit name wins, else the file stem.
    pub fn profile_for(&self, path: &Path, explicit: Option<&str>) -> SourceProfile {
        let key = explicit.map(str::to_string).or_else(|| {
            path.file_stem()
                .and_then(|s| s.to_str())
                .map(str::to_string)
        });
        key.and_then(|k| self.profiles.get(&k.to_lowercase()).cloned())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn encoding_aliases() {
        assert_eq!("UTF-8".parse::<Encoding>().unwrap(), Encoding::Utf8);
        assert_eq!("Shift_JIS".parse::<Encoding>().unwrap(), Encoding::Sjis);
        assert_eq!("cp932".parse::<Encoding>().unwrap(), Encoding::Sjis);
        assert!("latin1".parse::<Encoding>().is_err());
    }

    #[test]
    fn loads_profiles_from_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company-import.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
batch_size = 1000
pause_ms = 0

[ai]
model = "gemini-test"

[profiles.type_b]
money_scale = 1000
header_trusted = false
overwrite_fields = ["representativeName", "bogus"]
columns = {{ "0" = "name", "3" = "tel" }}
"#
        )
        .unwrap();

        let settings = Settings::load_from(&path).unwrap();
        assert_eq!(settings.batch_size, 499);
        assert_eq!(settings.pause_ms, 0);
        assert_eq!(settings.ai.model, "gemini-test");
        assert_eq!(settings.ai.sample_rows, 5);

        let profile = settings.profile_for(Path::new("/tmp/Type_B.csv"), None);
        assert_eq!(profile.money_scale, Some(1000));
        assert_eq!(profile.header_trusted, Some(false));
        assert_eq!(profile.overwrite_fields(), vec![Field::RepresentativeName]);
        assert_eq!(
            profile.pinned_columns(),
            vec![(0, Field::Name), (3, Field::Tel)]
        );

        let none = settings.profile_for(Path::new("other.csv"), None);
        assert!(none.money_scale.is_none());
    }

    #[test]
    fn api_key_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let key_path = dir.path().join("key.txt");
        std::fs::write(&key_path, "secret-key\n").unwrap();
        let ai = AiSettings {
            api_key_file: Some(key_path),
            ..Default::default()
        };
        assert_eq!(ai.resolve_api_key().unwrap(), "secret-key");

        let missing = AiSettings::default();
        assert!(matches!(
            missing.resolve_api_key(),
            Err(ImportError::MissingCredential(_))
        ));
    }
}
