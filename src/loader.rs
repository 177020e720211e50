use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use tracing::warn;
use walkdir::WalkDir;

use crate::config::Encoding;
use crate::error::{ImportError, Result};

/// A decoded CSV file as ordered rows of cells.
#[derive(Debug, Clone)]
pub struct LoadedCsv {
    pub path: PathBuf,
    pub rows: Vec<Vec<String>>,
    /// Records the parser could not read; they are left out of `rows`.
    pub bad_records: usize,
    pub had_decode_errors: bool,
}

impl LoadedCsv {
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string()
    }
}

pub fn load_csv(path: &Path, encoding: Encoding) -> Result<LoadedCsv> {
    if !path.is_file() {
        return Err(ImportError::FileNotFound(path.to_path_buf()));
    }
    let bytes = std::fs::read(path)?;
    let (text, had_decode_errors) = decode(&bytes, encoding);
    if had_decode_errors {
        warn!(file = %path.display(), ?encoding, "undecodable bytes replaced");
    }
    let (rows, bad_records) = parse_rows(&text, path)?;
    Ok(LoadedCsv {
        path: path.to_path_buf(),
        rows,
        bad_records,
        had_decode_errors,
    })
}

/// Decode to UTF-8; a leading BOM is dropped either way.
pub fn decode(bytes: &[u8], encoding: Encoding) -> (String, bool) {
    let codec = match encoding {
        Encoding::Utf8 => encoding_rs::UTF_8,
        Encoding::Sjis => encoding_rs::SHIFT_JIS,
    };
    let (text, _, had_errors) = codec.decode(bytes);
    (text.into_owned(), had_errors)
}

fn parse_rows(text: &str, path: &Path) -> Result<(Vec<Vec<String>>, usize)> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut rows = Vec::new();
    let mut bad = 0usize;
    for (i, record) in reader.records().enumerate() {
        match record {
            Ok(rec) => rows.push(rec.iter().map(|cell| cell.to_string()).collect()),
            Err(e) if e.is_io_error() => {
                return Err(ImportError::Csv {
                    path: path.to_path_buf(),
                    source: e,
                })
            }
            Err(e) => {
                bad += 1;
                warn!(file = %path.display(), record = i + 1, "skipping unreadable record: {}", e);
            }
        }
    }
    Ok((rows, bad))
}

/// Expand files and directories into a sorted list of `.csv` files.
pub fn collect_csv_files(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        if input.is_file() {
            files.push(input.clone());
        } else if input.is_dir() {
            for entry in WalkDir::new(input).follow_links(false) {
                let entry = match entry {
                    Ok(e) => e,
                    Err(e) => {
                        warn!("skipping unreadable directory entry: {}", e);
                        continue;
                    }
                };
                let is_csv = entry
                    .path()
                    .extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
                if entry.file_type().is_file() && is_csv {
                    files.push(entry.into_path());
                }
            }
        } else {
            return Err(ImportError::FileNotFound(input.clone()));
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_ragged_utf8_with_bom() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.csv");
        std::fs::write(&path, "\u{feff}会社名,住所\n株式会社A,東京都千代田区,extra\n\"株式会社B\"\n").unwrap();

        let csv = load_csv(&path, Encoding::Utf8).unwrap();
        assert_eq!(csv.rows.len(), 3);
        assert_eq!(csv.rows[0], vec!["会社名", "住所"]);
        assert_eq!(csv.rows[1].len(), 3);
        assert_eq!(csv.rows[2], vec!["株式会社B"]);
        assert_eq!(csv.file_name(), "a.csv");
        assert!(!csv.had_decode_errors);
    }

    #[test]
    fn decodes_shift_jis() {
        let (bytes, _, _) = encoding_rs::SHIFT_JIS.encode("会社名,電話番号\n株式会社テスト,03-1234-5678\n");
        let (text, errors) = decode(&bytes, Encoding::Sjis);
        assert!(!errors);
        assert!(text.starts_with("会社名,電話番号"));
    }

    #[test]
    fn missing_file_is_fatal() {
        let err = load_csv(Path::new("/nonexistent/file.csv"), Encoding::Utf8).unwrap_err();
        assert!(matches!(err, ImportError::FileNotFound(_)));
    }

    #[test]
    fn collects_csv_files_recursively() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("b.csv"), "x").unwrap();
        std::fs::write(dir.path().join("sub/a.CSV"), "x").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "x").unwrap();

        let files = collect_csv_files(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.extension().is_some()));

        let missing = collect_csv_files(&[dir.path().join("nope")]);
        assert!(matches!(missing, Err(ImportError::FileNotFound(_))));
    }
}
