pub mod columns;
pub mod header;
pub mod normalize;
pub mod representative;
pub mod scan;
pub mod values;

use crate::error::RowSkip;
use crate::learning::HeaderMappingStore;
use crate::schema::Field;
use crate::taxonomy::Taxonomy;
use columns::{ColumnMap, ColumnSuggestion};
use header::HeaderRow;
use normalize::{NormalizedRow, RowContext};

#[cfg(feature = "rayon")]
use rayon::prelude::*;

/// Where a file's data starts and how its columns are read.
#[derive(Debug, Clone, Default)]
pub struct FileLayout {
    pub header: Option<HeaderRow>,
    pub headers: Vec<String>,
    pub columns: ColumnMap,
    pub trusted: bool,
}

impl FileLayout {
    pub fn data_start(&self) -> usize {
        self.header.map(|h| h.index + 1).unwrap_or(0)
    }

    pub fn context<'a>(&'a self, taxonomy: &'a Taxonomy, money_scale: Option<i64>) -> RowContext<'a> {
        RowContext {
            columns: self.trusted.then_some(&self.columns),
            money_scale,
            taxonomy,
        }
    }
}

/// Header detection only; the advisor needs it before mapping.
pub fn detect_header(rows: &[Vec<String>], scan_rows: usize) -> (Option<HeaderRow>, Vec<String>) {
    let header = header::classify_header(rows, scan_rows);
    let headers = header
        .and_then(|h| rows.get(h.index))
        .cloned()
        .unwrap_or_default();
    (header, headers)
}

/// Header row -> column map -> trust decision. Pinned columns make a
/// headerless file trusted; `trust` (profile or advisor) overrides detection.
pub fn plan_layout(
    rows: &[Vec<String>],
    scan_rows: usize,
    store: &HeaderMappingStore,
    suggestions: &[ColumnSuggestion],
    pinned: &[(usize, Field)],
    trust: Option<bool>,
) -> FileLayout {
    let (header, headers) = detect_header(rows, scan_rows);
    let columns = columns::map_columns(&headers, store, suggestions, pinned);
    let detected = (header.is_some() && columns.column_of(Field::Name).is_some()) || !pinned.is_empty();
    FileLayout {
        header,
        headers,
        columns,
        trusted: trust.unwrap_or(detected),
    }
}

/// Normalize a chunk of rows. Pure; runs on the rayon pool when enabled.
#[cfg(feature = "rayon")]
pub fn normalize_rows(rows: &[Vec<String>], ctx: &RowContext) -> Vec<Result<NormalizedRow, RowSkip>> {
    rows.par_iter()
        .map(|cells| normalize::normalize_row(cells, ctx))
        .collect()
}

#[cfg(not(feature = "rayon"))]
pub fn normalize_rows(rows: &[Vec<String>], ctx: &RowContext) -> Vec<Result<NormalizedRow, RowSkip>> {
    rows.iter()
        .map(|cells| normalize::normalize_row(cells, ctx))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(data: &[&[&str]]) -> Vec<Vec<String>> {
        data.iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect()
    }

    #[test]
    fn layout_for_a_file_with_a_title_row() {
        let data = rows(&[
            &["会員名簿"],
            &["会社名", "所在地", "TEL"],
            &["株式会社A", "東京都港区1-1", "03-1111-2222"],
        ]);
        let layout = plan_layout(&data, 5, &HeaderMappingStore::in_memory(), &[], &[], None);
        assert!(layout.trusted);
        assert_eq!(layout.data_start(), 2);
        assert_eq!(layout.columns.field_at(2), Some(Field::Tel));

        let tax = Taxonomy::default();
        let ctx = layout.context(&tax, None);
        let out = normalize_rows(&data[layout.data_start()..], &ctx);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_ref().unwrap().record.tel.as_deref(), Some("03-1111-2222"));
    }

    #[test]
    fn headerless_file_is_scanned() {
        let data = rows(&[&["株式会社A", "東京都港区1-1"], &["株式会社B", "大阪府大阪市1-1"]]);
        let layout = plan_layout(&data, 5, &HeaderMappingStore::in_memory(), &[], &[], None);
        assert!(!layout.trusted);
        assert_eq!(layout.data_start(), 0);
        assert!(layout.context(&Taxonomy::default(), None).columns.is_none());
    }

    #[test]
    fn header_without_a_name_column_is_not_trusted() {
        let data = rows(&[&["住所", "電話番号"], &["東京都港区1-1 株式会社A", "03-1111-2222"]]);
        let layout = plan_layout(&data, 5, &HeaderMappingStore::in_memory(), &[], &[], None);
        assert!(!layout.trusted);
        assert_eq!(layout.data_start(), 1);

        let forced = plan_layout(&data, 5, &HeaderMappingStore::in_memory(), &[], &[], Some(true));
        assert!(forced.trusted);
    }
}
