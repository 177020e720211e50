use crate::schema::{synonyms, Field};
use crate::utils::{char_len, fold};

/// Cells longer than this are treated as data, never as a header label.
const MAX_HEADER_CELL_CHARS: usize = 24;
const MIN_HEADER_SCORE: usize = 2;

/// Where the header row sits and how many of its cells were recognized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HeaderRow {
    pub index: usize,
    pub score: usize,
}

/// Exact synonym hit weighs 3, containment 1. Highest score per field.
pub fn score_fields(cell: &str) -> Vec<(Field, u32)> {
    let folded = fold(cell);
    if folded.is_empty() {
        return Vec::new();
    }
    let long_enough = char_len(&folded) <= MAX_HEADER_CELL_CHARS;
    synonyms()
        .iter()
        .filter_map(|(field, list)| {
            let best = list
                .iter()
                .map(|syn| {
                    if *syn == folded {
                        3
                    } else if long_enough && contains_synonym(&folded, syn) {
                        1
                    } else {
                        0
                    }
                })
                .max()
                .unwrap_or(0);
            (best > 0).then_some((*field, best))
        })
        .collect()
}

/// Short synonyms only match exactly: one CJK char ("〒") or ASCII under
/// four letters ("hp", "tel") would hit too many data cells.
fn contains_synonym(folded: &str, syn: &str) -> bool {
    let min = if syn.is_ascii() { 4 } else { 2 };
    char_len(syn) >= min && folded.contains(syn)
}

/// Best field for a header cell; ties fall to canonical field order.
pub fn best_field(cell: &str) -> Option<(Field, u32)> {
    score_fields(cell)
        .into_iter()
        .fold(None, |best: Option<(Field, u32)>, (field, score)| match best {
            Some((_, s)) if s >= score => best,
            _ => Some((field, score)),
        })
}

pub fn is_header_cell(cell: &str) -> bool {
    !score_fields(cell).is_empty()
}

/// Score the first `scan_rows` rows; the highest score of at least 2 wins and
/// the earliest row wins a tie. `None` means the file has no header row.
pub fn classify_header(rows: &[Vec<String>], scan_rows: usize) -> Option<HeaderRow> {
    rows.iter()
        .take(scan_rows)
        .enumerate()
        .map(|(index, row)| HeaderRow {
            index,
            score: row.iter().filter(|c| is_header_cell(c)).count(),
        })
        .filter(|h| h.score >= MIN_HEADER_SCORE)
        .fold(None, |best: Option<HeaderRow>, h| match best {
            Some(b) if b.score >= h.score => best,
            _ => Some(h),
        })
}
