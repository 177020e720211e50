use crate::error::RowSkip;
use crate::schema::{find_prefecture, CompanyRecord, Field, FieldKind, FieldValue};
use crate::taxonomy::Taxonomy;
use crate::utils::non_empty;

use super::columns::ColumnMap;
use super::representative::{parse_birth_date, parse_representative};
use super::scan::scan_row;
use super::values::*;

/// How a row's record was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMode {
    HeaderTrusted,
    ValueScan,
    /// Header was trusted but the postal-code anchor failed, so the row was
    /// treated as shifted and scanned instead.
    ShiftFallback,
}

/// Everything a row needs besides its cells. Shared read-only across workers.
#[derive(Debug, Clone, Copy)]
pub struct RowContext<'a> {
    /// `None` switches every row to value-scan inference.
    pub columns: Option<&'a ColumnMap>,
    /// Profile multiplier for money written without a unit.
    pub money_scale: Option<i64>,
    pub taxonomy: &'a Taxonomy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedRow {
    pub record: CompanyRecord,
    pub mode: RowMode,
    /// Mapped fields whose cell failed validation and was dropped.
    pub rejected: Vec<Field>,
}

/// Convert one cell for `field`. `None` means the value failed validation;
/// a field may yield companions (address -> postal code, representative ->
/// birth date).
pub fn convert_cell(
    field: Field,
    raw: &str,
    header: &str,
    money_scale: Option<i64>,
) -> Option<Vec<(Field, FieldValue)>> {
    let text = |v: String| vec![(field, FieldValue::Text(v))];
    let number = |n: i64| vec![(field, FieldValue::Number(n))];
    match field.kind() {
        FieldKind::Text => non_empty(raw).map(text),
        FieldKind::PostalCode => normalize_postal_code(raw).map(text),
        FieldKind::CorporateNumber => normalize_corporate_number(raw).map(text),
        FieldKind::Phone => normalize_phone(raw).map(text),
        FieldKind::Url => extract_url(raw).map(text),
        FieldKind::Prefecture => normalize_prefecture(raw).map(text),
        FieldKind::Address => {
            let (postal, rest) = split_postal_prefix(raw);
            let address = clean_address(&rest)?;
            let mut out = vec![(Field::Address, FieldValue::Text(address))];
            if let Some(p) = postal {
                out.push((Field::PostalCode, FieldValue::Text(p)));
            }
            Some(out)
        }
        FieldKind::Representative => {
            let rep = parse_representative(raw);
            let mut out = Vec::new();
            if let Some(name) = rep.name {
                out.push((Field::RepresentativeName, FieldValue::Text(name)));
            }
            if let Some(date) = rep.birth_date {
                out.push((Field::RepresentativeBirthDate, FieldValue::Text(date)));
            }
            (!out.is_empty()).then_some(out)
        }
        FieldKind::BirthDate => parse_birth_date(raw).map(text),
        FieldKind::Money => {
            let scale = header_money_scale(header).or(money_scale).unwrap_or(1);
            parse_money(raw, scale).map(number)
        }
        FieldKind::Count => parse_count(raw).map(number),
        FieldKind::Year => parse_year(raw).map(number),
        FieldKind::Month => parse_month(raw).map(number),
        FieldKind::List => Some(vec![(field, FieldValue::List(parse_list(raw)))]),
    }
}

fn apply(record: &mut CompanyRecord, field: Field, value: FieldValue) {
    if field.is_list() || !record.is_set(field) {
        record.set(field, value);
    }
}

fn from_columns(cells: &[String], columns: &ColumnMap, ctx: &RowContext) -> Option<NormalizedRow> {
    if let Some(idx) = columns.column_of(Field::PostalCode) {
        let anchor = cells.get(idx).and_then(|c| non_empty(c));
        if anchor.is_some_and(|raw| normalize_postal_code(&raw).is_none()) {
            return None;
        }
    }

    let mut record = CompanyRecord::default();
    let mut rejected = Vec::new();
    for (idx, mapping) in columns.iter() {
        let Some(raw) = cells.get(idx).and_then(|c| non_empty(c)) else {
            continue;
        };
        match convert_cell(mapping.field, &raw, &mapping.header, ctx.money_scale) {
            Some(values) => {
                for (field, value) in values {
                    apply(&mut record, field, value);
                }
            }
            None => rejected.push(mapping.field),
        }
    }
    Some(NormalizedRow {
        record,
        mode: RowMode::HeaderTrusted,
        rejected,
    })
}

/// Normalize one data row into a canonical record.
pub fn normalize_row(cells: &[String], ctx: &RowContext) -> Result<NormalizedRow, RowSkip> {
    if cells.iter().all(|c| non_empty(c).is_none()) {
        return Err(RowSkip::Empty);
    }

    let mut row = match ctx.columns {
        Some(columns) => from_columns(cells, columns, ctx).unwrap_or_else(|| NormalizedRow {
            record: scan_row(cells),
            mode: RowMode::ShiftFallback,
            rejected: Vec::new(),
        }),
        None => NormalizedRow {
            record: scan_row(cells),
            mode: RowMode::ValueScan,
            rejected: Vec::new(),
        },
    };

    let record = &mut row.record;
    if !record.is_set(Field::Prefecture) {
        if let Some(pref) = record.address.as_deref().and_then(find_prefecture) {
            record.prefecture = Some(pref.to_string());
        }
    }
    ctx.taxonomy.complete(record);

    if !record.is_set(Field::Name) {
        return Err(RowSkip::MissingName);
    }
    Ok(row)
}
