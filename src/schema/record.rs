use serde::{Deserialize, Serialize};

use super::Field;

/// A single typed value moving between rows, records and the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Number(i64),
    List(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Number(_) => false,
            FieldValue::List(items) => items.is_empty(),
        }
    }
}

/// How incoming values treat values already present on a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MergeMode {
    /// Only fill fields that are currently empty.
    #[default]
    FillEmpty,
    /// Replace existing values unconditionally.
    ForceOverwrite,
}

/// The canonical company document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompanyRecord {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corporate_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub postal_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub representative_birth_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homepage_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_large: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_middle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_small: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_detail: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub industries: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capital_stock: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revenue: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub profit: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_assets: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub founded_year: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fiscal_month: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub executives: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suppliers: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub clients: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overview: Option<String>,

    // Provenance
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_row: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_header: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

impl CompanyRecord {
    fn text_slot(&mut self, field: Field) -> Option<&mut Option<String>> {
        match field {
            Field::Name => Some(&mut self.name),
            Field::CorporateNumber => Some(&mut self.corporate_number),
            Field::PostalCode => Some(&mut self.postal_code),
            Field::Prefecture => Some(&mut self.prefecture),
            Field::Address => Some(&mut self.address),
            Field::RepresentativeName => Some(&mut self.representative_name),
            Field::RepresentativeBirthDate => Some(&mut self.representative_birth_date),
            Field::Tel => Some(&mut self.tel),
            Field::HomepageUrl => Some(&mut self.homepage_url),
            Field::IndustryLarge => Some(&mut self.industry_large),
            Field::IndustryMiddle => Some(&mut self.industry_middle),
            Field::IndustrySmall => Some(&mut self.industry_small),
            Field::IndustryDetail => Some(&mut self.industry_detail),
            Field::Overview => Some(&mut self.overview),
            _ => None,
        }
    }

    fn number_slot(&mut self, field: Field) -> Option<&mut Option<i64>> {
        match field {
            Field::CapitalStock => Some(&mut self.capital_stock),
            Field::Revenue => Some(&mut self.revenue),
            Field::Profit => Some(&mut self.profit),
            Field::TotalAssets => Some(&mut self.total_assets),
            Field::EmployeeCount => Some(&mut self.employee_count),
            Field::FoundedYear => Some(&mut self.founded_year),
            Field::FiscalMonth => Some(&mut self.fiscal_month),
            _ => None,
        }
    }

    fn list_slot(&mut self, field: Field) -> Option<&mut Vec<String>> {
        match field {
            Field::Industries => Some(&mut self.industries),
            Field::Executives => Some(&mut self.executives),
            Field::Suppliers => Some(&mut self.suppliers),
            Field::Clients => Some(&mut self.clients),
            _ => None,
        }
    }

    pub fn get(&self, field: Field) -> Option<FieldValue> {
        let value = match field {
            Field::Name => self.name.clone().map(FieldValue::Text),
            Field::CorporateNumber => self.corporate_number.clone().map(FieldValue::Text),
            Field::PostalCode => self.postal_code.clone().map(FieldValue::Text),
            Field::Prefecture => self.prefecture.clone().map(FieldValue::Text),
            Field::Address => self.address.clone().map(FieldValue::Text),
            Field::RepresentativeName => self.representative_name.clone().map(FieldValue::Text),
            Field::RepresentativeBirthDate => {
                self.representative_birth_date.clone().map(FieldValue::Text)
            }
            Field::Tel => self.tel.clone().map(FieldValue::Text),
            Field::HomepageUrl => self.homepage_url.clone().map(FieldValue::Text),
            Field::IndustryLarge => self.industry_large.clone().map(FieldValue::Text),
            Field::IndustryMiddle => self.industry_middle.clone().map(FieldValue::Text),
            Field::IndustrySmall => self.industry_small.clone().map(FieldValue::Text),
            Field::IndustryDetail => self.industry_detail.clone().map(FieldValue::Text),
            Field::Overview => self.overview.clone().map(FieldValue::Text),
            Field::CapitalStock => self.capital_stock.map(FieldValue::Number),
            Field::Revenue => self.revenue.map(FieldValue::Number),
            Field::Profit => self.profit.map(FieldValue::Number),
            Field::TotalAssets => self.total_assets.map(FieldValue::Number),
            Field::EmployeeCount => self.employee_count.map(FieldValue::Number),
            Field::FoundedYear => self.founded_year.map(FieldValue::Number),
            Field::FiscalMonth => self.fiscal_month.map(FieldValue::Number),
            Field::Industries => Some(FieldValue::List(self.industries.clone())),
            Field::Executives => Some(FieldValue::List(self.executives.clone())),
            Field::Suppliers => Some(FieldValue::List(self.suppliers.clone())),
            Field::Clients => Some(FieldValue::List(self.clients.clone())),
        };
        value.filter(|v| !v.is_empty())
    }

    pub fn text(&self, field: Field) -> Option<String> {
        match self.get(field) {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }

    /// Store a value; values of the wrong shape for the field are ignored.
    /// Returns whether the record changed.
    pub fn set(&mut self, field: Field, value: FieldValue) -> bool {
        match value {
            FieldValue::Text(s) => match self.text_slot(field) {
                Some(slot) if slot.as_deref() != Some(s.as_str()) => {
                    *slot = Some(s);
                    true
                }
                _ => false,
            },
            FieldValue::Number(n) => match self.number_slot(field) {
                Some(slot) if *slot != Some(n) => {
                    *slot = Some(n);
                    true
                }
                _ => false,
            },
            FieldValue::List(items) => match self.list_slot(field) {
                Some(slot) => {
                    let before = slot.len();
                    union_into(slot, items);
                    slot.len() != before
                }
                None => false,
            },
        }
    }

    pub fn is_set(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    /// Fill (or with `ForceOverwrite`, replace) this record's fields from `incoming`.
    /// List fields are unioned in both modes. `always_overwrite` lists fields that
    /// replace existing values even in `FillEmpty` mode.
    pub fn merge_from(
        &mut self,
        incoming: &CompanyRecord,
        mode: MergeMode,
        always_overwrite: &[Field],
    ) -> Vec<Field> {
        let mut changed = Vec::new();
        for field in Field::ALL {
            let Some(value) = incoming.get(field) else {
                continue;
            };
            let may_write = field.is_list()
                || mode == MergeMode::ForceOverwrite
                || always_overwrite.contains(&field)
                || !self.is_set(field);
            if may_write && self.set(field, value) {
                changed.push(field);
            }
        }
        changed
    }

    /// Number of non-empty canonical fields.
    pub fn filled_count(&self) -> usize {
        Field::ALL.iter().filter(|f| self.is_set(**f)).count()
    }
}

fn union_into(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        let item = item.trim().to_string();
        if !item.is_empty() && !target.contains(&item) {
            target.push(item);
        }
    }
}
