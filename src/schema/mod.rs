pub mod record;
pub mod tables;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub use record::{CompanyRecord, FieldValue, MergeMode};
pub use tables::{
    find_prefecture, full_prefecture_in, has_legal_suffix, lexicon, synonyms, Lexicon,
};

/// Canonical target fields, in the order used to break scoring ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Field {
    Name,
    CorporateNumber,
    PostalCode,
    Prefecture,
    Address,
    RepresentativeName,
    RepresentativeBirthDate,
    Tel,
    HomepageUrl,
    IndustryLarge,
    IndustryMiddle,
    IndustrySmall,
    IndustryDetail,
    Industries,
    CapitalStock,
    Revenue,
    Profit,
    TotalAssets,
    EmployeeCount,
    FoundedYear,
    FiscalMonth,
    Executives,
    Suppliers,
    Clients,
    Overview,
}

/// How a field's raw cell is validated and converted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    PostalCode,
    CorporateNumber,
    Phone,
    Url,
    Prefecture,
    Address,
    Representative,
    BirthDate,
    Money,
    Count,
    Year,
    Month,
    List,
}

impl Field {
    pub const ALL: [Field; 25] = [
        Field::Name,
        Field::CorporateNumber,
        Field::PostalCode,
        Field::Prefecture,
        Field::Address,
        Field::RepresentativeName,
        Field::RepresentativeBirthDate,
        Field::Tel,
        Field::HomepageUrl,
        Field::IndustryLarge,
        Field::IndustryMiddle,
        Field::IndustrySmall,
        Field::IndustryDetail,
        Field::Industries,
        Field::CapitalStock,
        Field::Revenue,
        Field::Profit,
        Field::TotalAssets,
        Field::EmployeeCount,
        Field::FoundedYear,
        Field::FiscalMonth,
        Field::Executives,
        Field::Suppliers,
        Field::Clients,
        Field::Overview,
    ];

    pub fn key(self) -> &'static str {
        match self {
            Field::Name => "name",
            Field::CorporateNumber => "corporateNumber",
            Field::PostalCode => "postalCode",
            Field::Prefecture => "prefecture",
            Field::Address => "address",
            Field::RepresentativeName => "representativeName",
            Field::RepresentativeBirthDate => "representativeBirthDate",
            Field::Tel => "tel",
            Field::HomepageUrl => "homepageUrl",
            Field::IndustryLarge => "industryLarge",
            Field::IndustryMiddle => "industryMiddle",
            Field::IndustrySmall => "industrySmall",
            Field::IndustryDetail => "industryDetail",
            Field::Industries => "industries",
            Field::CapitalStock => "capitalStock",
            Field::Revenue => "revenue",
            Field::Profit => "profit",
            Field::TotalAssets => "totalAssets",
            Field::EmployeeCount => "employeeCount",
            Field::FoundedYear => "foundedYear",
            Field::FiscalMonth => "fiscalMonth",
            Field::Executives => "executives",
            Field::Suppliers => "suppliers",
            Field::Clients => "clients",
            Field::Overview => "overview",
        }
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::CorporateNumber => FieldKind::CorporateNumber,
            Field::PostalCode => FieldKind::PostalCode,
            Field::Prefecture => FieldKind::Prefecture,
            Field::Address => FieldKind::Address,
            Field::RepresentativeName => FieldKind::Representative,
            Field::RepresentativeBirthDate => FieldKind::BirthDate,
            Field::Tel => FieldKind::Phone,
            Field::HomepageUrl => FieldKind::Url,
            Field::CapitalStock | Field::Revenue | Field::Profit | Field::TotalAssets => {
                FieldKind::Money
            }
            Field::EmployeeCount => FieldKind::Count,
            Field::FoundedYear => FieldKind::Year,
            Field::FiscalMonth => FieldKind::Month,
            Field::Industries | Field::Executives | Field::Suppliers | Field::Clients => {
                FieldKind::List
            }
            Field::Name
            | Field::IndustryLarge
            | Field::IndustryMiddle
            | Field::IndustrySmall
            | Field::IndustryDetail
            | Field::Overview => FieldKind::Text,
        }
    }

    pub fn is_list(self) -> bool {
        self.kind() == FieldKind::List
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for Field {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Field::ALL
            .iter()
            .copied()
            .find(|f| f.key().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| format!("unknown field: {}", wanted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_keys_round_trip_through_from_str() {
        for field in Field::ALL {
            assert_eq!(field.key().parse::<Field>(), Ok(field));
        }
        assert_eq!("HOMEPAGEURL".parse::<Field>(), Ok(Field::HomepageUrl));
        assert!("fax".parse::<Field>().is_err());
    }

    #[test]
    fn serde_uses_camel_case_keys() {
        let json = serde_json::to_string(&Field::CorporateNumber).unwrap();
        assert_eq!(json, "\"corporateNumber\"");
    }
}
