use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Extents of the whole tariff dataset.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub total_records: usize,
    pub countries: Vec<String>,
    pub product_categories: Vec<String>,
    pub earliest_date: NaiveDate,
    pub latest_date: NaiveDate,
    pub min_rate: Decimal,
    pub max_rate: Decimal,
}

/// Countries and product categories a store can answer for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedDomain {
    pub countries: Vec<String>,
    pub product_categories: Vec<String>,
}

impl SupportedDomain {
    pub fn new(countries: Vec<String>, product_categories: Vec<String>) -> Self {
        Self { countries, product_categories }
    }

    pub fn canonical_country(&self, name: &str) -> Option<&str> {
        canonical(&self.countries, name)
    }

    pub fn canonical_category(&self, name: &str) -> Option<&str> {
        canonical(&self.product_categories, name)
    }

    pub fn is_empty(&self) -> bool {
        self.countries.is_empty() && self.product_categories.is_empty()
    }
}

impl From<&DatasetSummary> for SupportedDomain {
    fn from(summary: &DatasetSummary) -> Self {
        Self::new(summary.countries.clone(), summary.product_categories.clone())
    }
}

fn canonical<'a>(known: &'a [String], name: &str) -> Option<&'a str> {
    let needle = name.trim();
    known.iter().find(|candidate| candidate.eq_ignore_ascii_case(needle)).map(String::as_str)
}
