//! Read-only tariff store backed by a `tariffs.csv` extract.
//!
//! The CSV layout is `country,product_type,current_tariff,start_time`, one row
//! per rate change. Rows are loaded once and never mutated; concurrent runs
//! share a single dataset behind an `Arc`.

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::domain::{DatasetSummary, Intent, SupportedDomain, TariffRecord};

pub const TARIFFS_FILE_NAME: &str = "tariffs.csv";

#[derive(Debug, Error)]
pub enum DatasetError {
    #[error("could not open tariff data `{path}`: {source}")]
    Open { path: PathBuf, source: std::io::Error },
    #[error("could not parse tariff data at line {line}: {source}")]
    Csv { line: u64, source: csv::Error },
    #[error("invalid tariff row at line {line}: {message}")]
    InvalidRow { line: u64, message: String },
    #[error("tariff dataset is empty")]
    Empty,
    #[error("could not write tariff data `{path}`: {message}")]
    Write { path: PathBuf, message: String },
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("{intent:?} lookup needs at least one {missing}")]
    MissingEntities { intent: Intent, missing: &'static str },
    #[error("intent {0:?} is not answered by a tariff lookup")]
    NotALookupIntent(Intent),
    #[error("tariff store unavailable: {0}")]
    Unavailable(String),
}

/// Entities a lookup step hands to the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LookupRequest {
    pub intent: Intent,
    pub countries: Vec<String>,
    pub product_categories: Vec<String>,
}

impl LookupRequest {
    /// Country x category pairs to fetch, in request order.
    ///
    /// A rate lookup only ever asks for the first country and first category.
    pub fn combinations(&self) -> Result<Vec<(String, String)>, LookupError> {
        if !self.intent.needs_lookup() {
            return Err(LookupError::NotALookupIntent(self.intent));
        }
        if self.countries.is_empty() {
            return Err(LookupError::MissingEntities { intent: self.intent, missing: "country" });
        }
        if self.product_categories.is_empty() {
            return Err(LookupError::MissingEntities {
                intent: self.intent,
                missing: "product category",
            });
        }

        let pairs = match self.intent {
            Intent::RateLookup => {
                vec![(self.countries[0].clone(), self.product_categories[0].clone())]
            }
            _ => self
                .countries
                .iter()
                .flat_map(|country| {
                    self.product_categories
                        .iter()
                        .map(move |category| (country.clone(), category.clone()))
                })
                .collect(),
        };
        Ok(pairs)
    }
}

/// Boundary of the lookup leaf service.
pub trait TariffStore: Send + Sync {
    /// Latest record for one country/category pair with its prior rate, if any.
    fn find(&self, country: &str, product_category: &str) -> Option<TariffRecord>;

    fn summary(&self) -> Result<DatasetSummary, LookupError>;

    fn supported_domain(&self) -> SupportedDomain;

    /// Ordered records for every requested combination; misses are skipped.
    fn lookup(&self, request: &LookupRequest) -> Result<Vec<TariffRecord>, LookupError> {
        Ok(request
            .combinations()?
            .iter()
            .filter_map(|(country, category)| self.find(country, category))
            .collect())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TariffRow {
    pub country: String,
    pub product_category: String,
    pub rate: Decimal,
    pub effective_date: NaiveDate,
}

#[derive(Debug, Deserialize, Serialize)]
pub(crate) struct CsvTariffRow {
    pub country: String,
    pub product_type: String,
    pub current_tariff: String,
    pub start_time: String,
}

#[derive(Clone, Debug)]
pub struct TariffDataset {
    rows: Vec<TariffRow>,
    source: Option<PathBuf>,
}

impl TariffDataset {
    /// Loads `tariffs.csv` from a data directory, or the file itself when a
    /// `.csv` path is given.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DatasetError> {
        let path = resolve_csv_path(path.as_ref());
        let file = File::open(&path)
            .map_err(|source| DatasetError::Open { path: path.clone(), source })?;
        let mut dataset = Self::from_reader(file)?;
        debug!(
            event_name = "dataset.loaded",
            path = %path.display(),
            records = dataset.rows.len(),
            "tariff dataset loaded"
        );
        dataset.source = Some(path);
        Ok(dataset)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DatasetError> {
        let mut csv_reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut rows = Vec::new();
        for (index, record) in csv_reader.deserialize::<CsvTariffRow>().enumerate() {
            let line = index as u64 + 2;
            let raw = record.map_err(|source| DatasetError::Csv { line, source })?;
            rows.push(parse_row(raw, line)?);
        }
        Self::from_rows(rows)
    }

    pub fn from_rows(rows: Vec<TariffRow>) -> Result<Self, DatasetError> {
        if rows.is_empty() {
            return Err(DatasetError::Empty);
        }
        for (index, row) in rows.iter().enumerate() {
            validate_row(row, index as u64 + 2)?;
        }
        Ok(Self { rows, source: None })
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn rows(&self) -> &[TariffRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Countries in first-seen order.
    pub fn countries(&self) -> Vec<String> {
        distinct(self.rows.iter().map(|row| row.country.as_str()))
    }

    /// Product categories in first-seen order.
    pub fn product_categories(&self) -> Vec<String> {
        distinct(self.rows.iter().map(|row| row.product_category.as_str()))
    }

    /// Rate in force for a pair at `as_of` (latest when `None`) with the
    /// rate it replaced. When every row starts after `as_of` the earliest row
    /// is returned without a prior.
    pub fn lookup_with_history(
        &self,
        country: &str,
        product_category: &str,
        as_of: Option<NaiveDate>,
    ) -> Option<TariffRecord> {
        let mut matching = self
            .rows
            .iter()
            .filter(|row| {
                row.country.eq_ignore_ascii_case(country.trim())
                    && row.product_category.eq_ignore_ascii_case(product_category.trim())
            })
            .collect::<Vec<_>>();
        if matching.is_empty() {
            return None;
        }
        matching.sort_by_key(|row| row.effective_date);

        let in_force = match as_of {
            Some(date) => {
                let in_force = matching
                    .iter()
                    .take_while(|row| row.effective_date <= date)
                    .copied()
                    .collect::<Vec<_>>();
                if in_force.is_empty() {
                    vec![matching[0]]
                } else {
                    in_force
                }
            }
            None => matching,
        };

        let current = in_force[in_force.len() - 1];
        let prior = in_force.len().checked_sub(2).map(|index| in_force[index]);

        Some(TariffRecord {
            country: current.country.clone(),
            product_category: current.product_category.clone(),
            rate: current.rate,
            effective_date: current.effective_date,
            prior_rate: prior.map(|row| row.rate),
            prior_date: prior.map(|row| row.effective_date),
        })
    }

    pub fn dataset_summary(&self) -> DatasetSummary {
        let mut earliest = self.rows[0].effective_date;
        let mut latest = earliest;
        let mut min_rate = self.rows[0].rate;
        let mut max_rate = min_rate;
        for row in &self.rows {
            earliest = earliest.min(row.effective_date);
            latest = latest.max(row.effective_date);
            min_rate = min_rate.min(row.rate);
            max_rate = max_rate.max(row.rate);
        }

        DatasetSummary {
            total_records: self.rows.len(),
            countries: self.countries(),
            product_categories: self.product_categories(),
            earliest_date: earliest,
            latest_date: latest,
            min_rate,
            max_rate,
        }
    }
}

impl TariffStore for TariffDataset {
    fn find(&self, country: &str, product_category: &str) -> Option<TariffRecord> {
        self.lookup_with_history(country, product_category, None)
    }

    fn summary(&self) -> Result<DatasetSummary, LookupError> {
        Ok(self.dataset_summary())
    }

    fn supported_domain(&self) -> SupportedDomain {
        SupportedDomain::new(self.countries(), self.product_categories())
    }
}

fn resolve_csv_path(path: &Path) -> PathBuf {
    let is_csv =
        path.extension().map(|extension| extension.eq_ignore_ascii_case("csv")).unwrap_or(false);
    if is_csv {
        path.to_path_buf()
    } else {
        path.join(TARIFFS_FILE_NAME)
    }
}

fn parse_row(raw: CsvTariffRow, line: u64) -> Result<TariffRow, DatasetError> {
    let rate = Decimal::from_str(&raw.current_tariff).map_err(|error| DatasetError::InvalidRow {
        line,
        message: format!("current_tariff `{}` is not a decimal: {error}", raw.current_tariff),
    })?;
    let effective_date = parse_date(&raw.start_time).ok_or_else(|| DatasetError::InvalidRow {
        line,
        message: format!("start_time `{}` is not a date", raw.start_time),
    })?;

    Ok(TariffRow {
        country: raw.country,
        product_category: raw.product_type,
        rate,
        effective_date,
    })
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S").ok().map(|dt| dt.date()))
}

fn validate_row(row: &TariffRow, line: u64) -> Result<(), DatasetError> {
    if row.country.trim().is_empty() || row.product_category.trim().is_empty() {
        return Err(DatasetError::InvalidRow {
            line,
            message: "country and product_type must be non-empty".to_string(),
        });
    }
    if row.rate < Decimal::ZERO || row.rate > Decimal::ONE {
        return Err(DatasetError::InvalidRow {
            line,
            message: format!("current_tariff {} must be within 0..=1", row.rate),
        });
    }
    Ok(())
}

fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::new();
    for value in values {
        if !ordered.iter().any(|known| known == value) {
            ordered.push(value.to_string());
        }
    }
    ordered
}
