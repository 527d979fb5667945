//! Deterministic demo dataset: five origin countries, four product
//! categories and three quarterly rate changes during 2025.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use crate::dataset::{CsvTariffRow, DatasetError, TariffDataset, TariffRow, TARIFFS_FILE_NAME};

pub const DEMO_COUNTRIES: [&str; 5] = ["China", "Vietnam", "Mexico", "India", "USA"];
pub const DEMO_CATEGORIES: [&str; 4] = ["Electronics", "Apparel", "Home", "Toys"];

const CHANGE_DATES: [(i32, u32, u32); 3] = [(2025, 1, 1), (2025, 4, 1), (2025, 7, 1)];

/// Base rate per category in basis points.
fn category_base_bps(category: &str) -> i64 {
    match category {
        "Electronics" => 800,
        "Apparel" => 1200,
        "Home" => 600,
        _ => 500,
    }
}

/// Country adjustment in basis points.
fn country_bias_bps(country: &str) -> i64 {
    match country {
        "China" => 200,
        "Vietnam" => -100,
        "Mexico" => -50,
        "India" => -20,
        _ => 0,
    }
}

pub fn demo_rows() -> Vec<TariffRow> {
    let mut rows = Vec::with_capacity(DEMO_COUNTRIES.len() * DEMO_CATEGORIES.len() * 3);
    for (country_index, country) in DEMO_COUNTRIES.iter().enumerate() {
        for (category_index, category) in DEMO_CATEGORIES.iter().enumerate() {
            let mut bps = category_base_bps(category) + country_bias_bps(country);
            for (step, (year, month, day)) in CHANGE_DATES.iter().enumerate() {
                let swing = ((country_index + category_index + step) % 3) as i64 - 1;
                bps = (bps + swing * 75).max(0);
                let Some(effective_date) = NaiveDate::from_ymd_opt(*year, *month, *day) else {
                    continue;
                };
                rows.push(TariffRow {
                    country: (*country).to_string(),
                    product_category: (*category).to_string(),
                    rate: Decimal::new(bps, 4),
                    effective_date,
                });
            }
        }
    }
    rows
}

pub fn demo_dataset() -> Result<TariffDataset, DatasetError> {
    TariffDataset::from_rows(demo_rows())
}

/// Writes rows as `tariffs.csv` inside `dir`, creating the directory.
pub fn write_csv(rows: &[TariffRow], dir: &Path) -> Result<PathBuf, DatasetError> {
    let path = dir.join(TARIFFS_FILE_NAME);
    let write_error =
        |message: String| DatasetError::Write { path: path.clone(), message };

    fs::create_dir_all(dir).map_err(|error| write_error(error.to_string()))?;
    let mut writer = csv::Writer::from_path(&path).map_err(|error| write_error(error.to_string()))?;
    for row in rows {
        writer
            .serialize(CsvTariffRow {
                country: row.country.clone(),
                product_type: row.product_category.clone(),
                current_tariff: row.rate.to_string(),
                start_time: row.effective_date.format("%Y-%m-%d").to_string(),
            })
            .map_err(|error| write_error(error.to_string()))?;
    }
    writer.flush().map_err(|error| write_error(error.to_string()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::{demo_dataset, demo_rows, write_csv, DEMO_CATEGORIES, DEMO_COUNTRIES};
    use crate::dataset::TariffDataset;

    #[test]
    fn demo_rows_are_deterministic_and_complete() {
        let first = demo_rows();
        assert_eq!(first, demo_rows());
        assert_eq!(first.len(), DEMO_COUNTRIES.len() * DEMO_CATEGORIES.len() * 3);
    }

    #[test]
    fn every_demo_pair_has_a_prior_rate() {
        let dataset = demo_dataset().expect("demo dataset is valid");
        for country in DEMO_COUNTRIES {
            for category in DEMO_CATEGORIES {
                let record = dataset.lookup_with_history(country, category, None).expect("pair");
                assert!(record.prior_rate.is_some(), "{country}/{category} should have history");
            }
        }
    }

    #[test]
    fn written_csv_round_trips_through_loader() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_csv(&demo_rows(), &dir.path().join("data")).expect("csv written");

        let loaded = TariffDataset::load(&path).expect("csv loads");
        assert_eq!(loaded.rows(), demo_rows().as_slice());
    }
}
