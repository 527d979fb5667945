use tarifftok_core::{percent_label, DatasetSummary};

use crate::commands::{load_config, load_dataset, CommandResult};

pub fn run() -> CommandResult {
    let config = match load_config("summary") {
        Ok(config) => config,
        Err(failure) => return failure,
    };
    let dataset = match load_dataset("summary", &config) {
        Ok(dataset) => dataset,
        Err(failure) => return failure,
    };

    CommandResult::text(render(&dataset.dataset_summary()))
}

fn render(summary: &DatasetSummary) -> String {
    [
        format!("tariff records: {}", summary.total_records),
        format!("countries: {}", summary.countries.join(", ")),
        format!("product categories: {}", summary.product_categories.join(", ")),
        format!("effective dates: {} to {}", summary.earliest_date, summary.latest_date),
        format!("rates: {} to {}", percent_label(summary.min_rate), percent_label(summary.max_rate)),
    ]
    .join("\n")
}
