use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::json;
use tarifftok_core::{percent_label, DatasetSummary, TariffRecord, Trend};
use thiserror::Error;

use crate::llm::{LlmClient, LlmError, LlmRequest};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NarrativeStyle {
    SingleResult,
    Comparison,
    Summary,
}

impl fmt::Display for NarrativeStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SingleResult => "single-result",
            Self::Comparison => "comparison",
            Self::Summary => "summary",
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NarrativeInput {
    Records(Vec<TariffRecord>),
    Summary(DatasetSummary),
}

#[derive(Clone, Debug, PartialEq)]
pub struct NarrativeRequest {
    pub query: String,
    pub style: NarrativeStyle,
    pub input: NarrativeInput,
}

impl NarrativeRequest {
    pub fn records(query: impl Into<String>, style: NarrativeStyle, records: Vec<TariffRecord>) -> Self {
        Self { query: query.into(), style, input: NarrativeInput::Records(records) }
    }

    pub fn summary(query: impl Into<String>, summary: DatasetSummary) -> Self {
        Self { query: query.into(), style: NarrativeStyle::Summary, input: NarrativeInput::Summary(summary) }
    }
}

#[derive(Debug, Error)]
pub enum NarrativeError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("narrative service returned an empty response")]
    Empty,
    #[error("{style} narrative cannot be built from the supplied payload")]
    StyleMismatch { style: NarrativeStyle },
    #[error("no tariff records to narrate")]
    NoRecords,
}

/// Turns records or a dataset summary into prose for the end user.
#[async_trait]
pub trait NarrativeService: Send + Sync {
    async fn narrate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError>;
}

/// Deterministic prose built from fixed sentence templates.
#[derive(Clone, Debug, Default)]
pub struct TemplateNarrator;

impl TemplateNarrator {
    pub fn new() -> Self {
        Self
    }

    pub fn render(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        match (&request.style, &request.input) {
            (NarrativeStyle::Summary, NarrativeInput::Summary(summary)) => Ok(summary_text(summary)),
            (NarrativeStyle::SingleResult, NarrativeInput::Records(records)) => {
                let paragraphs = records.iter().map(single_result_text).collect::<Vec<_>>();
                non_empty(paragraphs.join("\n\n"))
            }
            (NarrativeStyle::Comparison, NarrativeInput::Records(records)) => {
                if records.is_empty() {
                    return Err(NarrativeError::NoRecords);
                }
                Ok(comparison_text(records))
            }
            (style, _) => Err(NarrativeError::StyleMismatch { style: *style }),
        }
    }
}

#[async_trait]
impl NarrativeService for TemplateNarrator {
    async fn narrate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        self.render(request)
    }
}

fn non_empty(text: String) -> Result<String, NarrativeError> {
    if text.trim().is_empty() {
        Err(NarrativeError::NoRecords)
    } else {
        Ok(text)
    }
}

fn long_date(date: NaiveDate) -> String {
    date.format("%B %-d, %Y").to_string()
}

fn dollars_per_hundred(record: &TariffRecord) -> String {
    let mut duty = record.percentage();
    duty.rescale(2);
    format!("${duty}")
}

fn change_clause(record: &TariffRecord) -> Option<String> {
    let trend = record.trend()?;
    let prior = record.prior_rate.map(percent_label)?;
    let since = record.prior_date.map(|date| format!(" (effective {})", long_date(date))).unwrap_or_default();
    Some(match trend {
        Trend::Unchanged => format!("remained unchanged from {prior}{since}"),
        Trend::Increased | Trend::Decreased => {
            let points = record.change_points().unwrap_or_default().abs();
            let relative = record
                .relative_change_pct()
                .map(|pct| format!(", a {}% relative change", pct.abs()))
                .unwrap_or_default();
            format!("{} from {prior}{since} by {points} percentage points{relative}", trend.as_str())
        }
    })
}

fn single_result_text(record: &TariffRecord) -> String {
    let rate = percent_label(record.rate);
    let mut text = format!(
        "The tariff rate for {category} from {country} is {rate}, effective {date}. \
         This means {duty} in duty for every $100 of {category_lower} imported from {country}.",
        category = record.product_category,
        country = record.country,
        date = long_date(record.effective_date),
        duty = dollars_per_hundred(record),
        category_lower = record.product_category.to_lowercase(),
    );
    match change_clause(record) {
        Some(clause) => text.push_str(&format!(" The rate {clause}.")),
        None => text.push_str(" No earlier rate is on record for this combination."),
    }
    text
}

fn comparison_text(records: &[TariffRecord]) -> String {
    let single_category = records.iter().all(|record| record.product_category == records[0].product_category);
    let single_country = records.iter().all(|record| record.country == records[0].country);
    let label = |record: &TariffRecord| -> String {
        if single_category {
            record.country.clone()
        } else if single_country {
            record.product_category.clone()
        } else {
            format!("{} {}", record.country, record.product_category)
        }
    };

    let subject = if single_category {
        format!("{} across {}", records[0].product_category, join_names(records.iter().map(|r| r.country.as_str())))
    } else if single_country {
        format!("imports from {}", records[0].country)
    } else {
        "the requested countries and categories".to_string()
    };

    let mut lines = vec![format!("Here's a comparison of tariff rates for {subject}:"), String::new()];
    for record in records {
        let trend = change_clause(record).unwrap_or_else(|| "no earlier rate on record".to_string());
        lines.push(format!(
            "- {}: {} (effective {}), {trend}",
            label(record),
            percent_label(record.rate),
            long_date(record.effective_date),
        ));
    }

    if records.len() > 1 {
        lines.push(String::new());
        let lowest = records.iter().min_by_key(|record| record.rate);
        let highest = records.iter().max_by_key(|record| record.rate);
        if let (Some(lowest), Some(highest)) = (lowest, highest) {
            if lowest.rate == highest.rate {
                lines.push(format!("All compared rates are equal at {}.", percent_label(lowest.rate)));
            } else {
                let mut spread = (highest.rate - lowest.rate) * Decimal::ONE_HUNDRED;
                spread.rescale(2);
                lines.push(format!(
                    "{} has the lowest tariff rate ({}), while {} has the highest ({}). \
                     The gap is {} percentage points, or ${spread} per $100 of imports.",
                    label(lowest),
                    percent_label(lowest.rate),
                    label(highest),
                    percent_label(highest.rate),
                    spread.normalize(),
                ));
            }
        }
    }

    lines.join("\n")
}

fn join_names<'a>(names: impl Iterator<Item = &'a str>) -> String {
    let mut distinct: Vec<&str> = Vec::new();
    for name in names {
        if !distinct.contains(&name) {
            distinct.push(name);
        }
    }
    match distinct.as_slice() {
        [] => String::new(),
        [only] => (*only).to_string(),
        [init @ .., last] => format!("{} and {last}", init.join(", ")),
    }
}

fn summary_text(summary: &DatasetSummary) -> String {
    format!(
        "Our tariff database holds {records} tariff records for {country_count} countries ({countries}) \
         and {category_count} product categories ({categories}). \
         The records cover {earliest} to {latest}, with rates ranging from {min} to {max}. \
         You can ask about the tariff rate for any of these country and category combinations.",
        records = summary.total_records,
        country_count = summary.countries.len(),
        countries = summary.countries.join(", "),
        category_count = summary.product_categories.len(),
        categories = summary.product_categories.join(", "),
        earliest = summary.earliest_date,
        latest = summary.latest_date,
        min = percent_label(summary.min_rate),
        max = percent_label(summary.max_rate),
    )
}

const SINGLE_RESULT_PROMPT: &str = "You are a tariff analysis assistant. Turn the tariff data \
in the context into a clear, conversational answer of two to four sentences. State the exact \
rate as a percentage, the effective date, and what the rate means per $100 of imports. When a \
previous rate is present, say whether the rate increased or decreased, from what, and by how much. \
Do not invent figures that are not in the context.";

const COMPARISON_PROMPT: &str = "You are a tariff analysis assistant. Compare the tariff records \
in the context. Start with \"Here's a comparison of tariff rates for\", list every record with its \
rate, effective date and trend, then say which has the lowest and which the highest rate and the \
difference in percentage points. Use only figures from the context.";

const SUMMARY_PROMPT: &str = "You are a tariff analysis assistant. Describe the tariff dataset \
in the context: how many records it holds, which countries and product categories it covers, the \
date range and the range of rates. End by inviting the user to ask about a specific combination.";

/// Narrator backed by a chat-completion model.
pub struct LlmNarrator {
    client: Arc<dyn LlmClient>,
}

impl LlmNarrator {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    fn build_request(&self, request: &NarrativeRequest) -> Result<LlmRequest, NarrativeError> {
        let (prompt, max_tokens, context) = match (&request.style, &request.input) {
            (NarrativeStyle::SingleResult, NarrativeInput::Records(records)) => {
                (SINGLE_RESULT_PROMPT, 300, records_context(records))
            }
            (NarrativeStyle::Comparison, NarrativeInput::Records(records)) => {
                (COMPARISON_PROMPT, 400, records_context(records))
            }
            (NarrativeStyle::Summary, NarrativeInput::Summary(summary)) => {
                (SUMMARY_PROMPT, 300, summary_context(summary))
            }
            (style, _) => return Err(NarrativeError::StyleMismatch { style: *style }),
        };

        let user = format!("Context: {context}\n\nOriginal query: {}", request.query);
        Ok(LlmRequest::new(prompt, user).with_temperature(0.3).with_max_tokens(max_tokens))
    }
}

#[async_trait]
impl NarrativeService for LlmNarrator {
    async fn narrate(&self, request: &NarrativeRequest) -> Result<String, NarrativeError> {
        let llm_request = self.build_request(request)?;
        let text = self.client.complete(llm_request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(NarrativeError::Empty);
        }
        Ok(text.to_string())
    }
}

fn records_context(records: &[TariffRecord]) -> serde_json::Value {
    let rows = records
        .iter()
        .map(|record| {
            json!({
                "country": record.country,
                "product_category": record.product_category,
                "tariff_percentage": record.percentage().to_string(),
                "effective_date": record.effective_date.to_string(),
                "previous_percentage": record.prior_percentage().map(|pct| pct.to_string()),
                "previous_date": record.prior_date.map(|date| date.to_string()),
                "change_percentage_points": record.change_points().map(|pct| pct.to_string()),
                "relative_change_percent": record.relative_change_pct().map(|pct| pct.to_string()),
                "trend": record.trend().map(|trend| trend.as_str()),
            })
        })
        .collect::<Vec<_>>();
    json!({ "tariff_results": rows })
}

fn summary_context(summary: &DatasetSummary) -> serde_json::Value {
    json!({
        "total_records": summary.total_records,
        "countries": summary.countries,
        "product_categories": summary.product_categories,
        "date_range": {
            "earliest": summary.earliest_date.to_string(),
            "latest": summary.latest_date.to_string(),
        },
        "tariff_range": {
            "min": percent_label(summary.min_rate),
            "max": percent_label(summary.max_rate),
        },
    })
}
