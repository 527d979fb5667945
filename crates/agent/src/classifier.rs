use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tarifftok_core::{ClassifiedQuery, Intent, SupportedDomain};
use thiserror::Error;
use tracing::debug;

use crate::aliases::{canonical_category, canonical_country, COUNTRY_ALIASES, CATEGORY_ALIASES};
use crate::llm::{extract_json, LlmClient, LlmError, LlmRequest};

/// Turns raw query text into an intent plus the entities it names.
#[async_trait]
pub trait IntentClassifier: Send + Sync {
    async fn classify(&self, query: &str) -> Result<ClassifiedQuery, ClassifierError>;
}

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error(transparent)]
    Llm(#[from] LlmError),
    #[error("classifier returned malformed output: {0}")]
    MalformedResponse(String),
    #[error("classifier returned unknown intent `{0}`")]
    UnknownIntent(String),
}

const CLASSIFIER_TEMPERATURE: f32 = 0.1;

#[derive(Debug, Deserialize)]
struct ClassifierReply {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    product_type: Option<String>,
    intent: String,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    parsed_entities: ParsedEntities,
}

#[derive(Debug, Default, Deserialize)]
struct ParsedEntities {
    #[serde(default)]
    countries_mentioned: Vec<String>,
    #[serde(default)]
    products_mentioned: Vec<String>,
}

/// Classifier backed by a chat-completion model in JSON mode.
pub struct LlmIntentClassifier {
    client: Arc<dyn LlmClient>,
    domain: SupportedDomain,
    system_prompt: String,
}

impl LlmIntentClassifier {
    pub fn new(client: Arc<dyn LlmClient>, domain: SupportedDomain) -> Self {
        let system_prompt = system_prompt(&domain);
        Self { client, domain, system_prompt }
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    fn interpret(&self, raw: &str) -> Result<ClassifiedQuery, ClassifierError> {
        let json = extract_json(raw)
            .ok_or_else(|| ClassifierError::MalformedResponse("no JSON object in reply".to_string()))?;
        let reply: ClassifierReply = serde_json::from_str(json)
            .map_err(|error| ClassifierError::MalformedResponse(error.to_string()))?;
        let intent =
            Intent::parse(&reply.intent).ok_or_else(|| ClassifierError::UnknownIntent(reply.intent.clone()))?;

        // Headline entity first, then everything else the model noticed.
        let countries = reply
            .country
            .iter()
            .chain(reply.parsed_entities.countries_mentioned.iter())
            .filter_map(|name| canonical_country(name, &self.domain))
            .collect::<Vec<_>>();
        let categories = reply
            .product_type
            .iter()
            .chain(reply.parsed_entities.products_mentioned.iter())
            .filter_map(|name| canonical_category(name, &self.domain))
            .collect::<Vec<_>>();

        Ok(ClassifiedQuery::new(intent, countries, categories, reply.confidence.unwrap_or(0.0)))
    }
}

#[async_trait]
impl IntentClassifier for LlmIntentClassifier {
    async fn classify(&self, query: &str) -> Result<ClassifiedQuery, ClassifierError> {
        let request = LlmRequest::new(self.system_prompt.clone(), format!("Parse this query: {query}"))
            .with_temperature(CLASSIFIER_TEMPERATURE)
            .json();
        let raw = self.client.complete(request).await?;
        debug!(event_name = "classifier.reply.received", chars = raw.len(), "classifier replied");
        self.interpret(&raw)
    }
}

fn alias_lines(table: &[(&str, &str)]) -> String {
    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for &(alias, target) in table {
        match grouped.iter_mut().find(|(name, _)| *name == target) {
            Some((_, aliases)) => aliases.push(alias),
            None => grouped.push((target, vec![alias])),
        }
    }
    grouped
        .into_iter()
        .map(|(target, aliases)| {
            let quoted = aliases.iter().map(|alias| format!("\"{alias}\"")).collect::<Vec<_>>();
            format!("- {} -> \"{target}\"", quoted.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn system_prompt(domain: &SupportedDomain) -> String {
    format!(
        r#"You parse questions about import tariff rates into structured JSON.

Extract the origin country, the product category and the intent of the question.

Supported countries: {countries}
Supported product categories: {categories}

Country aliases (map to the exact supported name):
{country_aliases}

Product category aliases:
{category_aliases}

Intents:
- tariff_rate: the user wants the current or historical rate for one country and category
- comparison: the user wants rates compared across countries or categories
- general_info: the user asks what data, countries or categories are available
- unsupported: hypothetical or what-if scenarios, margin or profit analysis, forecasts and predictions, business impact analysis, or anything beyond current and historical tariff rates

Reply with a single JSON object and nothing else:
{{
  "country": "Country" or null,
  "product_type": "Category" or null,
  "intent": "tariff_rate|comparison|general_info|unsupported",
  "confidence": 0.0-1.0,
  "parsed_entities": {{
    "countries_mentioned": ["..."],
    "products_mentioned": ["..."],
    "keywords": ["..."]
  }}
}}

List every mentioned country and product in parsed_entities in the order they appear.
Only use names from the supported lists for country and product_type; use null otherwise.
Lower the confidence when the question is ambiguous."#,
        countries = domain.countries.join(", "),
        categories = domain.product_categories.join(", "),
        country_aliases = alias_lines(COUNTRY_ALIASES),
        category_aliases = alias_lines(CATEGORY_ALIASES),
    )
}
