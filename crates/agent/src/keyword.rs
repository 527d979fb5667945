use async_trait::async_trait;
use tarifftok_core::{ClassifiedQuery, Intent, SupportedDomain};

use crate::aliases::{contains_phrase, mentioned_categories, mentioned_countries, normalize_text};
use crate::classifier::{ClassifierError, IntentClassifier};

const UNSUPPORTED_PHRASES: &[&str] = &[
    "what if",
    "margin",
    "margins",
    "forecast",
    "forecasts",
    "predict",
    "prediction",
    "scenario",
    "scenarios",
    "profit",
    "profits",
    "impact",
];

const COMPARISON_PHRASES: &[&str] =
    &["compare", "comparison", "versus", "vs", "between", "difference"];

const GENERAL_INFO_PHRASES: &[&str] = &[
    "available data",
    "data available",
    "what data",
    "which countries",
    "what countries",
    "which products",
    "what products",
    "overview",
    "help",
];

/// Rule-based classifier that needs no network access.
///
/// Rules, in order:
/// 1. any unsupported phrase wins;
/// 2. a country plus a category is a rate lookup, or a comparison when a
///    comparison phrase or several countries/categories are present;
/// 3. a general-info phrase asks for the dataset overview;
/// 4. a lone country or category is still treated as a lookup so the router
///    can explain what is missing;
/// 5. everything else is unsupported with low confidence.
#[derive(Clone, Debug)]
pub struct KeywordIntentClassifier {
    domain: SupportedDomain,
}

impl KeywordIntentClassifier {
    pub fn new(domain: SupportedDomain) -> Self {
        Self { domain }
    }

    pub fn classify_text(&self, text: &str) -> ClassifiedQuery {
        let normalized = normalize_text(text);
        let has_any = |phrases: &[&str]| phrases.iter().any(|phrase| contains_phrase(&normalized, phrase));

        let countries = mentioned_countries(text, &self.domain);
        let categories = mentioned_categories(text, &self.domain);

        if has_any(UNSUPPORTED_PHRASES) {
            return ClassifiedQuery::new(Intent::Unsupported, countries, categories, 0.9);
        }

        let wants_comparison = has_any(COMPARISON_PHRASES);
        let confidence = confidence_score(!countries.is_empty(), !categories.is_empty(), wants_comparison);

        let intent = match (countries.is_empty(), categories.is_empty()) {
            (false, false) => {
                if wants_comparison || countries.len() > 1 || categories.len() > 1 {
                    Intent::Comparison
                } else {
                    Intent::RateLookup
                }
            }
            _ if has_any(GENERAL_INFO_PHRASES) => {
                return ClassifiedQuery::new(Intent::GeneralInfo, countries, categories, 0.8);
            }
            (true, true) => return ClassifiedQuery::unsupported(0.2),
            _ if wants_comparison => Intent::Comparison,
            _ => Intent::RateLookup,
        };

        ClassifiedQuery::new(intent, countries, categories, confidence)
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, query: &str) -> Result<ClassifiedQuery, ClassifierError> {
        Ok(self.classify_text(query))
    }
}

fn confidence_score(has_country: bool, has_category: bool, has_comparison_phrase: bool) -> f64 {
    let mut score = 30u8;
    if has_country {
        score += 30;
    }
    if has_category {
        score += 30;
    }
    if has_comparison_phrase {
        score += 10;
    }
    f64::from(score.min(100)) / 100.0
}
