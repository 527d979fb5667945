use serde::{Deserialize, Serialize};

/// Purpose of a user query as decided by an intent classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Intent {
    #[serde(rename = "tariff_rate", alias = "rate_lookup")]
    RateLookup,
    #[serde(rename = "comparison")]
    Comparison,
    #[serde(rename = "general_info")]
    GeneralInfo,
    #[serde(rename = "unsupported")]
    Unsupported,
}

impl Intent {
    pub const ALL: [Intent; 4] =
        [Intent::RateLookup, Intent::Comparison, Intent::GeneralInfo, Intent::Unsupported];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RateLookup => "tariff_rate",
            Self::Comparison => "comparison",
            Self::GeneralInfo => "general_info",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tariff_rate" | "rate_lookup" => Some(Self::RateLookup),
            "comparison" => Some(Self::Comparison),
            "general_info" => Some(Self::GeneralInfo),
            "unsupported" => Some(Self::Unsupported),
            _ => None,
        }
    }

    /// Intents answered from individual tariff records.
    pub fn needs_lookup(&self) -> bool {
        matches!(self, Self::RateLookup | Self::Comparison)
    }
}

/// Classifier output: intent, extracted entities and a confidence in `[0, 1]`.
///
/// Entity lists are ordered sets: first mention wins and duplicates
/// (compared case-insensitively) are dropped on construction.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedQuery {
    pub intent: Intent,
    pub countries: Vec<String>,
    pub product_categories: Vec<String>,
    pub confidence: f64,
}

impl ClassifiedQuery {
    pub fn new(
        intent: Intent,
        countries: impl IntoIterator<Item = String>,
        product_categories: impl IntoIterator<Item = String>,
        confidence: f64,
    ) -> Self {
        Self {
            intent,
            countries: ordered_set(countries),
            product_categories: ordered_set(product_categories),
            confidence: clamp_confidence(confidence),
        }
    }

    pub fn unsupported(confidence: f64) -> Self {
        Self::new(Intent::Unsupported, Vec::new(), Vec::new(), confidence)
    }
}

fn ordered_set(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = Vec::<String>::new();
    let mut ordered = Vec::new();
    for value in values {
        let trimmed = value.trim();
        if trimmed.is_empty() {
            continue;
        }
        let key = trimmed.to_ascii_lowercase();
        if seen.contains(&key) {
            continue;
        }
        seen.push(key);
        ordered.push(trimmed.to_string());
    }
    ordered
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::{ClassifiedQuery, Intent};

    #[test]
    fn intent_wire_names_accept_both_spellings() {
        assert_eq!(Intent::parse("tariff_rate"), Some(Intent::RateLookup));
        assert_eq!(Intent::parse(" RATE_LOOKUP "), Some(Intent::RateLookup));
        assert_eq!(Intent::parse("forecast"), None);

        let parsed: Intent = serde_json::from_str("\"rate_lookup\"").expect("alias parses");
        assert_eq!(parsed, Intent::RateLookup);
        assert_eq!(serde_json::to_string(&Intent::GeneralInfo).expect("json"), "\"general_info\"");
    }

    #[test]
    fn entities_are_deduplicated_preserving_first_mention() {
        let query = ClassifiedQuery::new(
            Intent::Comparison,
            vec!["Vietnam".to_string(), "india".to_string(), "vietnam".to_string()],
            vec![" Toys ".to_string(), String::new()],
            1.7,
        );

        assert_eq!(query.countries, vec!["Vietnam", "india"]);
        assert_eq!(query.product_categories, vec!["Toys"]);
        assert_eq!(query.confidence, 1.0);
    }

    #[test]
    fn nan_confidence_collapses_to_zero() {
        assert_eq!(ClassifiedQuery::unsupported(f64::NAN).confidence, 0.0);
    }
}
