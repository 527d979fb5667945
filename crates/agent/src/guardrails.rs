use tarifftok_core::{ClassifiedQuery, Intent};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GuardrailDecision {
    Allow,
    Deny { reason_code: &'static str, user_message: String, fallback_path: &'static str },
}

impl GuardrailDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Checks a classification before the router acts on it.
#[derive(Clone, Debug, PartialEq)]
pub struct GuardrailPolicy {
    /// Classifications below this confidence are not acted on; `0.0` disables
    /// the floor.
    pub min_confidence: f64,
}

impl Default for GuardrailPolicy {
    fn default() -> Self {
        Self { min_confidence: 0.0 }
    }
}

impl GuardrailPolicy {
    pub fn with_min_confidence(min_confidence: f64) -> Self {
        Self { min_confidence }
    }

    pub fn evaluate(&self, classification: &ClassifiedQuery) -> GuardrailDecision {
        match classification.intent {
            // Already headed for the help message.
            Intent::Unsupported => GuardrailDecision::Allow,
            Intent::RateLookup | Intent::Comparison | Intent::GeneralInfo
                if classification.confidence < self.min_confidence =>
            {
                GuardrailDecision::Deny {
                    reason_code: "low_confidence_classification",
                    user_message: format!(
                        "the question was too ambiguous to answer reliably (confidence {:.2}, need {:.2})",
                        classification.confidence, self.min_confidence
                    ),
                    fallback_path: "help_message",
                }
            }
            Intent::RateLookup | Intent::Comparison | Intent::GeneralInfo => GuardrailDecision::Allow,
        }
    }
}
