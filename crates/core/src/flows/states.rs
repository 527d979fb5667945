use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Named unit of work in the query routing graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Step {
    Start,
    Classify,
    Lookup,
    Summarize,
    Format,
    HandleError,
    End,
}

impl Step {
    pub const ALL: [Step; 7] = [
        Step::Start,
        Step::Classify,
        Step::Lookup,
        Step::Summarize,
        Step::Format,
        Step::HandleError,
        Step::End,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Start => "START",
            Self::Classify => "CLASSIFY",
            Self::Lookup => "LOOKUP",
            Self::Summarize => "SUMMARIZE",
            Self::Format => "FORMAT",
            Self::HandleError => "HANDLE_ERROR",
            Self::End => "END",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        Self::ALL.into_iter().find(|step| step.as_str() == normalized)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::End)
    }

    /// Steps that may write `response_text`.
    pub fn produces_response(&self) -> bool {
        matches!(self, Self::Format | Self::HandleError)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("unknown step `{0}`")]
pub struct UnknownStep(pub String);

impl FromStr for Step {
    type Err = UnknownStep;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse(value).ok_or_else(|| UnknownStep(value.to_string()))
    }
}

/// One edge of the static routing graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FlowEdge {
    pub from: Step,
    pub to: Step,
    pub condition: &'static str,
}
