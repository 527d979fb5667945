//! Per-query execution state and the result handed back to callers.
//!
//! A state value is never shared: each step produces a [`StatePatch`] and
//! [`ExecutionState::apply`] consumes the old state to build the next one,
//! enforcing which step may write which field.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ClassifiedQuery, DatasetSummary, TariffRecord};
use crate::flows::states::Step;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("step {step} attempted to set the classification; only CLASSIFY may")]
    ClassificationOutsideClassify { step: Step },
    #[error("classification is already set and cannot be replaced")]
    AlreadyClassified,
    #[error("step {step} attempted to set lookup results; only LOOKUP may")]
    ResultsOutsideLookup { step: Step },
    #[error("step {step} attempted to set the dataset summary; only SUMMARIZE may")]
    SummaryOutsideSummarize { step: Step },
    #[error("step {step} attempted to write the response; only FORMAT or HANDLE_ERROR may")]
    ResponseOutsideFormatter { step: Step },
    #[error("response text is already set by an earlier step")]
    ResponseAlreadySet,
    #[error("step {step} ran before the query was classified")]
    NotClassified { step: Step },
}

/// Field updates produced by one step execution.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StatePatch {
    pub classification: Option<ClassifiedQuery>,
    pub results: Option<Vec<TariffRecord>>,
    pub summary: Option<DatasetSummary>,
    pub response_text: Option<String>,
    pub error: Option<String>,
}

impl StatePatch {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn classified(classification: ClassifiedQuery) -> Self {
        Self { classification: Some(classification), ..Self::default() }
    }

    pub fn results(results: Vec<TariffRecord>) -> Self {
        Self { results: Some(results), ..Self::default() }
    }

    pub fn summary(summary: DatasetSummary) -> Self {
        Self { summary: Some(summary), ..Self::default() }
    }

    pub fn response(text: impl Into<String>) -> Self {
        Self { response_text: Some(text.into()), ..Self::default() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { error: Some(error.into()), ..Self::default() }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct ExecutionState {
    query: String,
    classification: Option<ClassifiedQuery>,
    results: Option<Vec<TariffRecord>>,
    summary: Option<DatasetSummary>,
    response_text: Option<String>,
    error: Option<String>,
    current_step: Step,
    path: Vec<Step>,
    step_durations: BTreeMap<Step, Duration>,
}

impl ExecutionState {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            classification: None,
            results: None,
            summary: None,
            response_text: None,
            error: None,
            current_step: Step::Start,
            path: Vec::new(),
            step_durations: BTreeMap::new(),
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn classification(&self) -> Option<&ClassifiedQuery> {
        self.classification.as_ref()
    }

    pub fn results(&self) -> Option<&[TariffRecord]> {
        self.results.as_deref()
    }

    pub fn summary(&self) -> Option<&DatasetSummary> {
        self.summary.as_ref()
    }

    pub fn response_text(&self) -> Option<&str> {
        self.response_text.as_deref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn current_step(&self) -> Step {
        self.current_step
    }

    pub fn path(&self) -> &[Step] {
        &self.path
    }

    pub fn step_durations(&self) -> &BTreeMap<Step, Duration> {
        &self.step_durations
    }

    /// Records one execution of `step`: applies its patch, appends the step
    /// to the path and stores its duration (a revisit overwrites the earlier
    /// duration).
    ///
    /// The first error recorded in a run is kept; later ones are dropped.
    pub fn apply(
        mut self,
        step: Step,
        patch: StatePatch,
        elapsed: Duration,
    ) -> Result<Self, StateError> {
        if matches!(step, Step::Lookup | Step::Summarize) && self.classification.is_none() {
            return Err(StateError::NotClassified { step });
        }

        if let Some(classification) = patch.classification {
            if step != Step::Classify {
                return Err(StateError::ClassificationOutsideClassify { step });
            }
            if self.classification.is_some() {
                return Err(StateError::AlreadyClassified);
            }
            self.classification = Some(classification);
        }

        if let Some(results) = patch.results {
            if step != Step::Lookup {
                return Err(StateError::ResultsOutsideLookup { step });
            }
            self.results = Some(results);
        }

        if let Some(summary) = patch.summary {
            if step != Step::Summarize {
                return Err(StateError::SummaryOutsideSummarize { step });
            }
            self.summary = Some(summary);
        }

        if let Some(text) = patch.response_text {
            if !step.produces_response() {
                return Err(StateError::ResponseOutsideFormatter { step });
            }
            if self.response_text.is_some() {
                return Err(StateError::ResponseAlreadySet);
            }
            self.response_text = Some(text);
        }

        if let Some(error) = patch.error {
            self.error.get_or_insert(error);
        }

        self.current_step = step;
        self.path.push(step);
        self.step_durations.insert(step, elapsed);
        Ok(self)
    }

    pub fn into_result(self, run_id: impl Into<String>, total_elapsed: Duration) -> RunResult {
        let step_durations_ms = self
            .step_durations
            .into_iter()
            .map(|(step, elapsed)| (step, duration_ms(elapsed)))
            .collect::<BTreeMap<_, _>>();
        let statistics = ExecutionStatistics::new(self.path.len(), &step_durations_ms);

        RunResult {
            run_id: run_id.into(),
            query: self.query,
            response_text: self.response_text.unwrap_or_default(),
            path: self.path,
            step_durations_ms,
            statistics,
            classification: self.classification,
            results: self.results.unwrap_or_default(),
            summary: self.summary,
            error: self.error,
            total_elapsed_ms: duration_ms(total_elapsed),
        }
    }
}

/// Everything a caller observes about one run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub query: String,
    pub response_text: String,
    pub path: Vec<Step>,
    pub step_durations_ms: BTreeMap<Step, f64>,
    pub classification: Option<ClassifiedQuery>,
    pub results: Vec<TariffRecord>,
    pub summary: Option<DatasetSummary>,
    pub error: Option<String>,
    pub statistics: ExecutionStatistics,
    pub total_elapsed_ms: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepTiming {
    pub step: Step,
    pub elapsed_ms: f64,
}

/// Timing digest of one run. `total_steps` counts revisits; the timings
/// hold the last execution of each step.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionStatistics {
    pub total_steps: usize,
    pub total_step_ms: f64,
    pub average_step_ms: f64,
    pub slowest: Option<StepTiming>,
    pub fastest: Option<StepTiming>,
}

impl ExecutionStatistics {
    pub fn new(total_steps: usize, step_durations_ms: &BTreeMap<Step, f64>) -> Self {
        let total_step_ms = step_durations_ms.values().sum::<f64>();
        let average_step_ms =
            if total_steps == 0 { 0.0 } else { total_step_ms / total_steps as f64 };

        let timing = |(step, elapsed_ms): (&Step, &f64)| StepTiming {
            step: *step,
            elapsed_ms: *elapsed_ms,
        };
        let slowest = step_durations_ms
            .iter()
            .max_by(|left, right| left.1.total_cmp(right.1))
            .map(timing);
        let fastest = step_durations_ms
            .iter()
            .min_by(|left, right| left.1.total_cmp(right.1))
            .map(timing);

        Self { total_steps, total_step_ms, average_step_ms, slowest, fastest }
    }
}

fn duration_ms(elapsed: Duration) -> f64 {
    elapsed.as_secs_f64() * 1_000.0
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{ExecutionState, StateError, StatePatch};
    use crate::domain::{ClassifiedQuery, Intent};
    use crate::flows::states::Step;

    fn classified() -> ClassifiedQuery {
        ClassifiedQuery::new(Intent::GeneralInfo, Vec::new(), Vec::new(), 0.9)
    }

    #[test]
    fn apply_appends_path_and_records_durations() {
        let state = ExecutionState::new("what data do you have?")
            .apply(Step::Start, StatePatch::empty(), Duration::from_millis(1))
            .and_then(|s| {
                s.apply(Step::Classify, StatePatch::classified(classified()), Duration::from_millis(5))
            })
            .expect("valid transitions");

        assert_eq!(state.path(), &[Step::Start, Step::Classify]);
        assert_eq!(state.current_step(), Step::Classify);
        assert_eq!(state.step_durations()[&Step::Classify], Duration::from_millis(5));
        assert_eq!(state.query(), "what data do you have?");
    }

    #[test]
    fn revisiting_a_step_overwrites_its_duration() {
        let state = ExecutionState::new("q")
            .apply(Step::Start, StatePatch::empty(), Duration::from_millis(1))
            .and_then(|s| s.apply(Step::Start, StatePatch::empty(), Duration::from_millis(9)))
            .expect("revisit tolerated");

        assert_eq!(state.path().len(), 2);
        assert_eq!(state.step_durations().len(), 1);
        assert_eq!(state.step_durations()[&Step::Start], Duration::from_millis(9));
    }

    #[test]
    fn only_classify_may_set_classification_once() {
        let error = ExecutionState::new("q")
            .apply(Step::Format, StatePatch::classified(classified()), Duration::ZERO)
            .expect_err("format cannot classify");
        assert_eq!(error, StateError::ClassificationOutsideClassify { step: Step::Format });

        let error = ExecutionState::new("q")
            .apply(Step::Classify, StatePatch::classified(classified()), Duration::ZERO)
            .and_then(|s| s.apply(Step::Classify, StatePatch::classified(classified()), Duration::ZERO))
            .expect_err("second classification rejected");
        assert_eq!(error, StateError::AlreadyClassified);
    }

    #[test]
    fn lookup_requires_classification() {
        let error = ExecutionState::new("q")
            .apply(Step::Lookup, StatePatch::results(Vec::new()), Duration::ZERO)
            .expect_err("unclassified lookup");
        assert_eq!(error, StateError::NotClassified { step: Step::Lookup });
    }

    #[test]
    fn response_is_written_once_and_first_error_wins() {
        let state = ExecutionState::new("q")
            .apply(Step::Classify, StatePatch::failed("classifier timed out"), Duration::ZERO)
            .and_then(|s| s.apply(Step::HandleError, StatePatch::failed("second"), Duration::ZERO))
            .and_then(|s| s.apply(Step::HandleError, StatePatch::response("sorry"), Duration::ZERO))
            .expect("valid");
        assert_eq!(state.error(), Some("classifier timed out"));

        let error = state
            .apply(Step::Format, StatePatch::response("again"), Duration::ZERO)
            .expect_err("response already set");
        assert_eq!(error, StateError::ResponseAlreadySet);
    }

    #[test]
    fn result_carries_statistics_with_slowest_and_fastest_steps() {
        let result = ExecutionState::new("q")
            .apply(Step::Start, StatePatch::empty(), Duration::from_millis(2))
            .and_then(|s| s.apply(Step::Classify, StatePatch::failed("x"), Duration::from_millis(40)))
            .and_then(|s| s.apply(Step::HandleError, StatePatch::response("r"), Duration::from_millis(4)))
            .and_then(|s| s.apply(Step::End, StatePatch::empty(), Duration::ZERO))
            .expect("valid")
            .into_result("run-1", Duration::from_millis(50));

        let stats = &result.statistics;
        assert_eq!(stats.total_steps, 4);
        assert_eq!(stats.slowest.as_ref().map(|t| t.step), Some(Step::Classify));
        assert_eq!(stats.fastest.as_ref().map(|t| t.step), Some(Step::End));
        assert!((stats.total_step_ms - 46.0).abs() < 1e-6);
        assert!((stats.average_step_ms - 11.5).abs() < 1e-6);
        assert_eq!(result.response_text, "r");
    }

    #[test]
    fn statistics_count_revisits_but_time_each_step_once() {
        let result = ExecutionState::new("q")
            .apply(Step::Start, StatePatch::empty(), Duration::from_millis(3))
            .and_then(|s| s.apply(Step::Start, StatePatch::empty(), Duration::from_millis(1)))
            .expect("revisit tolerated")
            .into_result("run-2", Duration::from_millis(5));

        assert_eq!(result.statistics.total_steps, 2);
        assert!((result.statistics.total_step_ms - 1.0).abs() < 1e-6);
        assert!((result.statistics.average_step_ms - 0.5).abs() < 1e-6);
    }

    #[test]
    fn empty_run_has_empty_statistics() {
        let result = ExecutionState::new("q").into_result("run-3", Duration::ZERO);
        assert_eq!(result.statistics, super::ExecutionStatistics::default());
    }
}
