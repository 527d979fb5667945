use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tarifftok_core::config::{AppConfig, RouterConfig};
use tarifftok_core::{
    render_dot, ApplicationError, DomainError, ExecutionState, FlowEngine, FlowTransitionError, Intent, LookupError, LookupRequest,
    RunResult, StateError, StatePatch, Step, TariffQueryFlow, TariffStore,
};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::classifier::{IntentClassifier, LlmIntentClassifier};
use crate::guardrails::{GuardrailDecision, GuardrailPolicy};
use crate::help::{suggest_alternative, HelpMessages, HelpReason, FALLBACK_RESPONSE};
use crate::keyword::KeywordIntentClassifier;
use crate::llm::{build_llm_client, LlmError};
use crate::narrative::{LlmNarrator, NarrativeRequest, NarrativeService, NarrativeStyle, TemplateNarrator};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeSettings {
    /// Upper bound on every classifier or narrator call.
    pub leaf_timeout: Duration,
    /// Step executions allowed per run before the run is treated as a defect.
    pub max_steps: usize,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self { leaf_timeout: Duration::from_secs(30), max_steps: 16 }
    }
}

impl From<&RouterConfig> for RuntimeSettings {
    fn from(config: &RouterConfig) -> Self {
        Self { leaf_timeout: Duration::from_secs(config.leaf_timeout_secs), max_steps: config.max_steps }
    }
}

/// Failures of the router itself, as opposed to leaf failures, which are
/// recorded in the run and answered through HANDLE_ERROR.
#[derive(Debug, Error)]
pub enum RouterError {
    #[error("run exceeded the budget of {max_steps} step executions")]
    StepBudgetExceeded { max_steps: usize },
    #[error(transparent)]
    Transition(#[from] FlowTransitionError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("run was cancelled before step {step}")]
    Cancelled { step: Step },
}

impl RouterError {
    /// Whether this error means the transition table or a step contract is broken.
    pub fn is_defect(&self) -> bool {
        !matches!(self, Self::Cancelled { .. })
    }
}

impl From<RouterError> for ApplicationError {
    fn from(router_error: RouterError) -> Self {
        match router_error {
            RouterError::StepBudgetExceeded { .. } => {
                Self::Domain(DomainError::InvariantViolation(router_error.to_string()))
            }
            RouterError::Transition(error) => Self::Domain(error.into()),
            RouterError::State(error) => Self::Domain(error.into()),
            RouterError::Cancelled { .. } => Self::Cancelled(router_error.to_string()),
        }
    }
}

/// Leaf outcome after timeout handling; failures carry the message recorded
/// in the run's `error` field.
type LeafOutcome<T> = Result<T, String>;

/// Routes one query at a time through the tariff flow.
///
/// Runs share nothing mutable: each owns its `ExecutionState`, and the
/// classifier, narrator and store are shared read-only behind `Arc`s.
pub struct AgentRuntime {
    classifier: Arc<dyn IntentClassifier>,
    narrator: Arc<dyn NarrativeService>,
    store: Arc<dyn TariffStore>,
    guardrails: GuardrailPolicy,
    settings: RuntimeSettings,
    engine: FlowEngine<TariffQueryFlow>,
    help: Option<HelpMessages>,
}

impl AgentRuntime {
    pub fn new(
        classifier: Arc<dyn IntentClassifier>,
        narrator: Arc<dyn NarrativeService>,
        store: Arc<dyn TariffStore>,
    ) -> Self {
        let help = match HelpMessages::new() {
            Ok(help) => Some(help),
            Err(error) => {
                warn!(event_name = "router.help_templates.invalid", error = %error, "using fallback help text");
                None
            }
        };
        Self {
            classifier,
            narrator,
            store,
            guardrails: GuardrailPolicy::default(),
            settings: RuntimeSettings::default(),
            engine: FlowEngine::default(),
            help,
        }
    }

    /// Wires leaf services for the configured LLM provider; `offline` uses
    /// the keyword classifier and template narrator.
    pub fn from_config(config: &AppConfig, store: Arc<dyn TariffStore>) -> Result<Self, LlmError> {
        let domain = store.supported_domain();
        let (classifier, narrator): (Arc<dyn IntentClassifier>, Arc<dyn NarrativeService>) =
            match build_llm_client(&config.llm)? {
                Some(client) => (
                    Arc::new(LlmIntentClassifier::new(client.clone(), domain)),
                    Arc::new(LlmNarrator::new(client)),
                ),
                None => (Arc::new(KeywordIntentClassifier::new(domain)), Arc::new(TemplateNarrator::new())),
            };

        info!(
            event_name = "router.runtime.configured",
            provider = config.llm.provider.as_str(),
            leaf_timeout_secs = config.router.leaf_timeout_secs,
            max_steps = config.router.max_steps,
            min_confidence = config.router.min_confidence,
            "agent runtime configured"
        );

        Ok(Self::new(classifier, narrator, store)
            .with_guardrails(GuardrailPolicy::with_min_confidence(config.router.min_confidence))
            .with_settings(RuntimeSettings::from(&config.router)))
    }

    pub fn with_guardrails(mut self, guardrails: GuardrailPolicy) -> Self {
        self.guardrails = guardrails;
        self
    }

    pub fn with_settings(mut self, settings: RuntimeSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn settings(&self) -> RuntimeSettings {
        self.settings
    }

    pub fn store(&self) -> &Arc<dyn TariffStore> {
        &self.store
    }

    /// DOT rendering of the flow graph with `path` highlighted.
    pub fn render_graph(&self, path: Option<&[Step]>) -> String {
        render_dot(self.engine.edges(), path)
    }

    /// Always yields a well-formed result. Router defects are logged and
    /// answered with a generic fallback text.
    pub async fn run(&self, query: &str) -> RunResult {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut state = ExecutionState::new(query);

        match self.drive(&run_id, &mut state, &CancellationToken::new()).await {
            Ok(()) => self.finish(&run_id, state, started),
            Err(router_error) => {
                let mut result = self.finish(&run_id, state, started);
                if result.response_text.trim().is_empty() {
                    result.response_text = FALLBACK_RESPONSE.to_string();
                }
                result.error.get_or_insert_with(|| router_error.to_string());
                result
            }
        }
    }

    /// Like [`AgentRuntime::run`] but surfaces router defects to the caller.
    pub async fn try_run(&self, query: &str) -> Result<RunResult, RouterError> {
        self.run_with_cancellation(query, CancellationToken::new()).await
    }

    /// Runs until END or until `cancel` fires. Once cancelled no further step
    /// is scheduled and an in-flight leaf result is dropped.
    pub async fn run_with_cancellation(
        &self,
        query: &str,
        cancel: CancellationToken,
    ) -> Result<RunResult, RouterError> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();
        let mut state = ExecutionState::new(query);

        if let Err(router_error) = self.drive(&run_id, &mut state, &cancel).await {
            if !router_error.is_defect() {
                info!(
                    event_name = "router.run.cancelled",
                    correlation_id = %run_id,
                    path = ?state.path(),
                    "run cancelled by caller"
                );
            }
            return Err(router_error);
        }
        Ok(self.finish(&run_id, state, started))
    }

    fn finish(&self, run_id: &str, state: ExecutionState, started: Instant) -> RunResult {
        let result = state.into_result(run_id, started.elapsed());
        info!(
            event_name = "router.run.completed",
            correlation_id = %run_id,
            path = ?result.path,
            failed = result.error.is_some(),
            total_elapsed_ms = result.total_elapsed_ms,
            "run completed"
        );
        result
    }

    async fn drive(
        &self,
        run_id: &str,
        state: &mut ExecutionState,
        cancel: &CancellationToken,
    ) -> Result<(), RouterError> {
        info!(
            event_name = "router.run.started",
            correlation_id = %run_id,
            query_chars = state.query().chars().count(),
            "run started"
        );

        let mut step = self.engine.initial_step();
        let mut executions = 0usize;
        loop {
            if cancel.is_cancelled() {
                return Err(RouterError::Cancelled { step });
            }
            if executions >= self.settings.max_steps {
                return Err(defect(
                    run_id,
                    state,
                    RouterError::StepBudgetExceeded { max_steps: self.settings.max_steps },
                ));
            }
            executions += 1;

            let step_started = Instant::now();
            let patch = self.execute(step, state, cancel, run_id).await?;
            let elapsed = step_started.elapsed();
            *state = match state.clone().apply(step, patch, elapsed) {
                Ok(next_state) => next_state,
                Err(state_error) => return Err(defect(run_id, state, state_error.into())),
            };

            info!(
                event_name = "router.step.completed",
                correlation_id = %run_id,
                step = %step,
                elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
                failed = state.error().is_some(),
                "step completed"
            );

            if step.is_terminal() {
                return Ok(());
            }
            step = match self.engine.next(step, state) {
                Ok(next_step) => next_step,
                Err(transition_error) => return Err(defect(run_id, state, transition_error.into())),
            };
        }
    }

    async fn execute(
        &self,
        step: Step,
        state: &ExecutionState,
        cancel: &CancellationToken,
        run_id: &str,
    ) -> Result<StatePatch, RouterError> {
        Ok(match step {
            Step::Start | Step::End => StatePatch::empty(),
            Step::Classify => self.classify(state.query(), cancel, run_id).await?,
            Step::Lookup => self.lookup(state, run_id),
            Step::Summarize => self.summarize(run_id),
            Step::Format => self.format(state, cancel, run_id).await?,
            Step::HandleError => self.handle_error(state),
        })
    }

    async fn classify(
        &self,
        query: &str,
        cancel: &CancellationToken,
        run_id: &str,
    ) -> Result<StatePatch, RouterError> {
        let outcome = self
            .call_leaf(Step::Classify, "intent classification", cancel, run_id, self.classifier.classify(query))
            .await?;

        let classification = match outcome {
            Ok(classification) => classification,
            Err(message) => return Ok(StatePatch::failed(message)),
        };

        match self.guardrails.evaluate(&classification) {
            GuardrailDecision::Allow => Ok(StatePatch::classified(classification)),
            GuardrailDecision::Deny { reason_code, user_message, fallback_path } => {
                warn!(
                    event_name = "router.guardrail.denied",
                    correlation_id = %run_id,
                    reason_code,
                    fallback_path,
                    confidence = classification.confidence,
                    "classification rejected by guardrail"
                );
                Ok(StatePatch {
                    classification: Some(classification),
                    error: Some(user_message),
                    ..StatePatch::default()
                })
            }
        }
    }

    fn lookup(&self, state: &ExecutionState, run_id: &str) -> StatePatch {
        // Applying the patch reports the missing classification.
        let Some(classification) = state.classification() else {
            return StatePatch::empty();
        };
        let request = LookupRequest {
            intent: classification.intent,
            countries: classification.countries.clone(),
            product_categories: classification.product_categories.clone(),
        };

        match self.store.lookup(&request) {
            Ok(records) => StatePatch::results(records),
            Err(lookup_error) => {
                log_leaf_failure(run_id, Step::Lookup, &lookup_error);
                StatePatch::failed(lookup_message(&lookup_error))
            }
        }
    }

    fn summarize(&self, run_id: &str) -> StatePatch {
        match self.store.summary() {
            Ok(summary) => StatePatch::summary(summary),
            Err(lookup_error) => {
                log_leaf_failure(run_id, Step::Summarize, &lookup_error);
                StatePatch::failed(lookup_message(&lookup_error))
            }
        }
    }

    async fn format(
        &self,
        state: &ExecutionState,
        cancel: &CancellationToken,
        run_id: &str,
    ) -> Result<StatePatch, RouterError> {
        let Some(classification) = state.classification() else {
            return Ok(StatePatch::failed("the query was never classified"));
        };

        let request = match (classification.intent, state.summary()) {
            (Intent::GeneralInfo, Some(summary)) => NarrativeRequest::summary(state.query(), summary.clone()),
            (Intent::GeneralInfo, None) => return Ok(StatePatch::failed("the dataset summary is unavailable")),
            (Intent::RateLookup | Intent::Comparison | Intent::Unsupported, _) => {
                let records = state.results().unwrap_or_default();
                if records.is_empty() {
                    return Ok(StatePatch::response(self.not_found_text(state)));
                }
                let style = if classification.intent == Intent::Comparison && records.len() > 1 {
                    NarrativeStyle::Comparison
                } else {
                    NarrativeStyle::SingleResult
                };
                NarrativeRequest::records(state.query(), style, records.to_vec())
            }
        };

        let outcome = self
            .call_leaf(Step::Format, "narrative generation", cancel, run_id, self.narrator.narrate(&request))
            .await?;
        Ok(match outcome {
            Ok(text) if !text.trim().is_empty() => StatePatch::response(text),
            Ok(_) => StatePatch::failed("narrative generation returned no text"),
            Err(message) => StatePatch::failed(message),
        })
    }

    fn not_found_text(&self, state: &ExecutionState) -> String {
        let domain = self.store.supported_domain();
        let rendered = match (&self.help, state.classification()) {
            (Some(help), Some(classification)) => {
                let suggestion = suggest_alternative(classification, &domain, |country, category| {
                    self.store.find(country, category).is_some()
                });
                help.not_found(classification, &domain, suggestion).ok()
            }
            _ => None,
        };
        rendered.unwrap_or_else(|| {
            "I couldn't find tariff data for that request in our database.".to_string()
        })
    }

    fn handle_error(&self, state: &ExecutionState) -> StatePatch {
        let reason = match (state.error(), state.classification().map(|c| c.intent)) {
            (Some(message), _) => HelpReason::Failure(message.to_string()),
            (None, Some(Intent::Unsupported)) => HelpReason::Unsupported,
            (None, _) => HelpReason::Failure("the request could not be completed".to_string()),
        };
        let domain = self.store.supported_domain();

        let text = match &self.help {
            Some(help) => help.handle_error(&reason, &domain).unwrap_or_else(|error| {
                warn!(event_name = "router.help_render.failed", error = %error, "using fallback help text");
                FALLBACK_RESPONSE.to_string()
            }),
            None => FALLBACK_RESPONSE.to_string(),
        };
        StatePatch::response(text)
    }

    /// Awaits a leaf call under the configured timeout, racing it against
    /// cancellation. Leaf errors and timeouts become recorded failures.
    async fn call_leaf<T, E, F>(
        &self,
        step: Step,
        leaf: &'static str,
        cancel: &CancellationToken,
        run_id: &str,
        call: F,
    ) -> Result<LeafOutcome<T>, RouterError>
    where
        E: Display,
        F: Future<Output = Result<T, E>>,
    {
        let timeout = self.settings.leaf_timeout;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(RouterError::Cancelled { step }),
            outcome = tokio::time::timeout(timeout, call) => Ok(match outcome {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(leaf_error)) => {
                    log_leaf_failure(run_id, step, &leaf_error);
                    Err(format!("{leaf} failed: {leaf_error}"))
                }
                Err(_) => {
                    warn!(
                        event_name = "router.leaf.failed",
                        correlation_id = %run_id,
                        step = %step,
                        timeout_ms = timeout.as_millis() as u64,
                        "leaf call timed out"
                    );
                    Err(format!("{leaf} timed out after {}", human_duration(timeout)))
                }
            }),
        }
    }
}

fn defect(run_id: &str, state: &ExecutionState, router_error: RouterError) -> RouterError {
    error!(
        event_name = "router.transition_violation",
        correlation_id = %run_id,
        current_step = %state.current_step(),
        path = ?state.path(),
        error = %router_error,
        "router reached an invalid state"
    );
    router_error
}

fn log_leaf_failure(run_id: &str, step: Step, leaf_error: &dyn Display) {
    warn!(
        event_name = "router.leaf.failed",
        correlation_id = %run_id,
        step = %step,
        error = %leaf_error,
        "leaf call failed"
    );
}

fn lookup_message(lookup_error: &LookupError) -> String {
    match lookup_error {
        LookupError::MissingEntities { missing, .. } => {
            format!("I need at least one {missing} to look up a tariff rate")
        }
        LookupError::NotALookupIntent(_) | LookupError::Unavailable(_) => lookup_error.to_string(),
    }
}

fn human_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}
