use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use tarifftok_agent::help::FALLBACK_RESPONSE;
use tarifftok_agent::{
    AgentRuntime, ClassifierError, GuardrailPolicy, IntentClassifier, KeywordIntentClassifier,
    LlmError, NarrativeError, NarrativeRequest, NarrativeService, RouterError, RuntimeSettings,
    TemplateNarrator,
};
use tarifftok_core::config::AppConfig;
use tarifftok_core::dataset::TariffRow;
use tarifftok_core::{
    ClassifiedQuery, DatasetSummary, Intent, LookupError, LookupRequest, Step, SupportedDomain,
    TariffDataset, TariffRecord, TariffStore,
};
use tokio_util::sync::CancellationToken;

const RATE_LOOKUP_PATH: [Step; 5] = [Step::Start, Step::Classify, Step::Lookup, Step::Format, Step::End];
const HELP_PATH: [Step; 4] = [Step::Start, Step::Classify, Step::HandleError, Step::End];

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn row(country: &str, category: &str, rate_thousandths: i64, effective: NaiveDate) -> TariffRow {
    TariffRow {
        country: country.to_string(),
        product_category: category.to_string(),
        rate: Decimal::new(rate_thousandths, 3),
        effective_date: effective,
    }
}

fn store() -> Arc<dyn TariffStore> {
    let dataset = TariffDataset::from_rows(vec![
        row("China", "Electronics", 100, date(2023, 1, 1)),
        row("China", "Electronics", 125, date(2024, 1, 1)),
        row("Vietnam", "Toys", 25, date(2024, 1, 1)),
        row("Vietnam", "Toys", 44, date(2024, 7, 1)),
        row("India", "Toys", 61, date(2024, 7, 1)),
        row("Mexico", "Toys", 50, date(2024, 1, 1)),
        row("USA", "Apparel", 90, date(2024, 1, 1)),
    ])
    .expect("fixture rows are valid");
    Arc::new(dataset)
}

fn offline_runtime() -> AgentRuntime {
    let store = store();
    let classifier = Arc::new(KeywordIntentClassifier::new(store.supported_domain()));
    AgentRuntime::new(classifier, Arc::new(TemplateNarrator::new()), store)
}

fn runtime_with_classifier(classifier: impl IntentClassifier + 'static) -> AgentRuntime {
    AgentRuntime::new(Arc::new(classifier), Arc::new(TemplateNarrator::new()), store())
}

/// Knows its domain but cannot serve data, as while an extract is swapped.
struct UnavailableStore;

impl TariffStore for UnavailableStore {
    fn find(&self, _country: &str, _product_category: &str) -> Option<TariffRecord> {
        None
    }

    fn summary(&self) -> Result<DatasetSummary, LookupError> {
        Err(LookupError::Unavailable("extract is being replaced".to_string()))
    }

    fn supported_domain(&self) -> SupportedDomain {
        SupportedDomain::new(vec!["China".to_string()], vec!["Electronics".to_string()])
    }

    fn lookup(&self, _request: &LookupRequest) -> Result<Vec<TariffRecord>, LookupError> {
        Err(LookupError::Unavailable("extract is being replaced".to_string()))
    }
}

fn unavailable_runtime() -> AgentRuntime {
    let store: Arc<dyn TariffStore> = Arc::new(UnavailableStore);
    let classifier = Arc::new(KeywordIntentClassifier::new(store.supported_domain()));
    AgentRuntime::new(classifier, Arc::new(TemplateNarrator::new()), store)
}

struct FailingClassifier;

#[async_trait]
impl IntentClassifier for FailingClassifier {
    async fn classify(&self, _query: &str) -> Result<ClassifiedQuery, ClassifierError> {
        Err(ClassifierError::Llm(LlmError::Http("connection refused".to_string())))
    }
}

struct SlowClassifier {
    delay: Duration,
}

#[async_trait]
impl IntentClassifier for SlowClassifier {
    async fn classify(&self, _query: &str) -> Result<ClassifiedQuery, ClassifierError> {
        tokio::time::sleep(self.delay).await;
        Ok(ClassifiedQuery::new(Intent::GeneralInfo, Vec::new(), Vec::new(), 0.9))
    }
}

struct FixedClassifier(ClassifiedQuery);

#[async_trait]
impl IntentClassifier for FixedClassifier {
    async fn classify(&self, _query: &str) -> Result<ClassifiedQuery, ClassifierError> {
        Ok(self.0.clone())
    }
}

struct FailingNarrator;

#[async_trait]
impl NarrativeService for FailingNarrator {
    async fn narrate(&self, _request: &NarrativeRequest) -> Result<String, NarrativeError> {
        Err(NarrativeError::Llm(LlmError::Response("HTTP 503".to_string())))
    }
}

#[tokio::test]
async fn rate_lookup_reports_rate_and_increase() {
    let result = offline_runtime().run("What's the tariff rate for Electronics from China?").await;

    assert_eq!(result.path, RATE_LOOKUP_PATH);
    assert_eq!(result.results.len(), 1);
    assert_eq!(result.error, None);
    assert!(result.response_text.contains("China"), "{}", result.response_text);
    assert!(result.response_text.contains("Electronics"), "{}", result.response_text);
    assert!(result.response_text.contains("12.5%"), "{}", result.response_text);
    assert!(result.response_text.contains("increased from 10%"), "{}", result.response_text);
}

#[tokio::test]
async fn comparison_returns_one_record_per_country() {
    let result = offline_runtime().run("Compare tariffs for Toys between Vietnam and India").await;

    assert_eq!(result.path, RATE_LOOKUP_PATH);
    let countries = result.results.iter().map(|record| record.country.as_str()).collect::<Vec<_>>();
    assert_eq!(countries, vec!["Vietnam", "India"]);
    for expected in ["Vietnam", "India", "4.4%", "6.1%"] {
        assert!(result.response_text.contains(expected), "missing {expected}: {}", result.response_text);
    }
}

#[tokio::test]
async fn unsupported_query_gets_help_with_examples() {
    let result = offline_runtime().run("What if tariffs on Toys from India rise by 8%?").await;

    assert_eq!(result.path, HELP_PATH);
    assert_eq!(result.classification.as_ref().map(|c| c.intent), Some(Intent::Unsupported));
    assert!(result.response_text.contains("What's the tariff rate for Electronics from China?"));
}

#[tokio::test]
async fn general_info_summarises_dataset() {
    let result = offline_runtime().run("What data do you have available?").await;

    assert_eq!(result.path, [Step::Start, Step::Classify, Step::Summarize, Step::Format, Step::End]);
    assert!(result.response_text.contains("7 tariff records"), "{}", result.response_text);
    assert!(result.response_text.contains("2023-01-01 to 2024-07-01"), "{}", result.response_text);
    assert!(result.results.is_empty());
}

#[tokio::test]
async fn repeated_runs_take_the_same_path_and_results() {
    let runtime = offline_runtime();
    let query = "Compare tariffs for Toys between Vietnam and India";

    let first = runtime.run(query).await;
    let second = runtime.run(query).await;

    assert_eq!(first.path, second.path);
    assert_eq!(first.results, second.results);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn missing_combination_is_not_an_error() {
    let result = offline_runtime().run("What's the tariff rate for Apparel from Mexico?").await;

    assert_eq!(result.path, RATE_LOOKUP_PATH);
    assert!(result.results.is_empty());
    assert_eq!(result.error, None);
    assert!(result.response_text.contains("couldn't find tariff data for Apparel from Mexico"));
}

#[tokio::test]
async fn classifier_failure_routes_to_help() {
    let result = runtime_with_classifier(FailingClassifier).run("anything").await;

    assert_eq!(result.path, HELP_PATH);
    let error = result.error.as_deref().unwrap_or_default();
    assert!(error.contains("intent classification failed"), "{error}");
    assert!(result.response_text.starts_with("I encountered an issue processing your query"));
}

#[tokio::test(start_paused = true)]
async fn classifier_timeout_is_a_leaf_failure() {
    let runtime = runtime_with_classifier(SlowClassifier { delay: Duration::from_secs(60) })
        .with_settings(RuntimeSettings { leaf_timeout: Duration::from_secs(2), max_steps: 16 });

    let result = runtime.run("what data do you have").await;

    assert_eq!(result.path, HELP_PATH);
    assert_eq!(result.error.as_deref(), Some("intent classification timed out after 2s"));
    assert!(!result.response_text.is_empty());
}

#[tokio::test]
async fn narrator_failure_routes_format_to_help() {
    let store = store();
    let classifier = Arc::new(KeywordIntentClassifier::new(store.supported_domain()));
    let runtime = AgentRuntime::new(classifier, Arc::new(FailingNarrator), store);

    let result = runtime.run("What's the tariff rate for Electronics from China?").await;

    assert_eq!(
        result.path,
        [Step::Start, Step::Classify, Step::Lookup, Step::Format, Step::HandleError, Step::End]
    );
    assert_eq!(result.results.len(), 1);
    assert!(result.error.as_deref().unwrap_or_default().contains("narrative generation failed"));
    assert!(result.response_text.contains("Example queries that work"));
}

#[tokio::test]
async fn store_failure_during_lookup_routes_to_help() {
    let result = unavailable_runtime().run("What's the tariff rate for Electronics from China?").await;

    assert_eq!(result.path, [Step::Start, Step::Classify, Step::Lookup, Step::HandleError, Step::End]);
    assert_eq!(result.error.as_deref(), Some("tariff store unavailable: extract is being replaced"));
    assert!(result.results.is_empty());
    assert!(result.response_text.starts_with("I encountered an issue processing your query"));
}

#[tokio::test]
async fn store_failure_during_summary_routes_to_help() {
    let result = unavailable_runtime().run("What data do you have available?").await;

    assert_eq!(result.path, [Step::Start, Step::Classify, Step::Summarize, Step::HandleError, Step::End]);
    assert_eq!(result.error.as_deref(), Some("tariff store unavailable: extract is being replaced"));
    assert!(result.summary.is_none());
    assert!(!result.response_text.trim().is_empty());
}

#[tokio::test]
async fn missing_pair_suggests_a_pair_that_has_data() {
    let result = offline_runtime().run("What's the tariff rate for Apparel from China?").await;

    assert_eq!(result.path, RATE_LOOKUP_PATH);
    assert!(result.results.is_empty());
    assert!(
        result.response_text.ends_with("Would you like the rate for Apparel from USA instead?"),
        "{}",
        result.response_text
    );
}

#[tokio::test]
async fn lookup_without_country_explains_what_is_missing() {
    let result = offline_runtime().run("tariffs on toys").await;

    assert_eq!(result.path, [Step::Start, Step::Classify, Step::Lookup, Step::HandleError, Step::End]);
    assert_eq!(
        result.error.as_deref(),
        Some("I need at least one country to look up a tariff rate")
    );
}

#[tokio::test]
async fn low_confidence_classification_is_rejected_by_floor() {
    let classification = ClassifiedQuery::new(
        Intent::RateLookup,
        vec!["China".to_string()],
        vec!["Electronics".to_string()],
        0.3,
    );
    let runtime = runtime_with_classifier(FixedClassifier(classification))
        .with_guardrails(GuardrailPolicy::with_min_confidence(0.5));

    let result = runtime.run("china electronics?").await;

    assert_eq!(result.path, HELP_PATH);
    assert!(result.classification.is_some());
    assert!(result.error.as_deref().unwrap_or_default().contains("too ambiguous"));
}

#[tokio::test]
async fn step_budget_overrun_is_reported_as_defect() {
    let runtime = offline_runtime()
        .with_settings(RuntimeSettings { leaf_timeout: Duration::from_secs(5), max_steps: 3 });
    let query = "What's the tariff rate for Electronics from China?";

    let error = runtime.try_run(query).await.expect_err("budget of three steps cannot finish");
    assert!(matches!(error, RouterError::StepBudgetExceeded { max_steps: 3 }));
    assert!(error.is_defect());

    let result = runtime.run(query).await;
    assert_eq!(result.response_text, FALLBACK_RESPONSE);
    assert_eq!(result.path, [Step::Start, Step::Classify, Step::Lookup]);
    assert!(result.error.is_some());
}

#[tokio::test(start_paused = true)]
async fn cancellation_discards_in_flight_classification() {
    let runtime = runtime_with_classifier(SlowClassifier { delay: Duration::from_secs(10) });
    let token = CancellationToken::new();

    let canceller = {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            token.cancel();
        })
    };

    let outcome = runtime.run_with_cancellation("what data do you have", token).await;
    canceller.await.expect("canceller task completes");

    assert!(matches!(outcome, Err(RouterError::Cancelled { step: Step::Classify })));
}

#[tokio::test]
async fn cancelled_before_start_schedules_nothing() {
    let token = CancellationToken::new();
    token.cancel();

    let outcome = offline_runtime().run_with_cancellation("help", token).await;

    assert!(matches!(outcome, Err(RouterError::Cancelled { step: Step::Start })));
}

#[tokio::test]
async fn concurrent_runs_keep_isolated_state() {
    let runtime = Arc::new(offline_runtime());

    let (lookup, help) = tokio::join!(
        runtime.run("What's the tariff rate for Electronics from China?"),
        runtime.run("Forecast tariffs for Toys from Mexico"),
    );

    assert_eq!(lookup.path, RATE_LOOKUP_PATH);
    assert_eq!(help.path, HELP_PATH);
    assert_eq!(lookup.results.len(), 1);
    assert!(help.results.is_empty());
}

#[tokio::test]
async fn every_executed_step_has_a_duration() {
    let result = offline_runtime().run("Compare tariffs for Toys between Vietnam and India").await;

    let timed = result.step_durations_ms.keys().copied().collect::<BTreeSet<_>>();
    let visited = result.path.iter().copied().collect::<BTreeSet<_>>();
    assert_eq!(timed, visited);
    assert!(result.total_elapsed_ms >= 0.0);
}

#[tokio::test]
async fn graph_highlights_the_taken_path() {
    let runtime = offline_runtime();
    let result = runtime.run("What's the tariff rate for Electronics from China?").await;

    let dot = runtime.render_graph(Some(result.path.as_slice()));

    assert!(dot.starts_with("digraph TariffTok {"));
    assert!(dot.contains("LOOKUP -> FORMAT [label=\"found or not found\", color=red, penwidth=3]"), "{dot}");
    assert!(dot.contains("CLASSIFY -> SUMMARIZE [label=\"general info\"]"), "{dot}");
}

#[tokio::test]
async fn offline_config_builds_keyword_runtime() {
    let runtime = AgentRuntime::from_config(&AppConfig::default(), store()).expect("offline runtime");
    assert_eq!(runtime.settings(), RuntimeSettings { leaf_timeout: Duration::from_secs(30), max_steps: 16 });

    let result = runtime.run("What's the tariff rate for Toys from Mexico?").await;
    assert_eq!(result.path, RATE_LOOKUP_PATH);
    assert!(result.response_text.contains("5%"));
}
