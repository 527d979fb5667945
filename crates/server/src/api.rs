//! JSON API over the tariff router.
//!
//! - `POST /api/chat`          run one query through the flow
//! - `GET  /api/health`        dataset readiness
//! - `GET  /api/data/summary`  dataset extents
//! - `GET  /api/graph`         DOT rendering, optionally highlighting `execution_path`
//! - `POST /api/slack/send`    share an answer to Slack

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tarifftok_agent::AgentRuntime;
use tarifftok_core::{ApplicationError, DatasetSummary, InterfaceError, RunResult, Step};
use tracing::{info, warn};
use uuid::Uuid;

use crate::slack::SlackNotifier;

#[derive(Clone)]
pub struct ApiState {
    runtime: Arc<AgentRuntime>,
    slack: Arc<SlackNotifier>,
}

impl ApiState {
    pub fn new(runtime: Arc<AgentRuntime>, slack: Arc<SlackNotifier>) -> Self {
        Self { runtime, slack }
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphQuery {
    /// Comma-separated step names, e.g. `START,CLASSIFY,LOOKUP`.
    pub execution_path: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub success: bool,
    pub dot_content: String,
    pub format: &'static str,
    pub execution_path: Option<Vec<Step>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ShareRequest {
    pub query: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct ShareResponse {
    pub success: bool,
    pub message: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub dataset: HealthCheck,
    pub version: &'static str,
    pub checked_at: String,
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    pub detail: String,
    pub correlation_id: String,
}

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ApiError>)>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/health", get(health))
        .route("/api/data/summary", get(data_summary))
        .route("/api/graph", get(graph))
        .route("/api/slack/send", post(send_to_slack))
        .with_state(state)
}

pub async fn chat(State(state): State<ApiState>, Json(request): Json<ChatRequest>) -> ApiResult<RunResult> {
    if request.message.trim().is_empty() {
        return Err(reject(ApplicationError::InvalidInput("message must not be empty".to_string())));
    }
    state
        .runtime
        .try_run(&request.message)
        .await
        .map(Json)
        .map_err(|router_error| reject(ApplicationError::from(router_error)))
}

pub async fn health(State(state): State<ApiState>) -> (StatusCode, Json<HealthResponse>) {
    let dataset = match state.runtime.store().summary() {
        Ok(summary) => HealthCheck {
            status: "ready",
            detail: format!(
                "{} tariff records across {} countries",
                summary.total_records,
                summary.countries.len()
            ),
        },
        Err(error) => HealthCheck { status: "degraded", detail: format!("dataset unavailable: {error}") },
    };
    let ready = dataset.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck { status: "ready", detail: "tarifftok-server router initialized".to_string() },
        dataset,
        version: env!("CARGO_PKG_VERSION"),
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

pub async fn data_summary(State(state): State<ApiState>) -> ApiResult<DatasetSummary> {
    state.runtime.store().summary().map(Json).map_err(|error| reject(ApplicationError::from(error)))
}

pub async fn graph(State(state): State<ApiState>, Query(query): Query<GraphQuery>) -> ApiResult<GraphResponse> {
    let execution_path = match query.execution_path.as_deref() {
        Some(raw) => Some(parse_path(raw).map_err(reject)?),
        None => None,
    };

    Ok(Json(GraphResponse {
        success: true,
        dot_content: state.runtime.render_graph(execution_path.as_deref()),
        format: "graphviz_dot",
        execution_path,
    }))
}

pub async fn send_to_slack(State(state): State<ApiState>, Json(request): Json<ShareRequest>) -> Json<ShareResponse> {
    let query = request.query.as_deref().unwrap_or("Tariff Analysis");
    match state.slack.share(query, &request.message).await {
        Ok(()) => Json(ShareResponse { success: true, message: "Successfully sent to Slack".to_string() }),
        Err(error) => {
            warn!(event_name = "api.slack.failed", error = %error, "slack share failed");
            Json(ShareResponse { success: false, message: error.to_string() })
        }
    }
}

fn parse_path(raw: &str) -> Result<Vec<Step>, ApplicationError> {
    raw.split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(|name| name.parse::<Step>().map_err(|error| ApplicationError::InvalidInput(error.to_string())))
        .collect()
}

fn reject(error: ApplicationError) -> (StatusCode, Json<ApiError>) {
    let detail = error.to_string();
    let interface = error.into_interface(Uuid::new_v4().to_string());
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    info!(
        event_name = "api.request.rejected",
        correlation_id = interface.correlation_id(),
        status = status.as_u16(),
        detail = %detail,
        "request rejected"
    );
    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            detail,
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        extract::{Query, State},
        http::{Request, StatusCode},
        Json,
    };
    use serde_json::Value;
    use tarifftok_agent::{AgentRuntime, KeywordIntentClassifier, RuntimeSettings, TemplateNarrator};
    use tarifftok_core::fixtures::demo_dataset;
    use tarifftok_core::{DatasetSummary, LookupError, Step, SupportedDomain, TariffRecord, TariffStore};
    use tower::ServiceExt;

    use crate::api::{
        chat, data_summary, graph, health, router, send_to_slack, ApiState, ChatRequest, GraphQuery,
        ShareRequest,
    };
    use crate::slack::SlackNotifier;

    struct UnavailableStore;

    impl TariffStore for UnavailableStore {
        fn find(&self, _country: &str, _product_category: &str) -> Option<TariffRecord> {
            None
        }

        fn summary(&self) -> Result<DatasetSummary, LookupError> {
            Err(LookupError::Unavailable("extract is being replaced".to_string()))
        }

        fn supported_domain(&self) -> SupportedDomain {
            SupportedDomain::default()
        }
    }

    fn runtime_with(store: Arc<dyn TariffStore>) -> AgentRuntime {
        let domain = store.supported_domain();
        AgentRuntime::new(Arc::new(KeywordIntentClassifier::new(domain)), Arc::new(TemplateNarrator::new()), store)
    }

    fn state_from(runtime: AgentRuntime) -> ApiState {
        ApiState::new(Arc::new(runtime), Arc::new(SlackNotifier::new(None).expect("client builds")))
    }

    fn state_with(store: Arc<dyn TariffStore>) -> ApiState {
        state_from(runtime_with(store))
    }

    fn demo_state() -> ApiState {
        state_with(Arc::new(demo_dataset().expect("demo dataset")))
    }

    #[tokio::test]
    async fn chat_runs_the_query_through_the_flow() {
        let Json(result) = chat(
            State(demo_state()),
            Json(ChatRequest { message: "What's the tariff rate for Electronics from China?".to_string() }),
        )
        .await
        .expect("chat succeeds");

        assert_eq!(result.path, vec![Step::Start, Step::Classify, Step::Lookup, Step::Format, Step::End]);
        assert_eq!(result.results.len(), 1);
        assert!(result.error.is_none());
        assert_eq!(result.statistics.total_steps, 5);
    }

    #[tokio::test]
    async fn router_defect_in_chat_is_an_internal_error() {
        let runtime = runtime_with(Arc::new(demo_dataset().expect("demo dataset")))
            .with_settings(RuntimeSettings { leaf_timeout: Duration::from_secs(5), max_steps: 3 });

        let (status, Json(error)) = chat(
            State(state_from(runtime)),
            Json(ChatRequest { message: "What's the tariff rate for Electronics from China?".to_string() }),
        )
        .await
        .expect_err("three steps cannot finish a lookup");

        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(error.error, "An unexpected internal error occurred.");
        assert_eq!(error.detail, "domain invariant violation: run exceeded the budget of 3 step executions");
    }

    #[tokio::test]
    async fn blank_chat_message_is_a_bad_request() {
        let (status, Json(error)) =
            chat(State(demo_state()), Json(ChatRequest { message: "   ".to_string() }))
                .await
                .expect_err("blank message rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.detail, "invalid input: message must not be empty");
        assert!(!error.correlation_id.is_empty());
    }

    #[tokio::test]
    async fn health_reports_dataset_readiness() {
        let (status, Json(payload)) = health(State(demo_state())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(payload.dataset.status, "ready");
        assert_eq!(payload.dataset.detail, "60 tariff records across 5 countries");

        let (status, Json(payload)) = health(State(state_with(Arc::new(UnavailableStore)))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(payload.status, "degraded");
        assert_eq!(payload.service.status, "ready");
    }

    #[tokio::test]
    async fn unavailable_summary_maps_to_service_unavailable() {
        let (status, Json(error)) =
            data_summary(State(state_with(Arc::new(UnavailableStore)))).await.expect_err("store down");

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(error.error, "The service is temporarily unavailable. Please retry shortly.");
    }

    #[tokio::test]
    async fn graph_highlights_the_requested_path() {
        let Json(response) = graph(
            State(demo_state()),
            Query(GraphQuery { execution_path: Some("START, CLASSIFY,SUMMARIZE".to_string()) }),
        )
        .await
        .expect("graph renders");

        assert_eq!(response.execution_path, Some(vec![Step::Start, Step::Classify, Step::Summarize]));
        assert!(response.dot_content.starts_with("digraph"));
        assert!(response.dot_content.contains("color=red"));
    }

    #[tokio::test]
    async fn graph_rejects_unknown_step_names() {
        let (status, Json(error)) = graph(
            State(demo_state()),
            Query(GraphQuery { execution_path: Some("START,TRANSLATE".to_string()) }),
        )
        .await
        .expect_err("unknown step rejected");

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(error.detail.contains("TRANSLATE"));
    }

    #[tokio::test]
    async fn slack_share_without_webhook_reports_failure() {
        let Json(response) = send_to_slack(
            State(demo_state()),
            Json(ShareRequest { query: None, message: "4.4%".to_string() }),
        )
        .await;

        assert!(!response.success);
        assert!(response.message.contains("not configured"));
    }

    #[tokio::test]
    async fn router_serves_data_summary_over_http() {
        let response = router(demo_state())
            .oneshot(Request::builder().uri("/api/data/summary").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let summary: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(summary["total_records"], 60);
        assert_eq!(summary["countries"][0], "China");
    }

    #[tokio::test]
    async fn router_accepts_chat_posts() {
        let request = Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(r#"{"message":"What data do you have available?"}"#))
            .expect("request");

        let response = router(demo_state()).oneshot(request).await.expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let result: Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(result["path"], serde_json::json!(["START", "CLASSIFY", "SUMMARIZE", "FORMAT", "END"]));
    }
}
