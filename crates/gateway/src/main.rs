//! KBridge API Gateway
//!
//! The main entry point for all external API requests.
//! Handles:
//! - Context retrieval from knowledge bases
//! - Knowledge base listing per region
//! - Grounded chat answers
//! - Observability (logging, metrics, request ids)

mod handlers;

use axum::{
    extract::State,
    routing::{get, post},
    Router,
};
use kbridge_common::{
    answer::MockChatModel,
    bedrock::{self, BedrockChatModel, BedrockKnowledgeBaseRegistry, BedrockVectorSearch},
    config::AppConfig,
    errors::AppError,
    knowledge_base::MockKnowledgeBaseRegistry,
    metrics,
    retrieval::MockVectorSearch,
    AnswerService, ChatModel, ContextRetriever, KnowledgeBaseLister, KnowledgeBaseRegistry,
    VectorSearchClient,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::IntoFuture;
use std::sync::Arc;
use tokio::{signal, sync::Notify};
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub retriever: ContextRetriever,
    pub lister: KnowledgeBaseLister,
    pub answers: AnswerService,
    pub prometheus: Option<PrometheusHandle>,
}

impl AppState {
    /// Wire services over the given seam implementations
    pub fn from_parts(
        config: AppConfig,
        search: Arc<dyn VectorSearchClient>,
        registry: Arc<dyn KnowledgeBaseRegistry>,
        model: Arc<dyn ChatModel>,
        prometheus: Option<PrometheusHandle>,
    ) -> Self {
        let retriever =
            ContextRetriever::new(search).with_default_limit(config.retrieval.default_result_limit);
        let answers = AnswerService::new(retriever.clone(), model, &config.generation)
            .with_default_knowledge_base(config.default_knowledge_base().map(str::to_string));

        Self {
            retriever,
            lister: KnowledgeBaseLister::new(registry),
            answers,
            prometheus,
            config: Arc::new(config),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;
    init_tracing(&config);

    config.validate().map_err(|e| {
        tracing::error!(error = %e, "Invalid configuration");
        e
    })?;

    info!(
        service = %config.observability.service_name,
        "Starting KBridge API Gateway v{}",
        kbridge_common::VERSION
    );

    // Initialize metrics
    let prometheus = if config.observability.metrics_enabled {
        let handle = PrometheusBuilder::new()
            .set_buckets(metrics::REMOTE_CALL_BUCKETS)?
            .install_recorder()?;
        metrics::register_metrics();
        Some(handle)
    } else {
        None
    };

    let state = build_state(config, prometheus).await;
    let shutdown_timeout = state.config.shutdown_timeout();
    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);

    // Build the router
    let app = create_router(state);

    // Start the server
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    let draining = Arc::new(Notify::new());
    let signal_draining = draining.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        shutdown_signal().await;
        signal_draining.notify_one();
    });

    tokio::select! {
        result = server.into_future() => result?,
        _ = async {
            draining.notified().await;
            tokio::time::sleep(shutdown_timeout).await;
        } => warn!(
            timeout_secs = shutdown_timeout.as_secs(),
            "Shutdown timeout elapsed, dropping open connections"
        ),
    }

    info!("Server shutdown complete");
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Pick seam implementations for the configured provider
async fn build_state(config: AppConfig, prometheus: Option<PrometheusHandle>) -> AppState {
    match config.aws.provider.as_str() {
        "mock" => {
            info!("Using in-memory mock backends");
            AppState::from_parts(
                config,
                Arc::new(MockVectorSearch::sample()),
                Arc::new(MockKnowledgeBaseRegistry::sample()),
                Arc::new(MockChatModel::new()),
                prometheus,
            )
        }
        _ => {
            info!(region = %config.aws.region, "Loading AWS configuration");
            let sdk_config = bedrock::load_sdk_config(&config.aws).await;
            AppState::from_parts(
                config,
                Arc::new(BedrockVectorSearch::new(&sdk_config)),
                Arc::new(BedrockKnowledgeBaseRegistry::new(&sdk_config)),
                Arc::new(BedrockChatModel::new(&sdk_config)),
                prometheus,
            )
        }
    }
}

/// Create the main application router
fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    let api_routes = Router::new()
        .route("/retrieve", post(handlers::retrieve::retrieve))
        .route("/knowledge-bases", get(handlers::knowledge_bases::list_knowledge_bases))
        .route("/chat", post(handlers::chat::chat));

    // Compose the app
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        .route("/metrics", get(render_metrics))
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(propagate_id)
        .layer(request_id)
        .with_state(state)
}

async fn render_metrics(State(state): State<AppState>) -> Result<String, AppError> {
    state
        .prometheus
        .as_ref()
        .map(PrometheusHandle::render)
        .ok_or_else(|| AppError::NotFound {
            resource_type: "endpoint".to_string(),
            id: "/metrics".to_string(),
        })
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
        response::Response,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    struct Harness {
        search: Arc<MockVectorSearch>,
        registry: Arc<MockKnowledgeBaseRegistry>,
        model: Arc<MockChatModel>,
    }

    impl Harness {
        fn new(search: MockVectorSearch, registry: MockKnowledgeBaseRegistry) -> Self {
            Self {
                search: Arc::new(search),
                registry: Arc::new(registry),
                model: Arc::new(MockChatModel::new()),
            }
        }

        fn sample() -> Self {
            Self::new(MockVectorSearch::sample(), MockKnowledgeBaseRegistry::sample())
        }

        fn router(&self, config: AppConfig) -> Router {
            create_router(AppState::from_parts(
                config,
                self.search.clone(),
                self.registry.clone(),
                self.model.clone(),
                None,
            ))
        }
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    async fn json_body(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_health() {
        let app = Harness::sample().router(AppConfig::default());
        let response = tokio_test::block_on(app.oneshot(get("/health"))).unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_reports_provider() {
        let mut config = AppConfig::default();
        config.aws.provider = "mock".to_string();
        let app = Harness::sample().router(config);

        let response = app.oneshot(get("/ready")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["provider"], "mock");
        assert_eq!(body["region"], "us-west-2");
        assert_eq!(body["retrievalBackend"], "mock");
    }

    #[tokio::test]
    async fn test_request_id_propagated() {
        let app = Harness::sample().router(AppConfig::default());
        let response = app.oneshot(get("/health")).await.unwrap();
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn test_retrieve_without_knowledge_base() {
        let harness = Harness::sample();
        let app = harness.router(AppConfig::default());

        let response = app
            .oneshot(post_json("/v1/retrieve", json!({ "query": "return policy" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["isRagWorking"], false);
        assert_eq!(body["context"], "");
        assert_eq!(body["sources"], json!([]));
        assert_eq!(harness.search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_retrieve_return_policy() {
        let harness = Harness::sample();
        let app = harness.router(AppConfig::default());

        let response = app
            .oneshot(post_json(
                "/v1/retrieve",
                json!({ "query": "What is the return policy?", "knowledgeBaseId": "KB123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["isRagWorking"], true);
        assert_eq!(
            body["context"],
            "Returns accepted within 30 days.\n\nRefunds issued to original payment method."
        );
        assert_eq!(body["sources"][0]["name"], "policy returns");
        assert_eq!(body["sources"][1]["name"], "policy refunds");
        assert_eq!(body["sources"][0]["score"], 0.9);
        assert_eq!(
            harness.search.calls(),
            vec![("KB123".to_string(), "What is the return policy?".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_retrieve_uses_configured_knowledge_base() {
        let harness = Harness::sample();
        let mut config = AppConfig::default();
        config.retrieval.knowledge_base_id = Some("KBDEFAULT".to_string());
        let app = harness.router(config);

        let response = app
            .oneshot(post_json(
                "/v1/retrieve",
                json!({ "query": "refunds", "knowledgeBaseId": "", "resultLimit": 5 }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            harness.search.calls(),
            vec![("KBDEFAULT".to_string(), "refunds".to_string(), 5)]
        );
    }

    #[tokio::test]
    async fn test_retrieve_service_failure_is_not_an_error_status() {
        let harness = Harness::new(MockVectorSearch::failing(), MockKnowledgeBaseRegistry::sample());
        let app = harness.router(AppConfig::default());

        let response = app
            .oneshot(post_json(
                "/v1/retrieve",
                json!({ "query": "anything", "knowledgeBaseId": "KB123" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["isRagWorking"], false);
        assert_eq!(body["sources"], json!([]));
    }

    #[tokio::test]
    async fn test_retrieve_rejects_out_of_range_limits() {
        let harness = Harness::sample();

        for limit in [0, 101] {
            let response = harness
                .router(AppConfig::default())
                .oneshot(post_json(
                    "/v1/retrieve",
                    json!({ "query": "q", "knowledgeBaseId": "KB123", "resultLimit": limit }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = json_body(response).await;
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
        }

        assert_eq!(harness.search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_list_knowledge_bases() {
        let harness = Harness::sample();
        let app = harness.router(AppConfig::default());

        let response = app
            .oneshot(get("/v1/knowledge-bases?region=eu-central-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["region"], "eu-central-1");
        assert_eq!(body["knowledgeBases"][0]["id"], "KBSAMPLE01");
        assert_eq!(body["knowledgeBases"][0]["status"], "ACTIVE");
        assert_eq!(harness.registry.calls(), vec!["eu-central-1".to_string()]);
    }

    #[tokio::test]
    async fn test_list_knowledge_bases_echoes_trimmed_region() {
        let harness = Harness::sample();
        let response = harness
            .router(AppConfig::default())
            .oneshot(get("/v1/knowledge-bases?region=%20eu-west-1%20"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["region"], "eu-west-1");
        assert_eq!(harness.registry.calls(), vec!["eu-west-1".to_string()]);
    }

    #[test]
    fn test_listing_metrics_do_not_grow_with_regions() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let lister = KnowledgeBaseLister::new(Arc::new(MockKnowledgeBaseRegistry::sample()));

        ::metrics::with_local_recorder(&recorder, || {
            tokio_test::block_on(async {
                for i in 0..50 {
                    lister.list(Some(&format!("junk-{i}"))).await.unwrap();
                }
            })
        });

        let rendered = handle.render();
        let series = rendered
            .lines()
            .filter(|line| line.starts_with("kbridge_knowledge_base_listings_total"))
            .count();
        assert_eq!(series, 1);
    }

    #[tokio::test]
    async fn test_list_knowledge_bases_requires_region() {
        let harness = Harness::sample();

        for uri in ["/v1/knowledge-bases", "/v1/knowledge-bases?region="] {
            let response = harness
                .router(AppConfig::default())
                .oneshot(get(uri))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        }

        assert!(harness.registry.calls().is_empty());
    }

    #[tokio::test]
    async fn test_list_knowledge_bases_upstream_failure() {
        let harness = Harness::new(MockVectorSearch::sample(), MockKnowledgeBaseRegistry::failing());
        let app = harness.router(AppConfig::default());

        let response = app
            .oneshot(get("/v1/knowledge-bases?region=us-east-1"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = json_body(response).await;
        let message = body["error"]["message"].as_str().unwrap();
        assert!(!message.contains("ExpiredTokenException"));
    }

    #[tokio::test]
    async fn test_chat_with_context() {
        let harness = Harness::sample();
        let app = harness.router(AppConfig::default());

        let response = app
            .oneshot(post_json(
                "/v1/chat",
                json!({
                    "message": "Can I return this?",
                    "knowledgeBaseId": "KB123",
                    "history": [
                        { "role": "user", "text": "hello" },
                        { "role": "assistant", "text": "hi there" }
                    ]
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["text"], "mock answer: Can I return this?");
        assert_eq!(body["isRagWorking"], true);
        assert_eq!(body["sources"].as_array().map(Vec::len), Some(2));

        let prompts = harness.model.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Returns accepted within 30 days."));
    }

    #[tokio::test]
    async fn test_chat_rejects_malformed_history() {
        let harness = Harness::sample();
        let histories = [
            json!([{ "role": "user", "text": "returns?" }]),
            json!([{ "role": "assistant", "text": "hello" }, { "role": "user", "text": "hi" }]),
            json!([{ "role": "user", "text": "" }, { "role": "assistant", "text": "ok" }]),
        ];

        for history in histories {
            let response = harness
                .router(AppConfig::default())
                .oneshot(post_json(
                    "/v1/chat",
                    json!({ "message": "and refunds?", "knowledgeBaseId": "KB123", "history": history }),
                ))
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_REQUEST);

            let body = json_body(response).await;
            assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
            assert_eq!(body["error"]["field"], "history");
        }

        assert_eq!(harness.search.call_count(), 0);
        assert!(harness.model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_chat_rejects_blank_message() {
        let harness = Harness::sample();
        let response = harness
            .router(AppConfig::default())
            .oneshot(post_json("/v1/chat", json!({ "message": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert!(harness.model.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_chat_without_knowledge_base() {
        let harness = Harness::sample();
        let app = harness.router(AppConfig::default());

        let response = app
            .oneshot(post_json("/v1/chat", json!({ "message": "hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = json_body(response).await;
        assert_eq!(body["isRagWorking"], false);
        assert_eq!(harness.search.call_count(), 0);
    }

    #[tokio::test]
    async fn test_metrics_disabled() {
        let app = Harness::sample().router(AppConfig::default());
        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_metrics_rendered() {
        let harness = Harness::sample();
        let handle = PrometheusBuilder::new().build_recorder().handle();
        let app = create_router(AppState::from_parts(
            AppConfig::default(),
            harness.search.clone(),
            harness.registry.clone(),
            harness.model.clone(),
            Some(handle),
        ));

        let response = app.oneshot(get("/metrics")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
