//! Health check handlers

use axum::{extract::State, Json};
use serde::Serialize;

use crate::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadyResponse {
    pub status: String,
    pub provider: String,
    pub retrieval_backend: String,
    pub region: String,
    pub model_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_knowledge_base_id: Option<String>,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: kbridge_common::VERSION.to_string(),
    })
}

/// Readiness probe - reports the configured backend.
///
/// Remote services are not probed: their availability is reported per
/// request through `isRagWorking`.
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    Json(ReadyResponse {
        status: "ready".to_string(),
        provider: state.config.aws.provider.clone(),
        retrieval_backend: state.retriever.backend().to_string(),
        region: state.config.aws.region.clone(),
        model_id: state.answers.model_id().to_string(),
        default_knowledge_base_id: state.config.default_knowledge_base().map(str::to_string),
    })
}
