//! Context retrieval handler

use axum::{extract::State, Json};
use serde::Deserialize;
use validator::Validate;

use super::{check_result_limit, validation_error};
use crate::AppState;
use kbridge_common::{errors::Result, RetrievedContext};

/// Retrieval request. The query is passed through as given.
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RetrieveRequest {
    pub query: String,

    /// Falls back to the configured default knowledge base
    pub knowledge_base_id: Option<String>,

    #[validate(range(min = 1))]
    pub result_limit: Option<usize>,
}

/// Retrieve prompt context.
///
/// Always 200: a skipped or failed retrieval is reported through
/// `isRagWorking`, not an error status.
pub async fn retrieve(
    State(state): State<AppState>,
    Json(request): Json<RetrieveRequest>,
) -> Result<Json<RetrievedContext>> {
    request.validate().map_err(validation_error)?;
    check_result_limit(request.result_limit, state.config.retrieval.max_result_limit)?;

    let knowledge_base_id = request
        .knowledge_base_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .or_else(|| state.config.default_knowledge_base());

    let context = state
        .retriever
        .retrieve(&request.query, knowledge_base_id, request.result_limit)
        .await;

    Ok(Json(context))
}
