//! Chat handler: retrieval-augmented answer generation

use axum::{extract::State, Json};
use serde::Deserialize;
use std::time::Instant;
use validator::Validate;

use super::{check_result_limit, validation_error};
use crate::AppState;
use kbridge_common::{answer::ChatTurn, errors::Result, Answer, AnswerRequest};

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub message: String,

    pub knowledge_base_id: Option<String>,

    #[validate(range(min = 1))]
    pub result_limit: Option<usize>,

    /// Earlier turns, oldest first
    #[serde(default)]
    pub history: Vec<ChatTurn>,
}

/// Answer a message using knowledge base context
pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<Answer>> {
    let start = Instant::now();

    request.validate().map_err(validation_error)?;
    check_result_limit(request.result_limit, state.config.retrieval.max_result_limit)?;

    let history_len = request.history.len();
    let answer = state
        .answers
        .answer(AnswerRequest {
            message: request.message,
            knowledge_base_id: request.knowledge_base_id,
            result_limit: request.result_limit,
            history: request.history,
        })
        .await?;

    tracing::info!(
        history = history_len,
        sources = answer.sources.len(),
        is_rag_working = answer.is_rag_working,
        latency_ms = start.elapsed().as_millis() as u64,
        "Chat completed"
    );

    Ok(Json(answer))
}
