//! Knowledge base listing handler

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::AppState;
use kbridge_common::{errors::Result, KnowledgeBaseListing};

#[derive(Debug, Deserialize)]
pub struct ListParams {
    pub region: Option<String>,
}

/// List knowledge bases in the requested region
pub async fn list_knowledge_bases(
    State(state): State<AppState>,
    Query(params): Query<ListParams>,
) -> Result<Json<KnowledgeBaseListing>> {
    let listing = state.lister.list(params.region.as_deref()).await?;
    Ok(Json(listing))
}
