//! Knowledge base listing
//!
//! Thin passthrough to the remote registry. A blank region is a client
//! error, a timeout stays a timeout and any other remote failure collapses
//! into a generic upstream error.

use crate::errors::{AppError, Result};
use crate::metrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Service label used in upstream errors
pub const REGISTRY_SERVICE: &str = "knowledge-base registry";

/// Knowledge base as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBase {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: String,
    pub updated_at: DateTime<Utc>,
}

/// Result of one listing call, with the region actually queried
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KnowledgeBaseListing {
    pub region: String,
    pub knowledge_bases: Vec<KnowledgeBase>,
}

/// Remote knowledge base registry seam
#[async_trait]
pub trait KnowledgeBaseRegistry: Send + Sync {
    /// List every knowledge base visible in `region`
    async fn list(&self, region: &str) -> Result<Vec<KnowledgeBase>>;
}

/// Validates input and maps registry failures
#[derive(Clone)]
pub struct KnowledgeBaseLister {
    registry: Arc<dyn KnowledgeBaseRegistry>,
}

impl KnowledgeBaseLister {
    pub fn new(registry: Arc<dyn KnowledgeBaseRegistry>) -> Self {
        Self { registry }
    }

    /// List knowledge bases in `region`
    pub async fn list(&self, region: Option<&str>) -> Result<KnowledgeBaseListing> {
        let region = match region.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => {
                return Err(AppError::MissingField {
                    field: "region".to_string(),
                })
            }
        };

        let start = Instant::now();
        match self.registry.list(region).await {
            Ok(knowledge_bases) => {
                tracing::info!(
                    region,
                    count = knowledge_bases.len(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Listed knowledge bases"
                );
                metrics::record_listing(true, knowledge_bases.len());
                Ok(KnowledgeBaseListing {
                    region: region.to_string(),
                    knowledge_bases,
                })
            }
            Err(e @ AppError::UpstreamTimeout { .. }) => {
                tracing::error!(region, error = %e, "Knowledge base listing timed out");
                metrics::record_listing(false, 0);
                Err(e)
            }
            Err(e) => {
                let detail = match &e {
                    AppError::Upstream { detail, .. } => detail.clone(),
                    other => other.to_string(),
                };
                tracing::error!(
                    region,
                    error = %e,
                    detail = %detail,
                    "Failed to list knowledge bases"
                );
                metrics::record_listing(false, 0);
                Err(AppError::upstream(REGISTRY_SERVICE, detail))
            }
        }
    }
}

/// In-memory registry for tests and the `mock` provider
pub struct MockKnowledgeBaseRegistry {
    knowledge_bases: Vec<KnowledgeBase>,
    fail: bool,
    calls: Mutex<Vec<String>>,
}

impl MockKnowledgeBaseRegistry {
    pub fn new(knowledge_bases: Vec<KnowledgeBase>) -> Self {
        Self {
            knowledge_bases,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            knowledge_bases: Vec::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// One active sample knowledge base
    pub fn sample() -> Self {
        Self::new(vec![KnowledgeBase {
            id: "KBSAMPLE01".to_string(),
            name: "store-policies".to_string(),
            description: Some("Returns and refunds policies".to_string()),
            status: "ACTIVE".to_string(),
            updated_at: DateTime::<Utc>::UNIX_EPOCH,
        }])
    }

    /// Regions this registry was asked about
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl KnowledgeBaseRegistry for MockKnowledgeBaseRegistry {
    async fn list(&self, region: &str) -> Result<Vec<KnowledgeBase>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(region.to_string());
        }

        if self.fail {
            return Err(AppError::upstream(
                REGISTRY_SERVICE,
                "ExpiredTokenException: security token expired",
            ));
        }

        Ok(self.knowledge_bases.clone())
    }
}
