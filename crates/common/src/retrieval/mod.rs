//! Context retrieval over a managed knowledge base
//!
//! Provides:
//! - The remote vector search seam (`VectorSearchClient`)
//! - Normalization of raw matches into display records
//! - `ContextRetriever`, which assembles a prompt-ready context string
//! - An injected observer for logging and metrics

mod adapter;
mod normalize;
mod observer;

pub use adapter::ContextRetriever;
pub use normalize::{display_name, normalize_matches};
pub use observer::{RecordingObserver, RetrievalEvent, RetrievalObserver, TracingObserver};

use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;

/// Default number of matches requested from the remote service
pub const DEFAULT_RESULT_LIMIT: usize = 3;

/// One hit as returned by the remote vector search service
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetrievalMatch {
    /// Matched text, absent for non-text content
    pub text: Option<String>,

    /// Relevance score, higher is more relevant
    pub score: f64,

    /// Origin document URI
    pub locator: Option<String>,

    /// Remote-assigned chunk identifier
    pub chunk_id: Option<String>,
}

impl RetrievalMatch {
    /// Text-bearing match with a locator
    pub fn new(text: impl Into<String>, locator: impl Into<String>, score: f64) -> Self {
        Self {
            text: Some(text.into()),
            score,
            locator: Some(locator.into()),
            chunk_id: None,
        }
    }

    pub fn with_chunk_id(mut self, chunk_id: impl Into<String>) -> Self {
        self.chunk_id = Some(chunk_id.into());
        self
    }
}

/// Normalized source record shown alongside an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceRecord {
    /// Remote chunk id or positional placeholder
    pub id: String,

    /// Display name derived from the locator
    pub name: String,

    /// Origin document URI
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locator: Option<String>,

    /// Relevance score as reported remotely
    pub score: f64,

    /// Snippet text
    pub snippet: String,
}

/// Aggregate result of one retrieval
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    /// Snippets joined with a blank line, remote order preserved
    pub context: String,

    /// One record per snippet, same order as `context`
    pub sources: Vec<SourceRecord>,

    /// False only when retrieval was skipped or the service failed
    pub is_rag_working: bool,
}

impl RetrievedContext {
    /// Empty result with the retrieval subsystem flagged as down
    pub fn unavailable() -> Self {
        Self::default()
    }

    /// Empty result from a reachable service
    pub fn no_results() -> Self {
        Self {
            is_rag_working: true,
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

/// Remote vector search seam
#[async_trait]
pub trait VectorSearchClient: Send + Sync {
    /// Issue one search against `knowledge_base_id` asking for `limit` matches
    async fn search(
        &self,
        knowledge_base_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalMatch>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// In-memory vector search for tests and the `mock` provider
///
/// Returns its canned matches (truncated to the requested limit) or,
/// when configured to fail, an upstream error. Every call is recorded.
pub struct MockVectorSearch {
    matches: Vec<RetrievalMatch>,
    fail: bool,
    calls: Mutex<Vec<(String, String, usize)>>,
}

impl MockVectorSearch {
    pub fn new(matches: Vec<RetrievalMatch>) -> Self {
        Self {
            matches,
            fail: false,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Mock that always fails like an unreachable service
    pub fn failing() -> Self {
        Self {
            matches: Vec::new(),
            fail: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Small fixed corpus used by the `mock` provider
    pub fn sample() -> Self {
        Self::new(vec![
            RetrievalMatch::new(
                "Returns accepted within 30 days.",
                "s3://kbridge-sample/policy_returns.txt",
                0.9,
            )
            .with_chunk_id("sample-chunk-1"),
            RetrievalMatch::new(
                "Refunds issued to original payment method.",
                "s3://kbridge-sample/policy_refunds.txt",
                0.8,
            )
            .with_chunk_id("sample-chunk-2"),
        ])
    }

    /// Recorded `(knowledge_base_id, query, limit)` triples
    pub fn calls(&self) -> Vec<(String, String, usize)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl VectorSearchClient for MockVectorSearch {
    async fn search(
        &self,
        knowledge_base_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((knowledge_base_id.to_string(), query.to_string(), limit));
        }

        if self.fail {
            return Err(AppError::upstream(
                "vector search",
                "mock vector search configured to fail",
            ));
        }

        Ok(self.matches.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
