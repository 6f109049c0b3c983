//! Observability collaborator for the retrieval adapter

use crate::errors::AppError;
use crate::metrics::{self, RetrievalOutcome};
use std::sync::Mutex;
use std::time::Duration;

/// Receives one event per retrieval invocation
pub trait RetrievalObserver: Send + Sync {
    /// No knowledge base was supplied, no remote call made
    fn skipped(&self);

    /// Remote call succeeded; `kept` counts matches with text
    fn completed(&self, knowledge_base_id: &str, returned: usize, kept: usize, elapsed: Duration);

    /// Remote call failed
    fn failed(&self, knowledge_base_id: &str, error: &AppError, elapsed: Duration);
}

/// Default observer: structured logs plus metrics
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl RetrievalObserver for TracingObserver {
    fn skipped(&self) {
        tracing::debug!("No knowledge base supplied, skipping retrieval");
        metrics::record_retrieval(RetrievalOutcome::Skipped, None, 0);
    }

    fn completed(&self, knowledge_base_id: &str, returned: usize, kept: usize, elapsed: Duration) {
        let outcome = if kept == 0 {
            RetrievalOutcome::Empty
        } else {
            RetrievalOutcome::Hit
        };

        tracing::info!(
            knowledge_base_id,
            returned,
            kept,
            latency_ms = elapsed.as_millis() as u64,
            outcome = outcome.as_str(),
            "Retrieval completed"
        );
        metrics::record_retrieval(outcome, Some(elapsed.as_secs_f64()), kept);
    }

    fn failed(&self, knowledge_base_id: &str, error: &AppError, elapsed: Duration) {
        let detail = match error {
            AppError::Upstream { detail, .. } => detail.as_str(),
            _ => "",
        };

        tracing::error!(
            knowledge_base_id,
            error = %error,
            detail,
            code = ?error.code(),
            latency_ms = elapsed.as_millis() as u64,
            "Retrieval failed"
        );
        metrics::record_retrieval(RetrievalOutcome::Failed, Some(elapsed.as_secs_f64()), 0);
    }
}

/// Event captured by `RecordingObserver`
#[derive(Debug, Clone, PartialEq)]
pub enum RetrievalEvent {
    Skipped,
    Completed {
        knowledge_base_id: String,
        returned: usize,
        kept: usize,
    },
    Failed {
        knowledge_base_id: String,
        message: String,
    },
}

/// Observer that keeps events in memory for assertions
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<RetrievalEvent>>,
}

impl RecordingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RetrievalEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    fn push(&self, event: RetrievalEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl RetrievalObserver for RecordingObserver {
    fn skipped(&self) {
        self.push(RetrievalEvent::Skipped);
    }

    fn completed(&self, knowledge_base_id: &str, returned: usize, kept: usize, _elapsed: Duration) {
        self.push(RetrievalEvent::Completed {
            knowledge_base_id: knowledge_base_id.to_string(),
            returned,
            kept,
        });
    }

    fn failed(&self, knowledge_base_id: &str, error: &AppError, _elapsed: Duration) {
        self.push(RetrievalEvent::Failed {
            knowledge_base_id: knowledge_base_id.to_string(),
            message: error.to_string(),
        });
    }
}
