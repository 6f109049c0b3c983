//! Context retrieval adapter
//!
//! One remote search per call, normalized into a `RetrievedContext`.
//! Failures never propagate: they flip `is_rag_working` and go to the
//! observer.

use super::normalize::normalize_matches;
use super::{RetrievalObserver, RetrievedContext, TracingObserver, VectorSearchClient, DEFAULT_RESULT_LIMIT};
use std::sync::Arc;
use std::time::Instant;

/// Retrieves prompt context from a knowledge base
#[derive(Clone)]
pub struct ContextRetriever {
    client: Arc<dyn VectorSearchClient>,
    observer: Arc<dyn RetrievalObserver>,
    default_limit: usize,
}

impl ContextRetriever {
    /// Create a retriever that logs through `tracing`
    pub fn new(client: Arc<dyn VectorSearchClient>) -> Self {
        Self {
            client,
            observer: Arc::new(TracingObserver),
            default_limit: DEFAULT_RESULT_LIMIT,
        }
    }

    /// Replace the observer
    pub fn with_observer(mut self, observer: Arc<dyn RetrievalObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Limit used when the caller passes none
    pub fn with_default_limit(mut self, limit: usize) -> Self {
        self.default_limit = limit.max(1);
        self
    }

    pub fn default_limit(&self) -> usize {
        self.default_limit
    }

    pub fn backend(&self) -> &str {
        self.client.name()
    }

    /// Retrieve context for `query` from `knowledge_base_id`.
    ///
    /// A missing or blank knowledge base short-circuits without a remote
    /// call. `is_rag_working` is false only for that case and for remote
    /// failures; an empty result from a reachable service keeps it true.
    pub async fn retrieve(
        &self,
        query: &str,
        knowledge_base_id: Option<&str>,
        result_limit: Option<usize>,
    ) -> RetrievedContext {
        let knowledge_base_id = match knowledge_base_id.map(str::trim) {
            Some(id) if !id.is_empty() => id,
            _ => {
                self.observer.skipped();
                return RetrievedContext::unavailable();
            }
        };

        let limit = result_limit.unwrap_or(self.default_limit).max(1);
        let start = Instant::now();

        match self.client.search(knowledge_base_id, query, limit).await {
            Ok(matches) => {
                let returned = matches.len();
                let (context, sources) = normalize_matches(matches);
                self.observer
                    .completed(knowledge_base_id, returned, sources.len(), start.elapsed());

                RetrievedContext {
                    context,
                    sources,
                    is_rag_working: true,
                }
            }
            Err(e) => {
                self.observer.failed(knowledge_base_id, &e, start.elapsed());
                RetrievedContext::unavailable()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::{MockVectorSearch, RecordingObserver, RetrievalEvent, RetrievalMatch};

    fn retriever(mock: Arc<MockVectorSearch>) -> (ContextRetriever, Arc<RecordingObserver>) {
        let observer = Arc::new(RecordingObserver::new());
        let retriever = ContextRetriever::new(mock).with_observer(observer.clone());
        (retriever, observer)
    }

    #[tokio::test]
    async fn test_missing_knowledge_base_skips_remote_call() {
        let mock = Arc::new(MockVectorSearch::sample());
        let (retriever, observer) = retriever(mock.clone());

        for kb in [None, Some(""), Some("   ")] {
            let ctx = retriever.retrieve("What is your return policy?", kb, None).await;
            assert!(!ctx.is_rag_working);
            assert!(ctx.context.is_empty());
            assert!(ctx.sources.is_empty());
        }

        assert_eq!(mock.call_count(), 0);
        assert_eq!(observer.events(), vec![RetrievalEvent::Skipped; 3]);
    }

    #[tokio::test]
    async fn test_zero_matches_keeps_rag_working() {
        let mock = Arc::new(MockVectorSearch::new(Vec::new()));
        let (retriever, observer) = retriever(mock.clone());

        let ctx = retriever.retrieve("anything", Some("KB123"), None).await;

        assert!(ctx.is_rag_working);
        assert!(ctx.context.is_empty());
        assert!(ctx.sources.is_empty());
        assert_eq!(mock.call_count(), 1);
        assert_eq!(
            observer.events(),
            vec![RetrievalEvent::Completed {
                knowledge_base_id: "KB123".to_string(),
                returned: 0,
                kept: 0,
            }]
        );
    }

    #[tokio::test]
    async fn test_return_policy_scenario() {
        let mock = Arc::new(MockVectorSearch::new(vec![
            RetrievalMatch::new(
                "Returns accepted within 30 days.",
                "s3://bucket/policy_returns.txt",
                0.9,
            ),
            RetrievalMatch::new(
                "Refunds issued to original payment method.",
                "s3://bucket/policy_refunds.txt",
                0.8,
            ),
        ]));
        let (retriever, _) = retriever(mock.clone());

        let ctx = retriever
            .retrieve("What is your return policy?", Some("KB123"), None)
            .await;

        assert!(ctx.is_rag_working);
        assert_eq!(
            ctx.context,
            "Returns accepted within 30 days.\n\nRefunds issued to original payment method."
        );
        let names: Vec<_> = ctx.sources.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["policy returns", "policy refunds"]);
        let scores: Vec<_> = ctx.sources.iter().map(|s| s.score).collect();
        assert_eq!(scores, vec![0.9, 0.8]);

        // Default limit of 3 requested, query passed through verbatim
        assert_eq!(
            mock.calls(),
            vec![("KB123".to_string(), "What is your return policy?".to_string(), 3)]
        );
    }

    #[tokio::test]
    async fn test_remote_failure_returns_no_partial_result() {
        let mock = Arc::new(MockVectorSearch::failing());
        let (retriever, observer) = retriever(mock.clone());

        let ctx = retriever.retrieve("q", Some("KB123"), Some(5)).await;

        assert_eq!(ctx, RetrievedContext::unavailable());
        assert_eq!(mock.call_count(), 1);
        assert!(matches!(
            observer.events().as_slice(),
            [RetrievalEvent::Failed { knowledge_base_id, .. }] if knowledge_base_id == "KB123"
        ));
    }

    #[tokio::test]
    async fn test_empty_query_passed_through() {
        let mock = Arc::new(MockVectorSearch::sample());
        let (retriever, _) = retriever(mock.clone());

        let ctx = retriever.retrieve("", Some("KB9"), Some(1)).await;

        assert!(ctx.is_rag_working);
        assert_eq!(ctx.sources.len(), 1);
        assert_eq!(mock.calls(), vec![("KB9".to_string(), String::new(), 1)]);
    }

    #[tokio::test]
    async fn test_limits_are_positive() {
        let mock = Arc::new(MockVectorSearch::sample());
        let (retriever, _) = retriever(mock.clone());
        let retriever = retriever.with_default_limit(0);
        assert_eq!(retriever.default_limit(), 1);

        retriever.retrieve("q", Some("KB"), Some(0)).await;
        assert_eq!(mock.calls()[0].2, 1);
    }
}
