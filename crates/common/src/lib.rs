//! KBridge Common Library
//!
//! Shared code for the KBridge services including:
//! - Context retrieval from managed knowledge bases
//! - Knowledge base listing
//! - Answer generation grounded in retrieved context
//! - Bedrock implementations of the remote seams
//! - Error types, configuration and metrics

pub mod answer;
pub mod bedrock;
pub mod config;
pub mod errors;
pub mod knowledge_base;
pub mod metrics;
pub mod retrieval;

// Re-export commonly used types
pub use answer::{Answer, AnswerRequest, AnswerService, ChatModel};
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use knowledge_base::{
    KnowledgeBase, KnowledgeBaseListing, KnowledgeBaseLister, KnowledgeBaseRegistry,
};
pub use retrieval::{ContextRetriever, RetrievedContext, SourceRecord, VectorSearchClient};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
