//! Answer generation grounded in retrieved context
//!
//! Provides:
//! - System prompt assembly with an injected `<context>` block
//! - The chat model seam (`ChatModel`)
//! - `AnswerService`, tying retrieval and the model call together

use crate::config::GenerationConfig;
use crate::errors::{AppError, Result};
use crate::metrics;
use crate::retrieval::{ContextRetriever, RetrievedContext, SourceRecord};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Service label used in upstream errors
pub const MODEL_SERVICE: &str = "model";

/// Base prompt used when no override is configured
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question clearly and concisely. \
If you do not know the answer, say so instead of guessing.";

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: ChatRole,
    pub text: String,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self { role: ChatRole::User, text: text.into() }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, text: text.into() }
    }
}

/// Inference settings for one model call
#[derive(Debug, Clone, PartialEq)]
pub struct InferenceSettings {
    pub model_id: String,
    pub max_tokens: i32,
    pub temperature: f32,
    pub top_p: f32,
}

impl From<&GenerationConfig> for InferenceSettings {
    fn from(config: &GenerationConfig) -> Self {
        Self {
            model_id: config.model_id.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            top_p: config.top_p,
        }
    }
}

/// Token accounting reported by the model
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    pub input_tokens: i32,
    pub output_tokens: i32,
}

/// Model output
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCompletion {
    pub text: String,
    pub stop_reason: Option<String>,
    pub usage: Option<TokenUsage>,
}

/// Chat model seam
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// One model call; `turns` ends with the new user message
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        settings: &InferenceSettings,
    ) -> Result<ChatCompletion>;
}

/// What the caller should tell the end user about retrieval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalNotice {
    /// Knowledge base reachable but nothing relevant was found
    NoResults,
    /// Knowledge base was named but retrieval failed
    RetrievalUnavailable,
}

impl RetrievalNotice {
    /// Classify a retrieval result. `requested` is whether a knowledge base was named.
    pub fn classify(requested: bool, context: &RetrievedContext) -> Option<Self> {
        match (requested, context.is_rag_working, context.is_empty()) {
            (false, _, _) => None,
            (true, false, _) => Some(RetrievalNotice::RetrievalUnavailable),
            (true, true, true) => Some(RetrievalNotice::NoResults),
            (true, true, false) => None,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            RetrievalNotice::NoResults => "No relevant information was found in the knowledge base.",
            RetrievalNotice::RetrievalUnavailable => "The knowledge base is currently unavailable; answering without it.",
        }
    }
}

/// Question to answer
#[derive(Debug, Clone, Default)]
pub struct AnswerRequest {
    pub message: String,
    pub knowledge_base_id: Option<String>,
    pub result_limit: Option<usize>,
    pub history: Vec<ChatTurn>,
}

/// Generated answer with its supporting sources
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub text: String,
    pub sources: Vec<SourceRecord>,
    pub is_rag_working: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<RetrievalNotice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Build the system prompt, injecting `context` when present
pub fn build_system_prompt(base: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return base.to_string();
    }

    format!(
        "{base}\n\nUse the following context from the knowledge base to answer. \
Prefer it over prior knowledge and say when it does not cover the question.\n\
<context>\n{context}\n</context>"
    )
}

/// Retrieval followed by a single model call
#[derive(Clone)]
pub struct AnswerService {
    retriever: ContextRetriever,
    model: Arc<dyn ChatModel>,
    settings: InferenceSettings,
    system_prompt: String,
    default_knowledge_base: Option<String>,
}

impl AnswerService {
    pub fn new(retriever: ContextRetriever, model: Arc<dyn ChatModel>, config: &GenerationConfig) -> Self {
        Self {
            retriever,
            model,
            settings: InferenceSettings::from(config),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
            default_knowledge_base: None,
        }
    }

    /// Knowledge base used when a request names none
    pub fn with_default_knowledge_base(mut self, knowledge_base_id: Option<String>) -> Self {
        self.default_knowledge_base = knowledge_base_id;
        self
    }

    pub fn model_id(&self) -> &str {
        &self.settings.model_id
    }

    /// Answer `request.message`, grounding it in retrieved context
    pub async fn answer(&self, request: AnswerRequest) -> Result<Answer> {
        validate_conversation(&request.history, &request.message)?;

        let knowledge_base_id = request
            .knowledge_base_id
            .as_deref()
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .or(self.default_knowledge_base.as_deref());

        let retrieved = self
            .retriever
            .retrieve(&request.message, knowledge_base_id, request.result_limit)
            .await;
        let notice = RetrievalNotice::classify(knowledge_base_id.is_some(), &retrieved);

        let system_prompt = build_system_prompt(&self.system_prompt, &retrieved.context);
        let mut turns = request.history;
        turns.push(ChatTurn::user(request.message));

        let start = Instant::now();
        let completion = self
            .model
            .complete(&system_prompt, &turns, &self.settings)
            .await;
        let elapsed = start.elapsed().as_secs_f64();

        let completion = match completion {
            Ok(completion) => {
                metrics::record_generation(elapsed, &self.settings.model_id, true);
                completion
            }
            Err(e @ AppError::UpstreamTimeout { .. }) => {
                metrics::record_generation(elapsed, &self.settings.model_id, false);
                tracing::error!(model = %self.settings.model_id, error = %e, "Model call timed out");
                return Err(e);
            }
            Err(e) => {
                metrics::record_generation(elapsed, &self.settings.model_id, false);
                let detail = match &e {
                    AppError::Upstream { detail, .. } => detail.clone(),
                    other => other.to_string(),
                };
                tracing::error!(
                    model = %self.settings.model_id,
                    error = %e,
                    detail = %detail,
                    "Model call failed"
                );
                return Err(AppError::upstream(MODEL_SERVICE, detail));
            }
        };

        tracing::info!(
            model = %self.settings.model_id,
            sources = retrieved.sources.len(),
            is_rag_working = retrieved.is_rag_working,
            stop_reason = completion.stop_reason.as_deref().unwrap_or("unknown"),
            "Answer generated"
        );

        Ok(Answer {
            text: completion.text,
            sources: retrieved.sources,
            is_rag_working: retrieved.is_rag_working,
            notice,
            stop_reason: completion.stop_reason,
            usage: completion.usage,
        })
    }
}

/// Check that `history` followed by `message` is a conversation the model
/// accepts: it opens with a user turn, roles alternate and no text is blank.
pub fn validate_conversation(history: &[ChatTurn], message: &str) -> Result<()> {
    if message.trim().is_empty() {
        return Err(AppError::Validation {
            message: "message must not be blank".to_string(),
            field: Some("message".to_string()),
        });
    }

    let mut expected = ChatRole::User;
    for (i, turn) in history.iter().enumerate() {
        if turn.role != expected {
            return Err(history_error(format!(
                "history[{}] must be a {} turn",
                i,
                expected.as_str()
            )));
        }
        if turn.text.trim().is_empty() {
            return Err(history_error(format!("history[{}] has blank text", i)));
        }
        expected = match expected {
            ChatRole::User => ChatRole::Assistant,
            ChatRole::Assistant => ChatRole::User,
        };
    }

    // The new message is the next user turn
    if expected != ChatRole::User {
        return Err(history_error("history must end with an assistant turn".to_string()));
    }

    Ok(())
}

fn history_error(message: String) -> AppError {
    AppError::Validation {
        message,
        field: Some("history".to_string()),
    }
}

/// Deterministic chat model for tests and the `mock` provider
///
/// Replies with a fixed prefix and the last user message, and records the
/// system prompts it was given.
pub struct MockChatModel {
    fail: bool,
    prompts: Mutex<Vec<String>>,
}

impl MockChatModel {
    pub fn new() -> Self {
        Self { fail: false, prompts: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { fail: true, prompts: Mutex::new(Vec::new()) }
    }

    /// System prompts seen so far
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }
}

impl Default for MockChatModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatModel for MockChatModel {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        _settings: &InferenceSettings,
    ) -> Result<ChatCompletion> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(system_prompt.to_string());
        }

        if self.fail {
            return Err(AppError::upstream(MODEL_SERVICE, "ThrottlingException: slow down"));
        }

        let last = turns
            .iter()
            .rev()
            .find(|t| t.role == ChatRole::User)
            .map(|t| t.text.as_str())
            .unwrap_or_default();

        Ok(ChatCompletion {
            text: format!("mock answer: {}", last),
            stop_reason: Some("end_turn".to_string()),
            usage: Some(TokenUsage {
                input_tokens: system_prompt.len() as i32,
                output_tokens: last.len() as i32,
            }),
        })
    }
}
