//! Chat model through the Bedrock Runtime `Converse` API

use super::sdk_failure;
use crate::answer::{
    ChatCompletion, ChatModel, ChatRole, ChatTurn, InferenceSettings, TokenUsage, MODEL_SERVICE,
};
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use aws_sdk_bedrockruntime::types::{
    ContentBlock, ConversationRole, InferenceConfiguration, Message, SystemContentBlock,
};
use aws_sdk_bedrockruntime::Client;
use aws_types::SdkConfig;

/// Bedrock Converse client
#[derive(Clone)]
pub struct BedrockChatModel {
    client: Client,
}

impl BedrockChatModel {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

fn to_message(turn: &ChatTurn) -> Result<Message> {
    let role = match turn.role {
        ChatRole::User => ConversationRole::User,
        ChatRole::Assistant => ConversationRole::Assistant,
    };

    Message::builder()
        .role(role)
        .content(ContentBlock::Text(turn.text.clone()))
        .build()
        .map_err(|e| AppError::Internal {
            message: format!("Failed to build conversation message: {}", e),
        })
}

#[async_trait]
impl ChatModel for BedrockChatModel {
    async fn complete(
        &self,
        system_prompt: &str,
        turns: &[ChatTurn],
        settings: &InferenceSettings,
    ) -> Result<ChatCompletion> {
        let messages = turns.iter().map(to_message).collect::<Result<Vec<_>>>()?;

        let inference = InferenceConfiguration::builder()
            .max_tokens(settings.max_tokens)
            .temperature(settings.temperature)
            .top_p(settings.top_p)
            .build();

        let output = self
            .client
            .converse()
            .model_id(&settings.model_id)
            .system(SystemContentBlock::Text(system_prompt.to_string()))
            .set_messages(Some(messages))
            .inference_config(inference)
            .send()
            .await
            .map_err(|e| sdk_failure(MODEL_SERVICE, e))?;

        let message = output
            .output()
            .and_then(|o| o.as_message().ok())
            .ok_or_else(|| AppError::upstream(MODEL_SERVICE, "Converse returned no message"))?;

        let text = message
            .content()
            .iter()
            .filter_map(|block| block.as_text().ok())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");

        let usage = output.usage().map(|u| TokenUsage {
            input_tokens: u.input_tokens(),
            output_tokens: u.output_tokens(),
        });

        Ok(ChatCompletion {
            text,
            stop_reason: Some(output.stop_reason().as_str().to_string()),
            usage,
        })
    }
}
