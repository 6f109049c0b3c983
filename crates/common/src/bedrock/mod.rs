//! AWS Bedrock implementations of the remote seams
//!
//! - `BedrockVectorSearch`: Agent Runtime `Retrieve`
//! - `BedrockKnowledgeBaseRegistry`: Agent `ListKnowledgeBases`
//! - `BedrockChatModel`: Runtime `Converse`

mod agent;
mod agent_runtime;
mod runtime;

pub use agent::BedrockKnowledgeBaseRegistry;
pub use agent_runtime::BedrockVectorSearch;
pub use runtime::BedrockChatModel;

use crate::config::AwsConfig;
use crate::errors::AppError;
use aws_config::BehaviorVersion;
use aws_sdk_bedrockagentruntime::config::Credentials;
use aws_sdk_bedrockagentruntime::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use aws_types::{region::Region, SdkConfig};

/// Load the shared SDK configuration.
///
/// Static keys from config win; otherwise the default credential chain
/// (environment, profile, instance role) applies.
pub async fn load_sdk_config(aws: &AwsConfig) -> SdkConfig {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(aws.region.clone()));

    if let (Some(access_key), Some(secret_key)) = (&aws.access_key_id, &aws.secret_access_key) {
        tracing::info!("Using static AWS credentials from configuration");
        loader = loader.credentials_provider(Credentials::new(
            access_key.clone(),
            secret_key.clone(),
            aws.session_token.clone(),
            None,
            "kbridge-config",
        ));
    }

    if let Some(endpoint) = &aws.endpoint_url {
        loader = loader.endpoint_url(endpoint.clone());
    }

    let sdk_config = loader.load().await;
    tracing::info!(region = %aws.region, "AWS SDK configuration loaded");
    sdk_config
}

/// Convert an SDK failure into an upstream error, keeping code and context for logs
pub(crate) fn sdk_failure<E, R>(service: &str, err: SdkError<E, R>) -> AppError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    if matches!(err, SdkError::TimeoutError(_)) {
        return AppError::UpstreamTimeout {
            service: service.to_string(),
        };
    }

    let code = err.code().unwrap_or("Unknown").to_string();
    AppError::upstream(service, format!("{}: {}", code, DisplayErrorContext(&err)))
}
