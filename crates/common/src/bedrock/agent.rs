//! Knowledge base registry through the Bedrock Agent `ListKnowledgeBases` API

use super::sdk_failure;
use crate::errors::Result;
use crate::knowledge_base::{KnowledgeBase, KnowledgeBaseRegistry, REGISTRY_SERVICE};
use async_trait::async_trait;
use aws_sdk_bedrockagent::types::KnowledgeBaseSummary;
use aws_sdk_bedrockagent::{config::Builder, Client};
use aws_smithy_types::DateTime as SmithyDateTime;
use aws_types::{region::Region, SdkConfig};
use chrono::{DateTime, Utc};

/// Lists knowledge bases in any region, reusing shared credentials
#[derive(Clone)]
pub struct BedrockKnowledgeBaseRegistry {
    sdk_config: SdkConfig,
}

impl BedrockKnowledgeBaseRegistry {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            sdk_config: sdk_config.clone(),
        }
    }

    fn client_for(&self, region: &str) -> Client {
        let config = Builder::from(&self.sdk_config)
            .region(Region::new(region.to_string()))
            .build();
        Client::from_conf(config)
    }
}

#[async_trait]
impl KnowledgeBaseRegistry for BedrockKnowledgeBaseRegistry {
    async fn list(&self, region: &str) -> Result<Vec<KnowledgeBase>> {
        let client = self.client_for(region);
        let mut knowledge_bases = Vec::new();
        let mut next_token: Option<String> = None;

        loop {
            let page = client
                .list_knowledge_bases()
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| sdk_failure(REGISTRY_SERVICE, e))?;

            knowledge_bases.extend(page.knowledge_base_summaries().iter().map(to_knowledge_base));

            match page.next_token() {
                Some(token) if !token.is_empty() => next_token = Some(token.to_string()),
                _ => break,
            }
        }

        tracing::debug!(region, count = knowledge_bases.len(), "Bedrock knowledge bases listed");
        Ok(knowledge_bases)
    }
}

fn to_knowledge_base(summary: &KnowledgeBaseSummary) -> KnowledgeBase {
    KnowledgeBase {
        id: summary.knowledge_base_id().to_string(),
        name: summary.name().to_string(),
        description: summary.description().map(str::to_string),
        status: summary.status().as_str().to_string(),
        updated_at: to_utc(summary.updated_at()),
    }
}

fn to_utc(timestamp: &SmithyDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.secs(), timestamp.subsec_nanos()).unwrap_or_default()
}
