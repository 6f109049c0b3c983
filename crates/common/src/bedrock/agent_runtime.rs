//! Vector search through the Bedrock Agent Runtime `Retrieve` API

use super::sdk_failure;
use crate::errors::Result;
use crate::retrieval::{RetrievalMatch, VectorSearchClient};
use async_trait::async_trait;
use aws_sdk_bedrockagentruntime::types::{
    KnowledgeBaseQuery, KnowledgeBaseRetrievalConfiguration, KnowledgeBaseRetrievalResult,
    KnowledgeBaseVectorSearchConfiguration, RetrievalResultLocation,
};
use aws_sdk_bedrockagentruntime::Client;
use aws_smithy_types::Document;
use aws_types::SdkConfig;
use std::collections::HashMap;

/// Metadata key holding the remote chunk identifier
const CHUNK_ID_METADATA_KEY: &str = "x-amz-bedrock-kb-chunk-id";

const SERVICE: &str = "vector search";

/// Knowledge base retrieval via Bedrock
#[derive(Clone)]
pub struct BedrockVectorSearch {
    client: Client,
}

impl BedrockVectorSearch {
    pub fn new(sdk_config: &SdkConfig) -> Self {
        Self {
            client: Client::new(sdk_config),
        }
    }
}

#[async_trait]
impl VectorSearchClient for BedrockVectorSearch {
    async fn search(
        &self,
        knowledge_base_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<RetrievalMatch>> {
        let retrieval_query = KnowledgeBaseQuery::builder()
            .text(query)
            .build();

        let retrieval_configuration = KnowledgeBaseRetrievalConfiguration::builder()
            .vector_search_configuration(
                KnowledgeBaseVectorSearchConfiguration::builder()
                    .number_of_results(i32::try_from(limit).unwrap_or(i32::MAX))
                    .build(),
            )
            .build();

        let output = self
            .client
            .retrieve()
            .knowledge_base_id(knowledge_base_id)
            .retrieval_query(retrieval_query)
            .retrieval_configuration(retrieval_configuration)
            .send()
            .await
            .map_err(|e| sdk_failure(SERVICE, e))?;

        let matches: Vec<RetrievalMatch> = output
            .retrieval_results()
            .iter()
            .map(to_match)
            .collect();

        tracing::debug!(
            knowledge_base_id,
            count = matches.len(),
            "Bedrock retrieve returned"
        );

        Ok(matches)
    }

    fn name(&self) -> &str {
        "bedrock"
    }
}

fn to_match(result: &KnowledgeBaseRetrievalResult) -> RetrievalMatch {
    RetrievalMatch {
        text: result
            .content()
            .map(|content| content.text())
            .map(str::to_string),
        score: result.score().unwrap_or_default(),
        locator: result.location().and_then(location_uri),
        chunk_id: chunk_id(result.metadata()),
    }
}

fn chunk_id(metadata: Option<&HashMap<String, Document>>) -> Option<String> {
    match metadata?.get(CHUNK_ID_METADATA_KEY)? {
        Document::String(id) if !id.is_empty() => Some(id.clone()),
        _ => None,
    }
}

/// URI of the originating document, whichever data source it came from
fn location_uri(location: &RetrievalResultLocation) -> Option<String> {
    let uri = location
        .s3_location()
        .and_then(|l| l.uri())
        .or_else(|| location.web_location().and_then(|l| l.url()))
        .or_else(|| location.confluence_location().and_then(|l| l.url()))
        .or_else(|| location.salesforce_location().and_then(|l| l.url()))
        .or_else(|| location.share_point_location().and_then(|l| l.url()));

    uri.map(str::to_string)
}
