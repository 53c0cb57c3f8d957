//! LLM extractor collaborator (spec §6: `extract<T>(ScraperResponse,
//! ExtractionOptions{schema}) -> ScraperResponse & {data:T}`). The
//! provider abstraction and prompt engineering are explicitly out of
//! scope for the core (spec §1); this is the thin adapter the
//! orchestrator calls through, following the same remote-offload shape
//! as [`crate::lighthouse::LighthouseRunner`].

use crate::models::{ExtractionOptions, ScraperResponse};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("llm provider request failed: {0}")]
    Request(String),
    #[error("llm provider returned invalid json: {0}")]
    InvalidResponse(String),
    #[error("no llm provider configured")]
    NotConfigured,
}

/// Schema-guided extraction against a configured LLM provider endpoint.
/// The endpoint is expected to accept `{content, schema, prompt?}` and
/// return `{data: <value matching schema>}` — the actual provider and
/// prompting strategy live behind this HTTP boundary, not in this crate.
#[derive(Clone)]
pub struct LlmExtractor {
    client: reqwest::Client,
    endpoint: Option<String>,
}

impl LlmExtractor {
    pub fn new(endpoint: Option<String>) -> Self {
        LlmExtractor {
            client: reqwest::Client::new(),
            endpoint,
        }
    }

    pub async fn extract(
        &self,
        mut response: ScraperResponse,
        options: &ExtractionOptions,
    ) -> Result<ScraperResponse, LlmError> {
        let Some(endpoint) = self.endpoint.as_deref() else {
            return Err(LlmError::NotConfigured);
        };

        let body = self
            .client
            .post(endpoint)
            .timeout(Duration::from_secs(60))
            .json(&serde_json::json!({
                "content": response.content,
                "schema": options.schema,
                "prompt": options.prompt,
            }))
            .send()
            .await
            .map_err(|e| LlmError::Request(e.to_string()))?
            .json::<serde_json::Value>()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let data = body
            .get("data")
            .cloned()
            .ok_or_else(|| LlmError::InvalidResponse("missing 'data' key".to_string()))?;

        response.extracted_data = Some(data);
        Ok(response)
    }
}
