//! HTTP adapters for the completion and retrieval traits.
//!
//! Both use `reqwest::blocking`. Clients must be built and dropped outside an async
//! runtime, so async callers construct them on a blocking thread.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::domain::RetrievedDocument;
use super::services::{CompletionRequest, CompletionService, DocumentRetriever, ServiceError};
use crate::config::{LlmConfig, RetrievalConfig};

/// Chat-completions client for OpenAI-compatible endpoints. Temperature is pinned to zero.
pub struct OpenAiCompletionService {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OpenAiCompletionService {
    pub fn from_config(config: &LlmConfig) -> Result<Self, ServiceError> {
        let client = build_client(config.timeout)?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    fn body(&self, request: &CompletionRequest) -> serde_json::Value {
        json!({
            "model": self.model,
            "temperature": 0,
            "messages": [
                {"role": "system", "content": request.system},
                {"role": "user", "content": request.user},
            ],
        })
    }
}

impl CompletionService for OpenAiCompletionService {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(ServiceError::NotConfigured("OPENAI_API_KEY"))?;
        let url = format!("{}/v1/chat/completions", self.base_url);
        debug!(purpose = ?request.purpose, model = %self.model, "requesting completion");

        let response = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .json(&self.body(request))
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                code: status.as_u16(),
            });
        }

        let payload: ChatCompletion = response
            .json()
            .map_err(|err| ServiceError::Malformed(err.to_string()))?;
        payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| ServiceError::Malformed("completion had no content".to_string()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Retriever backed by a JSON search endpoint.
///
/// Sends `{"query", "k"}` and expects `{"documents": [{"text", "metadata"}]}` in ranked
/// order.
pub struct HttpRetriever {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    documents: Vec<RetrievedDocument>,
}

impl HttpRetriever {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, ServiceError> {
        Ok(Self {
            client: build_client(timeout)?,
            endpoint: endpoint.into(),
        })
    }

    /// `None` when no endpoint is configured.
    pub fn from_config(
        config: &RetrievalConfig,
        timeout: Duration,
    ) -> Result<Option<Self>, ServiceError> {
        config
            .endpoint
            .as_deref()
            .map(|endpoint| Self::new(endpoint, timeout))
            .transpose()
    }
}

impl DocumentRetriever for HttpRetriever {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, ServiceError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(&SearchRequest { query, k })
            .send()
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ServiceError::Status {
                code: status.as_u16(),
            });
        }

        let payload: SearchResponse = response
            .json()
            .map_err(|err| ServiceError::Malformed(err.to_string()))?;
        let mut documents = payload.documents;
        documents.truncate(k);
        debug!(documents = documents.len(), "retrieval completed");
        Ok(documents)
    }
}

fn build_client(timeout: Duration) -> Result<Client, ServiceError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(transport)
}

fn transport(err: reqwest::Error) -> ServiceError {
    ServiceError::Transport(err.to_string())
}
