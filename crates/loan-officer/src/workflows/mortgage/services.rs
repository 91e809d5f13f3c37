use serde::{Deserialize, Serialize};
use tracing::warn;

use super::domain::RetrievedDocument;

/// What a completion request is for. Adapters ignore it apart from logging; test doubles
/// use it to answer deterministically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionPurpose {
    TopicCheck,
    IntentRouting,
    RelevanceCheck,
    NumericExtraction,
    DownPaymentExtraction,
    GroundedAnswer,
    GeneralAnswer,
}

/// A single system-plus-user exchange with the language model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub purpose: CompletionPurpose,
    pub system: String,
    pub user: String,
}

impl CompletionRequest {
    pub fn new(
        purpose: CompletionPurpose,
        system: impl Into<String>,
        user: impl Into<String>,
    ) -> Self {
        Self {
            purpose,
            system: system.into(),
            user: user.into(),
        }
    }
}

/// Blocking language-model completion. Responses are free text; callers parse defensively.
pub trait CompletionService: Send + Sync {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError>;
}

/// Blocking document retrieval returning at most `k` passages in ranked order.
pub trait DocumentRetriever: Send + Sync {
    fn retrieve(&self, query: &str, k: usize) -> Result<Vec<RetrievedDocument>, ServiceError>;
}

/// Failure talking to an external collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ServiceError {
    #[error("service transport failed: {0}")]
    Transport(String),
    #[error("service responded with status {code}")]
    Status { code: u16 },
    #[error("service response was malformed: {0}")]
    Malformed(String),
    #[error("service is not configured: {0}")]
    NotConfigured(&'static str),
}

/// Retriever used when no company corpus is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyRetriever;

impl DocumentRetriever for EmptyRetriever {
    fn retrieve(&self, _query: &str, _k: usize) -> Result<Vec<RetrievedDocument>, ServiceError> {
        Ok(Vec::new())
    }
}

/// Attempt budget applied uniformly to every external call made during a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub(crate) fn run<T>(
        &self,
        operation: &'static str,
        mut call: impl FnMut() -> Result<T, ServiceError>,
    ) -> Result<T, ServiceError> {
        let mut attempt = 1;
        loop {
            match call() {
                Ok(value) => return Ok(value),
                Err(ServiceError::NotConfigured(what)) => {
                    return Err(ServiceError::NotConfigured(what))
                }
                Err(err) if attempt < self.max_attempts => {
                    warn!(operation, attempt, error = %err, "external call failed; retrying");
                    attempt += 1;
                }
                Err(err) => {
                    warn!(operation, attempt, error = %err, "external call failed; giving up");
                    return Err(err);
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    /// One retry.
    fn default() -> Self {
        Self::new(2)
    }
}
