use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;

use crate::workflows::mortgage::domain::{ConversationState, RetrievedDocument};
use crate::workflows::mortgage::engine::{EngineSettings, TurnEngine};
use crate::workflows::mortgage::rates::{RateRule, RateTable};
use crate::workflows::mortgage::services::{
    CompletionPurpose, CompletionRequest, CompletionService, DocumentRetriever, RetryPolicy,
    ServiceError,
};

/// Deterministic stand-in for the language model, answering by request purpose.
#[derive(Default)]
pub(super) struct HeuristicModel {
    requests: Mutex<Vec<CompletionRequest>>,
    irrelevant_context: bool,
    intent_reply: Option<String>,
}

impl HeuristicModel {
    pub(super) fn rejecting_context() -> Self {
        Self {
            irrelevant_context: true,
            ..Self::default()
        }
    }

    /// Answers every intent question with `reply` verbatim.
    pub(super) fn answering_intent(reply: &str) -> Self {
        Self {
            intent_reply: Some(reply.to_string()),
            ..Self::default()
        }
    }

    pub(super) fn requests(&self) -> Vec<CompletionRequest> {
        self.requests.lock().expect("lock").clone()
    }

    pub(super) fn calls_for(&self, purpose: CompletionPurpose) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.purpose == purpose)
            .count()
    }

    fn answer(&self, request: &CompletionRequest) -> String {
        let text = request.user.to_lowercase();
        match request.purpose {
            CompletionPurpose::TopicCheck => {
                if text.contains("weather") || text.contains("football") {
                    "no".to_string()
                } else {
                    "yes".to_string()
                }
            }
            CompletionPurpose::IntentRouting => {
                if let Some(reply) = &self.intent_reply {
                    reply.clone()
                } else if text.contains("apply") || text.contains("want a loan") {
                    "application".to_string()
                } else {
                    "qa".to_string()
                }
            }
            CompletionPurpose::RelevanceCheck => {
                let verdict = if self.irrelevant_context { "no" } else { "yes" };
                verdict.to_string()
            }
            CompletionPurpose::NumericExtraction => {
                first_number(&text).unwrap_or_else(|| "NONE".to_string())
            }
            CompletionPurpose::DownPaymentExtraction => match first_number(&text) {
                Some(number) if text.contains('%') || text.contains("percent") => {
                    format!("PERCENT:{number}")
                }
                Some(number) => format!("AMOUNT:{number}"),
                None => "NONE".to_string(),
            },
            CompletionPurpose::GroundedAnswer => "Closing usually takes 30 to 45 days.".to_string(),
            CompletionPurpose::GeneralAnswer => "Most lenders look at credit and income.".to_string(),
        }
    }
}

impl CompletionService for HeuristicModel {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        self.requests.lock().expect("lock").push(request.clone());
        Ok(self.answer(request))
    }
}

/// First run of digits in the text, ignoring `$` and `,` separators.
fn first_number(text: &str) -> Option<String> {
    let cleaned: String = text.chars().filter(|c| *c != ',' && *c != '$').collect();
    let start = cleaned.find(|c: char| c.is_ascii_digit())?;
    let number: String = cleaned[start..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    Some(number.trim_end_matches('.').to_string())
}

/// Fails the first `failures` calls, then defers to the heuristic model.
pub(super) struct FlakyModel {
    remaining_failures: AtomicUsize,
    pub(super) inner: HeuristicModel,
}

impl FlakyModel {
    pub(super) fn failing_first(failures: usize) -> Self {
        Self {
            remaining_failures: AtomicUsize::new(failures),
            inner: HeuristicModel::default(),
        }
    }
}

impl CompletionService for FlakyModel {
    fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
        let failing = self
            .remaining_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ServiceError::Transport("connection reset".to_string()));
        }
        self.inner.complete(request)
    }
}

#[derive(Default)]
pub(super) struct UnavailableModel {
    calls: AtomicUsize,
}

impl UnavailableModel {
    pub(super) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CompletionService for UnavailableModel {
    fn complete(&self, _request: &CompletionRequest) -> Result<String, ServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(ServiceError::Status { code: 503 })
    }
}

#[derive(Default)]
pub(super) struct MemoryRetriever {
    documents: Vec<RetrievedDocument>,
    requested_k: Mutex<Vec<usize>>,
}

impl MemoryRetriever {
    pub(super) fn with_texts(texts: &[&str]) -> Self {
        Self {
            documents: texts
                .iter()
                .map(|text| RetrievedDocument {
                    text: text.to_string(),
                    ..RetrievedDocument::default()
                })
                .collect(),
            requested_k: Mutex::new(Vec::new()),
        }
    }

    pub(super) fn requested_k(&self) -> Vec<usize> {
        self.requested_k.lock().expect("lock").clone()
    }
}

impl DocumentRetriever for MemoryRetriever {
    fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<RetrievedDocument>, ServiceError> {
        self.requested_k.lock().expect("lock").push(k);
        // returns everything regardless of k
        Ok(self.documents.clone())
    }
}

pub(super) fn rule(min_credit: u16, max_ltv: f64, max_dti: f64, term: u8, rate: f64) -> RateRule {
    RateRule {
        min_credit_score: min_credit,
        max_loan_to_value: max_ltv,
        max_debt_to_income: max_dti,
        loan_term: term,
        rate,
    }
}

pub(super) fn rate_table() -> RateTable {
    RateTable::new(vec![
        rule(760, 80.0, 36.0, 30, 6.5),
        rule(720, 80.0, 36.0, 30, 6.875),
        rule(680, 95.0, 50.0, 30, 7.5),
        rule(720, 80.0, 36.0, 15, 6.0),
    ])
}

pub(super) fn engine_with<C, R>(model: Arc<C>, retriever: Arc<R>) -> TurnEngine<C, R>
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    TurnEngine::with_settings(
        model,
        retriever,
        Arc::new(rate_table()),
        EngineSettings {
            retry: RetryPolicy::default(),
            top_k: 2,
        },
    )
}

pub(super) fn heuristic_engine() -> (
    TurnEngine<HeuristicModel, MemoryRetriever>,
    Arc<HeuristicModel>,
) {
    let model = Arc::new(HeuristicModel::default());
    let engine = engine_with(model.clone(), Arc::new(MemoryRetriever::default()));
    (engine, model)
}

/// Feeds utterances in order, threading the state like a caller would.
pub(super) fn converse<C, R>(
    engine: &TurnEngine<C, R>,
    state: ConversationState,
    utterances: &[&str],
) -> ConversationState
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    utterances
        .iter()
        .fold(state, |state, utterance| engine.process_turn(&state, utterance))
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}

pub(super) async fn read_text_body(response: Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    String::from_utf8(body.to_vec()).expect("utf-8 body")
}
