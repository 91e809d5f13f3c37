use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::error;

use super::domain::{ConversationState, LoanTerm};
use super::engine::TurnEngine;
use super::rates::{tool, RateInputs};
use super::services::{CompletionService, DocumentRetriever};

/// One conversational turn. An absent state starts a new conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct TurnRequest {
    #[serde(default)]
    pub state: Option<ConversationState>,
    pub utterance: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnResponse {
    pub reply: Option<String>,
    pub state: ConversationState,
}

/// Direct rate lookup, bypassing the conversation.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteRequest {
    pub credit_score: u16,
    pub ltv: f64,
    pub dti: f64,
    pub loan_term: LoanTerm,
}

#[derive(Debug, Clone, Serialize)]
pub struct QuoteResponse {
    pub rate: Option<f64>,
    pub message: String,
}

/// Router builder exposing the conversation and rate endpoints.
pub fn conversation_router<C, R>(engine: Arc<TurnEngine<C, R>>) -> Router
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    Router::new()
        .route("/api/v1/conversation/turn", post(turn_handler::<C, R>))
        .route("/api/v1/rates/quote", post(quote_handler::<C, R>))
        .route("/api/v1/rates/tool", post(tool_handler::<C, R>))
        .with_state(engine)
}

pub(crate) async fn turn_handler<C, R>(
    State(engine): State<Arc<TurnEngine<C, R>>>,
    axum::Json(request): axum::Json<TurnRequest>,
) -> Response
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    let TurnRequest { state, utterance } = request;
    let state = state.unwrap_or_default();

    // model and retrieval calls block
    let outcome =
        tokio::task::spawn_blocking(move || engine.process_turn(&state, &utterance)).await;

    match outcome {
        Ok(state) => {
            let view = TurnResponse {
                reply: state.final_response.clone(),
                state,
            };
            (StatusCode::OK, axum::Json(view)).into_response()
        }
        Err(join_error) => {
            error!(error = %join_error, "turn worker panicked");
            let payload = json!({
                "error": "turn processing failed",
            });
            (StatusCode::INTERNAL_SERVER_ERROR, axum::Json(payload)).into_response()
        }
    }
}

pub(crate) async fn quote_handler<C, R>(
    State(engine): State<Arc<TurnEngine<C, R>>>,
    axum::Json(request): axum::Json<QuoteRequest>,
) -> Response
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    if !request.ltv.is_finite() || !request.dti.is_finite() {
        let payload = json!({
            "error": "ltv and dti must be finite percentages",
        });
        return (StatusCode::UNPROCESSABLE_ENTITY, axum::Json(payload)).into_response();
    }

    let inputs = RateInputs::new(
        request.credit_score,
        request.ltv,
        request.dti,
        request.loan_term,
    );
    let quote = engine.rates().lookup(&inputs);
    let view = QuoteResponse {
        rate: quote.rate(),
        message: quote.describe(),
    };
    (StatusCode::OK, axum::Json(view)).into_response()
}

/// Plain-text boundary for tool-calling agents; always answers 200 with a sentence.
pub(crate) async fn tool_handler<C, R>(
    State(engine): State<Arc<TurnEngine<C, R>>>,
    body: String,
) -> Response
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    (StatusCode::OK, tool::run(engine.rates(), &body)).into_response()
}
