//! Mortgage assistant turn processing.
//!
//! A turn routes to one of two chains. Q&A retrieves company passages, checks their
//! relevance, and answers. The application chain fills slots one step per turn and
//! finishes with a rate lookup against the ordered rate matrix. Conversation state is
//! owned by the caller and round-trips through [`TurnEngine::process_turn`].

pub mod answer;
pub mod classify;
pub mod clients;
pub mod domain;
pub mod engine;
pub mod extraction;
pub mod rates;
pub mod router;
pub mod services;
pub mod steps;

#[cfg(test)]
mod tests;

pub use clients::{HttpRetriever, OpenAiCompletionService};
pub use domain::{
    ApplicationSlots, ApplicationStep, ConversationMode, ConversationState, DerivedMetrics,
    LoanTerm, RetrievedDocument, SUBPRIME_THRESHOLD,
};
pub use engine::{EngineSettings, TurnEngine, OFF_TOPIC_MESSAGE, SERVICE_UNAVAILABLE_MESSAGE};
pub use rates::{RateInputs, RateQuote, RateRule, RateTable, RateTableError};
pub use router::{conversation_router, QuoteRequest, QuoteResponse, TurnRequest, TurnResponse};
pub use services::{
    CompletionPurpose, CompletionRequest, CompletionService, DocumentRetriever, EmptyRetriever,
    RetryPolicy, ServiceError,
};
