use std::sync::Arc;

use tracing::{debug, info, warn};

use super::answer::{QaChain, DEFAULT_TOP_K};
use super::classify::{Classifier, TopicVerdict};
use super::domain::{ConversationMode, ConversationState};
use super::rates::RateTable;
use super::services::{CompletionService, DocumentRetriever, RetryPolicy, ServiceError};
use super::steps::{start_application, StepHandlers};

pub const OFF_TOPIC_MESSAGE: &str = "Sorry, I am only an expert in loan and mortgage related things. Please ask a question related to that or let me know if you want to start an application.";

pub const SERVICE_UNAVAILABLE_MESSAGE: &str = "I'm sorry, I'm having trouble reaching one of my services right now. Please try again in a moment.";

/// Tuning knobs for a [`TurnEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    pub retry: RetryPolicy,
    pub top_k: usize,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            top_k: DEFAULT_TOP_K,
        }
    }
}

/// Node the dispatcher picked for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Resume(super::domain::ApplicationStep),
    Classify,
}

/// Stateless turn processor. All conversation state arrives with each call and leaves
/// with its result, so one engine serves any number of conversations.
pub struct TurnEngine<C, R> {
    completion: Arc<C>,
    retriever: Arc<R>,
    rates: Arc<RateTable>,
    settings: EngineSettings,
}

impl<C, R> Clone for TurnEngine<C, R> {
    fn clone(&self) -> Self {
        Self {
            completion: self.completion.clone(),
            retriever: self.retriever.clone(),
            rates: self.rates.clone(),
            settings: self.settings,
        }
    }
}

impl<C, R> TurnEngine<C, R>
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    pub fn new(completion: Arc<C>, retriever: Arc<R>, rates: Arc<RateTable>) -> Self {
        Self::with_settings(completion, retriever, rates, EngineSettings::default())
    }

    pub fn with_settings(
        completion: Arc<C>,
        retriever: Arc<R>,
        rates: Arc<RateTable>,
        settings: EngineSettings,
    ) -> Self {
        Self {
            completion,
            retriever,
            rates,
            settings,
        }
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    /// Consumes one utterance and returns the next state with `final_response` set.
    ///
    /// External-service failures never escape: the incoming state is returned with only
    /// `user_input` and an apology updated.
    pub fn process_turn(&self, state: &ConversationState, utterance: &str) -> ConversationState {
        let mut incoming = state.clone();
        incoming.user_input = utterance.to_string();
        incoming.final_response = None;
        debug!(utterance, "processing turn");

        match self.dispatch(incoming.clone()) {
            Ok(next) => next,
            Err(err) => {
                warn!(error = %err, "turn failed after retries; replying with apology");
                incoming.respond(SERVICE_UNAVAILABLE_MESSAGE)
            }
        }
    }

    fn route(state: &ConversationState) -> Route {
        match state.application_step() {
            Some(step) if step.is_resumable() => Route::Resume(step),
            _ => Route::Classify,
        }
    }

    fn dispatch(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        match Self::route(&state) {
            Route::Resume(step) => {
                info!(step = step.label(), "resuming application step");
                StepHandlers::new(self.completion.as_ref(), self.settings.retry, &self.rates)
                    .handle(step, state)
            }
            Route::Classify => self.classify_and_route(state),
        }
    }

    fn classify_and_route(
        &self,
        state: ConversationState,
    ) -> Result<ConversationState, ServiceError> {
        let state = self.validate_topic(state)?;
        if state.mode == ConversationMode::Error {
            return Ok(state);
        }

        let classifier = Classifier::new(self.completion.as_ref(), self.settings.retry);
        let decision = classifier.intent(&state.user_input)?;
        info!(mode = decision.mode.label(), "intent routed");

        let mut state = state;
        state.intent = Some(decision.raw.trim().to_string());
        state.mode = decision.mode;

        match decision.mode {
            ConversationMode::Application => Ok(start_application(state)),
            ConversationMode::Qa | ConversationMode::Error => QaChain::new(
                self.completion.as_ref(),
                self.retriever.as_ref(),
                self.settings.retry,
                self.settings.top_k,
            )
            .run(state),
        }
    }

    /// Off-topic input flips the mode to `Error`; on-topic input heals a previous `Error`.
    fn validate_topic(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, ServiceError> {
        let verdict = Classifier::new(self.completion.as_ref(), self.settings.retry)
            .topic(&state.user_input)?;

        match verdict {
            TopicVerdict::OnTopic => {
                if state.mode == ConversationMode::Error {
                    state.mode = ConversationMode::Qa;
                }
                Ok(state)
            }
            TopicVerdict::OffTopic => {
                info!("off-topic utterance rejected");
                state.mode = ConversationMode::Error;
                Ok(state.respond(OFF_TOPIC_MESSAGE))
            }
        }
    }
}
