use tracing::debug;

use super::classify::Classifier;
use super::domain::{ConversationState, RetrievedDocument};
use super::services::{
    CompletionPurpose, CompletionRequest, CompletionService, DocumentRetriever, RetryPolicy,
    ServiceError,
};

/// Passages requested per question unless configured otherwise.
pub const DEFAULT_TOP_K: usize = 3;

/// Disclosure appended when the answer model omits it for an ungrounded reply.
pub const GENERAL_KNOWLEDGE_DISCLOSURE: &str = "Note: this answer is based on general mortgage knowledge and may not reflect company-specific policies. Please verify with official documentation.";

/// Retrieve, filter, answer.
pub struct QaChain<'a, C: ?Sized, R: ?Sized> {
    completion: &'a C,
    retriever: &'a R,
    retry: RetryPolicy,
    top_k: usize,
}

impl<'a, C, R> QaChain<'a, C, R>
where
    C: CompletionService + ?Sized,
    R: DocumentRetriever + ?Sized,
{
    pub fn new(completion: &'a C, retriever: &'a R, retry: RetryPolicy, top_k: usize) -> Self {
        Self {
            completion,
            retriever,
            retry,
            top_k,
        }
    }

    pub fn run(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        let state = self.retrieve(state)?;
        let state = self.filter_relevance(state)?;
        self.answer(state)
    }

    fn retrieve(&self, mut state: ConversationState) -> Result<ConversationState, ServiceError> {
        let mut docs = self.retry.run("retrieve_documents", || {
            self.retriever.retrieve(&state.user_input, self.top_k)
        })?;
        docs.truncate(self.top_k);

        state.context = join_context(&docs);
        debug!(documents = docs.len(), "retrieved context");
        state.retrieved_docs = docs;
        Ok(state)
    }

    /// Irrelevant context is discarded, which switches the answer prompt.
    fn filter_relevance(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, ServiceError> {
        let Some(context) = state.context.as_deref() else {
            return Ok(state);
        };

        let relevant = Classifier::new(self.completion, self.retry)
            .context_is_relevant(context, &state.user_input)?;
        debug!(relevant, "context relevance verdict");
        if !relevant {
            state.context = None;
        }
        Ok(state)
    }

    fn answer(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        let request = match state.context.as_deref() {
            Some(context) => CompletionRequest::new(
                CompletionPurpose::GroundedAnswer,
                grounded_prompt(context),
                state.user_input.as_str(),
            ),
            None => CompletionRequest::new(
                CompletionPurpose::GeneralAnswer,
                GENERAL_PROMPT,
                state.user_input.as_str(),
            ),
        };

        let reply = self
            .retry
            .run("answer_question", || self.completion.complete(&request))?;
        let reply = reply.trim().to_string();

        let message = if state.context.is_none() && !discloses_policy_caveat(&reply) {
            format!("{reply}\n\n{GENERAL_KNOWLEDGE_DISCLOSURE}")
        } else {
            reply
        };
        Ok(state.respond(message))
    }
}

/// Ranked passages joined by blank lines; `None` when nothing came back.
fn join_context(docs: &[RetrievedDocument]) -> Option<String> {
    let joined = docs
        .iter()
        .map(|doc| doc.text.trim())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n");
    (!joined.is_empty()).then_some(joined)
}

fn discloses_policy_caveat(reply: &str) -> bool {
    let lowered = reply.to_lowercase();
    lowered.contains("company-specific") || lowered.contains("company specific")
}

fn grounded_prompt(context: &str) -> String {
    format!(
        "You are a helpful loan officer assistant. Answer the user's question based on the provided context from company documents.\n\n\
Context:\n{context}"
    )
}

const GENERAL_PROMPT: &str = "You are a helpful loan officer assistant. Answer the user's question using your general knowledge about loans and mortgages.\n\n\
IMPORTANT: Mention that this information might not reflect company-specific policies and the user should verify with official documentation.";
