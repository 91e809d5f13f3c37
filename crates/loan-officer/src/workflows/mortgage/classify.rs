use tracing::debug;

use super::domain::ConversationMode;
use super::services::{
    CompletionPurpose, CompletionRequest, CompletionService, RetryPolicy, ServiceError,
};

/// Vocabulary that marks an utterance as on-topic without calling the model.
pub const TOPIC_KEYWORDS: [&str; 8] = [
    "application",
    "apply",
    "mortgage",
    "loan",
    "rate",
    "borrow",
    "finance",
    "refinance",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicVerdict {
    OnTopic,
    OffTopic,
}

/// Routing decision for a turn with no application in progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentDecision {
    pub mode: ConversationMode,
    /// Raw classifier output, kept for diagnostics.
    pub raw: String,
}

pub fn matches_topic_keyword(utterance: &str) -> bool {
    let lowered = utterance.to_lowercase();
    TOPIC_KEYWORDS
        .iter()
        .any(|keyword| lowered.contains(keyword))
}

/// Binary and categorical classifiers sharing one completion service.
pub struct Classifier<'a, C: ?Sized> {
    completion: &'a C,
    retry: RetryPolicy,
}

impl<'a, C> Classifier<'a, C>
where
    C: CompletionService + ?Sized,
{
    pub fn new(completion: &'a C, retry: RetryPolicy) -> Self {
        Self { completion, retry }
    }

    pub fn topic(&self, utterance: &str) -> Result<TopicVerdict, ServiceError> {
        if matches_topic_keyword(utterance) {
            debug!("topic keyword fast path");
            return Ok(TopicVerdict::OnTopic);
        }

        let request =
            CompletionRequest::new(CompletionPurpose::TopicCheck, TOPIC_PROMPT, utterance);
        let reply = self
            .retry
            .run("topic_check", || self.completion.complete(&request))?;

        Ok(if is_affirmative_verdict(&reply) {
            TopicVerdict::OnTopic
        } else {
            TopicVerdict::OffTopic
        })
    }

    /// Anything other than a clean `application` answer routes to Q&A.
    pub fn intent(&self, utterance: &str) -> Result<IntentDecision, ServiceError> {
        let request =
            CompletionRequest::new(CompletionPurpose::IntentRouting, INTENT_PROMPT, utterance);
        let raw = self
            .retry
            .run("intent_routing", || self.completion.complete(&request))?;

        let mode = match normalize_verdict(&raw).as_str() {
            "application" => ConversationMode::Application,
            _ => ConversationMode::Qa,
        };
        Ok(IntentDecision { mode, raw })
    }

    pub fn context_is_relevant(&self, context: &str, question: &str) -> Result<bool, ServiceError> {
        let request = CompletionRequest::new(
            CompletionPurpose::RelevanceCheck,
            relevance_prompt(context, question),
            "Is the context relevant?",
        );
        let reply = self
            .retry
            .run("relevance_check", || self.completion.complete(&request))?;
        Ok(is_affirmative_verdict(&reply))
    }
}

fn normalize_verdict(reply: &str) -> String {
    reply
        .trim()
        .trim_matches(|c: char| c == '\'' || c == '"' || c == '.' || c == '`')
        .to_ascii_lowercase()
}

fn is_affirmative_verdict(reply: &str) -> bool {
    normalize_verdict(reply) == "yes"
}

const TOPIC_PROMPT: &str = "You are a topic validator for a mortgage/loan officer assistant. Determine if the user's message is related to loans, mortgages, or home financing.\n\n\
Respond with only 'yes' if it's related to loans/mortgages, or 'no' if it's about something completely unrelated (like weather, sports, etc.).";

const INTENT_PROMPT: &str = "You are a routing assistant. Determine if the user wants to:\n\
1. Ask a question about loans (respond with 'qa')\n\
2. Start a mortgage application process (respond with 'application')\n\n\
User wants to START AN APPLICATION if they say things like:\n\
- \"I want a loan\"\n\
- \"I want to apply\"\n\
- \"I need a mortgage\"\n\
- \"I want to start an application\"\n\
- \"Can I get a loan?\"\n\
- \"I'd like to borrow money\"\n\n\
User wants Q&A if they ask informational questions like:\n\
- \"What are your rates?\"\n\
- \"How does the process work?\"\n\
- \"What documents do I need?\"\n\
- \"Tell me about your loan terms\"\n\n\
Respond with only 'qa' or 'application'.";

fn relevance_prompt(context: &str, question: &str) -> String {
    format!(
        "You are a relevance evaluator. Determine if the provided context contains information that can answer the user's question.\n\n\
Context:\n{context}\n\n\
Question: {question}\n\n\
Respond with only 'yes' if the context contains relevant information to answer the question, or 'no' if it does not."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_match_is_case_insensitive_substring() {
        assert!(matches_topic_keyword("What RATES do you offer?"));
        assert!(matches_topic_keyword("I'd like to Refinance"));
        assert!(matches_topic_keyword("loans please"));
        assert!(!matches_topic_keyword("What's the weather like?"));
    }

    #[test]
    fn verdicts_tolerate_quotes_and_punctuation() {
        assert!(is_affirmative_verdict(" Yes. "));
        assert!(is_affirmative_verdict("'yes'"));
        assert!(!is_affirmative_verdict("yes, definitely"));
        assert!(!is_affirmative_verdict("no"));
        assert_eq!(normalize_verdict("\"Application\""), "application");
    }
}
