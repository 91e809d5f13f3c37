use super::common::*;
use std::sync::Arc;

use crate::workflows::mortgage::answer::GENERAL_KNOWLEDGE_DISCLOSURE;
use crate::workflows::mortgage::domain::{ApplicationStep, ConversationMode, ConversationState};
use crate::workflows::mortgage::services::CompletionPurpose;

#[test]
fn relevant_context_grounds_the_answer() {
    let model = Arc::new(HeuristicModel::default());
    let retriever = Arc::new(MemoryRetriever::with_texts(&[
        "Closing takes 30 to 45 days.",
        "Appraisals are ordered after the rate lock.",
        "Escrow accounts hold taxes and insurance.",
    ]));
    let engine = engine_with(model.clone(), retriever.clone());

    let state = engine.process_turn(&ConversationState::new(), "How long does a loan take to close?");

    assert_eq!(state.mode, ConversationMode::Qa);
    assert_eq!(state.intent.as_deref(), Some("qa"));
    assert_eq!(retriever.requested_k(), vec![2]);
    assert_eq!(state.retrieved_docs.len(), 2, "truncated to top_k");
    assert_eq!(
        state.context.as_deref(),
        Some("Closing takes 30 to 45 days.\n\nAppraisals are ordered after the rate lock.")
    );
    assert_eq!(model.calls_for(CompletionPurpose::GroundedAnswer), 1);
    assert_eq!(model.calls_for(CompletionPurpose::GeneralAnswer), 0);
    assert_eq!(
        state.final_response.as_deref(),
        Some("Closing usually takes 30 to 45 days.")
    );
}

#[test]
fn irrelevant_context_falls_back_to_general_answer() {
    let model = Arc::new(HeuristicModel::rejecting_context());
    let retriever = Arc::new(MemoryRetriever::with_texts(&["Office hours are 9 to 5."]));
    let engine = engine_with(model.clone(), retriever);

    let state = engine.process_turn(&ConversationState::new(), "What loan programs exist?");

    assert_eq!(state.context, None);
    assert_eq!(state.retrieved_docs.len(), 1);
    assert_eq!(model.calls_for(CompletionPurpose::RelevanceCheck), 1);
    assert_eq!(model.calls_for(CompletionPurpose::GeneralAnswer), 1);
    let reply = state.final_response.unwrap_or_default();
    assert!(reply.ends_with(GENERAL_KNOWLEDGE_DISCLOSURE), "{reply}");
}

#[test]
fn empty_retrieval_skips_relevance_check() {
    let (engine, model) = heuristic_engine();

    let state = engine.process_turn(&ConversationState::new(), "What is a good mortgage rate?");

    assert_eq!(state.context, None);
    assert!(state.retrieved_docs.is_empty());
    assert_eq!(model.calls_for(CompletionPurpose::RelevanceCheck), 0);
    let general = model
        .requests()
        .into_iter()
        .find(|request| request.purpose == CompletionPurpose::GeneralAnswer)
        .expect("general answer requested");
    assert!(general.system.contains("company-specific"));
}

#[test]
fn informational_question_routes_to_qa() {
    let (engine, model) = heuristic_engine();

    let state = engine.process_turn(&ConversationState::new(), "Tell me about refinancing");

    assert_eq!(state.mode, ConversationMode::Qa);
    assert_eq!(state.application_step(), None);
    assert_eq!(model.calls_for(CompletionPurpose::IntentRouting), 1);
}

#[test]
fn unrecognized_intent_reply_defaults_to_qa() {
    for reply in ["banana", "", "I think application"] {
        let model = Arc::new(HeuristicModel::answering_intent(reply));
        let engine = engine_with(model.clone(), Arc::new(MemoryRetriever::default()));

        let state = engine.process_turn(&ConversationState::new(), "What documents do I need?");

        assert_eq!(state.mode, ConversationMode::Qa, "{reply:?}");
        assert_eq!(state.application_step(), None, "{reply:?}");
        assert_eq!(state.intent.as_deref(), Some(reply));
        let answers = model.calls_for(CompletionPurpose::GeneralAnswer)
            + model.calls_for(CompletionPurpose::GroundedAnswer);
        assert_eq!(answers, 1, "{reply:?}");
    }
}

#[test]
fn quoted_or_uppercase_application_reply_starts_application() {
    for reply in ["'application'", "APPLICATION\n"] {
        let model = Arc::new(HeuristicModel::answering_intent(reply));
        let engine = engine_with(model.clone(), Arc::new(MemoryRetriever::default()));

        let state = engine.process_turn(&ConversationState::new(), "Can I get a loan?");

        assert_eq!(state.mode, ConversationMode::Application, "{reply:?}");
        assert_eq!(
            state.application_step(),
            Some(ApplicationStep::CreditScore),
            "{reply:?}"
        );
        assert_eq!(model.calls_for(CompletionPurpose::GeneralAnswer), 0);
    }
}
