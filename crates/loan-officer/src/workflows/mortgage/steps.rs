//! Slot-filling handlers for the mortgage application.
//!
//! Each handler takes the incoming state by value and returns the next one. On invalid
//! input a handler re-emits its own step with a corrective prompt and leaves every slot
//! untouched.

use tracing::{debug, info, warn};

use super::domain::{
    group_thousands, ApplicationSlots, ApplicationStep, ConversationMode, ConversationState,
    DerivedMetrics, LoanTerm, SUBPRIME_THRESHOLD,
};
use super::extraction::NumericExtractor;
use super::rates::{RateInputs, RateQuote, RateTable};
use super::services::{CompletionService, RetryPolicy, ServiceError};

pub const CREDIT_SCORE_RANGE: std::ops::RangeInclusive<u16> = 300..=850;

const AFFIRMATIVE_TOKENS: [&str; 4] = ["yes", "y", "continue", "proceed"];

pub(crate) mod prompts {
    pub const START: &str =
        "Great! Let's start your mortgage application. First, what is your credit score?";
    pub const SUBPRIME_WARNING: &str = "Score below 620 is considered subprime and is much harder to approve. You should improve your credit score first, but if you want to continue the process, we can. Do you want to continue? (yes/no)";
    pub const HOME_VALUE: &str = "Great! What is the estimated home value/price?";
    pub const SUBPRIME_CONTINUE: &str =
        "Understood. Let's continue. What is the estimated home value/price?";
    pub const SUBPRIME_DECLINED: &str = "I understand. I'd recommend working on improving your credit score before applying. Feel free to come back when you're ready!";
    pub const DOWN_PAYMENT: &str = "How much down payment can you make?";
    pub const INCOME: &str = "What is your annual income?";
    pub const DEBTS: &str = "What are your total monthly debt payments?";
    pub const LOAN_TERM: &str = "What loan term do you prefer? (15 or 30 years)";

    pub const INVALID_CREDIT_SCORE: &str =
        "Please enter a valid credit score (a number between 300 and 850).";
    pub const INVALID_HOME_VALUE: &str = "Please enter a valid home value (numeric value).";
    pub const INVALID_DOWN_PAYMENT: &str = "Please enter a valid down payment amount (either a dollar amount or percentage) that does not exceed the home value.";
    pub const INVALID_INCOME: &str = "Please enter a valid annual income (numeric value).";
    pub const INVALID_DEBTS: &str = "Please enter a valid monthly debt amount (numeric value).";
    pub const INVALID_LOAN_TERM: &str = "Please choose either 15 or 30 years.";
    pub const INCOMPLETE_APPLICATION: &str = "I'm missing some of your application details, so I can't calculate a rate yet. Let's start a new application when you're ready.";
}

/// Opens a fresh application pass, clearing slots left from any previous one.
pub fn start_application(mut state: ConversationState) -> ConversationState {
    state.application = ApplicationSlots::default();
    state.calculated_rate = None;
    state.mode = ConversationMode::Application;
    state
        .at_step(ApplicationStep::CreditScore)
        .respond(prompts::START)
}

/// Dependencies shared by the step handlers for one turn.
pub struct StepHandlers<'a, C: ?Sized> {
    extractor: NumericExtractor<'a, C>,
    rates: &'a RateTable,
}

impl<'a, C> StepHandlers<'a, C>
where
    C: CompletionService + ?Sized,
{
    pub fn new(completion: &'a C, retry: RetryPolicy, rates: &'a RateTable) -> Self {
        Self {
            extractor: NumericExtractor::new(completion, retry),
            rates,
        }
    }

    pub fn handle(
        &self,
        step: ApplicationStep,
        state: ConversationState,
    ) -> Result<ConversationState, ServiceError> {
        match step {
            ApplicationStep::CreditScore => self.credit_score(state),
            ApplicationStep::SubprimeConfirmation => Ok(subprime_confirmation(state)),
            ApplicationStep::HomeValue => self.home_value(state),
            ApplicationStep::DownPayment => self.down_payment(state),
            ApplicationStep::Income => self.income(state),
            ApplicationStep::Debts => self.debts(state),
            ApplicationStep::LoanTerm => Ok(loan_term(state)),
            ApplicationStep::CalculateRate => Ok(calculate_rate(state, self.rates)),
            ApplicationStep::Ended => Ok(state),
        }
    }

    fn credit_score(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        let score = self
            .extractor
            .extract(&state.user_input, "credit score")?
            .map(f64::trunc)
            .filter(|value| *value <= f64::from(u16::MAX))
            .map(|value| value as u16)
            .filter(|score| CREDIT_SCORE_RANGE.contains(score));

        let Some(score) = score else {
            return Ok(reprompt(state, ApplicationStep::CreditScore, prompts::INVALID_CREDIT_SCORE));
        };

        let mut state = state;
        state.application.credit_score = Some(score);
        if score < SUBPRIME_THRESHOLD {
            info!(score, "subprime credit score; asking for confirmation");
            Ok(state
                .at_step(ApplicationStep::SubprimeConfirmation)
                .respond(prompts::SUBPRIME_WARNING))
        } else {
            Ok(state
                .at_step(ApplicationStep::HomeValue)
                .respond(prompts::HOME_VALUE))
        }
    }

    fn home_value(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        let value = self
            .extractor
            .extract(&state.user_input, "home value")?
            .and_then(whole_amount)
            .filter(|value| *value > 0);

        let Some(value) = value else {
            return Ok(reprompt(state, ApplicationStep::HomeValue, prompts::INVALID_HOME_VALUE));
        };

        let mut state = state;
        state.application.home_value = Some(value);
        Ok(state
            .at_step(ApplicationStep::DownPayment)
            .respond(prompts::DOWN_PAYMENT))
    }

    fn down_payment(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        let Some(home_value) = state.application.home_value else {
            warn!("down payment step reached without a home value");
            return Ok(reprompt(state, ApplicationStep::DownPayment, prompts::INVALID_DOWN_PAYMENT));
        };

        let amount = self
            .extractor
            .extract_down_payment(&state.user_input)?
            .and_then(|input| input.resolve(home_value));

        let Some(amount) = amount else {
            return Ok(reprompt(state, ApplicationStep::DownPayment, prompts::INVALID_DOWN_PAYMENT));
        };

        let mut state = state;
        state.application.down_payment = Some(amount);
        // loan_amount is derived here and nowhere else
        state.application.loan_amount = Some(home_value - amount);
        Ok(state
            .at_step(ApplicationStep::Income)
            .respond(prompts::INCOME))
    }

    fn income(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        let income = self
            .extractor
            .extract(&state.user_input, "annual income")?
            .and_then(whole_amount)
            .filter(|value| *value > 0);

        let Some(income) = income else {
            return Ok(reprompt(state, ApplicationStep::Income, prompts::INVALID_INCOME));
        };

        let mut state = state;
        state.application.income = Some(income);
        Ok(state
            .at_step(ApplicationStep::Debts)
            .respond(prompts::DEBTS))
    }

    fn debts(&self, state: ConversationState) -> Result<ConversationState, ServiceError> {
        let Some(debts) = self
            .extractor
            .extract(&state.user_input, "monthly debt payment")?
        else {
            return Ok(reprompt(state, ApplicationStep::Debts, prompts::INVALID_DEBTS));
        };

        let mut state = state;
        state.application.debts = Some(debts);
        Ok(state
            .at_step(ApplicationStep::LoanTerm)
            .respond(prompts::LOAN_TERM))
    }
}

/// Only an exact affirmative token continues; anything else declines.
pub fn subprime_confirmation(mut state: ConversationState) -> ConversationState {
    let answer = state
        .user_input
        .trim()
        .trim_end_matches(['.', '!'])
        .to_lowercase();

    if AFFIRMATIVE_TOKENS.contains(&answer.as_str()) {
        state.application.subprime_continue = Some(true);
        state
            .at_step(ApplicationStep::HomeValue)
            .respond(prompts::SUBPRIME_CONTINUE)
    } else {
        state.application.subprime_continue = Some(false);
        state
            .at_step(ApplicationStep::Ended)
            .respond(prompts::SUBPRIME_DECLINED)
    }
}

pub fn loan_term(state: ConversationState) -> ConversationState {
    let Some(term) = parse_loan_term(&state.user_input) else {
        return reprompt(state, ApplicationStep::LoanTerm, prompts::INVALID_LOAN_TERM);
    };

    let mut state = state;
    state.application.loan_term = Some(term);
    let Some(metrics) = DerivedMetrics::from_slots(&state.application) else {
        warn!("loan term step reached with incomplete application slots");
        return state
            .at_step(ApplicationStep::Ended)
            .respond(prompts::INCOMPLETE_APPLICATION);
    };

    let summary = loan_summary(&state.application, metrics.rounded(), term);
    state
        .at_step(ApplicationStep::CalculateRate)
        .respond(summary)
}

/// Recomputes the metrics from the slots, looks up the rate, and ends the pass.
pub fn calculate_rate(mut state: ConversationState, rates: &RateTable) -> ConversationState {
    let slots = &state.application;
    let (Some(credit_score), Some(term), Some(metrics)) = (
        slots.credit_score,
        slots.loan_term,
        DerivedMetrics::from_slots(slots),
    ) else {
        warn!("rate calculation reached with incomplete application slots");
        return state
            .at_step(ApplicationStep::Ended)
            .respond(prompts::INCOMPLETE_APPLICATION);
    };

    let metrics = metrics.rounded();
    let quote = rates.lookup(&RateInputs::new(credit_score, metrics.ltv, metrics.dti, term));
    info!(
        credit_score,
        ltv = metrics.ltv,
        dti = metrics.dti,
        loan_term = term.years(),
        ?quote,
        "rate lookup completed"
    );

    let summary = rate_summary(&state.application, metrics, term);
    let message = match quote {
        RateQuote::Found { rate, .. } => {
            state.calculated_rate = Some(rate);
            format!(
                "{summary}\n\n{} Let me know if you have any other questions!",
                quote.describe()
            )
        }
        RateQuote::NotFound => format!("{summary}\n\n{}", quote.describe()),
    };

    state.at_step(ApplicationStep::Ended).respond(message)
}

/// Accepts exactly one of the offered terms, as a standalone number (optionally with a
/// year suffix) or a word. No term, or both terms, is ambiguous.
pub fn parse_loan_term(utterance: &str) -> Option<LoanTerm> {
    let mut found: Option<LoanTerm> = None;

    for token in utterance
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        let Some(term) = token_term(&token.to_ascii_lowercase()) else {
            continue;
        };
        match found {
            Some(existing) if existing != term => {
                debug!("loan term reply names both terms");
                return None;
            }
            _ => found = Some(term),
        }
    }

    found
}

fn token_term(token: &str) -> Option<LoanTerm> {
    match token {
        "fifteen" => return Some(LoanTerm::Fifteen),
        "thirty" => return Some(LoanTerm::Thirty),
        _ => {}
    }

    let digits_end = token
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(token.len());
    let (digits, suffix) = token.split_at(digits_end);
    if digits.is_empty() || !matches!(suffix, "" | "y" | "yr" | "yrs" | "year" | "years") {
        return None;
    }

    digits.parse::<u32>().ok().and_then(LoanTerm::from_years)
}

fn whole_amount(value: f64) -> Option<u64> {
    let value = value.trunc();
    (value >= 0.0 && value <= u64::MAX as f64).then_some(value as u64)
}

fn reprompt(state: ConversationState, step: ApplicationStep, message: &str) -> ConversationState {
    debug!(step = step.label(), "validation failed; re-prompting");
    state.at_step(step).respond(message)
}

fn loan_summary(slots: &ApplicationSlots, metrics: DerivedMetrics, term: LoanTerm) -> String {
    format!(
        "Got it! We can see if you will be approved or not.\n\n\
Credit Score: {}\n\n\
Loan Amount: {}\n\n\
Home Value: {}\n\n\
LTV: {:.1}%\n\n\
DTI: {:.1}%\n\n\
Loan Term: {} years\n\n\
Would you like to see your rate?",
        display_score(slots),
        group_thousands(slots.loan_amount.unwrap_or_default()),
        group_thousands(slots.home_value.unwrap_or_default()),
        metrics.ltv,
        metrics.dti,
        term.years()
    )
}

fn rate_summary(slots: &ApplicationSlots, metrics: DerivedMetrics, term: LoanTerm) -> String {
    format!(
        "Thank you! Based on your information:\n\n\
Credit Score: {}\n\
Loan Amount: {}\n\
Home Value: ${}\n\
LTV: {:.1}%\n\
DTI: {:.1}%\n\
Loan Term: {} years",
        display_score(slots),
        group_thousands(slots.loan_amount.unwrap_or_default()),
        group_thousands(slots.home_value.unwrap_or_default()),
        metrics.ltv,
        metrics.dti,
        term.years()
    )
}

fn display_score(slots: &ApplicationSlots) -> String {
    slots
        .credit_score
        .map(|score| score.to_string())
        .unwrap_or_else(|| "n/a".to_string())
}
