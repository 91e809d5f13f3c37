use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Credit scores below this threshold are treated as subprime.
pub const SUBPRIME_THRESHOLD: u16 = 620;

/// Which chain the conversation is currently in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationMode {
    #[default]
    Qa,
    Application,
    Error,
}

impl ConversationMode {
    pub const fn label(self) -> &'static str {
        match self {
            ConversationMode::Qa => "qa",
            ConversationMode::Application => "application",
            ConversationMode::Error => "error",
        }
    }
}

/// Position in the mortgage application. A step never regresses: a turn either
/// re-emits the same step or advances to its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStep {
    CreditScore,
    SubprimeConfirmation,
    HomeValue,
    DownPayment,
    Income,
    Debts,
    LoanTerm,
    CalculateRate,
    Ended,
}

impl ApplicationStep {
    pub const fn label(self) -> &'static str {
        match self {
            ApplicationStep::CreditScore => "credit_score",
            ApplicationStep::SubprimeConfirmation => "subprime_confirmation",
            ApplicationStep::HomeValue => "home_value",
            ApplicationStep::DownPayment => "down_payment",
            ApplicationStep::Income => "income",
            ApplicationStep::Debts => "debts",
            ApplicationStep::LoanTerm => "loan_term",
            ApplicationStep::CalculateRate => "calculate_rate",
            ApplicationStep::Ended => "ended",
        }
    }

    /// Steps the engine resumes directly; `Ended` is a signal for the caller instead.
    pub const fn is_resumable(self) -> bool {
        !matches!(self, ApplicationStep::Ended)
    }
}

/// Loan terms offered by the rate matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum LoanTerm {
    Fifteen,
    Thirty,
}

impl LoanTerm {
    pub const fn years(self) -> u8 {
        match self {
            LoanTerm::Fifteen => 15,
            LoanTerm::Thirty => 30,
        }
    }

    pub fn from_years(years: u32) -> Option<Self> {
        match years {
            15 => Some(LoanTerm::Fifteen),
            30 => Some(LoanTerm::Thirty),
            _ => None,
        }
    }
}

impl TryFrom<u8> for LoanTerm {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        LoanTerm::from_years(u32::from(value))
            .ok_or_else(|| format!("loan term must be 15 or 30 years, got {value}"))
    }
}

impl From<LoanTerm> for u8 {
    fn from(value: LoanTerm) -> Self {
        value.years()
    }
}

/// Passage returned by the document retrieval service, in ranked order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RetrievedDocument {
    pub text: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Conversation state threaded through every turn. The engine holds none of it between
/// calls; the caller persists whatever `process_turn` returns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConversationState {
    pub user_input: String,
    pub mode: ConversationMode,
    pub intent: Option<String>,
    pub retrieved_docs: Vec<RetrievedDocument>,
    pub context: Option<String>,
    #[serde(flatten)]
    pub application: ApplicationSlots,
    pub final_response: Option<String>,
    pub calculated_rate: Option<f64>,
}

/// Fields collected by the application steps.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationSlots {
    pub credit_score: Option<u16>,
    pub home_value: Option<u64>,
    pub down_payment: Option<u64>,
    pub loan_amount: Option<u64>,
    pub income: Option<u64>,
    pub debts: Option<f64>,
    pub loan_term: Option<LoanTerm>,
    pub application_step: Option<ApplicationStep>,
    pub subprime_continue: Option<bool>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application_step(&self) -> Option<ApplicationStep> {
        self.application.application_step
    }

    /// Caller-side reset once a pass reports `Ended`; the engine never loops back itself.
    pub fn reset_after_end(&mut self) {
        if self.application.application_step == Some(ApplicationStep::Ended) {
            self.application.application_step = None;
            self.mode = ConversationMode::Qa;
        }
    }

    pub fn has_ended(&self) -> bool {
        self.application.application_step == Some(ApplicationStep::Ended)
    }

    pub(crate) fn respond(mut self, message: impl Into<String>) -> Self {
        self.final_response = Some(message.into());
        self
    }

    pub(crate) fn at_step(mut self, step: ApplicationStep) -> Self {
        self.application.application_step = Some(step);
        self
    }
}

/// Loan-to-value and debt-to-income, both as percentages.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DerivedMetrics {
    pub ltv: f64,
    pub dti: f64,
}

impl DerivedMetrics {
    /// Computes the ratios from collected slots, or `None` while any input is missing
    /// or a denominator is zero.
    pub fn from_slots(slots: &ApplicationSlots) -> Option<Self> {
        let loan_amount = slots.loan_amount? as f64;
        let home_value = slots.home_value? as f64;
        let income = slots.income? as f64;
        let debts = slots.debts?;
        if home_value <= 0.0 || income <= 0.0 {
            return None;
        }

        let monthly_income = income / 12.0;
        Some(Self {
            ltv: (loan_amount / home_value) * 100.0,
            dti: (debts / monthly_income) * 100.0,
        })
    }

    /// Metrics at the one-decimal precision shown to the applicant.
    pub fn rounded(self) -> Self {
        Self {
            ltv: round_tenths(self.ltv),
            dti: round_tenths(self.dti),
        }
    }
}

fn round_tenths(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Formats whole currency amounts with thousands separators.
pub fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (index, digit) in digits.chars().enumerate() {
        if index > 0 && (digits.len() - index) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    grouped
}
