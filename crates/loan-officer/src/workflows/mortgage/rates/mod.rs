mod parser;
pub mod tool;

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use super::domain::LoanTerm;

/// One row of the rate matrix.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRule {
    pub min_credit_score: u16,
    pub max_loan_to_value: f64,
    pub max_debt_to_income: f64,
    pub loan_term: u8,
    pub rate: f64,
}

impl RateRule {
    /// All four predicates are inclusive at the rule's bounds.
    pub fn matches(&self, applicant: &RateInputs) -> bool {
        applicant.credit_score >= self.min_credit_score
            && applicant.ltv <= self.max_loan_to_value
            && applicant.dti <= self.max_debt_to_income
            && applicant.loan_term == self.loan_term
    }
}

/// Applicant metrics fed to the calculator. `loan_term` is in years so the tool interface
/// can pass through terms the matrix does not offer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateInputs {
    pub credit_score: u16,
    pub ltv: f64,
    pub dti: f64,
    pub loan_term: u8,
}

impl RateInputs {
    pub fn new(credit_score: u16, ltv: f64, dti: f64, loan_term: LoanTerm) -> Self {
        Self {
            credit_score,
            ltv,
            dti,
            loan_term: loan_term.years(),
        }
    }
}

/// Structured lookup result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RateQuote {
    Found { rate: f64, rule_index: usize },
    NotFound,
}

impl RateQuote {
    pub fn rate(&self) -> Option<f64> {
        match self {
            RateQuote::Found { rate, .. } => Some(*rate),
            RateQuote::NotFound => None,
        }
    }

    /// Applicant-facing sentence for this result.
    pub fn describe(&self) -> String {
        match self {
            RateQuote::Found { rate, .. } => format!("The estimated interest rate is {rate:.3}%"),
            RateQuote::NotFound => NOT_FOUND_MESSAGE.to_string(),
        }
    }
}

pub const NOT_FOUND_MESSAGE: &str = "Unfortunately, no matching rate was found for the provided criteria. The LTV or DTI may be outside our lending guidelines.";

/// Ordered, read-only rate matrix. Row order is priority order and is never re-sorted.
#[derive(Debug, Clone, PartialEq)]
pub struct RateTable {
    rules: Vec<RateRule>,
}

impl RateTable {
    pub fn new(rules: Vec<RateRule>) -> Self {
        Self { rules }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RateTableError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| RateTableError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let table = Self::from_reader(file)?;
        info!(path = %path.display(), rules = table.len(), "rate table loaded");
        Ok(table)
    }

    /// Parses CSV rows, skipping malformed ones. A table with no usable rows is an error.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self, RateTableError> {
        let rules = parser::parse_rules(reader)?;
        if rules.is_empty() {
            return Err(RateTableError::Empty);
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[RateRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// First rule in file order satisfying every predicate; not the best or lowest rate.
    pub fn lookup(&self, applicant: &RateInputs) -> RateQuote {
        self.rules
            .iter()
            .position(|rule| rule.matches(applicant))
            .map(|rule_index| RateQuote::Found {
                rate: self.rules[rule_index].rate,
                rule_index,
            })
            .unwrap_or(RateQuote::NotFound)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RateTableError {
    #[error("rate table not readable at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid rate table CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("rate table contains no valid rules")]
    Empty,
}
