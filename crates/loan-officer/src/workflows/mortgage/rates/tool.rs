//! Text boundary over the rate calculator for tool-calling layers.
//!
//! Input is `credit_score,ltv,dti,loan_term`; output is a sentence serialized from the
//! structured [`RateQuote`], never the other way round.

use super::{RateInputs, RateQuote, RateTable};

pub const TOOL_DESCRIPTION: &str = "Calculate mortgage interest rate based on applicant's financial data. \
Input format: 'credit_score,ltv,dti,loan_term' where ltv and dti are percentages and loan_term is 15 or 30. \
Example: '760,80,43,30'.";

pub const INVALID_FORMAT_MESSAGE: &str =
    "Error: Invalid input format. Expected: credit_score,ltv,dti,loan_term";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RateToolError {
    #[error("expected 4 comma-separated fields, got {0}")]
    FieldCount(usize),
    #[error("field `{field}` is not a valid number: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// Parses the comma-joined tool input.
///
/// Any integer is accepted for the score and term. `Ok(None)` means no matrix row can
/// match: a negative score or a term wider than any stored term.
pub fn parse_input(input: &str) -> Result<Option<RateInputs>, RateToolError> {
    let parts: Vec<&str> = input.trim().split(',').map(str::trim).collect();
    if parts.len() != 4 {
        return Err(RateToolError::FieldCount(parts.len()));
    }

    let credit_score = parse_integer("credit_score", parts[0])?;
    let ltv = parse_ratio("ltv", parts[1])?;
    let dti = parse_ratio("dti", parts[2])?;
    let loan_term = parse_integer("loan_term", parts[3])?;

    if credit_score < 0 {
        return Ok(None);
    }
    // scores above the column width clear every minimum
    let credit_score = u16::try_from(credit_score).unwrap_or(u16::MAX);
    let Ok(loan_term) = u8::try_from(loan_term) else {
        return Ok(None);
    };

    Ok(Some(RateInputs {
        credit_score,
        ltv,
        dti,
        loan_term,
    }))
}

fn parse_integer(field: &'static str, raw: &str) -> Result<i64, RateToolError> {
    raw.parse::<i64>().map_err(|_| invalid(field, raw))
}

fn parse_ratio(field: &'static str, raw: &str) -> Result<f64, RateToolError> {
    raw.parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| invalid(field, raw))
}

fn invalid(field: &'static str, value: &str) -> RateToolError {
    RateToolError::InvalidField {
        field,
        value: value.to_string(),
    }
}

/// Runs the tool end to end; malformed input becomes a message rather than an error.
pub fn run(table: &RateTable, input: &str) -> String {
    match parse_input(input) {
        Ok(Some(inputs)) => render(&table.lookup(&inputs)),
        Ok(None) => render(&RateQuote::NotFound),
        Err(RateToolError::FieldCount(_)) => INVALID_FORMAT_MESSAGE.to_string(),
        Err(err) => format!("Error calculating rate: {err}"),
    }
}

pub fn render(quote: &RateQuote) -> String {
    quote.describe()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::mortgage::rates::{RateRule, NOT_FOUND_MESSAGE};

    fn table() -> RateTable {
        RateTable::new(vec![RateRule {
            min_credit_score: 760,
            max_loan_to_value: 80.0,
            max_debt_to_income: 43.0,
            loan_term: 30,
            rate: 6.875,
        }])
    }

    #[test]
    fn run_formats_found_rate() {
        assert_eq!(
            run(&table(), "760,80,43,30"),
            "The estimated interest rate is 6.875%"
        );
    }

    #[test]
    fn run_accepts_whitespace_and_decimals() {
        assert_eq!(
            run(&table(), " 780 , 79.9 , 12.5 , 30 "),
            "The estimated interest rate is 6.875%"
        );
    }

    #[test]
    fn run_reports_not_found() {
        assert_eq!(run(&table(), "700,80,43,30"), NOT_FOUND_MESSAGE);
    }

    #[test]
    fn run_rejects_wrong_field_count() {
        assert_eq!(run(&table(), "760,80,43"), INVALID_FORMAT_MESSAGE);
    }

    #[test]
    fn run_accepts_any_integer_score_and_term() {
        assert_eq!(
            run(&table(), "70000,80,43,30"),
            "The estimated interest rate is 6.875%"
        );
        assert_eq!(run(&table(), "-5,80,43,30"), NOT_FOUND_MESSAGE);
        assert_eq!(run(&table(), "760,80,43,-30"), NOT_FOUND_MESSAGE);
        assert_eq!(run(&table(), "760,80,43,360"), NOT_FOUND_MESSAGE);
    }

    #[test]
    fn parse_input_rejects_fractional_score() {
        assert_eq!(
            parse_input("760.5,80,43,30"),
            Err(RateToolError::InvalidField {
                field: "credit_score",
                value: "760.5".to_string(),
            })
        );
    }

    #[test]
    fn run_reports_unparseable_field() {
        let message = run(&table(), "760,eighty,43,30");
        assert!(message.starts_with("Error calculating rate:"));
        assert!(message.contains("ltv"));
    }
}
