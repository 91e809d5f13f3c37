use std::io::Read;

use serde::Deserialize;
use tracing::warn;

use super::RateRule;

pub(crate) fn parse_rules<R: Read>(reader: R) -> Result<Vec<RateRule>, csv::Error> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(reader);
    csv_reader.headers()?;

    let mut rules = Vec::new();
    for (index, record) in csv_reader.deserialize::<RateRow>().enumerate() {
        // header is line 1
        let line = index + 2;
        match record {
            Ok(row) => match row.into_rule() {
                Some(rule) => rules.push(rule),
                None => warn!(line, "skipping rate table row with out-of-range values"),
            },
            Err(err) => warn!(line, error = %err, "skipping invalid rate table row"),
        }
    }

    Ok(rules)
}

#[derive(Debug, Deserialize)]
struct RateRow {
    min_credit: u16,
    max_ltv: f64,
    max_dti: f64,
    loan_term: u8,
    rate: f64,
}

impl RateRow {
    fn into_rule(self) -> Option<RateRule> {
        let finite = [self.max_ltv, self.max_dti, self.rate]
            .iter()
            .all(|value| value.is_finite());
        if !finite {
            return None;
        }

        Some(RateRule {
            min_credit_score: self.min_credit,
            max_loan_to_value: self.max_ltv,
            max_debt_to_income: self.max_dti,
            loan_term: self.loan_term,
            rate: self.rate,
        })
    }
}
