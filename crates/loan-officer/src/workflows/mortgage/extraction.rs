use super::services::{
    CompletionPurpose, CompletionRequest, CompletionService, RetryPolicy, ServiceError,
};

/// Sentinel the model returns when the utterance holds no usable value.
pub const NOT_FOUND_SENTINEL: &str = "NONE";

/// Down payment as the applicant expressed it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DownPaymentInput {
    Amount(f64),
    Percent(f64),
}

impl DownPaymentInput {
    /// Resolves to whole currency units against the home value. Percentages round to the
    /// nearest unit; anything outside `0..=home_value` is rejected.
    pub fn resolve(self, home_value: u64) -> Option<u64> {
        let amount = match self {
            DownPaymentInput::Amount(amount) => amount.round(),
            DownPaymentInput::Percent(percent) => {
                if !(0.0..=100.0).contains(&percent) {
                    return None;
                }
                (percent / 100.0 * home_value as f64).round()
            }
        };

        if amount < 0.0 || amount > home_value as f64 {
            return None;
        }
        Some(amount as u64)
    }
}

/// Free-text to number extraction backed by the completion service.
pub struct NumericExtractor<'a, C: ?Sized> {
    completion: &'a C,
    retry: RetryPolicy,
}

impl<'a, C> NumericExtractor<'a, C>
where
    C: CompletionService + ?Sized,
{
    pub fn new(completion: &'a C, retry: RetryPolicy) -> Self {
        Self { completion, retry }
    }

    /// `Ok(None)` means the utterance held no parseable value; the calling step re-prompts.
    pub fn extract(&self, utterance: &str, field_label: &str) -> Result<Option<f64>, ServiceError> {
        let request = CompletionRequest::new(
            CompletionPurpose::NumericExtraction,
            numeric_prompt(field_label),
            utterance,
        );
        let reply = self
            .retry
            .run("numeric_extraction", || self.completion.complete(&request))?;
        Ok(parse_numeric_reply(&reply))
    }

    pub fn extract_down_payment(
        &self,
        utterance: &str,
    ) -> Result<Option<DownPaymentInput>, ServiceError> {
        let request = CompletionRequest::new(
            CompletionPurpose::DownPaymentExtraction,
            DOWN_PAYMENT_PROMPT,
            utterance,
        );
        let reply = self
            .retry
            .run("down_payment_extraction", || self.completion.complete(&request))?;
        Ok(parse_down_payment_reply(&reply))
    }
}

/// Accepts a bare number (currency symbols, separators, and spaces tolerated) or the
/// sentinel. Anything containing other text is a failure, not a best-effort scrape.
pub fn parse_numeric_reply(reply: &str) -> Option<f64> {
    let trimmed = reply.trim().trim_matches(|c| c == '"' || c == '\'' || c == '`');
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case(NOT_FOUND_SENTINEL) {
        return None;
    }

    let cleaned: String = trimmed
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | '_' | ' '))
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    cleaned
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite() && *value >= 0.0)
}

/// Parses `AMOUNT:<n>` or `PERCENT:<n>`; every other reply is a failure.
pub fn parse_down_payment_reply(reply: &str) -> Option<DownPaymentInput> {
    let trimmed = reply.trim();
    let (tag, value) = trimmed.split_once(':')?;
    let value = parse_numeric_reply(value.trim_end_matches('%'))?;

    match tag.trim().to_ascii_uppercase().as_str() {
        "AMOUNT" => Some(DownPaymentInput::Amount(value)),
        "PERCENT" => Some(DownPaymentInput::Percent(value)),
        _ => None,
    }
}

fn numeric_prompt(field_label: &str) -> String {
    format!(
        "You are a data extraction assistant. Extract the {field_label} from the user's message.\n\n\
IMPORTANT: Return ONLY the numeric value as digits. No words, no explanations, no units.\n\
If you cannot find a {field_label}, respond with '{NOT_FOUND_SENTINEL}'.\n\n\
Examples:\n\
- \"I want $500,000\" -> 500000\n\
- \"My credit score is 750\" -> 750\n\
- \"about 100000\" -> 100000\n\
- \"Its about 1000\" -> 1000\n\
- \"$1,000\" -> 1000\n\
- \"I don't know\" -> {NOT_FOUND_SENTINEL}"
    )
}

const DOWN_PAYMENT_PROMPT: &str = "You are a data extraction assistant. Extract the down payment from the user's message.\n\n\
The user may provide:\n\
1. A dollar amount (e.g., \"$50,000\", \"50000\", \"fifty thousand\")\n\
2. A percentage (e.g., \"10%\", \"10 percent\", \"ten percent\")\n\n\
Return ONLY in this format:\n\
- If dollar amount: \"AMOUNT:50000\"\n\
- If percentage: \"PERCENT:10\"\n\
- If cannot determine: \"NONE\"\n\n\
Examples:\n\
- \"I can put down $50,000\" -> AMOUNT:50000\n\
- \"10%\" -> PERCENT:10\n\
- \"I want to put down 20 percent\" -> PERCENT:20\n\
- \"I don't know\" -> NONE";
