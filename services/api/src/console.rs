use crate::infra::{blocking, build_engine};
use clap::Args;
use loan_officer::config::AppConfig;
use loan_officer::error::AppError;
use loan_officer::telemetry;
use loan_officer::workflows::mortgage::rates::tool;
use loan_officer::workflows::mortgage::{
    CompletionService, ConversationState, DocumentRetriever, LoanTerm, RateInputs, RateTable,
    TurnEngine,
};
use std::io::{BufRead, Write};
use std::path::PathBuf;

const RESET_COMMAND: &str = "/reset";
const EXIT_COMMANDS: [&str; 2] = ["/quit", "/exit"];
const GREETING: &str = "Hi! I can answer mortgage questions or help you start an application. Type /reset to start over or /quit to leave.";

#[derive(Args, Debug, Default)]
pub(crate) struct RateTableArgs {
    /// Rate matrix CSV (defaults to RATE_TABLE_PATH)
    #[arg(long)]
    pub(crate) table: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub(crate) struct QuoteArgs {
    #[command(flatten)]
    pub(crate) table: RateTableArgs,
    #[arg(long)]
    pub(crate) credit_score: u16,
    /// Loan-to-value, percent
    #[arg(long)]
    pub(crate) ltv: f64,
    /// Debt-to-income, percent
    #[arg(long)]
    pub(crate) dti: f64,
    /// 15 or 30
    #[arg(long, value_parser = parse_term)]
    pub(crate) loan_term: LoanTerm,
}

#[derive(Args, Debug)]
pub(crate) struct ToolArgs {
    #[command(flatten)]
    pub(crate) table: RateTableArgs,
    /// Tool input in the form `credit_score,ltv,dti,loan_term`
    pub(crate) input: String,
}

fn parse_term(raw: &str) -> Result<LoanTerm, String> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .and_then(LoanTerm::from_years)
        .ok_or_else(|| format!("loan term must be 15 or 30, got '{raw}'"))
}

fn load_table(args: RateTableArgs) -> Result<RateTable, AppError> {
    let path = match args.table {
        Some(path) => path,
        None => AppConfig::load()?.rates.path,
    };
    Ok(RateTable::from_path(path)?)
}

pub(crate) fn run_rate_quote(args: QuoteArgs) -> Result<(), AppError> {
    let table = load_table(args.table)?;
    let quote = table.lookup(&RateInputs::new(
        args.credit_score,
        args.ltv,
        args.dti,
        args.loan_term,
    ));
    println!("{}", quote.describe());
    Ok(())
}

pub(crate) fn run_rate_tool(args: ToolArgs) -> Result<(), AppError> {
    let table = load_table(args.table)?;
    println!("{}", tool::run(&table, &args.input));
    Ok(())
}

/// Interactive conversation over stdin/stdout, holding the state a UI session would.
pub(crate) async fn run_chat() -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    blocking(move || {
        let engine = build_engine(&config)?;
        let mut session = ChatSession::new(&engine);
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();

        writeln!(stdout, "{GREETING}")?;
        prompt(&mut stdout)?;
        for line in stdin.lock().lines() {
            let line = line?;
            let Some(reply) = session.respond(&line) else {
                break;
            };
            if !reply.is_empty() {
                writeln!(stdout, "{reply}")?;
            }
            prompt(&mut stdout)?;
        }
        Ok(())
    })
    .await
}

fn prompt(stdout: &mut std::io::Stdout) -> std::io::Result<()> {
    write!(stdout, "> ")?;
    stdout.flush()
}

/// Caller-side session: persists state between turns and resets ended application passes.
pub(crate) struct ChatSession<'a, C, R> {
    engine: &'a TurnEngine<C, R>,
    state: ConversationState,
}

impl<'a, C, R> ChatSession<'a, C, R>
where
    C: CompletionService + 'static,
    R: DocumentRetriever + 'static,
{
    pub(crate) fn new(engine: &'a TurnEngine<C, R>) -> Self {
        Self {
            engine,
            state: ConversationState::new(),
        }
    }

    pub(crate) fn state(&self) -> &ConversationState {
        &self.state
    }

    /// `None` ends the session.
    pub(crate) fn respond(&mut self, line: &str) -> Option<String> {
        let line = line.trim();
        if EXIT_COMMANDS.contains(&line) {
            return None;
        }
        if line == RESET_COMMAND {
            self.state = ConversationState::new();
            return Some("Conversation reset.".to_string());
        }
        if line.is_empty() {
            return Some(String::new());
        }

        let mut next = self.engine.process_turn(&self.state, line);
        let reply = next.final_response.clone().unwrap_or_default();
        next.reset_after_end();
        self.state = next;
        Some(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loan_officer::workflows::mortgage::{
        ApplicationStep, CompletionPurpose, CompletionRequest, EmptyRetriever, RateRule,
        ServiceError,
    };
    use std::sync::Arc;

    struct DecliningModel;

    impl CompletionService for DecliningModel {
        fn complete(&self, request: &CompletionRequest) -> Result<String, ServiceError> {
            Ok(match request.purpose {
                CompletionPurpose::IntentRouting => "application".to_string(),
                CompletionPurpose::NumericExtraction => request.user.trim().to_string(),
                _ => "yes".to_string(),
            })
        }
    }

    fn engine() -> TurnEngine<DecliningModel, EmptyRetriever> {
        TurnEngine::new(
            Arc::new(DecliningModel),
            Arc::new(EmptyRetriever),
            Arc::new(RateTable::new(vec![RateRule {
                min_credit_score: 620,
                max_loan_to_value: 95.0,
                max_debt_to_income: 50.0,
                loan_term: 30,
                rate: 7.0,
            }])),
        )
    }

    #[test]
    fn ended_pass_is_reset_for_next_turn() {
        let engine = engine();
        let mut session = ChatSession::new(&engine);

        session.respond("I want to apply").expect("reply");
        session.respond("580").expect("reply");
        let reply = session.respond("no").expect("reply");

        assert!(reply.contains("improving your credit score"));
        assert_eq!(session.state().application_step(), None);
        assert_eq!(session.state().application.subprime_continue, Some(false));
    }

    #[test]
    fn reset_command_clears_state() {
        let engine = engine();
        let mut session = ChatSession::new(&engine);

        session.respond("I want to apply").expect("reply");
        assert_eq!(
            session.state().application_step(),
            Some(ApplicationStep::CreditScore)
        );

        assert_eq!(session.respond(" /reset ").as_deref(), Some("Conversation reset."));
        assert_eq!(session.state(), &ConversationState::new());
        assert_eq!(session.respond("/quit"), None);
    }

    #[test]
    fn term_argument_accepts_offered_terms_only() {
        assert_eq!(parse_term("15"), Ok(LoanTerm::Fifteen));
        assert!(parse_term("20").is_err());
    }
}
