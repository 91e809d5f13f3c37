use crate::console::{run_chat, run_rate_quote, run_rate_tool, QuoteArgs, ToolArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use loan_officer::error::AppError;
use loan_officer::workflows::mortgage::rates::tool;

#[derive(Parser, Debug)]
#[command(
    name = "Loan Officer Assistant",
    about = "Serve or talk to the mortgage Q&A and application assistant",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Look up rates directly against the rate matrix
    Rates {
        #[command(subcommand)]
        command: RatesCommand,
    },
    /// Chat with the assistant on the terminal
    Chat,
}

#[derive(Subcommand, Debug)]
enum RatesCommand {
    /// Quote a rate for explicit applicant metrics
    Quote(QuoteArgs),
    #[command(about = tool::TOOL_DESCRIPTION)]
    Tool(ToolArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Rates {
            command: RatesCommand::Quote(args),
        } => run_rate_quote(args),
        Command::Rates {
            command: RatesCommand::Tool(args),
        } => run_rate_tool(args),
        Command::Chat => run_chat().await,
    }
}
