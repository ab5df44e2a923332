pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "bankbot",
    about = "Bankbot operator CLI",
    long_about = "Prepare the account database, inspect configuration, probe the language \
                  understanding pipeline, and chat with the banking assistant.",
    after_help = "Examples:\n  bankbot migrate\n  bankbot seed\n  bankbot classify \"send 5k to Neha\"\n  bankbot chat --user Priya"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load the sample users, accounts and cards (idempotent)")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Rank intents for a message with the configured classifier")]
    Classify {
        text: String,
        #[arg(long, help = "Number of predictions to return (defaults to nlu.top_k)")]
        top_k: Option<usize>,
    },
    #[command(about = "Extract entities (amounts, account types, ...) from a message")]
    Extract { text: String },
    #[command(about = "List transfers touching any account of a user, newest first")]
    History { user: String },
    #[command(about = "Start an interactive chat session against the configured database")]
    Chat {
        #[arg(long, help = "Treat this user as logged in")]
        user: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let (name, result) = match cli.command {
        Command::Migrate => ("migrate", commands::migrate::run()),
        Command::Seed => ("seed", commands::seed::run()),
        Command::Config => {
            ("config", commands::CommandResult { exit_code: 0, output: commands::config::run() })
        }
        Command::Classify { text, top_k } => ("classify", commands::classify::run(&text, top_k)),
        Command::Extract { text } => ("extract", commands::extract::run(&text)),
        Command::History { user } => ("history", commands::history::run(&user)),
        Command::Chat { user } => ("chat", commands::chat::run(user)),
    };

    tracing::debug!(
        event_name = "cli.command.completed",
        command = name,
        exit_code = result.exit_code,
        "command finished"
    );
    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Diagnostics go to stderr so stdout stays machine-readable. `RUST_LOG`
/// raises the level; the default only shows warnings.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .try_init();
}
