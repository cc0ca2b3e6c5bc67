pub mod commands;

use clap::{Parser, Subcommand};
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(
    name = "mailfn",
    about = "Mailfn operator CLI",
    long_about = "Inspect registered functions, ask one-off questions, review configuration, and check runtime readiness.",
    after_help = "Examples:\n  mailfn functions\n  mailfn ask \"What were sales in the north region?\"\n  mailfn doctor --json"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "List functions registered under the configured module whitelist")]
    Functions,
    #[command(about = "Resolve and execute one question, printing the result as JSON")]
    Ask {
        #[arg(help = "Question text, as it would appear in an email")]
        question: String,
    },
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, function registration, and LLM backend reachability")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Functions => commands::functions::run(),
        Command::Ask { question } => commands::ask::run(&question),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => commands::doctor::run(json),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
