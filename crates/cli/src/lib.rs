pub mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "tarifftok",
    about = "TariffTok operator CLI",
    long_about = "Ask tariff questions through the intent router, render the routing graph, and inspect data and config.",
    after_help = "Examples:\n  tarifftok seed\n  tarifftok ask \"What's the tariff rate for Toys from Vietnam?\"\n  tarifftok graph --path START,CLASSIFY,LOOKUP,FORMAT,END"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Route one query through the flow and print the answer")]
    Ask {
        query: String,
        #[arg(long, help = "Emit the full run result as JSON")]
        json: bool,
    },
    #[command(about = "Print the routing graph as Graphviz DOT")]
    Graph {
        #[arg(long, help = "Comma-separated steps to highlight, e.g. START,CLASSIFY,LOOKUP")]
        path: Option<String>,
    },
    #[command(about = "Summarize the loaded tariff dataset")]
    Summary,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Write the deterministic demo dataset")]
    Seed {
        #[arg(long, help = "Target directory (defaults to data.path)")]
        out: Option<PathBuf>,
    },
    #[command(about = "Validate config, dataset readiness, and LLM provider setup")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Command::Ask { query, json } => commands::ask::run(&query, json),
        Command::Graph { path } => commands::graph::run(path.as_deref()),
        Command::Summary => commands::summary::run(),
        Command::Config => commands::CommandResult::text(commands::config::run()),
        Command::Seed { out } => commands::seed::run(out.as_deref()),
        Command::Doctor { json } => commands::CommandResult::text(commands::doctor::run(json)),
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}
