mod color;
mod commands;
mod config;
mod diagnostics;
mod document;
mod error;
mod library;
mod matcher;
mod resolver;
mod scanner;
mod session;
mod types;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "TOKENLINK_LOG";

/// Top-level CLI.
#[derive(Parser)]
#[command(name = "tokenlink", version, about = "Find hard-coded design values and reconnect them to design tokens")]
struct Cli {
    /// Subcommand to run.
    #[command(subcommand)]
    command: Commands,
    /// Project root holding `.tokenlink.toml`.
    #[arg(long, global = true, default_value = ".")]
    root: PathBuf,
}

/// Subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Apply every unambiguous match and report the rest
    Fix {
        /// Report what would be fixed without writing the document
        #[arg(long)]
        dry_run: bool,
        /// Only scan the selected nodes
        #[arg(long)]
        selection: bool,
    },
    /// List token libraries and cross-library conflicts
    Libraries {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Find detached styles and their matching tokens
    Scan {
        /// Output as JSON
        #[arg(long)]
        json: bool,
        /// Override the configured node budget
        #[arg(long)]
        node_limit: Option<usize>,
        /// Only scan the selected nodes
        #[arg(long)]
        selection: bool,
    },
    /// Run the JSON-lines message protocol on stdin/stdout
    Serve,
}

/// Install the stderr log subscriber, filtered by `TOKENLINK_LOG`.
fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| return EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let root = cli.root;

    let result = match cli.command {
        Commands::Fix { dry_run, selection } => commands::fix(&root, selection, dry_run).map(|()| return ExitCode::SUCCESS),
        Commands::Libraries { json } => commands::libraries(&root, json).map(|()| return ExitCode::SUCCESS),
        Commands::Scan { json, node_limit, selection } => commands::scan(&root, selection, node_limit, json),
        Commands::Serve => commands::serve(&root).map(|()| return ExitCode::SUCCESS),
    };

    return match result {
        Err(e) => {
            diagnostics::print_error(&e);
            ExitCode::from(2)
        },
        Ok(code) => code,
    };
}
