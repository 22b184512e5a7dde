mod commands;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::{check, inspect, targets, watch, CheckArgs, InspectArgs, TargetsArgs, WatchArgs};

/// Promodel CLI - live project model for qmake-style build trees
#[derive(Parser, Debug)]
#[command(name = "promodel")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Read a project once and print its tree
    Inspect(InspectArgs),

    /// List build targets and their directories
    Targets(TargetsArgs),

    /// Evaluate a project and report every problem found
    Check(CheckArgs),

    /// Keep a project open and print updates as files change
    Watch(WatchArgs),
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    let cwd = std::env::current_dir().expect("Cannot get current directory");

    let result = match cli.command {
        Command::Inspect(args) => inspect(args, &cwd),
        Command::Targets(args) => targets(args, &cwd),
        Command::Check(args) => check(args, &cwd),
        Command::Watch(args) => watch(args, &cwd).await,
    };

    if let Err(err) = result {
        eprintln!();
        eprintln!("{} {}", "Error:".red().bold(), err);
        eprintln!();
        std::process::exit(1);
    }
}
