use anyhow::Result;
use clap::Args;
use colored::Colorize;
use promodel_common::Severity;
use promodel_engine::{Project, ProjectConfig, ProjectEvent};
use std::path::Path;
use tokio::sync::broadcast::error::RecvError;

use super::{build_globals, resolve_pro_file};

#[derive(Debug, Args)]
pub struct WatchArgs {
    /// Project file, or a directory holding one (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: String,

    /// Extra assignments applied before the root file, e.g. CONFIG+=debug
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// C compiler the configuration expects, for mismatch warnings
    #[arg(long)]
    pub cc: Option<String>,

    /// C++ compiler the configuration expects, for mismatch warnings
    #[arg(long)]
    pub cxx: Option<String>,
}

pub async fn watch(args: WatchArgs, cwd: &Path) -> Result<()> {
    let pro_file = resolve_pro_file(cwd, &args.path)?;
    let globals = build_globals(&args.defines, args.cc.as_deref(), args.cxx.as_deref());

    let project = Project::open(ProjectConfig::new(&pro_file).with_globals(globals))?;
    let mut events = project.subscribe();

    println!("👀 {} {}", "Watching".green().bold(), pro_file.display());
    println!("   {}", "Press Ctrl-C to stop".dimmed());
    println!();

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            event = events.recv() => match event {
                Ok(event) => print_event(&event),
                Err(RecvError::Lagged(skipped)) => {
                    eprintln!(
                        "   {} fell behind, skipped {} events",
                        "⚠️".yellow(),
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    println!();
    println!("✨ {} Project closed", "Done".green().bold());
    project.close().await;
    Ok(())
}

fn print_event(event: &ProjectEvent) {
    match event {
        ProjectEvent::SubtreeUpdated {
            path,
            structure_changed,
        } => {
            let note = if *structure_changed {
                " (structure changed)"
            } else {
                ""
            };
            println!("  {} {}{}", "updated".green().bold(), path.display(), note);
        }
        ProjectEvent::ProjectTypeChanged {
            path,
            previous,
            current,
            buildable_changed,
        } => {
            println!(
                "  {} {}: {} → {}",
                "retyped".cyan().bold(),
                path.display(),
                previous,
                current
            );
            if *buildable_changed {
                println!("      {}", "target list changed".yellow());
            }
        }
        ProjectEvent::EvaluationFinished { diagnostics } => {
            if diagnostics.is_empty() {
                println!("  {} evaluation finished", "✓".green());
            } else {
                println!(
                    "  {} evaluation finished with {} diagnostics",
                    "⚠️".yellow(),
                    diagnostics.len()
                );
                for diagnostic in diagnostics {
                    let level = match diagnostic.severity {
                        Severity::Error => "error".red().bold(),
                        Severity::Warning => "warning".yellow().bold(),
                        Severity::Info => "info".blue().bold(),
                    };
                    println!("      {} {}", level, diagnostic);
                }
            }
            println!();
        }
    }
}
