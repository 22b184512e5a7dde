use anyhow::Result;
use clap::Args;
use colored::Colorize;
use promodel_common::{Diagnostic, DiagnosticKind, RealFileSystem, Severity};
use promodel_engine::project::toolchain_mismatches;
use promodel_parser::report;
use promodel_reader::{ParseCache, ProReader, ProSubtree};
use promodel_tree::{reconcile, ProjectTree};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use super::{build_globals, resolve_pro_file};

#[derive(Debug, Args)]
pub struct CheckArgs {
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

    /// Show all diagnostics including info level
    #[arg(short, long)]
    pub verbose: bool,
}

pub fn check(args: CheckArgs, cwd: &Path) -> Result<()> {
    let pro_file = resolve_pro_file(cwd, &args.path)?;
    let globals = build_globals(&args.defines, args.cc.as_deref(), args.cxx.as_deref());

    println!("🔍 {} {}", "Checking".green().bold(), pro_file.display());
    println!();

    let fs = RealFileSystem;
    let cache = ParseCache::new();
    let reader = ProReader::new(&fs, &globals, &cache);
    let subtree = reader.read_subtree(&pro_file);

    let mut totals = Totals::default();
    print_subtree(&subtree, args.verbose, &mut totals);

    let mut tree = ProjectTree::new();
    reconcile::apply(&mut tree, &subtree);
    let mut reported = HashSet::new();
    for (_, container) in tree.containers() {
        for diagnostic in toolchain_mismatches(
            &globals.expected_tools,
            &container.tools,
            &container.path,
            &mut reported,
        ) {
            print_diagnostic(&diagnostic);
            totals.count(&diagnostic);
        }
    }

    println!();
    println!(
        "✨ {} Check complete!",
        if totals.errors > 0 {
            "Done".red().bold()
        } else {
            "Done".green().bold()
        }
    );
    println!("   Files checked: {}", totals.files);
    if totals.errors > 0 {
        println!("   {} {}", "Errors:".red(), totals.errors);
    }
    if totals.warnings > 0 {
        println!("   {} {}", "Warnings:".yellow(), totals.warnings);
    }
    if totals.errors == 0 && totals.warnings == 0 {
        println!("   {} No issues found!", "✓".green());
    }

    if totals.errors > 0 {
        std::process::exit(1);
    }
    Ok(())
}

#[derive(Default)]
struct Totals {
    files: usize,
    errors: usize,
    warnings: usize,
}

impl Totals {
    fn count(&mut self, diagnostic: &Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.errors += 1,
            Severity::Warning => self.warnings += 1,
            Severity::Info => {}
        }
    }
}

fn print_subtree(subtree: &ProSubtree, verbose: bool, totals: &mut Totals) {
    totals.files += 1;
    let result = &subtree.result;

    let shown: Vec<&Diagnostic> = result
        .diagnostics
        .iter()
        .filter(|diagnostic| verbose || diagnostic.severity != Severity::Info)
        .collect();

    if shown.is_empty() {
        if verbose {
            println!("{} {}", "✓".green(), result.path.display());
        }
    } else {
        println!("{}", result.path.display());
        for diagnostic in &shown {
            print_diagnostic(diagnostic);
            totals.count(diagnostic);
        }
        // syntax errors get a second pass with source context
        for diagnostic in &shown {
            if diagnostic.kind != DiagnosticKind::SyntaxOrCycle
                || diagnostic.severity != Severity::Error
            {
                continue;
            }
            let file = diagnostic.file.as_deref().unwrap_or(&result.path);
            if let Some(rendered) = pretty_syntax_report(file) {
                println!("{}", rendered);
            }
        }
        println!();
    }

    for child in &subtree.children {
        print_subtree(child, verbose, totals);
    }
}

fn print_diagnostic(diagnostic: &Diagnostic) {
    let level = match diagnostic.severity {
        Severity::Error => "error".red().bold(),
        Severity::Warning => "warning".yellow().bold(),
        Severity::Info => "info".blue().bold(),
    };
    println!(
        "  {} [{}] {}",
        level,
        kind_name(diagnostic.kind),
        diagnostic.message
    );
}

fn kind_name(kind: DiagnosticKind) -> &'static str {
    match kind {
        DiagnosticKind::Unreadable => "unreadable",
        DiagnosticKind::SyntaxOrCycle => "syntax",
        DiagnosticKind::UnresolvedConditional => "unresolved-conditional",
        DiagnosticKind::ToolchainMismatch => "toolchain",
        DiagnosticKind::ProjectMessage => "message",
    }
}

/// Re-parse a file that failed and render the error against its source.
/// Include cycles parse cleanly, so they get no extra context.
fn pretty_syntax_report(path: &Path) -> Option<String> {
    let source = fs::read_to_string(path).ok()?;
    let error = promodel_parser::parse(&source).err()?;
    let name = path.file_name()?.to_str()?;
    Some(report::format_error(&source, name, &error))
}
