use anyhow::Result;
use clap::Args;
use colored::Colorize;
use promodel_common::RealFileSystem;
use promodel_engine::targets::{deployment_data, target_information};
use promodel_reader::{ParseCache, ProReader};
use promodel_tree::{reconcile, ProjectTree};
use std::path::Path;

use super::{build_globals, resolve_pro_file};

#[derive(Debug, Args)]
pub struct TargetsArgs {
    /// Project file, or a directory holding one (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: String,

    /// Extra assignments applied before the root file, e.g. CONFIG+=debug
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// List deployment entries from INSTALLS rules instead of build targets
    #[arg(long)]
    pub deployment: bool,

    /// Print as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub fn targets(args: TargetsArgs, cwd: &Path) -> Result<()> {
    let pro_file = resolve_pro_file(cwd, &args.path)?;
    let globals = build_globals(&args.defines, None, None);

    let fs = RealFileSystem;
    let cache = ParseCache::new();
    let reader = ProReader::new(&fs, &globals, &cache);
    let subtree = reader.read_subtree(&pro_file);

    let mut tree = ProjectTree::new();
    reconcile::apply(&mut tree, &subtree);

    if args.deployment {
        let entries = deployment_data(&tree);
        if args.json {
            println!("{}", serde_json::to_string_pretty(&entries)?);
            return Ok(());
        }

        println!("🚚 {} {}", "Deployment for".green().bold(), pro_file.display());
        println!();
        if entries.is_empty() {
            println!("   {}", "No install rules with a destination".yellow());
            return Ok(());
        }
        for entry in &entries {
            println!(
                "  {} [{}] {} → {}",
                "✓".green(),
                entry.rule,
                entry.source.display(),
                entry.target_path
            );
        }
        println!();
        println!("{} {} files to deploy", "✅".green(), entries.len());
        return Ok(());
    }

    let targets = target_information(&tree);
    if args.json {
        println!("{}", serde_json::to_string_pretty(&targets)?);
        return Ok(());
    }

    println!("📦 {} {}", "Targets in".green().bold(), pro_file.display());
    println!();
    if targets.is_empty() {
        println!("   {}", "No buildable targets".yellow());
        return Ok(());
    }
    for target in &targets {
        println!("  {} {}", "✓".green(), target.target.bold());
        println!("      project: {}", target.path.display());
        println!("      build:   {}", target.build_dir.display());
        println!("      run in:  {}", target.working_dir.display());
    }
    println!();
    println!("{} {} targets", "✅".green(), targets.len());
    Ok(())
}
