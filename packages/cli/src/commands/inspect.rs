use anyhow::Result;
use clap::Args;
use colored::Colorize;
use promodel_common::RealFileSystem;
use promodel_reader::{ParseCache, ProReader};
use promodel_tree::{reconcile, ProjectTree, SnapshotDetail, SnapshotNode, TreeSnapshot};
use std::path::Path;

use super::{build_globals, resolve_pro_file};

#[derive(Debug, Args)]
pub struct InspectArgs {
    /// Project file, or a directory holding one (defaults to current directory)
    #[arg(default_value = ".")]
    pub path: String,

    /// Extra assignments applied before the root file, e.g. CONFIG+=debug
    #[arg(short = 'D', long = "define")]
    pub defines: Vec<String>,

    /// Print the tree as JSON instead of text
    #[arg(long)]
    pub json: bool,
}

pub fn inspect(args: InspectArgs, cwd: &Path) -> Result<()> {
    let pro_file = resolve_pro_file(cwd, &args.path)?;
    let globals = build_globals(&args.defines, None, None);

    let fs = RealFileSystem;
    let cache = ParseCache::new();
    let reader = ProReader::new(&fs, &globals, &cache);
    let subtree = reader.read_subtree(&pro_file);

    let mut tree = ProjectTree::new();
    reconcile::apply(&mut tree, &subtree);
    let snapshot = TreeSnapshot::capture(&tree);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&snapshot)?);
        return Ok(());
    }

    println!("🔎 {} {}", "Inspecting".green().bold(), pro_file.display());
    println!();

    match &snapshot.root {
        Some(root) => print_node(root, 1),
        None => println!("   {}", "Nothing could be read from the project".yellow()),
    }

    println!();
    println!(
        "{} {} nodes in the project tree",
        "✅".green(),
        snapshot.node_count()
    );
    Ok(())
}

fn print_node(node: &SnapshotNode, depth: usize) {
    let indent = "  ".repeat(depth);
    match &node.detail {
        SnapshotDetail::Container {
            project_type,
            valid_parse,
            target,
            ..
        } => {
            let marker = if *valid_parse {
                "✓".green()
            } else {
                "✗".red()
            };
            let kind = format!("({})", project_type);
            if target.name.is_empty() {
                println!("{}{} {} {}", indent, marker, node.name.bold(), kind.dimmed());
            } else {
                println!(
                    "{}{} {} {} → {}",
                    indent,
                    marker,
                    node.name.bold(),
                    kind.dimmed(),
                    target.name
                );
            }
        }
        SnapshotDetail::File { generated, .. } => {
            if *generated {
                println!("{}  {}", indent, node.name.dimmed());
            } else {
                println!("{}  {}", indent, node.name);
            }
        }
    }
    for child in &node.children {
        print_node(child, depth + 1);
    }
}
