pub mod check;
pub mod inspect;
pub mod targets;
pub mod watch;

pub use check::{check, CheckArgs};
pub use inspect::{inspect, InspectArgs};
pub use targets::{targets, TargetsArgs};
pub use watch::{watch, WatchArgs};

use anyhow::{anyhow, Result};
use promodel_common::paths;
use promodel_reader::Globals;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Turn a path argument into one project file. A file is taken as-is; a
/// directory must hold exactly one `.pro` file.
pub(crate) fn resolve_pro_file(cwd: &Path, arg: &str) -> Result<PathBuf> {
    let given = if Path::new(arg).is_absolute() {
        PathBuf::from(arg)
    } else {
        cwd.join(arg)
    };

    if given.is_file() {
        return Ok(paths::normalize(&given));
    }
    if !given.is_dir() {
        return Err(anyhow!("No such file or directory: {}", given.display()));
    }

    let mut candidates: Vec<PathBuf> = WalkDir::new(&given)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.into_path())
        .filter(|path| path.extension().map(|ext| ext == "pro").unwrap_or(false))
        .collect();
    candidates.sort();

    match candidates.len() {
        0 => Err(anyhow!("No .pro file found in {}", given.display())),
        1 => Ok(paths::normalize(&candidates[0])),
        _ => Err(anyhow!(
            "Several project files in {}; name one of: {}",
            given.display(),
            candidates
                .iter()
                .filter_map(|path| path.file_name())
                .map(|name| name.to_string_lossy().into_owned())
                .collect::<Vec<_>>()
                .join(", ")
        )),
    }
}

/// Globals from the process environment plus command-line overrides
pub(crate) fn build_globals(
    defines: &[String],
    cc: Option<&str>,
    cxx: Option<&str>,
) -> Globals {
    let mut globals = Globals::from_environment();
    globals.overrides.extend(defines.iter().cloned());
    if let Some(cc) = cc {
        globals.expected_tools.insert("CC".to_string(), cc.to_string());
    }
    if let Some(cxx) = cxx {
        globals
            .expected_tools
            .insert("CXX".to_string(), cxx.to_string());
    }
    globals
}
