//! Structured project contents distilled from raw variable bindings
//!
//! Evaluation leaves behind a flat map of variables. This module turns the
//! well-known ones into typed structure: the file groups, the sub-project
//! list, install rules and target details. Everything path-like is resolved
//! against the project file's directory, and every directory a wildcard or
//! a missing sub-project depends on is recorded for watching.

use crate::bindings::{FileKind, ProjectType, VariableBindings};
use crate::functions::expand_wildcard;
use promodel_common::{paths, Diagnostic, DiagnosticKind, FileSystem};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// One file the project names, with how it is used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub kind: FileKind,
    /// Produced by the build rather than checked in
    pub generated: bool,
}

/// Where the build output goes
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TargetDescription {
    pub name: String,
    pub destdir: Option<PathBuf>,
    pub objects_dir: Option<PathBuf>,
}

/// One INSTALLS rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstallRule {
    pub name: String,
    pub files: Vec<PathBuf>,
    pub target_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProContents {
    /// Files the project names, keyed by resolved path
    pub files: BTreeMap<PathBuf, FileEntry>,
    /// Files pulled in through include()
    pub includes: BTreeSet<PathBuf>,
    /// Child project files, present only for sub-directory projects
    pub subprojects: BTreeSet<PathBuf>,
    /// Directories whose contents influence this project
    pub watch_dirs: BTreeSet<PathBuf>,
    pub target: TargetDescription,
    pub install_rules: Vec<InstallRule>,
    /// Compiler overrides the project sets, keyed by variable name
    pub tools: BTreeMap<String, String>,
}

const FILE_GROUPS: &[(&str, FileKind, bool)] = &[
    ("SOURCES", FileKind::Source, false),
    ("HEADERS", FileKind::Header, false),
    ("RESOURCES", FileKind::Resource, false),
    ("FORMS", FileKind::Form, false),
    ("OTHER_FILES", FileKind::Other, false),
    ("DISTFILES", FileKind::Other, false),
    ("GENERATED_SOURCES", FileKind::Source, true),
    ("GENERATED_FILES", FileKind::Other, true),
];

/// Distill typed contents out of one evaluation's bindings
pub fn extract(
    pro_path: &Path,
    bindings: &VariableBindings,
    included: &BTreeSet<PathBuf>,
    eval_watch_dirs: &BTreeSet<PathBuf>,
    fs: &dyn FileSystem,
    diagnostics: &mut Vec<Diagnostic>,
) -> ProContents {
    let dir = pro_path.parent().unwrap_or_else(|| Path::new(""));
    let mut contents = ProContents {
        includes: included.clone(),
        watch_dirs: eval_watch_dirs.clone(),
        ..ProContents::default()
    };

    for &(variable, kind, generated) in FILE_GROUPS {
        for value in bindings.get(variable) {
            let resolved = paths::resolve_in(dir, value);
            if paths::is_wildcard(value) {
                match expand_wildcard(fs, &resolved, false) {
                    Ok(expansion) => {
                        contents.watch_dirs.extend(expansion.watched_dirs);
                        for path in expansion.matches {
                            insert_file(&mut contents.files, path, kind, generated);
                        }
                    }
                    Err(error) => diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::SyntaxOrCycle,
                            format!("invalid pattern `{}` in {}: {}", value, variable, error),
                        )
                        .with_file(pro_path),
                    ),
                }
            } else {
                insert_file(&mut contents.files, resolved, kind, generated);
            }
        }
    }

    contents.target = extract_target(pro_path, dir, bindings);
    contents.install_rules = extract_installs(dir, bindings, &contents.target, fs, &mut contents.watch_dirs);

    for variable in ["CC", "CXX"] {
        if let Some(value) = bindings.first(variable) {
            contents.tools.insert(variable.to_string(), value.to_string());
        }
    }

    if ProjectType::from_template(bindings.first("TEMPLATE")) == ProjectType::SubDirs {
        extract_subprojects(dir, bindings, fs, &mut contents);
    }

    contents
}

fn insert_file(
    files: &mut BTreeMap<PathBuf, FileEntry>,
    path: PathBuf,
    kind: FileKind,
    generated: bool,
) {
    files
        .entry(path)
        .and_modify(|entry| entry.generated |= generated)
        .or_insert(FileEntry { kind, generated });
}

fn extract_target(pro_path: &Path, dir: &Path, bindings: &VariableBindings) -> TargetDescription {
    let name = bindings
        .first("TARGET")
        .map(str::to_string)
        .or_else(|| {
            pro_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
        })
        .unwrap_or_default();
    TargetDescription {
        name,
        destdir: bindings.first("DESTDIR").map(|v| paths::resolve_in(dir, v)),
        objects_dir: bindings
            .first("OBJECTS_DIR")
            .map(|v| paths::resolve_in(dir, v)),
    }
}

fn extract_installs(
    dir: &Path,
    bindings: &VariableBindings,
    target: &TargetDescription,
    fs: &dyn FileSystem,
    watch_dirs: &mut BTreeSet<PathBuf>,
) -> Vec<InstallRule> {
    let mut rules = Vec::new();
    for rule in bindings.get("INSTALLS") {
        let target_path = bindings
            .first(&format!("{}.path", rule))
            .map(str::to_string);
        let files = if rule == "target" {
            let base = target.destdir.clone().unwrap_or_else(|| dir.to_path_buf());
            vec![base.join(&target.name)]
        } else {
            let mut files = Vec::new();
            for value in bindings.get(&format!("{}.files", rule)) {
                let resolved = paths::resolve_in(dir, value);
                if paths::is_wildcard(value) {
                    if let Ok(expansion) = expand_wildcard(fs, &resolved, false) {
                        watch_dirs.extend(expansion.watched_dirs);
                        files.extend(expansion.matches);
                    }
                } else {
                    files.push(resolved);
                }
            }
            files
        };
        rules.push(InstallRule {
            name: rule.clone(),
            files,
            target_path,
        });
    }
    rules
}

/// Resolve SUBDIRS entries to project file paths. An entry can name a
/// directory holding `<name>.pro`, a project file directly, or carry
/// `.file` / `.subdir` modifier variables. An entry whose project file
/// is not on disk is left out of the child list; its nearest existing
/// ancestor directory is watched instead, so the file's arrival triggers
/// a re-read that picks the child up.
fn extract_subprojects(
    dir: &Path,
    bindings: &VariableBindings,
    fs: &dyn FileSystem,
    contents: &mut ProContents,
) {
    for entry in bindings.get("SUBDIRS") {
        let pro = if let Some(file) = bindings.first(&format!("{}.file", entry)) {
            paths::resolve_in(dir, file)
        } else if let Some(subdir) = bindings.first(&format!("{}.subdir", entry)) {
            let resolved = paths::resolve_in(dir, subdir);
            pro_inside(&resolved)
        } else {
            let resolved = paths::resolve_in(dir, entry);
            if fs.is_dir(&resolved) {
                pro_inside(&resolved)
            } else {
                resolved
            }
        };
        if !fs.exists(&pro) {
            if let Some(watch) = nearest_existing_dir(fs, pro.parent().unwrap_or(dir)) {
                contents.watch_dirs.insert(watch);
            }
            continue;
        }
        contents.subprojects.insert(pro);
    }
}

/// The conventional project file inside a sub-directory
fn pro_inside(dir: &Path) -> PathBuf {
    match dir.file_name() {
        Some(name) => dir.join(format!("{}.pro", name.to_string_lossy())),
        None => dir.to_path_buf(),
    }
}

fn nearest_existing_dir(fs: &dyn FileSystem, start: &Path) -> Option<PathBuf> {
    let mut current = Some(start);
    while let Some(dir) = current {
        if fs.is_dir(dir) {
            return Some(dir.to_path_buf());
        }
        current = dir.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use promodel_common::MockFileSystem;

    fn bindings(pairs: &[(&str, &[&str])]) -> VariableBindings {
        let mut bindings = VariableBindings::new();
        for (name, values) in pairs {
            bindings.set(*name, values.iter().map(|v| v.to_string()).collect());
        }
        bindings
    }

    fn extract_with(fs: &MockFileSystem, bindings: &VariableBindings) -> ProContents {
        let mut diagnostics = Vec::new();
        let contents = extract(
            Path::new("/proj/app.pro"),
            bindings,
            &BTreeSet::new(),
            &BTreeSet::new(),
            fs,
            &mut diagnostics,
        );
        assert!(diagnostics.is_empty(), "unexpected: {:?}", diagnostics);
        contents
    }

    #[test]
    fn test_file_groups_resolve_against_project_dir() {
        let fs = MockFileSystem::new();
        let bindings = bindings(&[
            ("SOURCES", &["main.cpp", "src/util.cpp"]),
            ("HEADERS", &["src/util.h"]),
        ]);
        let contents = extract_with(&fs, &bindings);
        assert_eq!(
            contents.files[Path::new("/proj/main.cpp")],
            FileEntry { kind: FileKind::Source, generated: false }
        );
        assert_eq!(
            contents.files[Path::new("/proj/src/util.h")].kind,
            FileKind::Header
        );
        assert_eq!(contents.files.len(), 3);
    }

    #[test]
    fn test_wildcard_sources_expand_and_watch() {
        let mut fs = MockFileSystem::new();
        fs.add_file("/proj/src/a.cpp", "");
        fs.add_file("/proj/src/b.cpp", "");
        fs.add_file("/proj/src/notes.txt", "");
        let bindings = bindings(&[("SOURCES", &["src/*.cpp"])]);
        let contents = extract_with(&fs, &bindings);
        assert_eq!(contents.files.len(), 2);
        assert!(contents.files.contains_key(Path::new("/proj/src/b.cpp")));
        assert!(contents.watch_dirs.contains(Path::new("/proj/src")));
    }

    #[test]
    fn test_generated_flag_merges_onto_existing_entry() {
        let fs = MockFileSystem::new();
        let bindings = bindings(&[
            ("SOURCES", &["gen/tables.cpp"]),
            ("GENERATED_SOURCES", &["gen/tables.cpp"]),
        ]);
        let contents = extract_with(&fs, &bindings);
        let entry = contents.files[Path::new("/proj/gen/tables.cpp")];
        assert_eq!(entry.kind, FileKind::Source);
        assert!(entry.generated);
    }

    #[test]
    fn test_target_defaults_to_file_stem() {
        let fs = MockFileSystem::new();
        let contents = extract_with(&fs, &bindings(&[]));
        assert_eq!(contents.target.name, "app");
        assert!(contents.target.destdir.is_none());
    }

    #[test]
    fn test_target_variables() {
        let fs = MockFileSystem::new();
        let bindings = bindings(&[
            ("TARGET", &["demo"]),
            ("DESTDIR", &["bin"]),
            ("OBJECTS_DIR", &["/tmp/obj"]),
        ]);
        let contents = extract_with(&fs, &bindings);
        assert_eq!(contents.target.name, "demo");
        assert_eq!(contents.target.destdir.as_deref(), Some(Path::new("/proj/bin")));
        assert_eq!(
            contents.target.objects_dir.as_deref(),
            Some(Path::new("/tmp/obj"))
        );
    }

    #[test]
    fn test_subdirs_styles() {
        let mut fs = MockFileSystem::new();
        fs.add_file("/proj/lib/lib.pro", "");
        fs.add_file("/proj/tools/conv/conv.pro", "");
        fs.add_file("/proj/extra/custom.pro", "");
        let bindings = bindings(&[
            ("TEMPLATE", &["subdirs"]),
            ("SUBDIRS", &["lib", "conv", "custom"]),
            ("conv.subdir", &["tools/conv"]),
            ("custom.file", &["extra/custom.pro"]),
        ]);
        let contents = extract_with(&fs, &bindings);
        let expected: BTreeSet<PathBuf> = [
            "/proj/lib/lib.pro",
            "/proj/tools/conv/conv.pro",
            "/proj/extra/custom.pro",
        ]
        .into_iter()
        .map(PathBuf::from)
        .collect();
        assert_eq!(contents.subprojects, expected);
    }

    #[test]
    fn test_missing_subdir_dropped_and_parent_watched() {
        let fs = {
            let mut fs = MockFileSystem::new();
            fs.add_dir("/proj");
            fs
        };
        let bindings = bindings(&[("TEMPLATE", &["subdirs"]), ("SUBDIRS", &["ghost"])]);
        let contents = extract_with(&fs, &bindings);
        assert!(contents.subprojects.is_empty());
        assert!(contents.watch_dirs.contains(Path::new("/proj")));
    }

    #[test]
    fn test_subdirs_ignored_without_subdirs_template() {
        let mut fs = MockFileSystem::new();
        fs.add_file("/proj/lib/lib.pro", "");
        let bindings = bindings(&[("TEMPLATE", &["app"]), ("SUBDIRS", &["lib"])]);
        let contents = extract_with(&fs, &bindings);
        assert!(contents.subprojects.is_empty());
    }

    #[test]
    fn test_install_rules() {
        let mut fs = MockFileSystem::new();
        fs.add_file("/proj/conf/a.conf", "");
        fs.add_file("/proj/conf/b.conf", "");
        let bindings = bindings(&[
            ("TARGET", &["demo"]),
            ("DESTDIR", &["out"]),
            ("INSTALLS", &["target", "configs"]),
            ("target.path", &["/usr/local/bin"]),
            ("configs.files", &["conf/*.conf"]),
            ("configs.path", &["/etc/demo"]),
        ]);
        let contents = extract_with(&fs, &bindings);
        assert_eq!(contents.install_rules.len(), 2);
        let target_rule = &contents.install_rules[0];
        assert_eq!(target_rule.name, "target");
        assert_eq!(target_rule.files, vec![PathBuf::from("/proj/out/demo")]);
        assert_eq!(target_rule.target_path.as_deref(), Some("/usr/local/bin"));
        let configs = &contents.install_rules[1];
        assert_eq!(configs.files.len(), 2);
        assert_eq!(configs.target_path.as_deref(), Some("/etc/demo"));
    }

    #[test]
    fn test_tool_overrides() {
        let fs = MockFileSystem::new();
        let bindings = bindings(&[("CXX", &["/opt/gcc/bin/g++"])]);
        let contents = extract_with(&fs, &bindings);
        assert_eq!(contents.tools.get("CXX").map(String::as_str), Some("/opt/gcc/bin/g++"));
        assert!(!contents.tools.contains_key("CC"));
    }
}
