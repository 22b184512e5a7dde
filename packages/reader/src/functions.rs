//! Wildcard expansion against the project file system

use promodel_common::{paths, FileSystem};
use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};

/// Result of expanding one wildcard pattern
#[derive(Debug, Default)]
pub struct WildcardExpansion {
    /// Matching files, sorted
    pub matches: Vec<PathBuf>,
    /// Directories that were listed. The engine watches these so the
    /// pattern can be re-expanded when their contents change.
    pub watched_dirs: BTreeSet<PathBuf>,
}

/// Expand an absolute pattern such as `/proj/src/*.cpp`.
///
/// Wildcards may appear in any component. With `recursive` set, the final
/// component is also matched in every directory below its parent.
pub fn expand_wildcard(
    fs: &dyn FileSystem,
    pattern: &Path,
    recursive: bool,
) -> Result<WildcardExpansion, glob::PatternError> {
    let mut expansion = WildcardExpansion::default();

    let mut components = Vec::new();
    let mut prefix = PathBuf::new();
    for component in pattern.components() {
        match component {
            Component::Normal(text) => components.push(text.to_string_lossy().into_owned()),
            other => {
                if components.is_empty() {
                    prefix.push(other.as_os_str());
                } else {
                    // `..` after a wildcard; normalize lexically and retry
                    return expand_wildcard(fs, &paths::normalize(pattern), recursive);
                }
            }
        }
    }

    let mut current = vec![prefix];
    for (index, text) in components.iter().enumerate() {
        let last = index + 1 == components.len();
        if !paths::is_wildcard(text) {
            for path in &mut current {
                path.push(text);
            }
            continue;
        }

        let matcher = glob::Pattern::new(text)?;
        let mut next = Vec::new();
        for dir in &current {
            let mut dirs = vec![dir.clone()];
            if last && recursive {
                collect_subdirs(fs, dir, &mut dirs);
            }
            for dir in dirs {
                if !fs.is_dir(&dir) {
                    continue;
                }
                expansion.watched_dirs.insert(dir.clone());
                let Ok(entries) = fs.read_dir(&dir) else {
                    continue;
                };
                for entry in entries {
                    let matched = entry
                        .file_name()
                        .map(|name| matcher.matches(&name.to_string_lossy()))
                        .unwrap_or(false);
                    if !matched {
                        continue;
                    }
                    if last {
                        if !fs.is_dir(&entry) {
                            next.push(entry);
                        }
                    } else if fs.is_dir(&entry) {
                        next.push(entry);
                    }
                }
            }
        }
        current = next;
    }

    // a fully literal pattern degenerates to an existence check
    expansion.matches = current.into_iter().filter(|p| fs.exists(p)).collect();
    expansion.matches.sort();
    expansion.matches.dedup();
    Ok(expansion)
}

fn collect_subdirs(fs: &dyn FileSystem, dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs.read_dir(dir) else {
        return;
    };
    for entry in entries {
        if fs.is_dir(&entry) {
            collect_subdirs(fs, &entry, out);
            out.push(entry);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promodel_common::MockFileSystem;

    fn fixture() -> MockFileSystem {
        let mut fs = MockFileSystem::new();
        fs.add_file("/proj/src/main.cpp", "");
        fs.add_file("/proj/src/util.cpp", "");
        fs.add_file("/proj/src/util.h", "");
        fs.add_file("/proj/src/gen/table.cpp", "");
        fs.add_file("/proj/other/readme.md", "");
        fs
    }

    #[test]
    fn test_expand_simple_pattern() {
        let fs = fixture();
        let expansion = expand_wildcard(&fs, Path::new("/proj/src/*.cpp"), false).unwrap();
        assert_eq!(
            expansion.matches,
            vec![
                PathBuf::from("/proj/src/main.cpp"),
                PathBuf::from("/proj/src/util.cpp"),
            ]
        );
        assert!(expansion.watched_dirs.contains(Path::new("/proj/src")));
    }

    #[test]
    fn test_expand_directory_wildcard() {
        let fs = fixture();
        let expansion = expand_wildcard(&fs, Path::new("/proj/*/main.cpp"), false).unwrap();
        assert_eq!(expansion.matches, vec![PathBuf::from("/proj/src/main.cpp")]);
        // the dir component was listed at /proj
        assert!(expansion.watched_dirs.contains(Path::new("/proj")));
    }

    #[test]
    fn test_expand_recursive() {
        let fs = fixture();
        let expansion = expand_wildcard(&fs, Path::new("/proj/src/*.cpp"), true).unwrap();
        assert_eq!(
            expansion.matches,
            vec![
                PathBuf::from("/proj/src/gen/table.cpp"),
                PathBuf::from("/proj/src/main.cpp"),
                PathBuf::from("/proj/src/util.cpp"),
            ]
        );
        assert!(expansion.watched_dirs.contains(Path::new("/proj/src/gen")));
    }

    #[test]
    fn test_empty_match_still_watches_dir() {
        let fs = fixture();
        let expansion = expand_wildcard(&fs, Path::new("/proj/src/*.qml"), false).unwrap();
        assert!(expansion.matches.is_empty());
        assert!(expansion.watched_dirs.contains(Path::new("/proj/src")));
    }

    #[test]
    fn test_missing_dir_no_matches() {
        let fs = fixture();
        let expansion = expand_wildcard(&fs, Path::new("/proj/ghost/*.cpp"), false).unwrap();
        assert!(expansion.matches.is_empty());
        assert!(expansion.watched_dirs.is_empty());
    }

    #[test]
    fn test_literal_pattern_checks_existence() {
        let fs = fixture();
        let expansion = expand_wildcard(&fs, Path::new("/proj/src/main.cpp"), false).unwrap();
        assert_eq!(expansion.matches, vec![PathBuf::from("/proj/src/main.cpp")]);

        let missing = expand_wildcard(&fs, Path::new("/proj/src/ghost.cpp"), false).unwrap();
        assert!(missing.matches.is_empty());
    }
}
