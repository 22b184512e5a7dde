use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// File system abstraction for project reading and testing
pub trait FileSystem: Send + Sync {
    /// Check if a path exists
    fn exists(&self, path: &Path) -> bool;

    /// Check if a path is a directory
    fn is_dir(&self, path: &Path) -> bool;

    /// Canonicalize a path (resolve symlinks, make absolute)
    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error>;

    /// Read the full contents of a file as UTF-8 text
    fn read_to_string(&self, path: &Path) -> Result<String, std::io::Error>;

    /// List the direct children of a directory, sorted by path
    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, std::io::Error>;
}

/// Real file system implementation
pub struct RealFileSystem;

impl FileSystem for RealFileSystem {
    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn is_dir(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        std::fs::canonicalize(path)
    }

    fn read_to_string(&self, path: &Path) -> Result<String, std::io::Error> {
        std::fs::read_to_string(path)
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        let mut entries: Vec<PathBuf> = std::fs::read_dir(path)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .collect();
        entries.sort();
        Ok(entries)
    }
}

/// Mock file system for testing
pub struct MockFileSystem {
    files: BTreeMap<PathBuf, String>,
    dirs: BTreeSet<PathBuf>,
}

impl MockFileSystem {
    pub fn new() -> Self {
        Self {
            files: BTreeMap::new(),
            dirs: BTreeSet::new(),
        }
    }

    /// Register a file with contents. Parent directories are registered implicitly.
    pub fn add_file(&mut self, path: impl Into<PathBuf>, contents: impl Into<String>) {
        let path = path.into();
        self.add_ancestors(&path);
        self.files.insert(path, contents.into());
    }

    pub fn add_dir(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        self.add_ancestors(&path);
        self.dirs.insert(path);
    }

    fn add_ancestors(&mut self, path: &Path) {
        let mut current = path.parent();
        while let Some(dir) = current {
            if dir.as_os_str().is_empty() {
                break;
            }
            self.dirs.insert(dir.to_path_buf());
            current = dir.parent();
        }
    }
}

impl Default for MockFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl FileSystem for MockFileSystem {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn is_dir(&self, path: &Path) -> bool {
        self.dirs.contains(path)
    }

    fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
        // For mock, just return the path as-is
        Ok(path.to_path_buf())
    }

    fn read_to_string(&self, path: &Path) -> Result<String, std::io::Error> {
        self.files.get(path).cloned().ok_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, format!("{}", path.display()))
        })
    }

    fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
        if !self.is_dir(path) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{}", path.display()),
            ));
        }
        let mut entries: Vec<PathBuf> = self
            .files
            .keys()
            .chain(self.dirs.iter())
            .filter(|p| p.parent() == Some(path))
            .cloned()
            .collect();
        entries.sort();
        entries.dedup();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_registers_parent_dirs() {
        let mut fs = MockFileSystem::new();
        fs.add_file("/proj/src/main.cpp", "");

        assert!(fs.exists(Path::new("/proj/src/main.cpp")));
        assert!(fs.is_dir(Path::new("/proj/src")));
        assert!(fs.is_dir(Path::new("/proj")));
        assert!(!fs.is_dir(Path::new("/proj/src/main.cpp")));
    }

    #[test]
    fn test_mock_read_dir_lists_direct_children() {
        let mut fs = MockFileSystem::new();
        fs.add_file("/proj/app.pro", "TEMPLATE = app");
        fs.add_file("/proj/src/main.cpp", "");
        fs.add_file("/proj/src/util.cpp", "");

        let entries = fs.read_dir(Path::new("/proj")).unwrap();
        assert_eq!(
            entries,
            vec![PathBuf::from("/proj/app.pro"), PathBuf::from("/proj/src")]
        );

        let entries = fs.read_dir(Path::new("/proj/src")).unwrap();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn test_mock_read_missing_file() {
        let fs = MockFileSystem::new();
        assert!(fs.read_to_string(Path::new("/nope.pro")).is_err());
    }
}
