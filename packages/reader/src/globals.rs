use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

/// Definitions shared by every evaluation in one project: the environment,
/// command-line style overrides, include search paths and the feature words
/// of the active configuration.
#[derive(Debug, Clone, Default)]
pub struct Globals {
    /// Environment variables visible to `$$(NAME)` references
    pub env: BTreeMap<String, String>,
    /// Extra statements applied before the root file, e.g. `CONFIG += debug`
    pub overrides: Vec<String>,
    /// Fallback directories for include() resolution
    pub search_paths: Vec<PathBuf>,
    /// Feature words preset in CONFIG before evaluation starts
    pub base_features: BTreeSet<String>,
    /// Every feature word this configuration can decide. A bare-word test
    /// outside this set and outside CONFIG is unresolvable.
    pub declared_features: BTreeSet<String>,
    /// Compiler paths the configuration expects, keyed by variable
    /// name (CC, CXX)
    pub expected_tools: BTreeMap<String, String>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Globals seeded from the process environment and the host platform
    pub fn from_environment() -> Self {
        let (base_features, declared_features) = host_features();
        Self {
            env: std::env::vars().collect(),
            overrides: Vec::new(),
            search_paths: Vec::new(),
            base_features,
            declared_features,
            expected_tools: BTreeMap::new(),
        }
    }

    /// True when a bare-word test on `word` has a defined answer
    pub fn can_decide_feature(&self, word: &str) -> bool {
        self.declared_features.contains(word) || self.base_features.contains(word)
    }
}

/// Feature words for the host platform: the active set and the full set of
/// platform words the configuration can rule out.
pub fn host_features() -> (BTreeSet<String>, BTreeSet<String>) {
    let mut base: BTreeSet<String> = BTreeSet::new();
    if cfg!(target_os = "macos") {
        base.insert("unix".to_string());
        base.insert("macx".to_string());
    } else if cfg!(windows) {
        base.insert("win32".to_string());
    } else if cfg!(unix) {
        base.insert("unix".to_string());
        base.insert("linux".to_string());
    }
    base.insert("release".to_string());

    let mut declared: BTreeSet<String> = ["unix", "linux", "macx", "win32", "debug", "release"]
        .into_iter()
        .map(str::to_string)
        .collect();
    declared.extend(base.iter().cloned());

    (base, declared)
}
