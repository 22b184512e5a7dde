//! Whole-project reading
//!
//! A read runs the evaluator up to twice per project file: once in exact
//! mode, and once cumulatively when exact mode succeeded or stopped at an
//! undecidable condition. The outcome says which of the two produced data.
//! Sub-directory projects are followed recursively, so one call yields the
//! whole project tree's worth of results.

use crate::bindings::{ProjectType, VariableBindings};
use crate::cache::ParseCache;
use crate::contents::{self, ProContents};
use crate::error::ReadError;
use crate::eval::{evaluate_pro_file, EvalMode, EvalRun, ReadSession};
use crate::globals::Globals;
use promodel_common::{paths, Diagnostic, FileSystem};
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use tracing::debug;

/// How far a project read got
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EvalOutcome {
    /// Exact evaluation succeeded
    Ok,
    /// Exact evaluation hit an undecidable condition; cumulative data stands in
    PartialFailure,
    /// The file could not be read at all
    Failure,
    /// A cancellation request stopped the read; nothing can be concluded
    Aborted,
}

impl std::fmt::Display for EvalOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Self::Ok => "ok",
            Self::PartialFailure => "partial-failure",
            Self::Failure => "failure",
            Self::Aborted => "aborted",
        };
        write!(f, "{}", text)
    }
}

/// Data one evaluation mode produced for one project file
#[derive(Debug, Clone, Serialize)]
pub struct ProData {
    pub bindings: VariableBindings,
    pub project_type: ProjectType,
    pub contents: ProContents,
}

/// Result of reading one project file in both modes
#[derive(Debug, Clone, Serialize)]
pub struct ProReadResult {
    pub path: PathBuf,
    pub outcome: EvalOutcome,
    pub exact: Option<ProData>,
    pub cumulative: Option<ProData>,
    pub diagnostics: Vec<Diagnostic>,
}

impl ProReadResult {
    fn aborted(path: PathBuf) -> Self {
        Self {
            path,
            outcome: EvalOutcome::Aborted,
            exact: None,
            cumulative: None,
            diagnostics: Vec::new(),
        }
    }

    /// The more precise of the two data sets, when any exists
    pub fn primary(&self) -> Option<&ProData> {
        self.exact.as_ref().or(self.cumulative.as_ref())
    }

    /// Child project files from whichever modes produced data
    pub fn subprojects(&self) -> BTreeSet<PathBuf> {
        let mut children = BTreeSet::new();
        if let Some(data) = &self.exact {
            children.extend(data.contents.subprojects.iter().cloned());
        }
        if let Some(data) = &self.cumulative {
            children.extend(data.contents.subprojects.iter().cloned());
        }
        children
    }
}

/// One project file's result together with its children, in path order
#[derive(Debug, Clone, Serialize)]
pub struct ProSubtree {
    pub result: ProReadResult,
    pub children: Vec<ProSubtree>,
}

impl ProSubtree {
    /// True when this read or any nested read was cancelled
    pub fn aborted(&self) -> bool {
        self.result.outcome == EvalOutcome::Aborted || self.children.iter().any(Self::aborted)
    }
}

/// Reads project files against one configuration, sharing one parse cache
pub struct ProReader<'a> {
    fs: &'a dyn FileSystem,
    globals: &'a Globals,
    cache: &'a ParseCache,
    cancel: Option<&'a AtomicBool>,
}

impl<'a> ProReader<'a> {
    pub fn new(fs: &'a dyn FileSystem, globals: &'a Globals, cache: &'a ParseCache) -> Self {
        Self {
            fs,
            globals,
            cache,
            cancel: None,
        }
    }

    /// Readers carrying a cancel flag stop at the next file boundary once
    /// the flag is raised
    pub fn with_cancel(mut self, cancel: &'a AtomicBool) -> Self {
        self.cancel = Some(cancel);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .is_some_and(|flag| flag.load(std::sync::atomic::Ordering::Relaxed))
    }

    /// Read one project file in both modes
    pub fn read_project(&self, path: &Path) -> ProReadResult {
        let path = paths::normalize(path);
        if self.cancelled() {
            return ProReadResult::aborted(path);
        }

        let mut session = ReadSession::new(self.fs, self.globals, self.cache, self.cancel);
        let mut exact_run = evaluate_pro_file(&mut session, EvalMode::Exact, &path);
        let mut diagnostics = std::mem::take(&mut exact_run.diagnostics);

        let mut result = match exact_run.result {
            Ok(()) => {
                let exact = self.build_data(&path, exact_run, &mut diagnostics);
                let mut cumulative_run = evaluate_pro_file(&mut session, EvalMode::Cumulative, &path);
                diagnostics.append(&mut cumulative_run.diagnostics);
                match cumulative_run.result {
                    Err(ReadError::Aborted) => return ProReadResult::aborted(path),
                    Err(error) => {
                        self.push_error(&mut diagnostics, &error);
                        ProReadResult {
                            path,
                            outcome: EvalOutcome::Failure,
                            exact: None,
                            cumulative: None,
                            diagnostics,
                        }
                    }
                    Ok(()) => {
                        let cumulative = self.build_data(&path, cumulative_run, &mut diagnostics);
                        ProReadResult {
                            path,
                            outcome: EvalOutcome::Ok,
                            exact: Some(exact),
                            cumulative: Some(cumulative),
                            diagnostics,
                        }
                    }
                }
            }
            Err(ReadError::Aborted) => return ProReadResult::aborted(path),
            Err(error @ ReadError::UnresolvedCondition { .. }) => {
                self.push_error(&mut diagnostics, &error);
                let mut cumulative_run = evaluate_pro_file(&mut session, EvalMode::Cumulative, &path);
                diagnostics.append(&mut cumulative_run.diagnostics);
                match cumulative_run.result {
                    Err(ReadError::Aborted) => return ProReadResult::aborted(path),
                    Err(error) => {
                        self.push_error(&mut diagnostics, &error);
                        ProReadResult {
                            path,
                            outcome: EvalOutcome::Failure,
                            exact: None,
                            cumulative: None,
                            diagnostics,
                        }
                    }
                    Ok(()) => {
                        let cumulative = self.build_data(&path, cumulative_run, &mut diagnostics);
                        ProReadResult {
                            path,
                            outcome: EvalOutcome::PartialFailure,
                            exact: None,
                            cumulative: Some(cumulative),
                            diagnostics,
                        }
                    }
                }
            }
            Err(error) => {
                self.push_error(&mut diagnostics, &error);
                ProReadResult {
                    path,
                    outcome: EvalOutcome::Failure,
                    exact: None,
                    cumulative: None,
                    diagnostics,
                }
            }
        };

        dedupe(&mut result.diagnostics);
        result
    }

    /// Read a project file and every sub-project below it
    pub fn read_subtree(&self, path: &Path) -> ProSubtree {
        let root = paths::normalize(path);
        self.read_subtree_inner(&root, &mut Vec::new())
    }

    fn read_subtree_inner(&self, path: &Path, ancestors: &mut Vec<PathBuf>) -> ProSubtree {
        let result = self.read_project(path);
        let mut children = Vec::new();
        if result.outcome != EvalOutcome::Aborted {
            ancestors.push(path.to_path_buf());
            for child in result.subprojects() {
                if ancestors.contains(&child) {
                    debug!(parent = %path.display(), child = %child.display(),
                        "skipping sub-project that is its own ancestor");
                    continue;
                }
                if self.cancelled() {
                    children.push(ProSubtree {
                        result: ProReadResult::aborted(child),
                        children: Vec::new(),
                    });
                    break;
                }
                children.push(self.read_subtree_inner(&child, ancestors));
            }
            ancestors.pop();
        }
        ProSubtree { result, children }
    }

    fn build_data(
        &self,
        path: &Path,
        run: EvalRun,
        diagnostics: &mut Vec<Diagnostic>,
    ) -> ProData {
        let bindings = VariableBindings::from(run.values);
        let project_type = ProjectType::from_template(bindings.first("TEMPLATE"));
        let contents = contents::extract(
            path,
            &bindings,
            &run.included,
            &run.watch_dirs,
            self.fs,
            diagnostics,
        );
        ProData {
            bindings,
            project_type,
            contents,
        }
    }

    fn push_error(&self, diagnostics: &mut Vec<Diagnostic>, error: &ReadError) {
        if let Some(kind) = error.diagnostic_kind() {
            let mut diagnostic = Diagnostic::error(kind, error.to_string());
            if let Some(path) = error.path() {
                diagnostic = diagnostic.with_file(path);
            }
            diagnostics.push(diagnostic);
        }
    }
}

fn dedupe(diagnostics: &mut Vec<Diagnostic>) {
    let mut seen: Vec<Diagnostic> = Vec::new();
    diagnostics.retain(|diagnostic| {
        if seen.contains(diagnostic) {
            false
        } else {
            seen.push(diagnostic.clone());
            true
        }
    });
}
