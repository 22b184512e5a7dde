//! Statement evaluation for project files
//!
//! Two modes share this walker. Exact mode follows only the branches the
//! current configuration selects and refuses to guess: a condition that
//! cannot be decided stops the run. Cumulative mode explores every branch
//! of every condition and tolerates broken includes, so it always produces
//! a superset of the reachable structure.

use crate::cache::{CacheEntry, ParseCache};
use crate::error::{ReadError, ReadResult};
use crate::functions::expand_wildcard;
use crate::globals::Globals;
use promodel_common::{paths, Diagnostic, DiagnosticKind, FileSystem};
use promodel_parser::{Call, Condition, ProFile, Statement, Test, Word, WordPart};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvalMode {
    /// Follow only branches the configuration decides
    Exact,
    /// Follow every branch to discover all reachable structure
    Cumulative,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Truth {
    True,
    False,
    Unknown,
}

/// Shared state for all evaluations belonging to one read: the file system,
/// the globals, the cancel flag and every parse cache claim taken so far.
/// Claims are given back when the session drops.
pub(crate) struct ReadSession<'a> {
    pub fs: &'a dyn FileSystem,
    pub globals: &'a Globals,
    cache: &'a ParseCache,
    cancel: Option<&'a AtomicBool>,
    acquired: Vec<CacheEntry>,
}

impl<'a> ReadSession<'a> {
    pub fn new(
        fs: &'a dyn FileSystem,
        globals: &'a Globals,
        cache: &'a ParseCache,
        cancel: Option<&'a AtomicBool>,
    ) -> Self {
        Self {
            fs,
            globals,
            cache,
            cancel,
            acquired: Vec::new(),
        }
    }

    pub fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    /// Parse `path` through the cache, claiming its slot for this session
    pub fn parse_file(&mut self, path: &Path) -> ReadResult<Arc<ProFile>> {
        let entry = self.cache.acquire(path);
        let result = entry.parse_with(|| {
            let source = self
                .fs
                .read_to_string(path)
                .map_err(|e| ReadError::unreadable(path, e))?;
            promodel_parser::parse(&source).map_err(|e| ReadError::syntax(path, e))
        });
        self.acquired.push(entry);
        result
    }
}

impl Drop for ReadSession<'_> {
    fn drop(&mut self) {
        for entry in self.acquired.drain(..) {
            self.cache.release(entry);
        }
    }
}

/// Everything one evaluation produced, whether or not it ran to completion
pub(crate) struct EvalRun {
    pub result: ReadResult<()>,
    pub values: BTreeMap<String, Vec<String>>,
    pub included: BTreeSet<PathBuf>,
    pub watch_dirs: BTreeSet<PathBuf>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Evaluate `root` and everything it includes in one mode
pub(crate) fn evaluate_pro_file(
    session: &mut ReadSession<'_>,
    mode: EvalMode,
    root: &Path,
) -> EvalRun {
    let mut evaluator = Evaluator {
        mode,
        session,
        values: BTreeMap::new(),
        include_stack: Vec::new(),
        included: BTreeSet::new(),
        watch_dirs: BTreeSet::new(),
        diagnostics: Vec::new(),
    };
    let result = evaluator.evaluate_root(root);
    EvalRun {
        result,
        values: evaluator.values,
        included: evaluator.included,
        watch_dirs: evaluator.watch_dirs,
        diagnostics: evaluator.diagnostics,
    }
}

struct Evaluator<'s, 'a> {
    mode: EvalMode,
    session: &'s mut ReadSession<'a>,
    values: BTreeMap<String, Vec<String>>,
    include_stack: Vec<PathBuf>,
    included: BTreeSet<PathBuf>,
    watch_dirs: BTreeSet<PathBuf>,
    diagnostics: Vec<Diagnostic>,
}

impl Evaluator<'_, '_> {
    fn evaluate_root(&mut self, root: &Path) -> ReadResult<()> {
        if self.session.cancelled() {
            return Err(ReadError::Aborted);
        }
        let root = paths::normalize(root);
        let doc = self.session.parse_file(&root)?;
        self.include_stack.push(root);

        self.seed_config();
        self.apply_overrides()?;
        let result = self.eval_statements(&doc.statements);
        self.include_stack.pop();
        result
    }

    /// CONFIG starts out holding the configuration's feature words
    fn seed_config(&mut self) {
        let base: Vec<String> = self.session.globals.base_features.iter().cloned().collect();
        if !base.is_empty() {
            self.values.insert("CONFIG".to_string(), base);
        }
    }

    /// Command-line style statements run before the root file's own
    fn apply_overrides(&mut self) -> ReadResult<()> {
        let overrides = self.session.globals.overrides.clone();
        for source in &overrides {
            match promodel_parser::parse(source) {
                Ok(doc) => self.eval_statements(&doc.statements)?,
                Err(error) => {
                    warn!(%source, %error, "skipping unparsable override");
                    self.diagnostics.push(
                        Diagnostic::warning(
                            DiagnosticKind::SyntaxOrCycle,
                            format!("cannot parse override `{}`: {}", source, error),
                        ),
                    );
                }
            }
        }
        Ok(())
    }

    fn eval_statements(&mut self, statements: &[Statement]) -> ReadResult<()> {
        for statement in statements {
            self.eval_statement(statement)?;
        }
        Ok(())
    }

    fn eval_statement(&mut self, statement: &Statement) -> ReadResult<()> {
        match statement {
            Statement::Assignment(assignment) => {
                let values = self.expand_words(&assignment.values)?;
                self.assign(&assignment.name, assignment.op, values);
                Ok(())
            }
            Statement::Condition(condition) => self.eval_condition(condition),
            Statement::Call(call) => self.eval_block_call(call),
        }
    }

    fn assign(&mut self, name: &str, op: promodel_parser::AssignOp, values: Vec<String>) {
        use promodel_parser::AssignOp;
        match op {
            AssignOp::Set => {
                self.values.insert(name.to_string(), values);
            }
            AssignOp::Append => {
                self.values.entry(name.to_string()).or_default().extend(values);
            }
            AssignOp::Remove => {
                if let Some(existing) = self.values.get_mut(name) {
                    existing.retain(|v| !values.contains(v));
                }
            }
            AssignOp::UniqueAppend => {
                let existing = self.values.entry(name.to_string()).or_default();
                for value in values {
                    if !existing.contains(&value) {
                        existing.push(value);
                    }
                }
            }
        }
    }

    fn eval_condition(&mut self, condition: &Condition) -> ReadResult<()> {
        let truth = self.eval_test(&condition.test)?;
        match self.mode {
            // every branch contributes, even under a decided condition
            EvalMode::Cumulative => {
                self.eval_statements(&condition.then_branch)?;
                self.eval_statements(&condition.else_branch)
            }
            EvalMode::Exact => match truth {
                Truth::True => self.eval_statements(&condition.then_branch),
                Truth::False => self.eval_statements(&condition.else_branch),
                Truth::Unknown => Err(ReadError::unresolved(
                    self.current_file(),
                    describe_test(&condition.test),
                )),
            },
        }
    }

    fn eval_test(&mut self, test: &Test) -> ReadResult<Truth> {
        match test {
            Test::Feature(word) => Ok(self.feature_truth(word)),
            Test::Not(inner) => Ok(match self.eval_test(inner)? {
                Truth::True => Truth::False,
                Truth::False => Truth::True,
                Truth::Unknown => Truth::Unknown,
            }),
            Test::Or(left, right) => {
                let left = self.eval_test(left)?;
                if left == Truth::True {
                    return Ok(Truth::True);
                }
                let right = self.eval_test(right)?;
                Ok(match (left, right) {
                    (Truth::False, value) => value,
                    (Truth::Unknown, Truth::True) => Truth::True,
                    (Truth::Unknown, _) => Truth::Unknown,
                    (Truth::True, _) => Truth::True,
                })
            }
            Test::Call(call) => self.eval_test_call(call),
        }
    }

    /// A bare word is true when CONFIG holds it, false when the
    /// configuration knows the word, and undecidable otherwise
    fn feature_truth(&self, word: &str) -> Truth {
        match word {
            "true" => Truth::True,
            "false" => Truth::False,
            _ => {
                let config = self.values.get("CONFIG");
                if config.is_some_and(|values| values.iter().any(|v| v == word)) {
                    Truth::True
                } else if self.session.globals.can_decide_feature(word) {
                    Truth::False
                } else {
                    Truth::Unknown
                }
            }
        }
    }

    fn eval_test_call(&mut self, call: &Call) -> ReadResult<Truth> {
        match call.name.as_str() {
            "equals" => {
                let (var, value) = self.two_args(call)?;
                Ok(truth(self.lookup(&var).join(" ") == value))
            }
            "contains" => {
                let (var, value) = self.two_args(call)?;
                Ok(truth(self.lookup(&var).iter().any(|v| *v == value)))
            }
            "exists" => {
                let target = self.first_arg(call)?;
                let resolved = paths::resolve_in(&self.current_dir(), &target);
                Ok(truth(self.session.fs.exists(&resolved)))
            }
            "isEmpty" => {
                let var = self.first_arg(call)?;
                let values = self.lookup(&var);
                Ok(truth(
                    values.is_empty() || (values.len() == 1 && values[0].is_empty()),
                ))
            }
            "include" => self.eval_include(call).map(truth),
            "message" | "warning" => {
                self.emit_message(call)?;
                Ok(Truth::True)
            }
            "error" => {
                if self.mode == EvalMode::Cumulative {
                    return Ok(Truth::False);
                }
                let message = self.call_text(call)?;
                Err(ReadError::project_abort(self.current_file(), message))
            }
            other => {
                debug!(function = other, "unknown test function");
                Ok(Truth::Unknown)
            }
        }
    }

    fn eval_block_call(&mut self, call: &Call) -> ReadResult<()> {
        match call.name.as_str() {
            "include" => {
                self.eval_include(call)?;
                Ok(())
            }
            "message" | "warning" => self.emit_message(call),
            "error" => {
                if self.mode == EvalMode::Cumulative {
                    return Ok(());
                }
                let message = self.call_text(call)?;
                Err(ReadError::project_abort(self.current_file(), message))
            }
            _ => {
                self.eval_test_call(call)?;
                Ok(())
            }
        }
    }

    /// Resolve and evaluate an include() target. Returns whether the file
    /// was found and evaluated.
    fn eval_include(&mut self, call: &Call) -> ReadResult<bool> {
        let target = match call.args.first() {
            Some(words) => self
                .expand_words(words)?
                .into_iter()
                .next()
                .unwrap_or_default(),
            None => String::new(),
        };
        if target.is_empty() {
            self.diagnostics.push(
                Diagnostic::warning(DiagnosticKind::Unreadable, "include() without a file")
                    .with_file(self.current_file()),
            );
            return Ok(false);
        }

        let Some(resolved) = self.resolve_include(&target) else {
            self.diagnostics.push(
                Diagnostic::warning(
                    DiagnosticKind::Unreadable,
                    format!("include({}) not found", target),
                )
                .with_file(self.current_file()),
            );
            return Ok(false);
        };

        match self.include_file(&resolved) {
            Ok(()) => Ok(true),
            Err(ReadError::Aborted) => Err(ReadError::Aborted),
            Err(error) if self.mode == EvalMode::Cumulative => {
                // branch exploration keeps going past broken includes
                if let Some(kind) = error.diagnostic_kind() {
                    self.diagnostics.push(
                        Diagnostic::warning(kind, error.to_string()).with_file(resolved),
                    );
                }
                Ok(false)
            }
            Err(error) => Err(error),
        }
    }

    fn resolve_include(&self, target: &str) -> Option<PathBuf> {
        let direct = paths::resolve_in(&self.current_dir(), target);
        if self.session.fs.exists(&direct) {
            return Some(direct);
        }
        for dir in &self.session.globals.search_paths {
            let candidate = paths::resolve_in(dir, target);
            if self.session.fs.exists(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    fn include_file(&mut self, path: &Path) -> ReadResult<()> {
        if self.session.cancelled() {
            return Err(ReadError::Aborted);
        }
        if self.include_stack.iter().any(|entry| entry == path) {
            return Err(ReadError::include_cycle(path));
        }
        let doc = self.session.parse_file(path)?;
        self.include_stack.push(path.to_path_buf());
        self.included.insert(path.to_path_buf());
        let result = self.eval_statements(&doc.statements);
        self.include_stack.pop();
        result
    }

    fn emit_message(&mut self, call: &Call) -> ReadResult<()> {
        let text = self.call_text(call)?;
        debug!(file = %self.current_file().display(), "{}: {}", call.name, text);
        // cumulative mode revisits the same statements; report once
        if self.mode == EvalMode::Exact {
            let diagnostic = if call.name == "warning" {
                Diagnostic::warning(DiagnosticKind::ProjectMessage, text)
            } else {
                Diagnostic::info(DiagnosticKind::ProjectMessage, text)
            };
            self.diagnostics.push(diagnostic.with_file(self.current_file()));
        }
        Ok(())
    }

    fn call_text(&mut self, call: &Call) -> ReadResult<String> {
        let mut pieces = Vec::new();
        for words in &call.args {
            pieces.push(self.expand_words(words)?.join(" "));
        }
        Ok(pieces.join(" "))
    }

    fn first_arg(&mut self, call: &Call) -> ReadResult<String> {
        match call.args.first() {
            Some(words) => Ok(self
                .expand_words(words)?
                .into_iter()
                .next()
                .unwrap_or_default()),
            None => Ok(String::new()),
        }
    }

    fn two_args(&mut self, call: &Call) -> ReadResult<(String, String)> {
        let first = self.first_arg(call)?;
        let second = match call.args.get(1) {
            Some(words) => self.expand_words(words)?.join(" "),
            None => String::new(),
        };
        Ok((first, second))
    }

    fn expand_words(&mut self, words: &[Word]) -> ReadResult<Vec<String>> {
        let mut out = Vec::new();
        for word in words {
            self.expand_word_into(word, &mut out)?;
        }
        Ok(out)
    }

    /// A word that is exactly one variable or call reference expands to the
    /// whole list; anything embedded in surrounding text collapses to a
    /// single space-joined value.
    fn expand_word_into(&mut self, word: &Word, out: &mut Vec<String>) -> ReadResult<()> {
        match word.parts.as_slice() {
            [WordPart::Var(name)] => {
                out.extend(self.lookup(name));
                Ok(())
            }
            [WordPart::Call(call)] => {
                out.extend(self.eval_replace_call(call)?);
                Ok(())
            }
            parts => {
                let mut text = String::new();
                for part in parts {
                    match part {
                        WordPart::Literal(s) => text.push_str(s),
                        WordPart::Var(name) => text.push_str(&self.lookup(name).join(" ")),
                        WordPart::Env(name) => text.push_str(
                            self.session
                                .globals
                                .env
                                .get(name)
                                .map(String::as_str)
                                .unwrap_or(""),
                        ),
                        WordPart::Call(call) => {
                            text.push_str(&self.eval_replace_call(call)?.join(" "))
                        }
                    }
                }
                if !text.is_empty() || matches!(parts, [WordPart::Literal(_)]) {
                    out.push(text);
                }
                Ok(())
            }
        }
    }

    fn eval_replace_call(&mut self, call: &Call) -> ReadResult<Vec<String>> {
        let mut args: Vec<Vec<String>> = Vec::new();
        for words in &call.args {
            args.push(self.expand_words(words)?);
        }
        let arg_str = |index: usize| -> &str {
            args.get(index)
                .and_then(|a| a.first())
                .map(String::as_str)
                .unwrap_or("")
        };

        match call.name.as_str() {
            "member" => {
                let list = self.lookup(arg_str(0));
                let index: usize = arg_str(1).parse().unwrap_or(0);
                Ok(list.into_iter().skip(index).take(1).collect())
            }
            "first" => Ok(self.lookup(arg_str(0)).into_iter().take(1).collect()),
            "last" => {
                let mut list = self.lookup(arg_str(0));
                Ok(list.pop().into_iter().collect())
            }
            "basename" => Ok(self
                .lookup(arg_str(0))
                .iter()
                .filter_map(|v| {
                    Path::new(v)
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                })
                .collect()),
            "dirname" => Ok(self
                .lookup(arg_str(0))
                .iter()
                .filter_map(|v| {
                    Path::new(v)
                        .parent()
                        .map(|p| p.to_string_lossy().into_owned())
                })
                .collect()),
            "files" => {
                let pattern = paths::resolve_in(&self.current_dir(), arg_str(0));
                let recursive = arg_str(1) == "true";
                match expand_wildcard(self.session.fs, &pattern, recursive) {
                    Ok(expansion) => {
                        self.watch_dirs.extend(expansion.watched_dirs);
                        Ok(expansion
                            .matches
                            .iter()
                            .map(|p| p.display().to_string())
                            .collect())
                    }
                    Err(error) => {
                        self.diagnostics.push(
                            Diagnostic::warning(
                                DiagnosticKind::SyntaxOrCycle,
                                format!("invalid pattern in files(): {}", error),
                            )
                            .with_file(self.current_file()),
                        );
                        Ok(Vec::new())
                    }
                }
            }
            other => {
                debug!(function = other, "unknown replace function");
                Ok(Vec::new())
            }
        }
    }

    /// Variable lookup with the handful of built-in dynamic variables
    fn lookup(&self, name: &str) -> Vec<String> {
        match name {
            "PWD" => vec![self.current_dir().display().to_string()],
            "OUT_PWD" => vec![self.root_dir().display().to_string()],
            "_PRO_FILE_" => vec![self.root_file().display().to_string()],
            "_PRO_FILE_PWD_" => vec![self.root_dir().display().to_string()],
            _ => self.values.get(name).cloned().unwrap_or_default(),
        }
    }

    fn current_file(&self) -> &Path {
        self.include_stack
            .last()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(""))
    }

    fn current_dir(&self) -> PathBuf {
        self.current_file()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }

    fn root_file(&self) -> &Path {
        self.include_stack
            .first()
            .map(PathBuf::as_path)
            .unwrap_or_else(|| Path::new(""))
    }

    fn root_dir(&self) -> PathBuf {
        self.root_file()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default()
    }
}

fn truth(value: bool) -> Truth {
    if value {
        Truth::True
    } else {
        Truth::False
    }
}

fn describe_test(test: &Test) -> String {
    match test {
        Test::Feature(word) => word.clone(),
        Test::Not(inner) => format!("!{}", describe_test(inner)),
        Test::Or(left, right) => format!("{}|{}", describe_test(left), describe_test(right)),
        Test::Call(call) => format!("{}(...)", call.name),
    }
}
