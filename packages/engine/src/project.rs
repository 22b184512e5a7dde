//! The live project and its coordinator task
//!
//! [`Project::open`] spawns one coordinator owning the tree, the parse
//! cache, the watcher and the scheduler. Everything reaches it through
//! channels: commands from the facade, raw filesystem events from the
//! watch backend, results from evaluation tasks. Evaluations themselves
//! run on the blocking pool with a cancel flag, so a stale pass can be
//! abandoned without waiting for it.

use crate::error::{ProjectError, ProjectResult};
use crate::scheduler::{Completion, Dispatch, PassKind, Scheduler};
use crate::targets::{self, DeploymentEntry, TargetInformation};
use crate::watcher::{FolderWatcher, NotifyBackend, WatchBackend};
use promodel_common::{paths, Diagnostic, DiagnosticKind, FileSystem, RealFileSystem};
use promodel_reader::{Globals, ParseCache, ProReader, ProSubtree, ProjectType};
use promodel_tree::{reconcile, NodeId, ProjectTree, ReconcileOutcome, TreeSnapshot};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// How a project is opened
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    /// The root project file everything else hangs off
    pub root_file: PathBuf,
    pub globals: Globals,
    /// Quiet period between a change request and the pass it triggers
    pub debounce: Duration,
    /// Quiet period a changed directory must hold before it is reported
    pub settle: Duration,
}

impl ProjectConfig {
    pub fn new(root_file: impl Into<PathBuf>) -> Self {
        Self {
            root_file: paths::normalize(&root_file.into()),
            globals: Globals::new(),
            debounce: Duration::from_millis(150),
            settle: Duration::from_millis(200),
        }
    }

    pub fn with_globals(mut self, globals: Globals) -> Self {
        self.globals = globals;
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// Broadcast to subscribers as evaluation passes land. Within one pass
/// the subtree update comes first, then any type changes, and a
/// finished pass closes with its collected diagnostics.
#[derive(Debug, Clone)]
pub enum ProjectEvent {
    SubtreeUpdated {
        path: PathBuf,
        structure_changed: bool,
    },
    ProjectTypeChanged {
        path: PathBuf,
        previous: ProjectType,
        current: ProjectType,
        buildable_changed: bool,
    },
    EvaluationFinished {
        diagnostics: Vec<Diagnostic>,
    },
}

enum Command {
    FileSaved(PathBuf),
    FullUpdate,
    Sync(oneshot::Sender<()>),
    Targets(oneshot::Sender<Vec<TargetInformation>>),
    Deployment(oneshot::Sender<Vec<DeploymentEntry>>),
    Shutdown,
}

/// One evaluation task's result, tagged for staleness checks
struct EvalDone {
    generation: u64,
    kind: PassKind,
    node: Option<NodeId>,
    subtree: ProSubtree,
}

/// Handle to a running project. Cheap to query; all mutation happens on
/// the coordinator task it spawned.
pub struct Project {
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<Arc<TreeSnapshot>>,
    events: broadcast::Sender<ProjectEvent>,
    handle: Option<JoinHandle<()>>,
}

impl Project {
    /// Opens a project against the real filesystem and a notify-backed
    /// watcher. Must be called on a tokio runtime; the first full
    /// evaluation starts immediately.
    pub fn open(config: ProjectConfig) -> ProjectResult<Self> {
        let (backend, raw_events) = NotifyBackend::new()?;
        Ok(Self::open_with(
            config,
            Arc::new(RealFileSystem),
            Box::new(backend),
            raw_events,
        ))
    }

    /// Opens against a caller-supplied filesystem and watch backend
    pub fn open_with(
        config: ProjectConfig,
        fs: Arc<dyn FileSystem>,
        backend: Box<dyn WatchBackend>,
        raw_events: mpsc::UnboundedReceiver<notify::Event>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Arc::new(TreeSnapshot::default()));
        let (events_tx, _) = broadcast::channel(100);

        let coordinator = Coordinator {
            scheduler: Scheduler::new(config.root_file.clone(), config.debounce),
            watcher: FolderWatcher::new(Arc::clone(&fs), backend, config.settle),
            config,
            fs,
            cache: Arc::new(ParseCache::new()),
            tree: ProjectTree::new(),
            commands: commands_rx,
            raw_events,
            results_tx,
            results_rx,
            snapshot_tx,
            events_tx: events_tx.clone(),
            sync_waiters: Vec::new(),
            pass_diagnostics: Vec::new(),
            reported_mismatches: HashSet::new(),
            commands_alive: true,
            watcher_alive: true,
            closing: false,
        };
        let handle = tokio::spawn(coordinator.run());

        Self {
            commands: commands_tx,
            snapshot: snapshot_rx,
            events: events_tx,
            handle: Some(handle),
        }
    }

    /// The most recently published view of the tree
    pub fn snapshot(&self) -> Arc<TreeSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProjectEvent> {
        self.events.subscribe()
    }

    /// Tells the project an editor wrote `path`. Cached parses of the
    /// file are dropped and every node including it is queued for
    /// re-evaluation; saves of unrelated files are ignored.
    pub fn notify_file_saved(&self, path: impl Into<PathBuf>) {
        let _ = self.commands.send(Command::FileSaved(path.into()));
    }

    pub fn request_full_update(&self) {
        let _ = self.commands.send(Command::FullUpdate);
    }

    /// Resolves once no evaluation is pending or running
    pub async fn sync(&self) -> ProjectResult<()> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Sync(tx))
            .map_err(|_| ProjectError::Closed)?;
        rx.await.map_err(|_| ProjectError::Closed)
    }

    pub async fn target_information(&self) -> ProjectResult<Vec<TargetInformation>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Targets(tx))
            .map_err(|_| ProjectError::Closed)?;
        rx.await.map_err(|_| ProjectError::Closed)
    }

    pub async fn deployment_data(&self) -> ProjectResult<Vec<DeploymentEntry>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(Command::Deployment(tx))
            .map_err(|_| ProjectError::Closed)?;
        rx.await.map_err(|_| ProjectError::Closed)
    }

    /// Stops the coordinator and waits for in-flight evaluations to
    /// drain. Requests arriving after this are ignored.
    pub async fn close(mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for Project {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Coordinator {
    config: ProjectConfig,
    fs: Arc<dyn FileSystem>,
    cache: Arc<ParseCache>,
    tree: ProjectTree,
    scheduler: Scheduler,
    watcher: FolderWatcher,
    commands: mpsc::UnboundedReceiver<Command>,
    raw_events: mpsc::UnboundedReceiver<notify::Event>,
    results_tx: mpsc::UnboundedSender<EvalDone>,
    results_rx: mpsc::UnboundedReceiver<EvalDone>,
    snapshot_tx: watch::Sender<Arc<TreeSnapshot>>,
    events_tx: broadcast::Sender<ProjectEvent>,
    /// Callers blocked in sync(), answered when the scheduler idles
    sync_waiters: Vec<oneshot::Sender<()>>,
    /// Diagnostics gathered across the current pass
    pass_diagnostics: Vec<Diagnostic>,
    /// Mismatch messages already surfaced, so re-evaluations stay quiet
    reported_mismatches: HashSet<String>,
    commands_alive: bool,
    watcher_alive: bool,
    closing: bool,
}

impl Coordinator {
    async fn run(mut self) {
        debug!(root = %self.config.root_file.display(), "project coordinator started");
        self.scheduler.request_full(Instant::now());

        loop {
            let deadline = [self.scheduler.next_deadline(), self.watcher.next_deadline()]
                .into_iter()
                .flatten()
                .min();

            tokio::select! {
                command = self.commands.recv(), if self.commands_alive => {
                    match command {
                        Some(command) => self.handle_command(command),
                        None => {
                            // every handle dropped; shut down as if asked
                            self.commands_alive = false;
                            self.begin_shutdown();
                        }
                    }
                }
                event = self.raw_events.recv(), if self.watcher_alive => {
                    match event {
                        Some(event) => self.watcher.note_event(&event, Instant::now()),
                        None => self.watcher_alive = false,
                    }
                }
                result = self.results_rx.recv() => {
                    if let Some(done) = result {
                        self.handle_result(done);
                    }
                }
                _ = sleep_until(deadline) => {}
            }

            self.tick(Instant::now());
            if self.closing && self.scheduler.is_drained() {
                break;
            }
        }
        debug!("project coordinator stopped");
    }

    /// Runs the clock-driven parts: settled directories become update
    /// requests, elapsed debounce windows become passes, and an idle
    /// scheduler releases sync() callers.
    fn tick(&mut self, now: Instant) {
        for change in self.watcher.take_settled(now) {
            debug!(
                dir = %change.dir.display(),
                files = change.files.len(),
                "directory settled"
            );
            for owner in change.owners {
                if self.tree.get(owner).is_some() {
                    self.scheduler.request_partial(&self.tree, owner, now);
                }
            }
        }

        if let Some(dispatch) = self.scheduler.poll(&self.tree, now) {
            self.dispatch(dispatch);
        }

        if self.scheduler.is_idle() && !self.sync_waiters.is_empty() {
            for waiter in self.sync_waiters.drain(..) {
                let _ = waiter.send(());
            }
        }
    }

    fn handle_command(&mut self, command: Command) {
        match command {
            Command::FileSaved(path) => self.file_saved(&path),
            Command::FullUpdate => self.scheduler.request_full(Instant::now()),
            Command::Sync(reply) => {
                if self.closing {
                    drop(reply);
                } else {
                    self.sync_waiters.push(reply);
                }
            }
            Command::Targets(reply) => {
                let _ = reply.send(targets::target_information(&self.tree));
            }
            Command::Deployment(reply) => {
                let _ = reply.send(targets::deployment_data(&self.tree));
            }
            Command::Shutdown => self.begin_shutdown(),
        }
    }

    fn file_saved(&mut self, path: &Path) {
        let path = paths::normalize(path);
        let discarded = self.cache.discard(&path);
        debug!(path = %path.display(), discarded, "file saved");

        let now = Instant::now();
        let owners: Vec<NodeId> = self
            .tree
            .containers()
            .filter(|(_, container)| container.includes.contains(&path))
            .map(|(id, _)| id)
            .collect();
        if owners.is_empty() {
            // nothing includes it yet; a save of the root file before the
            // first pass landed still has to count
            if path == self.config.root_file {
                self.scheduler.request_full(now);
            }
            return;
        }
        for owner in owners {
            self.scheduler.request_partial(&self.tree, owner, now);
        }
    }

    /// Starts one blocking evaluation task per pass root
    fn dispatch(&mut self, dispatch: Dispatch) {
        for root in &dispatch.roots {
            if let Some(node) = root.node {
                for id in self.tree.subtree_ids(node) {
                    self.tree.mark_parsing(id, true);
                }
            }

            let fs = Arc::clone(&self.fs);
            let globals = self.config.globals.clone();
            let cache = Arc::clone(&self.cache);
            let cancel = Arc::clone(&dispatch.cancel);
            let results = self.results_tx.clone();
            let generation = dispatch.generation;
            let kind = dispatch.kind;
            let node = root.node;
            let path = root.path.clone();

            tokio::task::spawn_blocking(move || {
                let reader = ProReader::new(fs.as_ref(), &globals, &cache).with_cancel(&cancel);
                let subtree = reader.read_subtree(&path);
                let _ = results.send(EvalDone {
                    generation,
                    kind,
                    node,
                    subtree,
                });
            });
        }
    }

    fn handle_result(&mut self, done: EvalDone) {
        let fresh = self.scheduler.should_apply(done.generation) && !done.subtree.aborted();
        if fresh {
            let outcome = match (done.kind, done.node) {
                (PassKind::Partial, Some(node)) => {
                    reconcile::apply_at(&mut self.tree, node, &done.subtree)
                }
                _ => reconcile::apply(&mut self.tree, &done.subtree),
            };
            self.collect_diagnostics(&done.subtree);
            self.absorb(&done.subtree.result.path, outcome);
        } else {
            debug!(
                generation = done.generation,
                path = %done.subtree.result.path.display(),
                "dropping stale evaluation result"
            );
        }

        match self.scheduler.task_completed(done.generation, Instant::now()) {
            Completion::Finished => {
                let diagnostics = std::mem::take(&mut self.pass_diagnostics);
                let _ = self
                    .events_tx
                    .send(ProjectEvent::EvaluationFinished { diagnostics });
            }
            Completion::Superseded => {
                // the follow-up full pass will re-collect everything
                self.pass_diagnostics.clear();
            }
            Completion::Pending | Completion::Drained | Completion::Stale => {}
        }
    }

    /// Feeds one reconciliation outcome back into the watcher and the
    /// subscribers: snapshot first, then the per-pass events in order
    fn absorb(&mut self, pass_root: &Path, outcome: ReconcileOutcome) {
        for removed in &outcome.removed {
            if removed.was_container {
                self.watcher.remove_owner(removed.id);
            }
        }
        for id in &outcome.refreshed {
            let Some(container) = self.tree.get(*id).and_then(|node| node.as_container()) else {
                continue;
            };
            let watch_dirs = container.watch_dirs.clone();
            let tools = container.tools.clone();
            let path = container.path.clone();
            self.watcher.sync_owner(*id, &watch_dirs);
            self.check_toolchain(&path, &tools);
        }

        let _ = self
            .snapshot_tx
            .send(Arc::new(TreeSnapshot::capture(&self.tree)));

        let _ = self.events_tx.send(ProjectEvent::SubtreeUpdated {
            path: pass_root.to_path_buf(),
            structure_changed: outcome.structure_changed,
        });
        for change in outcome.type_changes {
            let _ = self.events_tx.send(ProjectEvent::ProjectTypeChanged {
                path: change.path,
                previous: change.previous,
                current: change.current,
                buildable_changed: change.buildable_changed,
            });
        }
    }

    fn collect_diagnostics(&mut self, subtree: &ProSubtree) {
        self.pass_diagnostics
            .extend(subtree.result.diagnostics.iter().cloned());
        for child in &subtree.children {
            self.collect_diagnostics(child);
        }
    }

    fn check_toolchain(&mut self, path: &Path, tools: &BTreeMap<String, String>) {
        for diagnostic in toolchain_mismatches(
            &self.config.globals.expected_tools,
            tools,
            path,
            &mut self.reported_mismatches,
        ) {
            warn!(file = %path.display(), "{}", diagnostic.message);
            self.pass_diagnostics.push(diagnostic);
        }
    }

    fn begin_shutdown(&mut self) {
        if self.closing {
            return;
        }
        debug!("project closing");
        self.closing = true;
        self.scheduler.begin_shutdown();
        // pending sync() calls can never resolve now
        self.sync_waiters.clear();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => {
            tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await
        }
        None => std::future::pending().await,
    }
}

/// Compares the compilers a project evaluated against the configured
/// ones. Each distinct mismatch is reported once per project lifetime;
/// `reported` carries the messages already surfaced.
pub fn toolchain_mismatches(
    expected: &BTreeMap<String, String>,
    tools: &BTreeMap<String, String>,
    path: &Path,
    reported: &mut HashSet<String>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for (name, value) in tools {
        let Some(configured) = expected.get(name) else {
            continue;
        };
        if configured == value {
            continue;
        }
        let message = format!(
            "project sets {} to '{}' but the configuration expects '{}'",
            name, value, configured
        );
        if reported.insert(message.clone()) {
            diagnostics.push(
                Diagnostic::warning(DiagnosticKind::ToolchainMismatch, message).with_file(path),
            );
        }
    }
    diagnostics
}
