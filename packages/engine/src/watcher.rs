//! Directory watching with per-owner registration and settle-interval
//! coalescing
//!
//! Tree nodes register the directories whose contents feed their
//! evaluation. Each explicitly watched root is expanded to cover its
//! subdirectories, and that discovered set is maintained incrementally:
//! when a directory settles, only that directory is rescanned for
//! added or removed children. Raw backend events are merged per
//! directory until no further event arrives within the settle interval,
//! then exactly one change is dispatched to every owner registered at
//! the directory or at any watched ancestor.
//!
//! The low-level registration sits behind [`WatchBackend`] so the logic
//! can be driven by a stub in tests; [`NotifyBackend`] is the real one.

use crate::error::{WatchError, WatchResult};
use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher};
use promodel_common::{paths, FileSystem};
use promodel_tree::NodeId;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Low-level per-directory watch registration
pub trait WatchBackend: Send {
    fn add_path(&mut self, path: &Path) -> WatchResult<()>;
    fn remove_path(&mut self, path: &Path) -> WatchResult<()>;
}

/// The notify-backed production backend. Single-directory watches only;
/// recursion is the [`FolderWatcher`]'s bookkeeping.
pub struct NotifyBackend {
    watcher: RecommendedWatcher,
}

impl NotifyBackend {
    /// Creates the backend and the raw event stream it feeds. Events
    /// are sent from notify's own thread; the coordinator drains the
    /// receiver.
    pub fn new() -> WatchResult<(Self, mpsc::UnboundedReceiver<notify::Event>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let watcher = RecommendedWatcher::new(
            move |res: Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    let _ = tx.send(event);
                }
                Err(err) => warn!(error = %err, "watch backend error"),
            },
            Config::default(),
        )?;
        Ok((Self { watcher }, rx))
    }
}

impl WatchBackend for NotifyBackend {
    fn add_path(&mut self, path: &Path) -> WatchResult<()> {
        self.watcher
            .watch(path, RecursiveMode::NonRecursive)
            .map_err(|source| WatchError::Watch {
                path: path.to_path_buf(),
                source,
            })
    }

    fn remove_path(&mut self, path: &Path) -> WatchResult<()> {
        self.watcher
            .unwatch(path)
            .map_err(|source| WatchError::Unwatch {
                path: path.to_path_buf(),
                source,
            })
    }
}

/// One coalesced change for one directory, addressed to every owner
/// watching it or a directory above it
#[derive(Debug, Clone)]
pub struct FolderChange {
    pub dir: PathBuf,
    /// Paths the raw events named inside the directory
    pub files: BTreeSet<PathBuf>,
    /// Interested owners, deduplicated, in id order
    pub owners: Vec<NodeId>,
}

#[derive(Default)]
struct WatchEntry {
    /// Owners that asked for this directory directly
    owners: HashSet<NodeId>,
    /// Explicit roots whose recursive expansion reached this directory
    roots: HashSet<PathBuf>,
}

impl WatchEntry {
    fn is_orphaned(&self) -> bool {
        self.owners.is_empty() && self.roots.is_empty()
    }
}

struct PendingChange {
    deadline: Instant,
    files: BTreeSet<PathBuf>,
}

pub struct FolderWatcher {
    fs: Arc<dyn FileSystem>,
    backend: Box<dyn WatchBackend>,
    settle: Duration,
    watched: HashMap<PathBuf, WatchEntry>,
    pending: BTreeMap<PathBuf, PendingChange>,
}

impl FolderWatcher {
    pub fn new(fs: Arc<dyn FileSystem>, backend: Box<dyn WatchBackend>, settle: Duration) -> Self {
        Self {
            fs,
            backend,
            settle,
            watched: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Registers `owner`'s interest in each directory, expanding new
    /// roots to their subdirectories
    pub fn watch<'p>(&mut self, dirs: impl IntoIterator<Item = &'p Path>, owner: NodeId) {
        for dir in dirs {
            self.add_root(&paths::normalize(dir), owner);
        }
    }

    /// Drops `owner`'s interest; directories nobody needs any more lose
    /// their backend watch, along with subdirectories only they pulled in
    pub fn unwatch<'p>(&mut self, dirs: impl IntoIterator<Item = &'p Path>, owner: NodeId) {
        for dir in dirs {
            self.remove_root(&paths::normalize(dir), owner);
        }
    }

    /// Reconciles `owner`'s registrations with a freshly evaluated set
    pub fn sync_owner(&mut self, owner: NodeId, desired: &BTreeSet<PathBuf>) {
        let current: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|(_, entry)| entry.owners.contains(&owner))
            .map(|(path, _)| path.clone())
            .collect();
        for path in &current {
            if !desired.contains(path) {
                self.remove_root(path, owner);
            }
        }
        for path in desired {
            self.add_root(&paths::normalize(path), owner);
        }
    }

    /// Removes every registration held by `owner`
    pub fn remove_owner(&mut self, owner: NodeId) {
        let current: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|(_, entry)| entry.owners.contains(&owner))
            .map(|(path, _)| path.clone())
            .collect();
        for path in current {
            self.remove_root(&path, owner);
        }
    }

    /// Folds one raw backend event into the pending sets
    pub fn note_event(&mut self, event: &notify::Event, now: Instant) {
        if matches!(event.kind, notify::EventKind::Access(_)) {
            return;
        }
        for path in &event.paths {
            self.note_path(path, now);
        }
    }

    /// Records a change to `path`, restarting its directory's settle
    /// window
    pub fn note_path(&mut self, path: &Path, now: Instant) {
        let path = paths::normalize(path);
        let Some(dir) = self.dir_for_event(&path) else {
            debug!(path = %path.display(), "event outside every watched directory");
            return;
        };
        let pending = self.pending.entry(dir).or_insert_with(|| PendingChange {
            deadline: now + self.settle,
            files: BTreeSet::new(),
        });
        pending.deadline = now + self.settle;
        pending.files.insert(path);
    }

    /// The instant the earliest pending directory settles, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|pending| pending.deadline).min()
    }

    /// Dispatches every directory whose settle window has elapsed,
    /// rescanning each for added or removed subdirectories on the way
    pub fn take_settled(&mut self, now: Instant) -> Vec<FolderChange> {
        let due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, pending)| pending.deadline <= now)
            .map(|(dir, _)| dir.clone())
            .collect();

        let mut out = Vec::new();
        for dir in due {
            let Some(pending) = self.pending.remove(&dir) else {
                continue;
            };
            self.refresh_subdirs(&dir);
            let owners = self.owners_above(&dir);
            if owners.is_empty() {
                debug!(dir = %dir.display(), "settled change no longer has owners");
                continue;
            }
            debug!(
                dir = %dir.display(),
                files = pending.files.len(),
                "folder changed"
            );
            out.push(FolderChange {
                dir,
                files: pending.files,
                owners,
            });
        }
        out
    }

    fn add_root(&mut self, root: &Path, owner: NodeId) {
        let entry = self.watched.entry(root.to_path_buf()).or_default();
        let newly_watched = entry.is_orphaned();
        let first_owner = entry.owners.insert(owner) && entry.owners.len() == 1;
        if newly_watched {
            if let Err(err) = self.backend.add_path(root) {
                warn!(path = %root.display(), error = %err, "could not watch directory");
            }
        }
        if first_owner {
            debug!(root = %root.display(), "watching directory");
            let roots = HashSet::from([root.to_path_buf()]);
            self.bind_subtree(root, &roots);
        }
    }

    fn remove_root(&mut self, root: &Path, owner: NodeId) {
        let Some(entry) = self.watched.get_mut(root) else {
            return;
        };
        if !entry.owners.remove(&owner) {
            return;
        }
        if entry.owners.is_empty() {
            debug!(root = %root.display(), "no owners left, unbinding");
            self.unbind_root(root);
        }
    }

    /// Strips `root` from the roots-sets it bound and drops whatever
    /// that orphans, the root itself included
    fn unbind_root(&mut self, root: &Path) {
        let bound: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|(_, entry)| entry.roots.contains(root))
            .map(|(path, _)| path.clone())
            .collect();
        for path in bound {
            if let Some(entry) = self.watched.get_mut(&path) {
                entry.roots.remove(root);
            }
            self.drop_if_orphaned(&path);
        }
        self.drop_if_orphaned(root);
    }

    fn drop_if_orphaned(&mut self, path: &Path) {
        let orphaned = self
            .watched
            .get(path)
            .is_some_and(WatchEntry::is_orphaned);
        if orphaned {
            self.watched.remove(path);
            self.pending.remove(path);
            if let Err(err) = self.backend.remove_path(path) {
                debug!(path = %path.display(), error = %err, "backend unwatch failed");
            }
        }
    }

    /// Watches every subdirectory below `under`, binding each to `roots`
    fn bind_subtree(&mut self, under: &Path, roots: &HashSet<PathBuf>) {
        let mut stack = vec![under.to_path_buf()];
        while let Some(dir) = stack.pop() {
            let Ok(entries) = self.fs.read_dir(&dir) else {
                continue;
            };
            for child in entries {
                if !self.fs.is_dir(&child) {
                    continue;
                }
                self.bind_dir(&child, roots);
                stack.push(child);
            }
        }
    }

    fn bind_dir(&mut self, dir: &Path, roots: &HashSet<PathBuf>) {
        let entry = self.watched.entry(dir.to_path_buf()).or_default();
        let newly_watched = entry.is_orphaned();
        entry.roots.extend(roots.iter().cloned());
        if newly_watched {
            if let Err(err) = self.backend.add_path(dir) {
                warn!(path = %dir.display(), error = %err, "could not watch directory");
            }
        }
    }

    /// Rescans one settled directory: newly created subdirectories are
    /// bound under the same roots, vanished ones take their discovered
    /// watches with them
    fn refresh_subdirs(&mut self, dir: &Path) {
        let Some(entry) = self.watched.get(dir) else {
            return;
        };
        let mut roots = entry.roots.clone();
        if !entry.owners.is_empty() {
            roots.insert(dir.to_path_buf());
        }

        let listed: Vec<PathBuf> = match self.fs.read_dir(dir) {
            Ok(entries) => entries
                .into_iter()
                .filter(|path| self.fs.is_dir(path))
                .collect(),
            // the directory itself is gone; its parent's refresh prunes it
            Err(_) => Vec::new(),
        };
        let present: HashSet<&PathBuf> = listed.iter().collect();

        let stale: Vec<PathBuf> = self
            .watched
            .keys()
            .filter(|watched| watched.parent() == Some(dir) && !present.contains(*watched))
            .filter(|watched| {
                self.watched
                    .get(*watched)
                    .is_some_and(|entry| entry.owners.is_empty())
            })
            .cloned()
            .collect();
        for gone in stale {
            self.drop_discovered_under(&gone);
        }

        for child in listed {
            if !self.watched.contains_key(&child) {
                self.bind_dir(&child, &roots);
                self.bind_subtree(&child, &roots);
            }
        }
    }

    fn drop_discovered_under(&mut self, top: &Path) {
        let doomed: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|(path, entry)| {
                entry.owners.is_empty() && paths::is_same_or_under(path, top)
            })
            .map(|(path, _)| path.clone())
            .collect();
        for path in doomed {
            self.watched.remove(&path);
            self.pending.remove(&path);
            // the watch usually died with the directory
            if let Err(err) = self.backend.remove_path(&path) {
                debug!(path = %path.display(), error = %err, "dropping dead watch");
            }
        }
    }

    /// The directory a raw event belongs to: the path's parent when that
    /// is watched, the path itself when it is a watched directory, else
    /// the nearest watched ancestor
    fn dir_for_event(&self, path: &Path) -> Option<PathBuf> {
        if let Some(parent) = path.parent() {
            if self.watched.contains_key(parent) {
                return Some(parent.to_path_buf());
            }
        }
        if self.watched.contains_key(path) {
            return Some(path.to_path_buf());
        }
        let mut cursor = path.parent();
        while let Some(current) = cursor {
            if self.watched.contains_key(current) {
                return Some(current.to_path_buf());
            }
            cursor = current.parent();
        }
        None
    }

    fn owners_above(&self, dir: &Path) -> Vec<NodeId> {
        let mut owners = BTreeSet::new();
        let mut cursor = Some(dir);
        while let Some(current) = cursor {
            if let Some(entry) = self.watched.get(current) {
                owners.extend(entry.owners.iter().copied());
            }
            cursor = current.parent();
        }
        owners.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use promodel_common::MockFileSystem;
    use promodel_tree::{ContainerData, NodeData, ProjectTree};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubState {
        added: Vec<PathBuf>,
        removed: Vec<PathBuf>,
    }

    #[derive(Clone, Default)]
    struct StubBackend {
        state: Arc<Mutex<StubState>>,
    }

    impl StubBackend {
        fn added(&self) -> Vec<PathBuf> {
            self.state.lock().unwrap().added.clone()
        }

        fn removed(&self) -> Vec<PathBuf> {
            self.state.lock().unwrap().removed.clone()
        }
    }

    impl WatchBackend for StubBackend {
        fn add_path(&mut self, path: &Path) -> WatchResult<()> {
            self.state.lock().unwrap().added.push(path.to_path_buf());
            Ok(())
        }

        fn remove_path(&mut self, path: &Path) -> WatchResult<()> {
            self.state.lock().unwrap().removed.push(path.to_path_buf());
            Ok(())
        }
    }

    /// Interior-mutable filesystem so tests can add directories after
    /// the watcher took its handle
    #[derive(Clone, Default)]
    struct SharedFs(Arc<Mutex<MockFileSystem>>);

    impl SharedFs {
        fn add_dir(&self, path: &str) {
            self.0.lock().unwrap().add_dir(path);
        }

        fn add_file(&self, path: &str) {
            self.0.lock().unwrap().add_file(path, "");
        }

        fn replace(&self, fresh: MockFileSystem) {
            *self.0.lock().unwrap() = fresh;
        }
    }

    impl FileSystem for SharedFs {
        fn exists(&self, path: &Path) -> bool {
            self.0.lock().unwrap().exists(path)
        }

        fn is_dir(&self, path: &Path) -> bool {
            self.0.lock().unwrap().is_dir(path)
        }

        fn canonicalize(&self, path: &Path) -> Result<PathBuf, std::io::Error> {
            self.0.lock().unwrap().canonicalize(path)
        }

        fn read_to_string(&self, path: &Path) -> Result<String, std::io::Error> {
            self.0.lock().unwrap().read_to_string(path)
        }

        fn read_dir(&self, path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
            self.0.lock().unwrap().read_dir(path)
        }
    }

    fn owner_ids(count: usize) -> Vec<NodeId> {
        let mut tree = ProjectTree::new();
        (0..count)
            .map(|i| {
                tree.insert(
                    None,
                    NodeData::Container(ContainerData::new(PathBuf::from(format!(
                        "/owners/{i}.pro"
                    )))),
                )
            })
            .collect()
    }

    fn watcher_with(fs: &SharedFs, settle_ms: u64) -> (FolderWatcher, StubBackend) {
        let backend = StubBackend::default();
        let watcher = FolderWatcher::new(
            Arc::new(fs.clone()),
            Box::new(backend.clone()),
            Duration::from_millis(settle_ms),
        );
        (watcher, backend)
    }

    fn ms(base: Instant, millis: u64) -> Instant {
        base + Duration::from_millis(millis)
    }

    #[test]
    fn test_watch_covers_discovered_subdirectories() {
        let fs = SharedFs::default();
        fs.add_dir("/r/sub/inner");
        fs.add_file("/r/sub/note.txt");
        let (mut watcher, backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];

        watcher.watch([Path::new("/r")], owner);

        let mut added = backend.added();
        added.sort();
        assert_eq!(
            added,
            vec![
                PathBuf::from("/r"),
                PathBuf::from("/r/sub"),
                PathBuf::from("/r/sub/inner"),
            ]
        );
    }

    #[test]
    fn test_refcounted_unwatch_keeps_shared_paths() {
        let fs = SharedFs::default();
        fs.add_dir("/r/sub");
        let (mut watcher, backend) = watcher_with(&fs, 200);
        let owners = owner_ids(2);

        watcher.watch([Path::new("/r")], owners[0]);
        watcher.watch([Path::new("/r")], owners[1]);
        watcher.unwatch([Path::new("/r")], owners[0]);
        assert!(backend.removed().is_empty());

        watcher.unwatch([Path::new("/r")], owners[1]);
        let mut removed = backend.removed();
        removed.sort();
        assert_eq!(removed, vec![PathBuf::from("/r"), PathBuf::from("/r/sub")]);
    }

    #[test]
    fn test_unwatch_prunes_discovered_but_keeps_other_roots() {
        let fs = SharedFs::default();
        fs.add_dir("/a/sub/inner");
        let (mut watcher, backend) = watcher_with(&fs, 200);
        let owners = owner_ids(2);

        watcher.watch([Path::new("/a")], owners[0]);
        watcher.watch([Path::new("/a/sub")], owners[1]);
        watcher.unwatch([Path::new("/a")], owners[0]);

        // the outer root goes; the inner root and what it discovered stay
        assert_eq!(backend.removed(), vec![PathBuf::from("/a")]);
        assert!(watcher.watched.contains_key(Path::new("/a/sub")));
        assert!(watcher.watched.contains_key(Path::new("/a/sub/inner")));
    }

    #[test]
    fn test_two_events_within_settle_coalesce_into_one_change() {
        let fs = SharedFs::default();
        fs.add_dir("/r");
        let (mut watcher, _backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];
        watcher.watch([Path::new("/r")], owner);

        let t0 = Instant::now();
        watcher.note_path(Path::new("/r/one.cpp"), t0);
        watcher.note_path(Path::new("/r/two.cpp"), ms(t0, 50));

        assert!(watcher.take_settled(ms(t0, 100)).is_empty());

        let changes = watcher.take_settled(ms(t0, 250));
        assert_eq!(changes.len(), 1);
        let change = &changes[0];
        assert_eq!(change.dir, PathBuf::from("/r"));
        assert_eq!(
            change.files,
            BTreeSet::from([PathBuf::from("/r/one.cpp"), PathBuf::from("/r/two.cpp")])
        );
        assert_eq!(change.owners, vec![owner]);
        assert!(watcher.take_settled(ms(t0, 1000)).is_empty());
    }

    #[test]
    fn test_every_event_restarts_the_settle_window() {
        let fs = SharedFs::default();
        fs.add_dir("/r");
        let (mut watcher, _backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];
        watcher.watch([Path::new("/r")], owner);

        let t0 = Instant::now();
        watcher.note_path(Path::new("/r/a.cpp"), t0);
        watcher.note_path(Path::new("/r/b.cpp"), ms(t0, 150));

        // the first event's window would have closed at t0+200
        assert!(watcher.take_settled(ms(t0, 210)).is_empty());
        assert_eq!(watcher.next_deadline(), Some(ms(t0, 350)));
        assert_eq!(watcher.take_settled(ms(t0, 350)).len(), 1);
    }

    #[test]
    fn test_dispatch_reaches_every_ancestor_owner() {
        let fs = SharedFs::default();
        fs.add_dir("/r/sub/inner");
        let (mut watcher, _backend) = watcher_with(&fs, 200);
        let owners = owner_ids(2);

        watcher.watch([Path::new("/r")], owners[0]);
        watcher.watch([Path::new("/r/sub")], owners[1]);

        let t0 = Instant::now();
        watcher.note_path(Path::new("/r/sub/inner/x.txt"), t0);
        let changes = watcher.take_settled(ms(t0, 200));

        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].dir, PathBuf::from("/r/sub/inner"));
        assert_eq!(changes[0].owners, owners);
    }

    #[test]
    fn test_separate_directories_settle_separately() {
        let fs = SharedFs::default();
        fs.add_dir("/r/a");
        fs.add_dir("/r/b");
        let (mut watcher, _backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];
        watcher.watch([Path::new("/r")], owner);

        let t0 = Instant::now();
        watcher.note_path(Path::new("/r/a/x.cpp"), t0);
        watcher.note_path(Path::new("/r/b/y.cpp"), ms(t0, 100));

        let first = watcher.take_settled(ms(t0, 200));
        assert_eq!(first.len(), 1);
        assert_eq!(first[0].dir, PathBuf::from("/r/a"));

        let second = watcher.take_settled(ms(t0, 300));
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].dir, PathBuf::from("/r/b"));
    }

    #[test]
    fn test_new_subdirectory_is_bound_incrementally() {
        let fs = SharedFs::default();
        fs.add_dir("/r");
        let (mut watcher, backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];
        watcher.watch([Path::new("/r")], owner);
        assert_eq!(backend.added(), vec![PathBuf::from("/r")]);

        fs.add_dir("/r/new/deep");
        let t0 = Instant::now();
        watcher.note_path(Path::new("/r/new"), t0);
        let changes = watcher.take_settled(ms(t0, 200));

        assert_eq!(changes.len(), 1);
        let mut added = backend.added();
        added.sort();
        assert_eq!(
            added,
            vec![
                PathBuf::from("/r"),
                PathBuf::from("/r/new"),
                PathBuf::from("/r/new/deep"),
            ]
        );
    }

    #[test]
    fn test_vanished_subdirectory_watches_are_pruned() {
        let fs = SharedFs::default();
        fs.add_dir("/r/old/deep");
        let (mut watcher, backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];
        watcher.watch([Path::new("/r")], owner);

        let mut fresh = MockFileSystem::new();
        fresh.add_dir("/r");
        fs.replace(fresh);

        let t0 = Instant::now();
        watcher.note_path(Path::new("/r/old"), t0);
        watcher.take_settled(ms(t0, 200));

        let mut removed = backend.removed();
        removed.sort();
        assert_eq!(
            removed,
            vec![PathBuf::from("/r/old"), PathBuf::from("/r/old/deep")]
        );
        assert!(watcher.watched.contains_key(Path::new("/r")));
    }

    #[test]
    fn test_settled_change_without_owners_is_dropped() {
        let fs = SharedFs::default();
        fs.add_dir("/r");
        let (mut watcher, _backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];
        watcher.watch([Path::new("/r")], owner);

        let t0 = Instant::now();
        watcher.note_path(Path::new("/r/x.cpp"), t0);
        watcher.unwatch([Path::new("/r")], owner);

        assert!(watcher.take_settled(ms(t0, 500)).is_empty());
        assert_eq!(watcher.next_deadline(), None);
    }

    #[test]
    fn test_sync_owner_adds_and_removes() {
        let fs = SharedFs::default();
        fs.add_dir("/r/a");
        fs.add_dir("/r/b");
        let (mut watcher, backend) = watcher_with(&fs, 200);
        let owner = owner_ids(1)[0];

        watcher.sync_owner(owner, &BTreeSet::from([PathBuf::from("/r/a")]));
        assert!(watcher.watched[Path::new("/r/a")].owners.contains(&owner));

        watcher.sync_owner(owner, &BTreeSet::from([PathBuf::from("/r/b")]));
        assert!(!watcher.watched.contains_key(Path::new("/r/a")));
        assert!(watcher.watched.contains_key(Path::new("/r/b")));
        assert_eq!(backend.removed(), vec![PathBuf::from("/r/a")]);
    }

    #[test]
    fn test_remove_owner_clears_everything_it_held() {
        let fs = SharedFs::default();
        fs.add_dir("/r");
        fs.add_dir("/s");
        let (mut watcher, _backend) = watcher_with(&fs, 200);
        let owners = owner_ids(2);

        watcher.watch([Path::new("/r"), Path::new("/s")], owners[0]);
        watcher.watch([Path::new("/s")], owners[1]);
        watcher.remove_owner(owners[0]);

        assert!(!watcher.watched.contains_key(Path::new("/r")));
        assert!(watcher.watched[Path::new("/s")].owners.contains(&owners[1]));
    }
}
