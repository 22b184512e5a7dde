use once_cell::sync::OnceCell;
use promodel_parser::ProFile;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Shared parse results, keyed by file path.
///
/// Entries are reference counted by the readers holding them. A file that is
/// included from several projects is parsed once; the entry leaves the map
/// when the last reader releases it or when the engine discards it after an
/// on-disk change. A reader holding a discarded entry keeps its parsed
/// document, it just stops sharing the slot with future acquisitions.
pub struct ParseCache {
    inner: Mutex<Inner>,
}

struct Inner {
    slots: HashMap<PathBuf, Slot>,
    next_epoch: u64,
}

struct Slot {
    epoch: u64,
    refcount: usize,
    cell: Arc<OnceCell<Arc<ProFile>>>,
}

/// A claim on one cache slot. Obtained from [`ParseCache::acquire`] and given
/// back through [`ParseCache::release`].
pub struct CacheEntry {
    path: PathBuf,
    epoch: u64,
    cell: Arc<OnceCell<Arc<ProFile>>>,
}

impl CacheEntry {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Return the cached document, parsing it with `parse` on first use.
    ///
    /// Concurrent callers on the same slot block until the first parse
    /// finishes and then share its result. A failed parse leaves the slot
    /// empty so a later caller can retry.
    pub fn parse_with<E>(
        &self,
        parse: impl FnOnce() -> Result<ProFile, E>,
    ) -> Result<Arc<ProFile>, E> {
        self.cell
            .get_or_try_init(|| parse().map(Arc::new))
            .cloned()
    }

    /// The parsed document when this slot was already filled
    pub fn cached(&self) -> Option<Arc<ProFile>> {
        self.cell.get().cloned()
    }
}

impl ParseCache {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                slots: HashMap::new(),
                next_epoch: 0,
            }),
        }
    }

    /// Claim the slot for `path`, creating it when absent
    pub fn acquire(&self, path: &Path) -> CacheEntry {
        let mut guard = self.inner.lock().expect("parse cache mutex poisoned");
        let inner = &mut *guard;

        let mut fresh = false;
        let new_epoch = inner.next_epoch;
        let slot = inner.slots.entry(path.to_path_buf()).or_insert_with(|| {
            fresh = true;
            Slot {
                epoch: new_epoch,
                refcount: 0,
                cell: Arc::new(OnceCell::new()),
            }
        });
        slot.refcount += 1;
        let entry = CacheEntry {
            path: path.to_path_buf(),
            epoch: slot.epoch,
            cell: Arc::clone(&slot.cell),
        };
        if fresh {
            inner.next_epoch += 1;
        }
        entry
    }

    /// Give a claim back. The slot is dropped when this was the last one.
    pub fn release(&self, entry: CacheEntry) {
        let mut inner = self.inner.lock().expect("parse cache mutex poisoned");
        if let Some(slot) = inner.slots.get_mut(&entry.path) {
            // a discarded slot was already replaced; old claims do not
            // touch its successor
            if slot.epoch != entry.epoch {
                return;
            }
            slot.refcount = slot.refcount.saturating_sub(1);
            if slot.refcount == 0 {
                inner.slots.remove(&entry.path);
            }
        }
    }

    /// Drop the slot for `path` so the next acquire reparses the file.
    /// Outstanding claims keep the old document. Returns whether a slot
    /// existed.
    pub fn discard(&self, path: &Path) -> bool {
        let mut inner = self.inner.lock().expect("parse cache mutex poisoned");
        inner.slots.remove(path).is_some()
    }

    pub fn contains(&self, path: &Path) -> bool {
        let inner = self.inner.lock().expect("parse cache mutex poisoned");
        inner.slots.contains_key(path)
    }

    /// Number of live slots
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("parse cache mutex poisoned");
        inner.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ParseCache {
    fn default() -> Self {
        Self::new()
    }
}
