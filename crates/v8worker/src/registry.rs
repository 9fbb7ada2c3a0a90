//! Process-wide table of live workers, keyed by an integer [`Handle`].
//!
//! The script engine can only carry a small integer across the boundary when
//! it calls back into the host. The registry turns that integer back into the
//! host-side [`WorkerRecord`]. Entries are weak: the registry never keeps a
//! worker alive, it only indexes the live ones.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError, Weak};

use tracing::trace;

/// Host callback receiving a copy of every message a script sends out.
///
/// The returned bytes, if any, are handed back to the script as the reply.
pub type ReceiveCallback = Arc<dyn Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync>;

/// Opaque identifier of a worker across the host/engine boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u64);

impl Handle {
    /// Rebuilds a handle from the raw integer an engine carried around
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Host-side state the dispatch bridge needs to reach a worker
pub struct WorkerRecord {
    callback: ReceiveCallback,
}

impl WorkerRecord {
    pub fn new(callback: ReceiveCallback) -> Self {
        Self { callback }
    }

    pub fn receive(&self, message: Vec<u8>) -> Option<Vec<u8>> {
        (self.callback)(message)
    }
}

impl fmt::Debug for WorkerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerRecord").finish_non_exhaustive()
    }
}

struct Table {
    entries: HashMap<Handle, Weak<WorkerRecord>>,
    next: u64,
}

/// Handle to record mapping guarded by a single lock.
///
/// The lock is only held for the map read or mutation itself, never across a
/// call into the engine or into a receive callback.
pub struct HandleRegistry {
    table: Mutex<Table>,
}

static GLOBAL: LazyLock<HandleRegistry> = LazyLock::new(HandleRegistry::new);

impl HandleRegistry {
    pub fn new() -> Self {
        Self {
            table: Mutex::new(Table {
                entries: HashMap::new(),
                next: 1,
            }),
        }
    }

    /// The registry shared by every worker in the process
    pub fn global() -> &'static HandleRegistry {
        &GLOBAL
    }

    // A panic elsewhere while holding the lock leaves the map itself intact,
    // and dispatch must keep working during teardown.
    fn table(&self) -> MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Allocates the next handle and indexes `record` under it.
    ///
    /// Handles increase monotonically and are never handed out twice.
    pub fn register(&self, record: &Arc<WorkerRecord>) -> Handle {
        let mut table = self.table();
        let handle = Handle(table.next);
        table.next += 1;
        table.entries.insert(handle, Arc::downgrade(record));
        trace!(%handle, "Registered worker handle");
        handle
    }

    /// Resolves a handle to its record, `None` if it was never registered,
    /// was unregistered, or its worker is gone.
    pub fn lookup(&self, handle: Handle) -> Option<Arc<WorkerRecord>> {
        let mut table = self.table();
        let record = table.entries.get(&handle)?.upgrade();
        if record.is_none() {
            table.entries.remove(&handle);
        }
        record
    }

    /// Removes a handle. Returns false if it was not registered.
    pub fn unregister(&self, handle: Handle) -> bool {
        let removed = self.table().entries.remove(&handle).is_some();
        trace!(%handle, removed, "Unregistered worker handle");
        removed
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.table().entries.contains_key(&handle)
    }

    /// Number of registered handles
    pub fn len(&self) -> usize {
        self.table().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    fn record() -> Arc<WorkerRecord> {
        Arc::new(WorkerRecord::new(Arc::new(|_: Vec<u8>| None)))
    }

    #[test]
    fn test_register_assigns_increasing_handles() {
        let registry = HandleRegistry::new();
        let (a, b) = (record(), record());

        let first = registry.register(&a);
        let second = registry.register(&b);

        assert!(second > first);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_lookup_after_unregister_misses() {
        let registry = HandleRegistry::new();
        let rec = record();
        let handle = registry.register(&rec);

        assert!(registry.lookup(handle).is_some());
        assert!(registry.unregister(handle));
        assert!(registry.lookup(handle).is_none());
        assert!(!registry.unregister(handle), "second unregister is a no-op");
    }

    #[test]
    fn test_lookup_unknown_handle_misses() {
        let registry = HandleRegistry::new();
        assert!(registry.lookup(Handle::from_raw(42)).is_none());
    }

    #[test]
    fn test_registry_does_not_keep_record_alive() {
        let registry = HandleRegistry::new();
        let rec = record();
        let handle = registry.register(&rec);
        drop(rec);

        assert!(registry.lookup(handle).is_none());
        assert!(!registry.contains(handle), "dead entry is pruned on lookup");
    }

    #[test]
    fn test_handles_unique_across_threads() {
        let registry = Arc::new(HandleRegistry::new());

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    let records: Vec<_> = (0..50).map(|_| record()).collect();
                    let handles: Vec<_> = records.iter().map(|r| registry.register(r)).collect();
                    (records, handles)
                })
            })
            .collect();

        let mut seen = HashSet::new();
        let mut keep_alive = Vec::new();
        for t in threads {
            let (records, handles) = t.join().unwrap();
            for handle in handles {
                assert!(seen.insert(handle), "duplicate handle {handle}");
            }
            keep_alive.push(records);
        }
        assert_eq!(registry.len(), 400);
    }
}
