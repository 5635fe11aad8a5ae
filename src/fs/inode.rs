//! Inode table for the mounted filesystem
//!
//! FUSE speaks inode numbers; the store speaks virtual paths. This
//! table maps between the two, allocating numbers on first lookup.
//! Nothing else is cached here: attributes are always re-resolved from
//! the backing tree.
//!
//! Inodes handed to the kernel via `lookup` carry a reference count
//! and are evicted when the kernel forgets them, so the table does not
//! grow without bound over a long-lived mount. Inodes only ever seen
//! in `readdir` replies are never forgotten by the kernel and stay
//! until a lookup/forget cycle claims them.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Inode number of the mount root (empty virtual path)
pub const ROOT_INO: u64 = 1;

struct InodeEntry {
    path: PathBuf,
    /// Kernel lookup count; entry is evicted when it drops to zero
    lookups: u64,
}

/// Bidirectional ino <-> virtual path mapping
pub struct InodeTable {
    /// Next virtual inode number
    next_ino: AtomicU64,
    /// ino -> entry
    entries: RwLock<HashMap<u64, InodeEntry>>,
    /// virtual path -> ino
    inos: RwLock<HashMap<PathBuf, u64>>,
}

impl InodeTable {
    pub fn new() -> Self {
        let table = InodeTable {
            next_ino: AtomicU64::new(ROOT_INO + 1),
            entries: RwLock::new(HashMap::new()),
            inos: RwLock::new(HashMap::new()),
        };

        table.entries.write().insert(
            ROOT_INO,
            InodeEntry {
                path: PathBuf::new(),
                lookups: 0,
            },
        );
        table.inos.write().insert(PathBuf::new(), ROOT_INO);

        table
    }

    /// Virtual path for an inode number
    pub fn path_of(&self, ino: u64) -> Option<PathBuf> {
        self.entries.read().get(&ino).map(|e| e.path.clone())
    }

    /// Inode number for a path, allocating one on first sight
    pub fn assign(&self, path: &Path) -> u64 {
        if let Some(&ino) = self.inos.read().get(path) {
            return ino;
        }

        let ino = self.next_ino.fetch_add(1, Ordering::SeqCst);
        self.entries.write().insert(
            ino,
            InodeEntry {
                path: path.to_path_buf(),
                lookups: 0,
            },
        );
        self.inos.write().insert(path.to_path_buf(), ino);
        ino
    }

    /// Record one kernel reference, taken when a lookup reply is sent
    pub fn retain(&self, ino: u64) {
        if let Some(entry) = self.entries.write().get_mut(&ino) {
            entry.lookups += 1;
        }
    }

    /// Drop `nlookup` kernel references, evicting the entry when none
    /// remain. The root is never evicted.
    pub fn forget(&self, ino: u64, nlookup: u64) {
        if ino == ROOT_INO {
            return;
        }

        let mut entries = self.entries.write();
        if let Some(entry) = entries.get_mut(&ino) {
            entry.lookups = entry.lookups.saturating_sub(nlookup);
            if entry.lookups == 0 {
                let path = entries.remove(&ino).map(|e| e.path);
                if let Some(path) = path {
                    self.inos.write().remove(&path);
                }
            }
        }
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
