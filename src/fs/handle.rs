//! Open file handle management
//!
//! The mount is read-only, so a handle is just the virtual path frozen
//! at open time.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

/// Manages open file handles
pub struct HandleTable {
    /// Next handle ID
    next_fh: AtomicU64,
    /// fh -> virtual path
    handles: RwLock<HashMap<u64, PathBuf>>,
}

impl HandleTable {
    pub fn new() -> Self {
        HandleTable {
            next_fh: AtomicU64::new(1),
            handles: RwLock::new(HashMap::new()),
        }
    }

    /// Open a path and return a handle ID
    pub fn open(&self, path: PathBuf) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::SeqCst);
        self.handles.write().insert(fh, path);
        fh
    }

    /// Virtual path for an open handle
    pub fn path_of(&self, fh: u64) -> Option<PathBuf> {
        self.handles.read().get(&fh).cloned()
    }

    /// Close a handle
    pub fn close(&self, fh: u64) {
        self.handles.write().remove(&fh);
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_close() {
        let table = HandleTable::new();

        let fh1 = table.open(PathBuf::from("doc.txt"));
        let fh2 = table.open(PathBuf::from("other"));
        assert_ne!(fh1, fh2);

        assert_eq!(table.path_of(fh1), Some(PathBuf::from("doc.txt")));

        table.close(fh1);
        assert_eq!(table.path_of(fh1), None);
        assert_eq!(table.path_of(fh2), Some(PathBuf::from("other")));
    }
}
