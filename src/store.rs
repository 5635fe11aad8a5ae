//! Encrypted store access
//!
//! The store root mirrors the home directory layout: directories are
//! real directories, files are ciphertext blobs with a size sidecar
//! next to them. There is no index; every call re-resolves against the
//! backing tree.

use crate::crypto::CryptoBackend;
use crate::error::{Error, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

/// Suffix distinguishing a size sidecar from its ciphertext
pub const SIZE_SUFFIX: &str = ".size";

/// Kind of store entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Directory,
    File,
}

/// Attributes reported for a store entry.
///
/// Everything is passed through from the backing entry except `size`,
/// which for files is the recorded plaintext length. Reporting the
/// ciphertext length instead would break byte-range reads computed by
/// callers against `stat`.
#[derive(Debug, Clone)]
pub struct EntryMetadata {
    pub kind: EntryKind,
    pub size: u64,
    pub perm: u16,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl EntryMetadata {
    #[cfg(unix)]
    fn from_backing(meta: &fs::Metadata, kind: EntryKind, size: u64) -> Self {
        use std::os::unix::fs::MetadataExt;
        Self {
            kind,
            size,
            perm: (meta.mode() & 0o7777) as u16,
            nlink: meta.nlink() as u32,
            uid: meta.uid(),
            gid: meta.gid(),
            atime: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            ctime: SystemTime::UNIX_EPOCH + std::time::Duration::from_secs(meta.ctime() as u64),
        }
    }

    #[cfg(not(unix))]
    fn from_backing(meta: &fs::Metadata, kind: EntryKind, size: u64) -> Self {
        Self {
            kind,
            size,
            perm: if meta.is_dir() { 0o755 } else { 0o644 },
            nlink: 1,
            uid: 0,
            gid: 0,
            atime: meta.accessed().unwrap_or(SystemTime::UNIX_EPOCH),
            mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
            ctime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        }
    }
}

/// Normalize a virtual path: strip any root, drop `.` components,
/// reject `..` and non-plain components.
pub fn normalize(path: &Path) -> Result<PathBuf> {
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::RootDir | Component::CurDir => {}
            Component::Normal(part) => clean.push(part),
            Component::ParentDir | Component::Prefix(_) => {
                return Err(Error::NotFound(path.display().to_string()));
            }
        }
    }
    Ok(clean)
}

/// Sidecar path for a ciphertext path (`doc.txt` -> `doc.txt.size`)
pub fn sidecar_path(cipher_path: &Path) -> PathBuf {
    let mut name = cipher_path.as_os_str().to_os_string();
    name.push(SIZE_SUFFIX);
    PathBuf::from(name)
}

/// Whether a backing path is the size sidecar of an existing entry.
///
/// The suffix alone is not enough: a user file may itself be named
/// `*.size`. A path counts as a sidecar only when it is a regular file
/// and the ciphertext it would belong to exists next to it. A directory
/// or an entry with no base file keeps its visible name.
pub fn is_sidecar(backing: &Path) -> bool {
    let Some(name) = backing.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(base) = name.strip_suffix(SIZE_SUFFIX) else {
        return false;
    };
    !base.is_empty() && backing.is_file() && backing.with_file_name(base).is_file()
}

/// Whether committing a ciphertext at this path would clash with the
/// sidecar scheme: the path is an existing entry's sidecar slot, or its
/// own sidecar slot is occupied by another entry's ciphertext. A stale
/// sidecar left by a previous commit of the same path does not count.
pub fn sidecar_collision(cipher_path: &Path) -> bool {
    if let Some(name) = cipher_path.file_name().and_then(|n| n.to_str()) {
        if let Some(base) = name.strip_suffix(SIZE_SUFFIX) {
            if !base.is_empty() && cipher_path.with_file_name(base).is_file() {
                return true;
            }
        }
    }

    let sidecar = sidecar_path(cipher_path);
    sidecar.is_file() && sidecar_path(&sidecar).is_file()
}

/// Record the plaintext length next to a ciphertext blob
pub fn write_size_record(cipher_path: &Path, plain_len: u64) -> Result<()> {
    fs::write(sidecar_path(cipher_path), plain_len.to_string())?;
    Ok(())
}

/// Read the recorded plaintext length for a ciphertext blob.
///
/// A missing or unparseable sidecar is `CorruptEntry`; the length is
/// never inferred from the ciphertext.
pub fn read_size_record(cipher_path: &Path) -> Result<u64> {
    let sidecar = sidecar_path(cipher_path);
    let text = fs::read_to_string(&sidecar)
        .map_err(|_| Error::CorruptEntry(cipher_path.display().to_string()))?;
    text.trim()
        .parse::<u64>()
        .map_err(|_| Error::CorruptEntry(cipher_path.display().to_string()))
}

/// Path-addressed view over the encrypted store
pub struct EncryptedStore {
    root: PathBuf,
    crypto: Arc<dyn CryptoBackend>,
}

impl EncryptedStore {
    pub fn new(root: PathBuf, crypto: Arc<dyn CryptoBackend>) -> Self {
        EncryptedStore { root, crypto }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a virtual path to its backing path under the store root
    pub fn resolve(&self, path: &Path) -> Result<PathBuf> {
        Ok(self.root.join(normalize(path)?))
    }

    /// Attributes for a virtual path
    pub fn stat(&self, path: &Path) -> Result<EntryMetadata> {
        let backing = self.resolve(path)?;
        let meta = backing_metadata(&backing, path)?;

        if meta.is_dir() {
            let len = meta.len();
            return Ok(EntryMetadata::from_backing(&meta, EntryKind::Directory, len));
        }

        // Sidecars are implementation detail, never addressable
        if is_sidecar(&backing) {
            return Err(Error::NotFound(path.display().to_string()));
        }

        let size = read_size_record(&backing)?;
        Ok(EntryMetadata::from_backing(&meta, EntryKind::File, size))
    }

    /// Enumerate a directory's visible children
    pub fn list(&self, path: &Path) -> Result<Vec<(String, EntryMetadata)>> {
        let backing = self.resolve(path)?;
        let meta = backing_metadata(&backing, path)?;

        if !meta.is_dir() {
            return Err(Error::NotADirectory(path.display().to_string()));
        }

        let virtual_path = normalize(path)?;
        let mut entries = Vec::new();

        for entry in fs::read_dir(&backing)? {
            let entry = entry?;
            let name = entry.file_name();

            if is_sidecar(&backing.join(&name)) {
                continue;
            }

            let child_meta = self.stat(&virtual_path.join(&name))?;
            entries.push((name.to_string_lossy().into_owned(), child_meta));
        }

        Ok(entries)
    }

    /// Decrypt a file and return `[offset, offset + size)`, clamped to
    /// the plaintext length. A range fully past end-of-file is empty.
    pub fn read_bytes(&self, path: &Path, offset: u64, size: u32) -> Result<Vec<u8>> {
        let backing = self.resolve(path)?;
        let meta = backing_metadata(&backing, path)?;

        if meta.is_dir() {
            return Err(Error::IsADirectory(path.display().to_string()));
        }

        if is_sidecar(&backing) {
            return Err(Error::NotFound(path.display().to_string()));
        }

        let cipher = fs::read(&backing)?;
        let plain = self.crypto.decrypt(&cipher)?;

        let start = (offset as usize).min(plain.len());
        let end = (offset as usize)
            .saturating_add(size as usize)
            .min(plain.len());

        Ok(plain[start..end].to_vec())
    }
}

fn backing_metadata(backing: &Path, path: &Path) -> Result<fs::Metadata> {
    fs::symlink_metadata(backing).map_err(|e| match e.kind() {
        ErrorKind::NotFound => Error::NotFound(path.display().to_string()),
        _ => Error::Io(e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::mock::MockBackend;
    use tempfile::{tempdir, TempDir};

    fn store() -> (TempDir, EncryptedStore) {
        let dir = tempdir().unwrap();
        let root = dir.path().join("store");
        fs::create_dir(&root).unwrap();
        (dir, EncryptedStore::new(root, Arc::new(MockBackend)))
    }

    /// Place a protected file directly into the store
    fn seed(store: &EncryptedStore, path: &str, plain: &[u8]) {
        let backing = store.root().join(path);
        if let Some(parent) = backing.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let cipher = MockBackend.encrypt(plain, "test").unwrap();
        fs::write(&backing, cipher).unwrap();
        write_size_record(&backing, plain.len() as u64).unwrap();
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize(Path::new("/a/b")).unwrap(), PathBuf::from("a/b"));
        assert_eq!(normalize(Path::new("./a")).unwrap(), PathBuf::from("a"));
        assert!(normalize(Path::new("a/../b")).is_err());
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/s/doc.txt")),
            PathBuf::from("/s/doc.txt.size")
        );
    }

    #[test]
    fn test_stat_file_reports_plaintext_size() {
        let (_dir, store) = store();
        seed(&store, "doc.txt", b"hello");

        let meta = store.stat(Path::new("doc.txt")).unwrap();
        assert_eq!(meta.kind, EntryKind::File);
        assert_eq!(meta.size, 5);
    }

    #[test]
    fn test_stat_empty_file() {
        let (_dir, store) = store();
        seed(&store, "empty", b"");

        assert_eq!(store.stat(Path::new("empty")).unwrap().size, 0);
    }

    #[test]
    fn test_stat_directory_passthrough() {
        let (_dir, store) = store();
        fs::create_dir(store.root().join("sub")).unwrap();

        let meta = store.stat(Path::new("sub")).unwrap();
        assert_eq!(meta.kind, EntryKind::Directory);
    }

    #[test]
    fn test_stat_missing_is_not_found() {
        let (_dir, store) = store();
        assert!(matches!(
            store.stat(Path::new("nope")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_stat_hides_sidecar() {
        let (_dir, store) = store();
        seed(&store, "doc.txt", b"hello");

        assert!(matches!(
            store.stat(Path::new("doc.txt.size")),
            Err(Error::NotFound(_))
        ));
    }

    #[test]
    fn test_missing_sidecar_is_corrupt() {
        let (_dir, store) = store();
        fs::write(store.root().join("orphan"), b"cipher bytes").unwrap();

        assert!(matches!(
            store.stat(Path::new("orphan")),
            Err(Error::CorruptEntry(_))
        ));
    }

    #[test]
    fn test_unparseable_sidecar_is_corrupt() {
        let (_dir, store) = store();
        seed(&store, "doc.txt", b"hello");
        fs::write(store.root().join("doc.txt.size"), "not a number").unwrap();

        assert!(matches!(
            store.stat(Path::new("doc.txt")),
            Err(Error::CorruptEntry(_))
        ));
    }

    #[test]
    fn test_list_hides_sidecars() {
        let (_dir, store) = store();
        seed(&store, "doc.txt", b"hello");
        fs::create_dir(store.root().join("sub")).unwrap();

        let mut names: Vec<String> = store
            .list(Path::new(""))
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        names.sort();

        assert_eq!(names, vec!["doc.txt", "sub"]);
    }

    #[test]
    fn test_directory_named_like_sidecar_stays_visible() {
        let (_dir, store) = store();
        fs::create_dir(store.root().join("reports.size")).unwrap();
        seed(&store, "reports.size/doc.txt", b"inside");

        let meta = store.stat(Path::new("reports.size")).unwrap();
        assert_eq!(meta.kind, EntryKind::Directory);

        let names: Vec<String> = store
            .list(Path::new(""))
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["reports.size"]);
    }

    #[test]
    fn test_entry_named_like_sidecar_is_reachable() {
        let (_dir, store) = store();
        seed(&store, "data.size", b"hello");

        // A protected file that happens to be called *.size is a real
        // entry; only its own sidecar (data.size.size) is hidden
        assert_eq!(store.stat(Path::new("data.size")).unwrap().size, 5);
        assert_eq!(store.read_bytes(Path::new("data.size"), 0, 5).unwrap(), b"hello");

        let names: Vec<String> = store
            .list(Path::new(""))
            .unwrap()
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        assert_eq!(names, vec!["data.size"]);
    }

    #[test]
    fn test_sidecar_collision_detection() {
        let (_dir, store) = store();

        // No entries yet: nothing collides
        assert!(!sidecar_collision(&store.root().join("data")));
        assert!(!sidecar_collision(&store.root().join("data.size")));

        seed(&store, "data", b"hello");

        // Committing at data's sidecar slot would corrupt data
        assert!(sidecar_collision(&store.root().join("data.size")));
        // Re-committing data over its own stale sidecar is fine
        assert!(!sidecar_collision(&store.root().join("data")));

        let (_dir2, store2) = self::store();
        seed(&store2, "data.size", b"hello");

        // data's sidecar slot is occupied by the data.size entry
        assert!(sidecar_collision(&store2.root().join("data")));
    }

    #[test]
    fn test_list_on_file_is_not_a_directory() {
        let (_dir, store) = store();
        seed(&store, "doc.txt", b"hello");

        assert!(matches!(
            store.list(Path::new("doc.txt")),
            Err(Error::NotADirectory(_))
        ));
    }

    #[test]
    fn test_read_bytes_slices_and_clamps() {
        let (_dir, store) = store();
        seed(&store, "doc.txt", b"hello world");
        let path = Path::new("doc.txt");

        assert_eq!(store.read_bytes(path, 0, 5).unwrap(), b"hello");
        assert_eq!(store.read_bytes(path, 6, 100).unwrap(), b"world");
        assert_eq!(store.read_bytes(path, 0, 1024).unwrap(), b"hello world");
    }

    #[test]
    fn test_read_past_eof_is_empty() {
        let (_dir, store) = store();
        seed(&store, "doc.txt", b"hello");

        assert!(store.read_bytes(Path::new("doc.txt"), 5, 10).unwrap().is_empty());
        assert!(store.read_bytes(Path::new("doc.txt"), 999, 10).unwrap().is_empty());
    }

    #[test]
    fn test_read_directory_is_error() {
        let (_dir, store) = store();
        fs::create_dir(store.root().join("sub")).unwrap();

        assert!(matches!(
            store.read_bytes(Path::new("sub"), 0, 10),
            Err(Error::IsADirectory(_))
        ));
    }

    #[test]
    fn test_nested_paths() {
        let (_dir, store) = store();
        seed(&store, "a/b/doc.txt", b"nested");

        assert_eq!(store.stat(Path::new("a/b/doc.txt")).unwrap().size, 6);
        assert_eq!(store.read_bytes(Path::new("a/b/doc.txt"), 0, 6).unwrap(), b"nested");
    }
}
