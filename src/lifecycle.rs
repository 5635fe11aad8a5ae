//! Protect / unprotect state transitions
//!
//! The ordering here is the safety core of sealfs: the ciphertext and
//! its size record are durably committed before the plaintext original
//! is replaced, and on unprotect the plaintext is durably rewritten
//! before the store entry is destroyed. Both replacements go through a
//! staged file in the same directory swapped in with a rename, so the
//! user-visible path flips atomically or not at all.

use crate::crypto::CryptoBackend;
use crate::error::{Error, Result};
use crate::store::{sidecar_collision, sidecar_path, write_size_record};
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Coordinates the crypto backend, the store tree and placeholder links
pub struct LifecycleManager {
    home: PathBuf,
    store_dir: PathBuf,
    mount_dir: PathBuf,
    recipient: String,
    crypto: Arc<dyn CryptoBackend>,
}

impl LifecycleManager {
    pub fn new(
        home: PathBuf,
        store_dir: PathBuf,
        mount_dir: PathBuf,
        recipient: String,
        crypto: Arc<dyn CryptoBackend>,
    ) -> Self {
        LifecycleManager {
            home,
            store_dir,
            mount_dir,
            recipient,
            crypto,
        }
    }

    /// Move a plaintext file into the store, leaving a placeholder link.
    ///
    /// Returns the virtual path the file is now exposed at. On any
    /// failure, partially written store artifacts are removed and the
    /// original is left untouched: the placeholder is staged next to
    /// the original and renamed over it only once the store entry is
    /// durable.
    pub fn protect(&self, source: &Path) -> Result<PathBuf> {
        let rel = source
            .strip_prefix(&self.home)
            .map_err(|_| Error::OutOfTree(source.display().to_string()))?
            .to_path_buf();

        let meta = fs::symlink_metadata(source).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(source.display().to_string()),
            _ => Error::Io(e),
        })?;

        if meta.is_dir() {
            return Err(Error::IsADirectory(source.display().to_string()));
        }
        if meta.file_type().is_symlink() {
            // Already a link; protecting it again would encrypt the
            // link target path, not file content
            return Err(Error::NotManaged(source.display().to_string()));
        }

        let cipher_path = self.store_dir.join(&rel);
        if sidecar_collision(&cipher_path) {
            // A source named `*.size` can occupy another entry's size
            // record slot, or have its own slot occupied; committing
            // would silently corrupt the other entry
            return Err(Error::Internal(format!(
                "Refusing {}: store path collides with a size record",
                source.display()
            )));
        }

        let plain = fs::read(source)?;
        let plain_len = plain.len() as u64;

        let cipher = self.crypto.encrypt(&plain, &self.recipient)?;

        if let Some(parent) = cipher_path.parent() {
            fs::create_dir_all(parent)?;
        }

        if let Err(e) = fs::write(&cipher_path, &cipher) {
            remove_artifacts(&cipher_path);
            return Err(Error::Io(e));
        }

        if let Err(e) = write_size_record(&cipher_path, plain_len) {
            remove_artifacts(&cipher_path);
            return Err(e);
        }

        // The encrypted copy is durable; swap the placeholder in over
        // the original with a rename so the original never disappears
        // without its link
        let link_target = self.mount_dir.join(&rel);
        let staged = staging_path(source);
        if let Err(e) = symlink(&link_target, &staged) {
            remove_artifacts(&cipher_path);
            return Err(Error::Io(e));
        }
        if let Err(e) = fs::rename(&staged, source) {
            let _ = fs::remove_file(&staged);
            remove_artifacts(&cipher_path);
            return Err(Error::Io(e));
        }

        info!("Protected {} ({} bytes)", source.display(), plain_len);
        Ok(rel)
    }

    /// Restore a protected file to plaintext and remove its store entry.
    ///
    /// `link` must be a placeholder symlink pointing under the mount
    /// root; anything else is `NotManaged` and is left untouched.
    pub fn unprotect(&self, link: &Path) -> Result<()> {
        let meta = fs::symlink_metadata(link).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::NotFound(link.display().to_string()),
            _ => Error::Io(e),
        })?;

        if !meta.file_type().is_symlink() {
            return Err(Error::NotManaged(link.display().to_string()));
        }

        let target = fs::read_link(link)?;
        let rel = target
            .strip_prefix(&self.mount_dir)
            .map_err(|_| Error::NotManaged(link.display().to_string()))?
            .to_path_buf();

        let cipher_path = self.store_dir.join(&rel);
        let cipher = fs::read(&cipher_path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => Error::CorruptEntry(cipher_path.display().to_string()),
            _ => Error::Io(e),
        })?;

        // Decrypt before touching anything; a backend failure must
        // leave the link valid
        let plain = self.crypto.decrypt(&cipher)?;

        // Stage the plaintext next to the link and rename it over the
        // link; any failure up to the rename leaves the link in place
        let staged = staging_path(link);
        if let Err(e) = fs::write(&staged, &plain) {
            let _ = fs::remove_file(&staged);
            return Err(Error::Io(e));
        }
        if let Err(e) = fs::rename(&staged, link) {
            let _ = fs::remove_file(&staged);
            return Err(Error::Io(e));
        }

        // Plaintext is durable; the store entry can go
        fs::remove_file(&cipher_path)?;
        fs::remove_file(sidecar_path(&cipher_path))?;

        info!("Unprotected {} ({} bytes)", link.display(), plain.len());
        Ok(())
    }
}

/// Best-effort removal of a ciphertext and its sidecar
fn remove_artifacts(cipher_path: &Path) {
    let _ = fs::remove_file(cipher_path);
    let _ = fs::remove_file(sidecar_path(cipher_path));
}

/// Hidden staging name in the same directory as `path`, so the final
/// rename cannot cross filesystems
fn staging_path(path: &Path) -> PathBuf {
    let mut name = OsString::from(".");
    if let Some(file_name) = path.file_name() {
        name.push(file_name);
    }
    name.push(".sealfs-tmp");
    path.with_file_name(name)
}
