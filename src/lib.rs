//! sealfs - encrypted file store with a read-through FUSE mount
//!
//! Files are kept at rest as ciphertext blobs plus a size sidecar and
//! decrypted on demand when read through the mounted tree. `protect`
//! moves a file into the store and leaves a placeholder link behind;
//! `unprotect` restores it.

pub mod config;
pub mod crypto;
pub mod error;
pub mod fs;
pub mod lifecycle;
pub mod store;

pub use config::Config;
pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::crypto::CryptoBackend;
    pub use crate::error::{Error, Result};
    pub use crate::lifecycle::LifecycleManager;
    pub use crate::store::EncryptedStore;
}
