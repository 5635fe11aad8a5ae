//! Error types for sealfs

use thiserror::Error;

/// Result type used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// All errors sealfs can produce
#[derive(Error, Debug)]
pub enum Error {
    /// Path does not exist in the store
    #[error("No such entry: {0}")]
    NotFound(String),

    /// Listing was requested on a non-directory entry
    #[error("Not a directory: {0}")]
    NotADirectory(String),

    /// Byte read was requested on a directory entry
    #[error("Is a directory: {0}")]
    IsADirectory(String),

    /// Ciphertext exists but its size record is missing or unreadable
    #[error("Corrupt store entry (bad size record): {0}")]
    CorruptEntry(String),

    /// The crypto backend reported a failure
    #[error("Crypto backend failure: {0}")]
    CryptoFailure(String),

    /// Unprotect target is not a placeholder link into the mount
    #[error("Not a managed placeholder: {0}")]
    NotManaged(String),

    /// Protect source is not inside the home tree
    #[error("Not under the home directory: {0}")]
    OutOfTree(String),

    /// Configuration file problems
    #[error("Configuration error: {0}")]
    Config(String),

    /// Underlying I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Anything else
    #[error("Internal error: {0}")]
    Internal(String),
}
