//! FUSE adapter
//!
//! Implements the kernel filesystem contract against the encrypted
//! store, decrypting file content on demand.

mod filesystem;
mod handle;
mod inode;

pub use filesystem::SealFs;
pub use handle::HandleTable;
pub use inode::{InodeTable, ROOT_INO};
