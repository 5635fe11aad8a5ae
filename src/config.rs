//! Configuration management for sealfs

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Root of the encrypted store (mirrors the home directory layout)
    pub store_dir: PathBuf,

    /// Mount point for the decrypting virtual filesystem
    pub mount_dir: PathBuf,

    /// Recipient identity passed to the crypto backend when encrypting
    pub recipient: String,

    /// Run the mount as a background daemon
    pub daemonize: bool,
}

impl Default for Config {
    fn default() -> Self {
        let base = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".sealfs");

        Config {
            store_dir: base.join("store"),
            mount_dir: base.join("mount"),
            recipient: String::new(),
            daemonize: false,
        }
    }
}

impl Config {
    /// Default configuration file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("sealfs")
            .join("config.json")
    }

    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config file: {}", e)))?;

        let config: Config = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config file: {}", e)))?;

        Ok(config)
    }

    /// Save configuration to a file, creating the parent directory
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config file: {}", e)))?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.recipient.trim().is_empty() {
            return Err(Error::Config(
                "Recipient identity is required (run 'sealfs setup')".to_string(),
            ));
        }

        if self.store_dir == self.mount_dir {
            return Err(Error::Config(
                "Store and mount directories must differ".to_string(),
            ));
        }

        Ok(())
    }

    /// Ensure the store and mount directories exist
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.store_dir)?;
        std::fs::create_dir_all(&self.mount_dir)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample(dir: &Path) -> Config {
        Config {
            store_dir: dir.join("store"),
            mount_dir: dir.join("mount"),
            recipient: "user@example.org".to_string(),
            daemonize: false,
        }
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("conf").join("config.json");

        let config = sample(dir.path());
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.store_dir, config.store_dir);
        assert_eq!(loaded.mount_dir, config.mount_dir);
        assert_eq!(loaded.recipient, "user@example.org");
        assert!(!loaded.daemonize);
    }

    #[test]
    fn test_validate_requires_recipient() {
        let dir = tempdir().unwrap();
        let mut config = sample(dir.path());
        config.recipient = String::new();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_same_dirs() {
        let dir = tempdir().unwrap();
        let mut config = sample(dir.path());
        config.mount_dir = config.store_dir.clone();

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ensure_directories() {
        let dir = tempdir().unwrap();
        let config = sample(dir.path());

        config.ensure_directories().unwrap();
        assert!(config.store_dir.is_dir());
        assert!(config.mount_dir.is_dir());
    }

    #[test]
    fn test_load_missing_file() {
        assert!(Config::load("/nonexistent/config.json").is_err());
    }

    #[test]
    fn test_default_path_shape() {
        let path = Config::default_path();
        assert!(path.ends_with("sealfs/config.json"));
    }
}
