//! sealfs - encrypted file store with a read-through FUSE mount
//!
//! Usage:
//!   sealfs mount              - Serve the decrypting filesystem
//!   sealfs umount             - Unmount the filesystem
//!   sealfs protect <path>...  - Move files into the encrypted store
//!   sealfs unprotect <path>.. - Restore files to plaintext
//!   sealfs setup              - Create config and directories

use clap::{Parser, Subcommand};
use sealfs::{
    config::Config,
    crypto::GpgBackend,
    fs::SealFs,
    lifecycle::LifecycleManager,
    store::EncryptedStore,
    Error, Result,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "sealfs")]
#[command(author = "sealfs Contributors")]
#[command(version)]
#[command(about = "Encrypted file store with a read-through FUSE mount")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value_os_t = Config::default_path())]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the decrypting filesystem until interrupted
    Mount,

    /// Unmount the filesystem
    Umount,

    /// Move files into the encrypted store, leaving placeholder links
    Protect {
        /// Files under the home directory to protect
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Restore protected files to plaintext
    Unprotect {
        /// Placeholder links to restore
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Idempotently create configuration and backing directories
    Setup,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            // Help and version are not usage errors
            if e.use_stderr() {
                let _ = e.print();
                std::process::exit(1);
            }
            let _ = e.print();
            std::process::exit(0);
        }
    };

    // Setup logging
    let log_level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    let config_path = expand_tilde(&cli.config);

    if let Err(e) = run_command(cli.command, &config_path) {
        error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run_command(command: Commands, config_path: &Path) -> Result<()> {
    match command {
        Commands::Mount => cmd_mount(config_path),
        Commands::Umount => cmd_umount(config_path),
        Commands::Protect { paths } => cmd_protect(config_path, &paths),
        Commands::Unprotect { paths } => cmd_unprotect(config_path, &paths),
        Commands::Setup => cmd_setup(config_path),
    }
}

fn cmd_mount(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;
    config.validate()?;
    config.ensure_directories()?;

    if config.daemonize {
        // For proper daemonization you'd use a crate like `daemonize`;
        // for now the serve loop stays in the foreground
        info!("Daemonize requested; running in foreground");
    }

    let store = EncryptedStore::new(config.store_dir.clone(), Arc::new(GpgBackend::new()));
    let fs = SealFs::new(store);

    let options = vec![
        fuser::MountOption::FSName("sealfs".to_string()),
        fuser::MountOption::RO,
        fuser::MountOption::AutoUnmount,
    ];

    info!("Mounting at {:?}", config.mount_dir);

    // The session is the unmount guard: dropping it unmounts on every
    // exit path, normal or errored
    let session = fuser::spawn_mount2(fs, &config.mount_dir, &options)
        .map_err(|e| Error::Internal(format!("Failed to mount: {}", e)))?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived termination signal, unmounting...");
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| Error::Internal(format!("Failed to set signal handler: {}", e)))?;

    while running.load(Ordering::SeqCst) {
        std::thread::sleep(Duration::from_millis(500));
    }

    drop(session);
    info!("Unmounted {:?}", config.mount_dir);

    Ok(())
}

fn cmd_umount(config_path: &Path) -> Result<()> {
    let config = Config::load(config_path)?;

    info!("Unmounting {:?}...", config.mount_dir);

    #[cfg(target_os = "linux")]
    let output = std::process::Command::new("fusermount")
        .arg("-u")
        .arg(&config.mount_dir)
        .output()?;

    #[cfg(target_os = "macos")]
    let output = std::process::Command::new("umount")
        .arg(&config.mount_dir)
        .output()?;

    if output.status.success() {
        info!("Unmounted successfully");
        Ok(())
    } else {
        Err(Error::Internal(format!(
            "Failed to unmount: {}",
            String::from_utf8_lossy(&output.stderr)
        )))
    }
}

fn cmd_protect(config_path: &Path, paths: &[PathBuf]) -> Result<()> {
    let config = Config::load(config_path)?;
    config.validate()?;
    config.ensure_directories()?;

    let manager = lifecycle_manager(&config)?;

    for path in paths {
        let source = absolutize(&expand_tilde(path));
        match manager.protect(&source) {
            Ok(rel) => info!("Protected {} -> {}", source.display(), rel.display()),
            // Skippable per-item problems; keep going
            Err(e @ (Error::OutOfTree(_) | Error::NotFound(_) | Error::IsADirectory(_))) => {
                warn!("Skipping {}: {}", source.display(), e);
            }
            // Crypto failures and the rest abort the remaining paths
            Err(e) => return Err(e),
        }
    }

    Ok(())
}

fn cmd_unprotect(config_path: &Path, paths: &[PathBuf]) -> Result<()> {
    let config = Config::load(config_path)?;
    config.validate()?;

    let manager = lifecycle_manager(&config)?;

    for path in paths {
        let link = absolutize(&expand_tilde(path));
        manager.unprotect(&link)?;
        info!("Unprotected {}", link.display());
    }

    Ok(())
}

fn cmd_setup(config_path: &Path) -> Result<()> {
    let mut config = if config_path.exists() {
        Config::load(config_path)?
    } else {
        info!("Initializing new sealfs configuration");
        Config::default()
    };

    if config.recipient.trim().is_empty() {
        print!("Please enter recipient identity (e.g. a GPG key id): ");
        use std::io::Write;
        std::io::stdout().flush()?;

        let mut recipient = String::new();
        std::io::stdin().read_line(&mut recipient)?;
        config.recipient = recipient.trim().to_string();

        if config.recipient.is_empty() {
            return Err(Error::Config("Recipient identity is required".to_string()));
        }
    }

    config.save(config_path)?;
    config.ensure_directories()?;

    info!("Configuration saved to {:?}", config_path);
    info!("Store directory: {:?}", config.store_dir);
    info!("Mount directory: {:?}", config.mount_dir);

    Ok(())
}

fn lifecycle_manager(config: &Config) -> Result<LifecycleManager> {
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("Cannot determine home directory".to_string()))?;

    Ok(LifecycleManager::new(
        home,
        config.store_dir.clone(),
        config.mount_dir.clone(),
        config.recipient.clone(),
        Arc::new(GpgBackend::new()),
    ))
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if path.starts_with("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(path.strip_prefix("~").unwrap());
        }
    }
    path.to_path_buf()
}

/// Make a path absolute against the current directory
fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    }
}
