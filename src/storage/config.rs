use crate::core::DurabilityMode;
use crate::format::FormatOptions;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory name used for backups when none is configured
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Persistent store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Serialize transactions on the same file through the lock registry
    pub using_locks: bool,

    /// Also take an advisory lock on `<file>.lock` so other processes are
    /// excluded. Only meaningful with `using_locks`.
    pub cross_process: bool,

    /// Give up waiting for the lock after this long. `None` waits forever.
    pub lock_timeout: Option<Duration>,

    /// Whether dumps are fsynced before replacing the data file
    pub durability: DurabilityMode,

    /// Where `create_backup` writes. `None` means `backups/` next to the data file.
    pub backup_dir: Option<PathBuf>,

    /// Dump options. `None` uses the format's defaults.
    pub options: Option<FormatOptions>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            using_locks: false,
            cross_process: true,
            lock_timeout: None,
            durability: DurabilityMode::default(),
            backup_dir: None,
            options: None,
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable locking
    pub fn using_locks(mut self, enabled: bool) -> Self {
        self.using_locks = enabled;
        self
    }

    /// Restrict locking to threads of this process
    pub fn process_local(mut self) -> Self {
        self.cross_process = false;
        self
    }

    /// Set lock acquisition timeout
    pub fn lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = Some(timeout);
        self
    }

    /// Set durability mode
    pub fn durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode;
        self
    }

    /// Set backup directory
    pub fn backup_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.backup_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    /// Override the format's dump options
    pub fn options(mut self, options: FormatOptions) -> Self {
        self.options = Some(options);
        self
    }
}
