//! File-backed mapping and its transaction protocol.

use super::config::StoreConfig;
use super::file_lock::{AdvisoryLock, lock_path_for};
use super::lock_registry::LockRegistry;
use crate::core::{DurabilityMode, Mapping, Result, StoreError};
use crate::format::{Format, FormatOptions, JsonFormat};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ffi::OsString;
use std::fs;
use std::io::{self, Write};
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// A string-keyed mapping mirrored to `<name>.<format>` on disk.
///
/// The store derefs to its [`Mapping`], so reads and writes between
/// [`begin`](Self::begin) and [`end`](Self::end) are plain map operations.
/// Most callers want [`transaction`](Self::transaction) or
/// [`with_transaction`](Self::with_transaction) instead of calling `begin`
/// and `end` by hand.
///
/// # Examples
///
/// ```no_run
/// use persistmap::PersistentStore;
/// use serde_json::json;
///
/// # fn main() -> persistmap::Result<()> {
/// let mut store = PersistentStore::new("cfg");
/// {
///     let mut tx = store.transaction()?;
///     tx.insert("a".into(), json!(1));
///     tx.insert("b".into(), json!({"x": 2}));
///     tx.commit()?;
/// }
/// assert_eq!(store.path().to_str(), Some("cfg.json"));
/// # Ok(())
/// # }
/// ```
pub struct PersistentStore {
    name: PathBuf,
    path: PathBuf,
    lock_key: PathBuf,
    format: Arc<dyn Format>,
    options: FormatOptions,
    config: StoreConfig,
    registry: Arc<LockRegistry>,
    data: Mapping,
    snapshot: Option<Mapping>,
    in_transaction: bool,
    registry_held: bool,
    advisory: Option<AdvisoryLock>,
}

impl PersistentStore {
    /// JSON store with default configuration
    pub fn new(name: impl AsRef<Path>) -> Self {
        Self::with_config(name, StoreConfig::default())
    }

    /// JSON store with custom configuration
    pub fn with_config(name: impl AsRef<Path>, config: StoreConfig) -> Self {
        Self::with_format(name, Arc::new(JsonFormat), config)
    }

    pub fn with_format(
        name: impl AsRef<Path>,
        format: Arc<dyn Format>,
        config: StoreConfig,
    ) -> Self {
        let name = name.as_ref().to_path_buf();
        let path = resolve_filename(&name, format.name());
        let lock_key = std::path::absolute(&path).unwrap_or_else(|_| path.clone());
        let options = config
            .options
            .clone()
            .unwrap_or_else(|| format.default_options());

        Self {
            name,
            path,
            lock_key,
            format,
            options,
            config,
            registry: LockRegistry::global(),
            data: Mapping::new(),
            snapshot: None,
            in_transaction: false,
            registry_held: false,
            advisory: None,
        }
    }

    /// Use `registry` instead of the process-wide one.
    ///
    /// Stores only exclude each other when they share a registry.
    pub fn with_registry(mut self, registry: Arc<LockRegistry>) -> Self {
        self.registry = registry;
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    /// Logical filename, without extension
    pub fn name(&self) -> &Path {
        &self.name
    }

    /// Resolved filename: `<name>.<format name>`
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn format_name(&self) -> &str {
        self.format.name()
    }

    pub fn format(&self) -> &Arc<dyn Format> {
        &self.format
    }

    pub fn options(&self) -> &FormatOptions {
        &self.options
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<LockRegistry> {
        &self.registry
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn has_snapshot(&self) -> bool {
        self.snapshot.is_some()
    }

    pub fn data(&self) -> &Mapping {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Mapping {
        &mut self.data
    }

    pub fn into_inner(self) -> Mapping {
        // Drop impl prevents moving fields out directly
        let mut this = self;
        std::mem::take(&mut this.data)
    }

    /// Deserializes the value under `key`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.data
            .get(key)
            .map(|value| T::deserialize(value).map_err(StoreError::from))
            .transpose()
    }

    /// Serializes `value` and stores it under `key`, returning the previous value.
    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<Option<Value>> {
        let value = serde_json::to_value(value)?;
        Ok(self.data.insert(key.into(), value))
    }

    // ------------------------------------------------------------------------
    // Load / Dump
    // ------------------------------------------------------------------------

    /// Replaces the in-memory mapping with the file's contents.
    ///
    /// A missing file is not an error: the mapping becomes empty.
    pub fn load(&mut self) -> Result<()> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no data file yet, starting empty");
                self.data.clear();
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        self.data = self.format.decode(&bytes)?.unwrap_or_default();
        debug!(path = %self.path.display(), keys = self.data.len(), "loaded store");
        Ok(())
    }

    /// Rewrites the whole file from the in-memory mapping.
    pub fn dump(&self) -> Result<()> {
        let bytes = self.format.encode(&self.data, &self.options)?;
        write_atomic(&self.path, &bytes, self.config.durability)?;
        debug!(path = %self.path.display(), bytes = bytes.len(), "dumped store");
        Ok(())
    }

    /// Loads the file under the store lock, writing nothing back.
    ///
    /// For read-only callers that still need to see a consistent file. Fails
    /// with [`StoreError::NestedTransaction`] inside a transaction, where the
    /// lock is already held and the mapping is authoritative.
    pub fn load_locked(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(StoreError::NestedTransaction(self.path.clone()));
        }

        self.lock()?;
        let loaded = self.load();
        let unlocked = self.unlock();
        loaded.and(unlocked)
    }

    // ------------------------------------------------------------------------
    // Transaction protocol
    // ------------------------------------------------------------------------

    /// Opens a transaction: lock, load, snapshot.
    ///
    /// Fails with [`StoreError::NestedTransaction`] if one is already open on
    /// this store. If loading fails the lock is released before returning.
    pub fn begin(&mut self) -> Result<&mut Self> {
        if self.in_transaction {
            return Err(StoreError::NestedTransaction(self.path.clone()));
        }

        self.lock()?;
        self.in_transaction = true;

        if let Err(e) = self.load() {
            self.in_transaction = false;
            if let Err(unlock_err) = self.unlock() {
                warn!(path = %self.path.display(), error = %unlock_err, "failed to release lock after load error");
            }
            return Err(e);
        }

        self.snapshot = Some(self.data.clone());
        Ok(self)
    }

    /// Closes the open transaction.
    ///
    /// The mapping is always dumped. With `failed`, the snapshot taken by
    /// [`begin`](Self::begin) is then restored and dumped again. The lock is
    /// released and the transaction closed on every path; the first error
    /// encountered is returned.
    pub fn end(&mut self, failed: bool) -> Result<()> {
        if !self.in_transaction {
            return Err(StoreError::NoTransaction(self.path.clone()));
        }

        let dumped = self.dump();
        let restored = if failed {
            info!(path = %self.path.display(), "rolling back transaction");
            self.restore()
        } else {
            Ok(())
        };

        self.snapshot = None;
        let unlocked = self.unlock();
        self.in_transaction = false;

        dumped.and(restored).and(unlocked)
    }

    /// Puts the transaction snapshot back and dumps it.
    ///
    /// Outside a transaction there is no snapshot and this fails with
    /// [`StoreError::NoSnapshot`].
    pub fn restore(&mut self) -> Result<()> {
        let snapshot = self.snapshot.as_ref().ok_or(StoreError::NoSnapshot)?;
        self.data = snapshot.clone();
        self.dump()
    }

    fn lock(&mut self) -> Result<()> {
        if !self.config.using_locks {
            return Ok(());
        }

        let started = Instant::now();
        self.registry.acquire(&self.lock_key, self.config.lock_timeout)?;
        self.registry_held = true;

        if self.config.cross_process {
            let remaining = self
                .config
                .lock_timeout
                .map(|timeout| timeout.saturating_sub(started.elapsed()));
            match AdvisoryLock::acquire(&lock_path_for(&self.lock_key), remaining) {
                Ok(lock) => self.advisory = Some(lock),
                Err(e) => {
                    self.registry_held = false;
                    if let Err(release_err) = self.registry.release(&self.lock_key) {
                        warn!(path = %self.path.display(), error = %release_err, "failed to release lock after advisory lock error");
                    }
                    return Err(e);
                }
            }
        }

        debug!(path = %self.path.display(), "acquired lock");
        Ok(())
    }

    fn unlock(&mut self) -> Result<()> {
        let advisory = self.advisory.take().map_or(Ok(()), AdvisoryLock::release);
        let registry = if std::mem::take(&mut self.registry_held) {
            self.registry.release(&self.lock_key)
        } else {
            Ok(())
        };
        advisory.and(registry)
    }
}

impl Deref for PersistentStore {
    type Target = Mapping;

    fn deref(&self) -> &Mapping {
        &self.data
    }
}

impl DerefMut for PersistentStore {
    fn deref_mut(&mut self) -> &mut Mapping {
        &mut self.data
    }
}

impl std::fmt::Debug for PersistentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PersistentStore")
            .field("path", &self.path)
            .field("format", &self.format.name())
            .field("keys", &self.data.len())
            .field("in_transaction", &self.in_transaction)
            .finish()
    }
}

impl Drop for PersistentStore {
    fn drop(&mut self) {
        if self.registry_held || self.advisory.is_some() {
            warn!(path = %self.path.display(), "store dropped with an open transaction, releasing lock");
            if let Err(e) = self.unlock() {
                warn!(path = %self.path.display(), error = %e, "failed to release lock on drop");
            }
        }
    }
}

/// `<name>.<extension>`, appended to the whole name so `v1.2/cfg` keeps its dots.
pub fn resolve_filename(name: &Path, extension: &str) -> PathBuf {
    let mut resolved = OsString::from(name.as_os_str());
    resolved.push(".");
    resolved.push(extension);
    PathBuf::from(resolved)
}

#[cfg(unix)]
const NEW_FILE_MODE: u32 = 0o666;

/// Writes `bytes` to a temporary file beside `path`, then renames it over `path`.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8], durability: DurabilityMode) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut builder = tempfile::Builder::new();
    // Same mode File::create would give a new file, before the umask
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        builder.permissions(fs::Permissions::from_mode(NEW_FILE_MODE));
    }
    let mut tmp = builder.tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.flush()?;
    if let Ok(meta) = fs::metadata(path) {
        tmp.as_file().set_permissions(meta.permissions())?;
    }
    if durability == DurabilityMode::Sync {
        tmp.as_file().sync_all()?;
    }
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}
