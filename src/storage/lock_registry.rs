// ============================================================================
// Lock Registry
// ============================================================================
//
// One mutual-exclusion primitive per resolved filename, shared by every store
// in the process that points at that file. Entries are created on first use
// and live for the lifetime of the registry.
//
// The primitive is a binary semaphore rather than a mutex guard: a store takes
// it in `begin` and gives it back in `end`, two separate calls with no borrow
// spanning them.
//
// ============================================================================

use crate::core::{Result, StoreError};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::trace;

lazy_static! {
    static ref GLOBAL_REGISTRY: Arc<LockRegistry> = Arc::new(LockRegistry::new());
}

#[derive(Debug, Default)]
pub struct FileLock {
    held: Mutex<bool>,
    available: Condvar,
}

impl FileLock {
    /// Blocks until the lock is free, or until `timeout` elapses.
    ///
    /// Returns `false` on timeout.
    fn acquire(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut held = self.held.lock()?;

        match timeout {
            None => {
                while *held {
                    held = self.available.wait(held)?;
                }
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while *held {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    let (guard, _) = self.available.wait_timeout(held, deadline - now)?;
                    held = guard;
                }
            }
        }

        *held = true;
        Ok(true)
    }

    /// Returns `false` if the lock was not held.
    fn release(&self) -> Result<bool> {
        let mut held = self.held.lock()?;
        if !*held {
            return Ok(false);
        }
        *held = false;
        drop(held);
        self.available.notify_one();
        Ok(true)
    }

    fn is_held(&self) -> Result<bool> {
        Ok(*self.held.lock()?)
    }
}

#[derive(Debug, Default)]
pub struct LockRegistry {
    locks: Mutex<HashMap<PathBuf, Arc<FileLock>>>,
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide registry used by stores that were not given one.
    pub fn global() -> Arc<LockRegistry> {
        Arc::clone(&GLOBAL_REGISTRY)
    }

    fn entry(&self, path: &Path) -> Result<Arc<FileLock>> {
        let mut locks = self.locks.lock()?;
        let lock = locks
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                trace!(path = %path.display(), "creating lock registry entry");
                Arc::new(FileLock::default())
            });
        Ok(Arc::clone(lock))
    }

    /// Takes the lock for `path`, creating it if needed.
    ///
    /// The registry mutex is only held while looking up the entry, never while
    /// waiting for the file lock itself.
    pub fn acquire(&self, path: &Path, timeout: Option<Duration>) -> Result<()> {
        let lock = self.entry(path)?;
        if lock.acquire(timeout)? {
            Ok(())
        } else {
            Err(StoreError::LockTimeout {
                path: path.to_path_buf(),
                // acquire only returns false when a timeout was given
                timeout: timeout.unwrap_or_default(),
            })
        }
    }

    pub fn release(&self, path: &Path) -> Result<()> {
        let lock = self
            .locks
            .lock()?
            .get(path)
            .cloned()
            .ok_or_else(|| StoreError::LockNotHeld(path.to_path_buf()))?;

        if lock.release()? {
            Ok(())
        } else {
            Err(StoreError::LockNotHeld(path.to_path_buf()))
        }
    }

    pub fn is_locked(&self, path: &Path) -> Result<bool> {
        match self.locks.lock()?.get(path) {
            Some(lock) => lock.is_held(),
            None => Ok(false),
        }
    }

    /// Number of files that have ever been locked through this registry.
    pub fn len(&self) -> Result<usize> {
        Ok(self.locks.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}
