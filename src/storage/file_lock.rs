//! Advisory lock on a sidecar file, for exclusion between processes.

use crate::core::{Result, StoreError};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Sidecar lock path for a data file: `cfg.json` -> `cfg.json.lock`.
pub fn lock_path_for(data_path: &Path) -> PathBuf {
    let mut name = data_path.as_os_str().to_os_string();
    name.push(".lock");
    PathBuf::from(name)
}

#[derive(Debug)]
pub struct AdvisoryLock {
    file: File,
    path: PathBuf,
}

impl AdvisoryLock {
    /// Opens (creating if needed) the sidecar file and locks it exclusively.
    pub fn acquire(path: &Path, timeout: Option<Duration>) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match timeout {
            None => file.lock_exclusive().map_err(|e| {
                StoreError::LockAcquisition(format!(
                    "Failed to lock '{}': {}",
                    path.display(),
                    e
                ))
            })?,
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                let contended = fs2::lock_contended_error().kind();
                loop {
                    match file.try_lock_exclusive() {
                        Ok(()) => break,
                        Err(e) if e.kind() == contended => {
                            if Instant::now() >= deadline {
                                return Err(StoreError::LockTimeout {
                                    path: path.to_path_buf(),
                                    timeout,
                                });
                            }
                            thread::sleep(POLL_INTERVAL);
                        }
                        Err(e) => {
                            return Err(StoreError::LockAcquisition(format!(
                                "Failed to lock '{}': {}",
                                path.display(),
                                e
                            )));
                        }
                    }
                }
            }
        }

        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(self) -> Result<()> {
        FileExt::unlock(&self.file).map_err(|e| {
            StoreError::LockRelease(format!(
                "Failed to unlock '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_path_appends_suffix() {
        assert_eq!(
            lock_path_for(Path::new("/tmp/cfg.json")),
            PathBuf::from("/tmp/cfg.json.lock")
        );
    }

    #[test]
    fn test_second_handle_times_out_until_release() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json.lock");

        let first = AdvisoryLock::acquire(&path, None).unwrap();
        let err = AdvisoryLock::acquire(&path, Some(Duration::from_millis(30))).unwrap_err();
        assert!(matches!(err, StoreError::LockTimeout { .. }));

        first.release().unwrap();
        let second = AdvisoryLock::acquire(&path, Some(Duration::from_millis(200))).unwrap();
        assert_eq!(second.path(), path.as_path());
    }
}
