//! Durable, caller-triggered backups of a store.
//!
//! Independent of the transaction snapshot: a backup is a timestamped file in
//! the backup directory, named `<resolved filename>-<YYYYmmdd-HHMMSS>`.

use super::config::DEFAULT_BACKUP_DIR;
use super::store::{PersistentStore, write_atomic};
use crate::core::Result;
use chrono::{Local, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

pub const BACKUP_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";
const TIMESTAMP_LEN: usize = 15;

/// Splits a backup file name into its timestamp and collision counter.
fn parse_backup_name(file_name: &str, prefix: &str) -> Option<(NaiveDateTime, u32)> {
    let rest = file_name.strip_prefix(prefix)?;
    let stamp = rest.get(..TIMESTAMP_LEN)?;
    let at = NaiveDateTime::parse_from_str(stamp, BACKUP_TIMESTAMP_FORMAT).ok()?;
    let counter = match &rest[TIMESTAMP_LEN..] {
        "" => 0,
        suffix => suffix.strip_prefix('-')?.parse().ok()?,
    };
    Some((at, counter))
}

impl PersistentStore {
    pub fn backup_dir(&self) -> PathBuf {
        match &self.config().backup_dir {
            Some(dir) => dir.clone(),
            None => match self.path().parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.join(DEFAULT_BACKUP_DIR),
                _ => PathBuf::from(DEFAULT_BACKUP_DIR),
            },
        }
    }

    fn backup_prefix(&self) -> String {
        let file_name = self
            .path()
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        format!("{}-", file_name)
    }

    /// Writes the current in-memory mapping to a new timestamped backup file.
    ///
    /// Two backups in the same second get `-1`, `-2`, ... suffixes rather than
    /// overwriting each other. Returns the path written.
    pub fn create_backup(&self) -> Result<PathBuf> {
        let dir = self.backup_dir();
        fs::create_dir_all(&dir)?;

        let base = format!(
            "{}{}",
            self.backup_prefix(),
            Local::now().format(BACKUP_TIMESTAMP_FORMAT)
        );
        let mut target = dir.join(&base);
        let mut counter = 1;
        while target.exists() {
            target = dir.join(format!("{}-{}", base, counter));
            counter += 1;
        }

        let bytes = self.format().encode(self.data(), self.options())?;
        write_atomic(&target, &bytes, self.config().durability)?;
        info!(path = %self.path().display(), backup = %target.display(), "created backup");
        Ok(target)
    }

    /// This store's backups, oldest first.
    pub fn backups(&self) -> Result<Vec<PathBuf>> {
        let dir = self.backup_dir();
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let prefix = self.backup_prefix();
        let mut found = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(key) = name.to_str().and_then(|n| parse_backup_name(n, &prefix)) {
                found.push((key, entry.path()));
            }
        }

        found.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(found.into_iter().map(|(_, path)| path).collect())
    }

    /// Replaces the mapping with a backup's contents and dumps it to the
    /// primary file.
    pub fn restore_backup(&mut self, backup: impl AsRef<Path>) -> Result<()> {
        let backup = backup.as_ref();
        let bytes = fs::read(backup)?;
        let restored = self.format().decode(&bytes)?.unwrap_or_default();
        *self.data_mut() = restored;
        self.dump()?;
        info!(path = %self.path().display(), backup = %backup.display(), "restored from backup");
        Ok(())
    }
}
