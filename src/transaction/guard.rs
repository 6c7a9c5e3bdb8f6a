use super::error::TransactionError;
use super::state::TransactionState;
use crate::core::{Mapping, Result};
use crate::storage::PersistentStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};
use tracing::{error, warn};

/// An open transaction on a [`PersistentStore`].
///
/// Derefs to the store's mapping. Finish with [`commit`](Self::commit) or
/// [`rollback`](Self::rollback); a guard dropped while still active (an early
/// return, a `?`, a panic) rolls back.
pub struct Transaction<'a> {
    store: &'a mut PersistentStore,
    state: TransactionState,
}

impl<'a> Transaction<'a> {
    pub(crate) fn open(store: &'a mut PersistentStore) -> Result<Self> {
        store.begin()?;
        Ok(Self {
            store,
            state: TransactionState::Active,
        })
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn store(&self) -> &PersistentStore {
        self.store
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Dump the changes and release the lock.
    pub fn commit(mut self) -> Result<()> {
        self.finish(false)
    }

    /// Restore the state captured when the transaction began, dump it and
    /// release the lock.
    pub fn rollback(mut self) -> Result<()> {
        self.finish(true)
    }

    /// Puts the snapshot back without ending the transaction.
    pub fn restore(&mut self) -> Result<()> {
        self.store.restore()
    }

    pub fn create_backup(&self) -> Result<PathBuf> {
        self.store.create_backup()
    }

    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.store.get_as(key)
    }

    pub fn set<T: Serialize>(&mut self, key: impl Into<String>, value: T) -> Result<Option<Value>> {
        self.store.set(key, value)
    }

    fn finish(&mut self, failed: bool) -> Result<()> {
        self.state = if failed {
            TransactionState::Aborted
        } else {
            TransactionState::Committed
        };
        self.store.end(failed)
    }
}

impl Deref for Transaction<'_> {
    type Target = Mapping;

    fn deref(&self) -> &Mapping {
        self.store.data()
    }
}

impl DerefMut for Transaction<'_> {
    fn deref_mut(&mut self) -> &mut Mapping {
        self.store.data_mut()
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.state.is_active() {
            return;
        }

        warn!(
            path = %self.store.path().display(),
            panicking = std::thread::panicking(),
            "transaction dropped while active, rolling back"
        );
        if let Err(e) = self.finish(true) {
            error!(path = %self.store.path().display(), error = %e, "rollback on drop failed");
        }
    }
}

impl PersistentStore {
    /// Opens a transaction and returns its guard.
    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        Transaction::open(self)
    }

    /// Runs `work` inside a transaction.
    ///
    /// `Ok` commits. `Err` rolls back and comes back as
    /// [`TransactionError::Aborted`]; errors from the store itself come back as
    /// [`TransactionError::Store`].
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use persistmap::{PersistentStore, StoreConfig, TransactionError};
    ///
    /// let mut store = PersistentStore::with_config("counters", StoreConfig::new().using_locks(true));
    /// let result: Result<u64, TransactionError<String>> = store.with_transaction(|tx| {
    ///     let hits = tx.get_as::<u64>("hits").map_err(|e| e.to_string())?.unwrap_or(0) + 1;
    ///     tx.set("hits", hits).map_err(|e| e.to_string())?;
    ///     Ok(hits)
    /// });
    /// ```
    pub fn with_transaction<T, E, F>(&mut self, work: F) -> std::result::Result<T, TransactionError<E>>
    where
        F: FnOnce(&mut Transaction<'_>) -> std::result::Result<T, E>,
    {
        let mut tx = self.transaction()?;
        match work(&mut tx) {
            Ok(value) => {
                tx.commit()?;
                Ok(value)
            }
            Err(cause) => match tx.rollback() {
                Ok(()) => Err(TransactionError::Aborted(cause)),
                Err(error) => Err(TransactionError::RollbackFailed { cause, error }),
            },
        }
    }
}
