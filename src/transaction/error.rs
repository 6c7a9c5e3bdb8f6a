use crate::core::StoreError;
use thiserror::Error;

/// Outcome of [`PersistentStore::with_transaction`](crate::PersistentStore::with_transaction)
/// when something went wrong.
///
/// Keeps a failure of the caller's unit of work apart from a failure of the
/// store itself.
#[derive(Debug, Error)]
pub enum TransactionError<E> {
    /// The unit of work failed; the pre-transaction state was restored.
    #[error("transaction aborted: {0}")]
    Aborted(E),

    /// Locking, loading or dumping failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The unit of work failed and putting the old state back failed too.
    #[error("transaction aborted ({cause}) and rollback failed: {error}")]
    RollbackFailed {
        cause: E,
        #[source]
        error: StoreError,
    },
}

impl<E> TransactionError<E> {
    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted(_) | Self::RollbackFailed { .. })
    }

    /// The caller's error, if the unit of work was what failed.
    pub fn into_cause(self) -> Option<E> {
        match self {
            Self::Aborted(cause) | Self::RollbackFailed { cause, .. } => Some(cause),
            Self::Store(_) => None,
        }
    }

    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::Store(error) | Self::RollbackFailed { error, .. } => Some(error),
            Self::Aborted(_) => None,
        }
    }
}
