// ============================================================================
// persistmap Library
// ============================================================================
//
// An in-memory mapping mirrored to a single file, with scoped transactions
// that roll back to the pre-transaction state on failure and optional
// locking between threads and processes.
//
// ============================================================================

pub mod core;
pub mod format;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use core::{DurabilityMode, Mapping, Result, StoreError};
pub use format::{Format, FormatOptions, JsonFormat, MessagePackFormat, format_by_name};
pub use storage::{LockRegistry, PersistentStore, StoreConfig};
pub use transaction::{Transaction, TransactionError, TransactionState};
