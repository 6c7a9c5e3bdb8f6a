// ============================================================================
// Transaction Module
// ============================================================================
//
// Scoped transactions over a PersistentStore:
//
//   begin:  lock -> load -> snapshot
//   end:    dump -> (on failure: restore snapshot -> dump) -> unlock
//
// The lock is released on every exit path. `Transaction` is the RAII form,
// `with_transaction` the closure form.
//
// ============================================================================

pub mod error;
pub mod guard;
pub mod state;

pub use error::TransactionError;
pub use guard::Transaction;
pub use state::TransactionState;
