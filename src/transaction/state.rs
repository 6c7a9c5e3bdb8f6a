// ============================================================================
// Transaction State
// ============================================================================
//
// A scoped transaction moves through: Active -> Committed | Aborted.
// A guard that is dropped while still Active rolls back.
//
// ============================================================================

/// Transaction state following the State Pattern
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──rollback / drop──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is open and the mapping may be mutated
    Active,

    /// Changes were dumped and the lock released
    Committed,

    /// Snapshot was restored and dumped, lock released
    Aborted,
}

impl TransactionState {
    /// Check if the transaction is still open
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        !self.is_active()
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}
