// ============================================================================
// Transaction State Management
// ============================================================================
//
// State Pattern for the lifecycle of a session transaction:
//
//   Active ──commit──> Committed
//     │
//     └──rollback──> RolledBack
//
// ============================================================================

use crate::core::{MappingError, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Global transaction ID counter
static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Generate a new unique transaction ID
    pub fn new() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransactionState::Committed | TransactionState::RolledBack
        )
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::RolledBack => write!(f, "ROLLED_BACK"),
        }
    }
}

/// A session transaction
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    state: TransactionState,
    /// Start time for diagnostics
    start_time: Instant,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            id: TransactionId::new(),
            state: TransactionState::Active,
            start_time: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    pub fn elapsed(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    pub fn commit(&mut self) -> Result<()> {
        self.finish(TransactionState::Committed)
    }

    pub fn rollback(&mut self) -> Result<()> {
        self.finish(TransactionState::RolledBack)
    }

    fn finish(&mut self, target: TransactionState) -> Result<()> {
        if !self.state.is_active() {
            return Err(MappingError::Transaction(format!(
                "Cannot move {} from {} to {}",
                self.id, self.state, target
            )));
        }
        self.state = target;
        Ok(())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}
