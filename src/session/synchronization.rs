use super::registry::SessionRegistry;
use super::session::{DatastoreId, Session};
use crate::core::Result;
use log::debug;
use std::fmt;
use std::sync::Arc;

/// Outcome of a completed transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletionStatus {
    Committed,
    RolledBack,
    Unknown,
}

impl fmt::Display for CompletionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Committed => write!(f, "COMMITTED"),
            Self::RolledBack => write!(f, "ROLLED_BACK"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Callback bound to the lifecycle of the current transaction.
///
/// Callbacks get the registry they were registered with so they can unbind
/// and close sessions.
pub trait TransactionSynchronization {
    fn before_commit(&mut self, _registry: &mut SessionRegistry) -> Result<()> {
        Ok(())
    }

    fn before_completion(&mut self, _registry: &mut SessionRegistry) {}

    fn after_completion(&mut self, _registry: &mut SessionRegistry, _status: CompletionStatus) {}
}

/// Ties a session to the transaction it takes part in.
#[derive(Debug)]
pub struct SessionSynchronization {
    session: Arc<Session>,
    datastore: DatastoreId,
    /// The session was opened for this transaction
    new_session: bool,
}

impl SessionSynchronization {
    pub fn new(session: Arc<Session>, datastore: DatastoreId, new_session: bool) -> Self {
        Self {
            session,
            datastore,
            new_session,
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    pub fn is_new_session(&self) -> bool {
        self.new_session
    }
}

impl TransactionSynchronization for SessionSynchronization {
    fn before_commit(&mut self, _registry: &mut SessionRegistry) -> Result<()> {
        if self.session.is_connected() {
            debug!("Flushing {} before commit", self.session.id());
            self.session.flush()?;
        }
        Ok(())
    }

    fn after_completion(&mut self, registry: &mut SessionRegistry, status: CompletionStatus) {
        if status == CompletionStatus::RolledBack {
            self.session.clear();
        }

        registry.mark_unsynchronized(self.datastore);
        self.session.set_synchronized_with_transaction(false);

        if self.new_session {
            debug!(
                "Releasing {} opened for transaction ({})",
                self.session.id(),
                status
            );
            registry.unbind_session(&self.session);
        }
    }
}
