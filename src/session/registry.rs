// ============================================================================
// Session Registry
// ============================================================================
//
// Execution-context object owning the session state of one thread:
//
//   - a SessionHolder per datastore (LIFO stack, top = current session)
//   - the deferred-close window: sessions whose close waits for an explicit
//     process_deferred_close() per datastore
//   - the transaction synchronizations registered while a transaction runs
//
// Per datastore the state moves NONE -> HELD -> (nested binds) -> NONE. A
// holder is dropped exactly when its stack becomes empty.
//
// ============================================================================

use super::holder::SessionHolder;
use super::session::{Datastore, DatastoreId, Session};
use super::synchronization::{CompletionStatus, SessionSynchronization, TransactionSynchronization};
use crate::core::{MappingError, Result};
use log::{debug, warn};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

thread_local! {
    static THREAD_REGISTRY: RefCell<SessionRegistry> = RefCell::new(SessionRegistry::new());
}

/// Run `f` with the registry bound to the calling thread.
///
/// Nested calls from inside `f` fail with a session-state error; pass the
/// registry down instead.
pub fn with_thread_registry<T, F>(f: F) -> Result<T>
where
    F: FnOnce(&mut SessionRegistry) -> Result<T>,
{
    THREAD_REGISTRY.with(|registry| {
        let mut registry = registry.try_borrow_mut().map_err(|_| {
            MappingError::SessionState("thread session registry is already in use".to_string())
        })?;
        f(&mut registry)
    })
}

#[derive(Default)]
pub struct SessionRegistry {
    holders: HashMap<DatastoreId, SessionHolder>,
    deferred_close: Option<HashMap<DatastoreId, Vec<Arc<Session>>>>,
    synchronizations: Option<Vec<Box<dyn TransactionSynchronization>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Session lookup and creation
    // ========================================================================

    /// Bound session for `datastore`, or a new one.
    ///
    /// A bound session that predates the active transaction synchronization
    /// gets registered with it once. New sessions are bound only while
    /// synchronization is active; without it they are returned unbound and
    /// must be given back through [`SessionRegistry::release_session`].
    pub fn get_or_create(&mut self, datastore: &dyn Datastore, allow_create: bool) -> Result<Arc<Session>> {
        let id = datastore.id();
        let synchronizing = self.is_synchronization_active();

        let mut existing = None;
        let mut register_existing = false;
        if let Some(holder) = self.holders.get_mut(&id) {
            match holder.validated_session() {
                Some(session) => {
                    if synchronizing && !holder.is_synchronized_with_transaction() {
                        holder.set_synchronized_with_transaction(true);
                        register_existing = true;
                    }
                    existing = Some(session);
                }
                None => {
                    // Only closed sessions were left
                    self.holders.remove(&id);
                }
            }
        }

        if let Some(session) = existing {
            if register_existing {
                debug!("Registering transaction synchronization for existing {}", session.id());
                self.register_synchronization(Box::new(SessionSynchronization::new(
                    Arc::clone(&session),
                    id,
                    false,
                )))?;
            }
            return Ok(session);
        }

        if !allow_create && !synchronizing {
            return Err(MappingError::SessionState(format!(
                "No session bound to thread for {}, and configuration does not allow creation of non-transactional one here",
                id
            )));
        }

        debug!("Opening session for datastore '{}'", datastore.name());
        let session = datastore.connect().map_err(|err| match err {
            MappingError::DataAccessResourceFailure(_) => err,
            other => MappingError::DataAccessResourceFailure(other.to_string()),
        })?;

        if synchronizing {
            debug!("Registering transaction synchronization for new {}", session.id());
            self.bind_session(Arc::clone(&session), id);
            if let Some(holder) = self.holders.get_mut(&id) {
                holder.set_synchronized_with_transaction(true);
            }
            self.register_synchronization(Box::new(SessionSynchronization::new(
                Arc::clone(&session),
                id,
                true,
            )))?;
        }

        Ok(session)
    }

    pub fn current_session(&self, datastore: DatastoreId) -> Option<Arc<Session>> {
        self.holders
            .get(&datastore)
            .and_then(|holder| holder.session().cloned())
    }

    pub fn has_current_session(&self, datastore: DatastoreId) -> bool {
        self.current_session(datastore).is_some()
    }

    pub fn holder(&self, datastore: DatastoreId) -> Option<&SessionHolder> {
        self.holders.get(&datastore)
    }

    /// True if `session` is bound in the holder of `datastore`.
    pub fn is_session_transactional(&self, session: &Session, datastore: DatastoreId) -> bool {
        self.holders
            .get(&datastore)
            .is_some_and(|holder| holder.contains_session(session))
    }

    // ========================================================================
    // Binding
    // ========================================================================

    /// Make `session` the current session of `datastore`.
    pub fn bind_session(&mut self, session: Arc<Session>, datastore: DatastoreId) {
        match self.holders.get_mut(&datastore) {
            Some(holder) => holder.add_session(session),
            None => {
                self.holders.insert(datastore, SessionHolder::new(session));
            }
        }
    }

    /// Bind `session` in a fresh holder tagged with `creator`. An existing
    /// holder for `datastore` is replaced.
    pub fn bind_session_with_creator(&mut self, session: Arc<Session>, datastore: DatastoreId, creator: &str) {
        if let Some(previous) = self
            .holders
            .insert(datastore, SessionHolder::with_creator(session, creator))
        {
            warn!(
                "Replaced holder of {} with {} session(s) still bound",
                datastore,
                previous.len()
            );
        }
    }

    /// Remove `session` from its holder, then close it or defer its close.
    ///
    /// Unknown sessions are logged and ignored.
    pub fn unbind_session(&mut self, session: &Arc<Session>) {
        let datastore = session.datastore_id();
        let Some(holder) = self.holders.get_mut(&datastore) else {
            warn!("Cannot unbind {}, there's no SessionHolder registered", session.id());
            return;
        };

        if !holder.contains_session(session) {
            warn!("Cannot unbind {}, it's not registered in a SessionHolder", session.id());
            return;
        }

        if holder.len() > 1 {
            holder.remove_session(session);
        } else {
            self.holders.remove(&datastore);
        }

        self.close_session_or_register_deferred_close(session, datastore);
    }

    pub(crate) fn mark_unsynchronized(&mut self, datastore: DatastoreId) {
        if let Some(holder) = self.holders.get_mut(&datastore) {
            holder.set_synchronized_with_transaction(false);
        }
    }

    // ========================================================================
    // Release and close
    // ========================================================================

    /// Give back a session obtained from [`SessionRegistry::get_or_create`].
    /// Sessions bound to this registry stay open.
    pub fn release_session(&mut self, session: &Arc<Session>, datastore: DatastoreId) {
        if self.is_session_transactional(session, datastore) {
            return;
        }
        self.close_session_or_register_deferred_close(session, datastore);
    }

    pub fn close_session(&self, session: &Session) {
        debug!("Closing {}", session.id());
        session.disconnect();
    }

    pub fn close_session_or_register_deferred_close(&mut self, session: &Arc<Session>, datastore: DatastoreId) {
        if let Some(pending) = self
            .deferred_close
            .as_mut()
            .and_then(|windows| windows.get_mut(&datastore))
        {
            debug!("Registering {} for deferred close", session.id());
            if !pending.iter().any(|s| s.id() == session.id()) {
                pending.push(Arc::clone(session));
            }
            return;
        }
        self.close_session(session);
    }

    /// Open a deferred-close window for `datastore`. Reopening keeps the
    /// sessions already pending.
    pub fn init_deferred_close(&mut self, datastore: DatastoreId) {
        debug!("Initializing deferred close for {}", datastore);
        self.deferred_close
            .get_or_insert_with(HashMap::new)
            .entry(datastore)
            .or_default();
    }

    pub fn is_deferred_close_active(&self, datastore: DatastoreId) -> bool {
        self.deferred_close
            .as_ref()
            .is_some_and(|windows| windows.contains_key(&datastore))
    }

    /// Close every session deferred for `datastore` and end its window.
    pub fn process_deferred_close(&mut self, datastore: DatastoreId) -> Result<()> {
        let pending = self
            .deferred_close
            .as_mut()
            .and_then(|windows| windows.remove(&datastore))
            .ok_or_else(|| {
                MappingError::SessionState(format!("Deferred close not active for {}", datastore))
            })?;

        if self.deferred_close.as_ref().is_some_and(HashMap::is_empty) {
            self.deferred_close = None;
        }

        debug!("Processing {} deferred close(s) for {}", pending.len(), datastore);
        for session in pending {
            self.close_session(&session);
        }
        Ok(())
    }

    // ========================================================================
    // Scoped execution
    // ========================================================================

    /// Run `f` in the current session of `datastore`, or in a fresh session
    /// bound for the duration of `f` and closed (or deferred) afterwards.
    pub fn execute<T, F>(&mut self, datastore: &dyn Datastore, f: F) -> Result<T>
    where
        F: FnOnce(&mut SessionRegistry, &Arc<Session>) -> Result<T>,
    {
        let id = datastore.id();
        if let Some(session) = self.current_session(id) {
            return f(self, &session);
        }

        let session = datastore.connect()?;
        self.bind_session(Arc::clone(&session), id);

        let result = f(self, &session);

        if let Some(holder) = self.holders.get_mut(&id) {
            holder.remove_session(&session);
            if holder.is_empty() {
                self.holders.remove(&id);
            }
        }
        self.close_session_or_register_deferred_close(&session, id);
        result
    }

    // ========================================================================
    // Transaction synchronization
    // ========================================================================

    pub fn init_synchronization(&mut self) -> Result<()> {
        if self.synchronizations.is_some() {
            return Err(MappingError::Transaction(
                "Cannot activate transaction synchronization - already active".to_string(),
            ));
        }
        self.synchronizations = Some(Vec::new());
        Ok(())
    }

    pub fn is_synchronization_active(&self) -> bool {
        self.synchronizations.is_some()
    }

    pub fn register_synchronization(&mut self, synchronization: Box<dyn TransactionSynchronization>) -> Result<()> {
        let synchronizations = self.synchronizations.as_mut().ok_or_else(|| {
            MappingError::Transaction("Transaction synchronization is not active".to_string())
        })?;
        synchronizations.push(synchronization);
        Ok(())
    }

    pub fn synchronization_count(&self) -> usize {
        self.synchronizations.as_ref().map_or(0, Vec::len)
    }

    /// Run the registered callbacks for a finished transaction and end
    /// synchronization.
    ///
    /// `before_commit` runs only for commits; a failing `before_commit` turns
    /// the completion into a rollback and its error is returned.
    pub fn complete_synchronization(&mut self, status: CompletionStatus) -> Result<()> {
        let mut synchronizations = self.synchronizations.take().ok_or_else(|| {
            MappingError::Transaction("Transaction synchronization is not active".to_string())
        })?;

        let mut status = status;
        let mut failure = None;
        if status == CompletionStatus::Committed {
            for synchronization in synchronizations.iter_mut() {
                if let Err(err) = synchronization.before_commit(self) {
                    warn!("before_commit callback failed: {}", err);
                    status = CompletionStatus::RolledBack;
                    failure = Some(err);
                    break;
                }
            }
        }

        for synchronization in synchronizations.iter_mut() {
            synchronization.before_completion(self);
        }
        for synchronization in synchronizations.iter_mut() {
            synchronization.after_completion(self, status);
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Drop registered callbacks without running them.
    pub fn clear_synchronization(&mut self) {
        self.synchronizations = None;
    }
}

impl fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("holders", &self.holders.len())
            .field("deferred_close", &self.deferred_close.as_ref().map(HashMap::len))
            .field("synchronizations", &self.synchronization_count())
            .finish()
    }
}
