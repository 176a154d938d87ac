use super::transaction::{Transaction, TransactionId};
use crate::core::{MappingError, Result};
use crate::model::{Instance, MappingContext};
use crate::reflect::EntityAccess;
use log::{debug, warn};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_DATASTORE_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn new() -> Self {
        SessionId(NEXT_SESSION_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatastoreId(pub u64);

impl DatastoreId {
    pub fn new() -> Self {
        DatastoreId(NEXT_DATASTORE_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for DatastoreId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DatastoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "datastore_{}", self.0)
    }
}

/// A unit of work against one datastore.
pub struct Session {
    id: SessionId,
    datastore: DatastoreId,
    context: Arc<MappingContext>,
    connected: AtomicBool,
    synchronized: AtomicBool,
    transaction: Mutex<Option<Transaction>>,
    flushes: AtomicUsize,
    clears: AtomicUsize,
    closes: AtomicUsize,
}

impl Session {
    pub fn new(datastore: DatastoreId, context: Arc<MappingContext>) -> Self {
        Self {
            id: SessionId::new(),
            datastore,
            context,
            connected: AtomicBool::new(true),
            synchronized: AtomicBool::new(false),
            transaction: Mutex::new(None),
            flushes: AtomicUsize::new(0),
            clears: AtomicUsize::new(0),
            closes: AtomicUsize::new(0),
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn datastore_id(&self) -> DatastoreId {
        self.datastore
    }

    pub fn mapping_context(&self) -> &Arc<MappingContext> {
        &self.context
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Close the session. Closing twice is logged and otherwise ignored.
    pub fn disconnect(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.connected.swap(false, Ordering::SeqCst) {
            debug!("Closed {} of {}", self.id, self.datastore);
        } else {
            warn!("{} of {} is already closed", self.id, self.datastore);
        }
    }

    pub fn flush(&self) -> Result<()> {
        self.ensure_connected()?;
        self.flushes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }

    pub fn flush_count(&self) -> usize {
        self.flushes.load(Ordering::SeqCst)
    }

    pub fn clear_count(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }

    /// Close requests received, including repeated ones
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn is_synchronized_with_transaction(&self) -> bool {
        self.synchronized.load(Ordering::SeqCst)
    }

    pub fn set_synchronized_with_transaction(&self, synchronized: bool) {
        self.synchronized.store(synchronized, Ordering::SeqCst);
    }

    pub fn begin_transaction(&self) -> Result<TransactionId> {
        self.ensure_connected()?;
        let mut transaction = self.transaction.lock()?;
        if let Some(active) = transaction.as_ref().filter(|t| t.is_active()) {
            return Err(MappingError::Transaction(format!(
                "{} already has active transaction {}",
                self.id,
                active.id()
            )));
        }
        let started = Transaction::new();
        let id = started.id();
        *transaction = Some(started);
        debug!("Began {} in {}", id, self.id);
        Ok(id)
    }

    /// Active transaction, if any
    pub fn transaction(&self) -> Option<TransactionId> {
        self.transaction
            .lock()
            .ok()
            .and_then(|t| t.as_ref().filter(|t| t.is_active()).map(Transaction::id))
    }

    pub fn has_transaction(&self) -> bool {
        self.transaction().is_some()
    }

    pub fn commit(&self) -> Result<()> {
        self.flush()?;
        self.finish_transaction(|t| t.commit())
    }

    pub fn rollback(&self) -> Result<()> {
        self.finish_transaction(|t| t.rollback())
    }

    fn finish_transaction<F>(&self, finish: F) -> Result<()>
    where
        F: FnOnce(&mut Transaction) -> Result<()>,
    {
        let mut transaction = self.transaction.lock()?;
        let active = transaction
            .as_mut()
            .ok_or_else(|| MappingError::Transaction(format!("{} has no transaction", self.id)))?;
        finish(active)?;
        debug!("{} finished as {}", active.id(), active.state());
        *transaction = None;
        Ok(())
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MappingError::SessionState(format!("{} is closed", self.id)))
        }
    }

    /// New instance of a mapped entity.
    pub fn create(&self, entity: &str) -> Result<Instance> {
        self.context.require_entity(entity)?.new_instance()
    }

    pub fn entity_access<'a>(&self, instance: &'a mut Instance) -> Result<EntityAccess<'a>> {
        self.context.entity_access(instance)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("datastore", &self.datastore)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Source of sessions.
pub trait Datastore: Send + Sync {
    fn id(&self) -> DatastoreId;

    fn name(&self) -> &str;

    fn mapping_context(&self) -> &Arc<MappingContext>;

    /// Open a new session.
    fn connect(&self) -> Result<Arc<Session>>;
}

/// In-memory datastore handing out plain sessions.
pub struct SimpleDatastore {
    id: DatastoreId,
    name: String,
    context: Arc<MappingContext>,
    available: AtomicBool,
    opened: AtomicUsize,
}

impl SimpleDatastore {
    pub fn new(name: &str, context: Arc<MappingContext>) -> Self {
        Self {
            id: DatastoreId::new(),
            name: name.to_string(),
            context,
            available: AtomicBool::new(true),
            opened: AtomicUsize::new(0),
        }
    }

    /// When unavailable, `connect` fails with a resource failure.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of sessions opened so far
    pub fn opened_sessions(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Datastore for SimpleDatastore {
    fn id(&self) -> DatastoreId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn mapping_context(&self) -> &Arc<MappingContext> {
        &self.context
    }

    fn connect(&self) -> Result<Arc<Session>> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(MappingError::DataAccessResourceFailure(format!(
                "datastore '{}' is unavailable",
                self.name
            )));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);
        let session = Arc::new(Session::new(self.id, Arc::clone(&self.context)));
        debug!("Opened {} of datastore '{}'", session.id(), self.name);
        Ok(session)
    }
}

impl fmt::Debug for SimpleDatastore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SimpleDatastore")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish()
    }
}
