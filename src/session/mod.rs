//! Session lifecycle: sessions, datastores, thread-bound session holders,
//! transaction synchronization and deferred close.

mod holder;
mod registry;
#[allow(clippy::module_inception)]
mod session;
mod synchronization;
mod transaction;

pub use holder::SessionHolder;
pub use registry::{SessionRegistry, with_thread_registry};
pub use session::{Datastore, DatastoreId, Session, SessionId, SimpleDatastore};
pub use synchronization::{CompletionStatus, SessionSynchronization, TransactionSynchronization};
pub use transaction::{Transaction, TransactionId, TransactionState};
