/// Session Tests
///
/// Thread-bound session holders, transaction synchronization and deferred close
/// Run with: cargo test --test session_tests

use persistmodel::session::TransactionSynchronization;
use persistmodel::{
    ClassDescriptor, CompletionStatus, DataType, Datastore, MappingContext, MappingError,
    MappingSettings, Result, SessionRegistry, SimpleDatastore, Value,
};
use persistmodel::session::with_thread_registry;
use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

fn datastore() -> SimpleDatastore {
    let context = MappingContext::isolated(MappingSettings::default());
    context
        .add_persistent_entity(
            ClassDescriptor::builder("library.Book")
                .entity()
                .field("id", DataType::Long)
                .field("title", DataType::Text)
                .build(),
        )
        .unwrap();
    SimpleDatastore::new("library", Arc::new(context))
}

#[test]
fn test_nested_binds_stack_sessions() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let first = store.connect().unwrap();
    let second = store.connect().unwrap();

    registry.bind_session(Arc::clone(&first), store.id());
    registry.bind_session(Arc::clone(&second), store.id());
    assert_eq!(registry.current_session(store.id()).unwrap().id(), second.id());
    assert_eq!(registry.holder(store.id()).unwrap().len(), 2);
    assert!(registry.is_session_transactional(&first, store.id()));

    registry.unbind_session(&second);
    assert!(!second.is_connected());
    assert_eq!(registry.current_session(store.id()).unwrap().id(), first.id());

    registry.unbind_session(&first);
    assert!(!first.is_connected());
    assert!(!registry.has_current_session(store.id()));
    assert!(registry.holder(store.id()).is_none());
}

#[test]
fn test_unbind_unknown_session_is_ignored() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let stray = store.connect().unwrap();

    registry.unbind_session(&stray);
    assert!(stray.is_connected());

    let bound = store.connect().unwrap();
    registry.bind_session(Arc::clone(&bound), store.id());
    registry.unbind_session(&stray);
    assert!(stray.is_connected());
    assert_eq!(registry.current_session(store.id()).unwrap().id(), bound.id());
}

#[test]
fn test_deferred_close_window() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    registry.init_deferred_close(store.id());
    assert!(registry.is_deferred_close_active(store.id()));

    let session = store.connect().unwrap();
    registry.bind_session(Arc::clone(&session), store.id());
    registry.unbind_session(&session);
    registry.close_session_or_register_deferred_close(&session, store.id());
    assert!(session.is_connected());
    assert!(!registry.has_current_session(store.id()));

    // Reopening the window keeps pending sessions
    registry.init_deferred_close(store.id());

    registry.process_deferred_close(store.id()).unwrap();
    assert!(!session.is_connected());
    assert_eq!(session.close_count(), 1);
    assert!(!registry.is_deferred_close_active(store.id()));

    let err = registry.process_deferred_close(store.id()).unwrap_err();
    assert!(err.is_session_state());
}

#[test]
fn test_released_session_closed_once_by_deferred_window() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    registry.init_deferred_close(store.id());

    let session = registry.get_or_create(&store, true).unwrap();
    assert!(!registry.has_current_session(store.id()));

    registry.release_session(&session, store.id());
    // Releasing again while the window is open queues nothing new
    registry.release_session(&session, store.id());
    assert!(session.is_connected());
    assert_eq!(session.close_count(), 0);

    registry.process_deferred_close(store.id()).unwrap();
    assert!(!session.is_connected());
    assert_eq!(session.close_count(), 1);
    assert!(!registry.is_deferred_close_active(store.id()));
}

#[test]
fn test_deferred_close_is_per_datastore() {
    let books = datastore();
    let audit = datastore();
    let mut registry = SessionRegistry::new();
    registry.init_deferred_close(books.id());

    let deferred = books.connect().unwrap();
    let closed = audit.connect().unwrap();
    registry.close_session_or_register_deferred_close(&deferred, books.id());
    registry.close_session_or_register_deferred_close(&closed, audit.id());

    assert!(deferred.is_connected());
    assert!(!closed.is_connected());
    assert!(!registry.is_deferred_close_active(audit.id()));
    registry.process_deferred_close(books.id()).unwrap();
    assert!(!deferred.is_connected());
}

#[test]
fn test_get_or_create_without_synchronization() {
    let store = datastore();
    let mut registry = SessionRegistry::new();

    let err = registry.get_or_create(&store, false).unwrap_err();
    assert!(err.is_session_state());
    assert_eq!(store.opened_sessions(), 0);

    let session = registry.get_or_create(&store, true).unwrap();
    assert!(session.is_connected());
    assert!(!registry.has_current_session(store.id()));

    registry.release_session(&session, store.id());
    assert!(!session.is_connected());
}

#[test]
fn test_get_or_create_returns_bound_session() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let bound = store.connect().unwrap();
    registry.bind_session(Arc::clone(&bound), store.id());

    let found = registry.get_or_create(&store, false).unwrap();
    assert_eq!(found.id(), bound.id());

    // Bound sessions survive release
    registry.release_session(&found, store.id());
    assert!(bound.is_connected());
}

#[test]
fn test_get_or_create_discards_closed_sessions() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let stale = store.connect().unwrap();
    registry.bind_session(Arc::clone(&stale), store.id());
    stale.disconnect();

    let fresh = registry.get_or_create(&store, true).unwrap();
    assert_ne!(fresh.id(), stale.id());
    assert!(registry.holder(store.id()).is_none());
}

#[test]
fn test_get_or_create_reports_resource_failure() {
    let store = datastore();
    store.set_available(false);
    let mut registry = SessionRegistry::new();

    let err = registry.get_or_create(&store, true).unwrap_err();
    assert!(matches!(err, MappingError::DataAccessResourceFailure(_)));
}

#[test]
fn test_synchronized_session_commit() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    registry.init_synchronization().unwrap();

    let session = registry.get_or_create(&store, false).unwrap();
    assert!(session.is_synchronized_with_transaction());
    assert!(registry.holder(store.id()).unwrap().is_synchronized_with_transaction());
    assert_eq!(registry.synchronization_count(), 1);

    // Same session, no second registration
    let again = registry.get_or_create(&store, false).unwrap();
    assert_eq!(again.id(), session.id());
    assert_eq!(registry.synchronization_count(), 1);

    registry.complete_synchronization(CompletionStatus::Committed).unwrap();
    assert_eq!(session.flush_count(), 1);
    assert_eq!(session.clear_count(), 0);
    assert!(!session.is_connected());
    assert!(!registry.has_current_session(store.id()));
    assert!(!registry.is_synchronization_active());
}

#[test]
fn test_existing_session_joins_transaction_and_rolls_back() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let bound = store.connect().unwrap();
    registry.bind_session(Arc::clone(&bound), store.id());

    registry.init_synchronization().unwrap();
    let session = registry.get_or_create(&store, false).unwrap();
    assert_eq!(session.id(), bound.id());
    assert_eq!(registry.synchronization_count(), 1);

    registry.complete_synchronization(CompletionStatus::RolledBack).unwrap();
    assert_eq!(bound.clear_count(), 1);
    assert_eq!(bound.flush_count(), 0);
    assert!(bound.is_connected());
    assert!(!bound.is_synchronized_with_transaction());
    assert!(!registry.holder(store.id()).unwrap().is_synchronized_with_transaction());
}

#[test]
fn test_synchronized_close_is_deferred() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    registry.init_deferred_close(store.id());
    registry.init_synchronization().unwrap();

    let session = registry.get_or_create(&store, false).unwrap();
    registry.complete_synchronization(CompletionStatus::Committed).unwrap();
    assert!(session.is_connected());

    registry.process_deferred_close(store.id()).unwrap();
    assert!(!session.is_connected());
}

#[derive(Default)]
struct Recorded {
    events: Vec<String>,
}

struct Recorder {
    log: Rc<RefCell<Recorded>>,
    fail_before_commit: bool,
}

impl TransactionSynchronization for Recorder {
    fn before_commit(&mut self, _registry: &mut SessionRegistry) -> Result<()> {
        self.log.borrow_mut().events.push("before_commit".to_string());
        if self.fail_before_commit {
            return Err(MappingError::Transaction("flush failed".to_string()));
        }
        Ok(())
    }

    fn before_completion(&mut self, _registry: &mut SessionRegistry) {
        self.log.borrow_mut().events.push("before_completion".to_string());
    }

    fn after_completion(&mut self, _registry: &mut SessionRegistry, status: CompletionStatus) {
        self.log
            .borrow_mut()
            .events
            .push(format!("after_completion:{}", status));
    }
}

#[test]
fn test_synchronization_callback_order() {
    let log = Rc::new(RefCell::new(Recorded::default()));
    let mut registry = SessionRegistry::new();
    registry.init_synchronization().unwrap();
    registry
        .register_synchronization(Box::new(Recorder {
            log: Rc::clone(&log),
            fail_before_commit: false,
        }))
        .unwrap();

    registry.complete_synchronization(CompletionStatus::Committed).unwrap();
    assert_eq!(
        log.borrow().events,
        vec!["before_commit", "before_completion", "after_completion:COMMITTED"]
    );
}

#[test]
fn test_failed_before_commit_rolls_back() {
    let log = Rc::new(RefCell::new(Recorded::default()));
    let mut registry = SessionRegistry::new();
    registry.init_synchronization().unwrap();
    registry
        .register_synchronization(Box::new(Recorder {
            log: Rc::clone(&log),
            fail_before_commit: true,
        }))
        .unwrap();

    let err = registry
        .complete_synchronization(CompletionStatus::Committed)
        .unwrap_err();
    assert!(matches!(err, MappingError::Transaction(_)));
    assert_eq!(
        log.borrow().events,
        vec!["before_commit", "before_completion", "after_completion:ROLLED_BACK"]
    );
    assert!(!registry.is_synchronization_active());
}

#[test]
fn test_synchronization_state_errors() {
    let mut registry = SessionRegistry::new();
    let log = Rc::new(RefCell::new(Recorded::default()));
    assert!(registry
        .register_synchronization(Box::new(Recorder {
            log,
            fail_before_commit: false,
        }))
        .is_err());
    assert!(registry.complete_synchronization(CompletionStatus::Unknown).is_err());

    registry.init_synchronization().unwrap();
    assert!(registry.init_synchronization().is_err());
    registry.clear_synchronization();
    assert!(!registry.is_synchronization_active());
}

#[test]
fn test_execute_binds_session_for_the_call() {
    let store = datastore();
    let mut registry = SessionRegistry::new();

    let used = registry
        .execute(&store, |registry, session| {
            assert_eq!(
                registry.current_session(session.datastore_id()).unwrap().id(),
                session.id()
            );
            Ok(Arc::clone(session))
        })
        .unwrap();
    assert!(!used.is_connected());
    assert!(!registry.has_current_session(store.id()));

    let bound = store.connect().unwrap();
    registry.bind_session(Arc::clone(&bound), store.id());
    let reused = registry
        .execute(&store, |_, session| Ok(session.id()))
        .unwrap();
    assert_eq!(reused, bound.id());
    assert!(bound.is_connected());
}

#[test]
fn test_execute_closes_session_on_error() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let mut seen = None;

    let result: Result<()> = registry.execute(&store, |_, session| {
        seen = Some(Arc::clone(session));
        Err(MappingError::Transaction("boom".to_string()))
    });

    assert!(result.is_err());
    assert!(!seen.unwrap().is_connected());
    assert!(!registry.has_current_session(store.id()));
}

#[test]
fn test_bind_with_creator_replaces_holder() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let first = store.connect().unwrap();
    let second = store.connect().unwrap();

    registry.bind_session(Arc::clone(&first), store.id());
    registry.bind_session_with_creator(Arc::clone(&second), store.id(), "batch-import");

    let holder = registry.holder(store.id()).unwrap();
    assert_eq!(holder.len(), 1);
    assert_eq!(holder.creator(), Some("batch-import"));
    assert_eq!(holder.session().unwrap().id(), second.id());
}

#[test]
fn test_thread_registry_is_reused_and_not_reentrant() {
    let store = datastore();
    let session = store.connect().unwrap();

    with_thread_registry(|registry| {
        registry.bind_session(Arc::clone(&session), store.id());
        Ok(())
    })
    .unwrap();

    let current = with_thread_registry(|registry| Ok(registry.current_session(store.id())))
        .unwrap()
        .unwrap();
    assert_eq!(current.id(), session.id());

    let nested = with_thread_registry(|_| with_thread_registry(|_| Ok(())));
    assert!(nested.unwrap_err().is_session_state());

    // Other threads start with an empty registry
    let id = store.id();
    let elsewhere = std::thread::spawn(move || {
        with_thread_registry(|registry| Ok(registry.has_current_session(id))).unwrap()
    })
    .join()
    .unwrap();
    assert!(!elsewhere);

    with_thread_registry(|registry| {
        registry.unbind_session(&session);
        Ok(())
    })
    .unwrap();
    assert!(!session.is_connected());
}

#[test]
fn test_session_creates_and_accesses_entities() {
    let store = datastore();
    let session = store.connect().unwrap();

    let mut book = session.create("library.Book").unwrap();
    let mut access = session.entity_access(&mut book).unwrap();
    access.set_identifier(Value::from("1")).unwrap();
    access.set_property("title", Value::from("Walden")).unwrap();

    assert_eq!(book.get("id"), Value::Integer(1));
    assert_eq!(book.get("title"), Value::from("Walden"));
    assert!(matches!(
        session.create("library.Missing"),
        Err(MappingError::EntityNotFound(_))
    ));
}

#[test]
fn test_holder_reports_current_transaction() {
    let store = datastore();
    let mut registry = SessionRegistry::new();
    let session = store.connect().unwrap();
    registry.bind_session(Arc::clone(&session), store.id());

    let txn = session.begin_transaction().unwrap();
    assert_eq!(registry.holder(store.id()).unwrap().transaction(), Some(txn));
    session.rollback().unwrap();
    assert!(registry.holder(store.id()).unwrap().transaction().is_none());
}
