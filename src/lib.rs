// ============================================================================
// persistmodel Library
// ============================================================================
//
// Persistence metamodel engine:
//   - model    entity/property metamodels built from runtime class descriptions
//   - reflect  compiled, cached per-entity accessors
//   - session  thread-bound sessions with transaction synchronization and
//              deferred close
//
// ============================================================================

pub mod config;
pub mod core;
pub mod mapping;
pub mod model;
pub mod prelude;
pub mod reflect;
pub mod session;

// Re-export main types for convenience
pub use crate::config::{MappingSettings, MultiTenancyMode};
pub use crate::core::{DataType, MappingError, Result, Value};
pub use crate::mapping::{AssociationKind, EntityMapping, IdentityMapping, MappingFactory, PropertyConfig};
pub use crate::model::{
    ClassDescriptor, EntityIdentity, Instance, MappingContext, PersistentEntity,
    PersistentProperty, PropertyKind,
};
pub use crate::reflect::{EntityAccess, EntityReflector, ReflectorCache};
pub use crate::session::{
    CompletionStatus, Datastore, DatastoreId, Session, SessionRegistry, SimpleDatastore,
};
