//! Commonly used types in one import.
//!
//! ```
//! use persistmodel::prelude::*;
//!
//! let context = MappingContext::isolated(MappingSettings::default());
//! let book = context
//!     .add_persistent_entity(
//!         ClassDescriptor::builder("app.Book")
//!             .entity()
//!             .field("id", DataType::Long)
//!             .field("title", DataType::Text)
//!             .build(),
//!     )
//!     .unwrap();
//!
//! assert_eq!(book.identity().unwrap().name(), "id");
//! ```

pub use crate::config::{MappingSettings, MultiTenancyMode};
pub use crate::core::{DataType, MappingError, Result, Value};
pub use crate::mapping::{AssociationKind, EntityMapping, PropertyConfig};
pub use crate::model::{
    ClassDescriptor, Instance, MappingContext, MappingSyntaxStrategy, PersistentEntity,
    PersistentProperty, ProxyHandler,
};
pub use crate::reflect::{EntityAccess, EntityReflector};
pub use crate::session::{
    CompletionStatus, Datastore, Session, SessionRegistry, SimpleDatastore,
    TransactionSynchronization, with_thread_registry,
};
