//! Accessor compilation.
//!
//! An [`EntityReflector`] is the compiled read/write operations of one entity.
//! Reflectors are built once per entity class and cached by entity name in a
//! [`ReflectorCache`].

mod access;
mod accessor;
mod cache;
pub mod naming;
mod reflector;

pub use access::EntityAccess;
pub use accessor::{AccessorPair, PropertyReader, PropertyWriter};
pub use cache::ReflectorCache;
pub use reflector::EntityReflector;
