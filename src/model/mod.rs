pub mod class;
pub mod context;
pub mod entity;
pub mod property;
pub mod proxy;
pub mod strategy;

pub use class::{
    ClassBuilder, ClassDescriptor, FieldDef, GetterFn, Instance, MethodBody, MethodDef,
    MethodOrigin, SetterFn,
};
pub use context::MappingContext;
pub use entity::{EntityIdentity, PersistentEntity};
pub use property::{PersistentProperty, PropertyKind, VERSION};
pub use proxy::{DefaultProxyHandler, ProxyHandler};
pub use strategy::{ConventionMappingStrategy, MappingSyntaxStrategy};
