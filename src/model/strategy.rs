//! Mapping syntax strategies decide which members of a class are persistent
//! and how each one is classified.

use super::{ClassDescriptor, MappingContext, PersistentEntity, PersistentProperty, PropertyKind};
use crate::core::{DataType, MappingError, Result};
use crate::mapping::{AssociationKind, EntityMapping, PropertyConfig};
use crate::reflect::naming;
use std::collections::HashSet;
use std::sync::Arc;

pub trait MappingSyntaxStrategy: Send + Sync {
    /// Name reported by entities mapped with this strategy.
    fn name(&self) -> &str;

    fn is_persistent_entity(&self, class: &ClassDescriptor) -> bool;

    /// Names of the entities owning `class`.
    fn owning_entities(&self, class: &ClassDescriptor, context: &MappingContext) -> Vec<String>;

    /// Persistent properties of `entity`, in discovery order. `hierarchy` is
    /// root-first and ends with the entity's own class.
    fn persistent_properties(
        &self,
        entity: &Arc<PersistentEntity>,
        hierarchy: &[Arc<ClassDescriptor>],
        mapping: &EntityMapping,
        context: &MappingContext,
    ) -> Result<Vec<PersistentProperty>>;

    /// Identity resolved from the declared identifier name.
    fn identity(
        &self,
        entity: &Arc<PersistentEntity>,
        hierarchy: &[Arc<ClassDescriptor>],
        mapping: &EntityMapping,
        context: &MappingContext,
    ) -> Result<PersistentProperty>;

    /// Composite identity resolved from the declared identifier names.
    fn composite_identity(
        &self,
        entity: &Arc<PersistentEntity>,
        hierarchy: &[Arc<ClassDescriptor>],
        mapping: &EntityMapping,
        context: &MappingContext,
    ) -> Result<Vec<PersistentProperty>>;
}

/// A member that may become a persistent property.
struct Candidate {
    name: String,
    data_type: DataType,
    identity_marker: bool,
    tenant_marker: bool,
}

/// Default strategy: bean properties of the class hierarchy, classified by
/// their declared type.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConventionMappingStrategy;

impl ConventionMappingStrategy {
    pub fn new() -> Self {
        Self
    }

    fn candidates(hierarchy: &[Arc<ClassDescriptor>], mapping: &EntityMapping) -> Vec<Candidate> {
        let mut seen = HashSet::new();
        let mut candidates = Vec::new();

        for class in hierarchy {
            for field in class.fields() {
                if field.transient
                    || naming::is_trait_field(&field.name)
                    || mapping.is_transient(&field.name)
                    || !seen.insert(field.name.clone())
                {
                    continue;
                }
                candidates.push(Candidate {
                    name: field.name.clone(),
                    data_type: field.data_type.clone(),
                    identity_marker: field.identity,
                    tenant_marker: field.tenant_id,
                });
            }

            for method in class.methods().iter().filter(|m| m.is_getter()) {
                if mapping.is_transient(&method.property) || !seen.insert(method.property.clone()) {
                    continue;
                }
                candidates.push(Candidate {
                    name: method.property.clone(),
                    data_type: method.data_type.clone(),
                    identity_marker: false,
                    tenant_marker: false,
                });
            }
        }

        candidates
    }

    fn classify(data_type: &DataType, config: &PropertyConfig) -> PropertyKind {
        match data_type {
            DataType::Entity(target) => PropertyKind::Association(
                config.association.unwrap_or(AssociationKind::ManyToOne),
                target.clone(),
            ),
            DataType::Embedded(target) => PropertyKind::Embedded(target.clone()),
            DataType::List(inner) => match inner.as_ref() {
                DataType::Entity(target) => PropertyKind::Association(
                    config.association.unwrap_or(AssociationKind::OneToMany),
                    target.clone(),
                ),
                DataType::Embedded(target) => PropertyKind::EmbeddedCollection(target.clone()),
                _ => PropertyKind::Basic,
            },
            DataType::Map => PropertyKind::Basic,
            _ => PropertyKind::Simple,
        }
    }

    fn identity_property(
        entity: &Arc<PersistentEntity>,
        hierarchy: &[Arc<ClassDescriptor>],
        mapping: &EntityMapping,
        context: &MappingContext,
        name: &str,
    ) -> Result<PersistentProperty> {
        let candidate = Self::candidates(hierarchy, mapping)
            .into_iter()
            .find(|c| c.name == name)
            .ok_or_else(|| {
                MappingError::Configuration(format!(
                    "Class [{}] declares identifier [{}] but has no such property",
                    entity.name(),
                    name
                ))
            })?;

        let config = context.factory().property_mapped_form(mapping, name);
        Ok(PersistentProperty::new(
            entity,
            &candidate.name,
            candidate.data_type,
            PropertyKind::Identity,
            config,
        ))
    }
}

impl MappingSyntaxStrategy for ConventionMappingStrategy {
    fn name(&self) -> &str {
        "default"
    }

    fn is_persistent_entity(&self, class: &ClassDescriptor) -> bool {
        class.is_entity()
    }

    fn owning_entities(&self, class: &ClassDescriptor, _context: &MappingContext) -> Vec<String> {
        class.belongs_to().to_vec()
    }

    fn persistent_properties(
        &self,
        entity: &Arc<PersistentEntity>,
        hierarchy: &[Arc<ClassDescriptor>],
        mapping: &EntityMapping,
        context: &MappingContext,
    ) -> Result<Vec<PersistentProperty>> {
        let factory = context.factory();
        let declared = mapping.identifier_names();
        let single_identifier = match declared.as_slice() {
            [name] => Some(name.as_str()),
            _ => None,
        };

        let properties = Self::candidates(hierarchy, mapping)
            .into_iter()
            .map(|candidate| {
                let config = factory.property_mapped_form(mapping, &candidate.name);
                let kind = if candidate.identity_marker
                    || single_identifier == Some(candidate.name.as_str())
                {
                    PropertyKind::Identity
                } else if factory.is_tenant_id(
                    entity.class(),
                    mapping,
                    &candidate.name,
                    candidate.tenant_marker,
                ) {
                    PropertyKind::TenantId
                } else {
                    Self::classify(&candidate.data_type, &config)
                };
                PersistentProperty::new(entity, &candidate.name, candidate.data_type, kind, config)
            })
            .collect();

        Ok(properties)
    }

    fn identity(
        &self,
        entity: &Arc<PersistentEntity>,
        hierarchy: &[Arc<ClassDescriptor>],
        mapping: &EntityMapping,
        context: &MappingContext,
    ) -> Result<PersistentProperty> {
        let declared = mapping.identifier_names();
        let name = declared.first().ok_or_else(|| {
            MappingError::Configuration(format!(
                "Class [{}] declares no identifier",
                entity.name()
            ))
        })?;
        Self::identity_property(entity, hierarchy, mapping, context, name)
    }

    fn composite_identity(
        &self,
        entity: &Arc<PersistentEntity>,
        hierarchy: &[Arc<ClassDescriptor>],
        mapping: &EntityMapping,
        context: &MappingContext,
    ) -> Result<Vec<PersistentProperty>> {
        mapping
            .identifier_names()
            .iter()
            .map(|name| Self::identity_property(entity, hierarchy, mapping, context, name))
            .collect()
    }
}
