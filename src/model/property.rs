use super::PersistentEntity;
use crate::core::{DataType, MappingError, Result};
use crate::mapping::{AssociationKind, PropertyConfig};
use crate::reflect::{PropertyReader, PropertyWriter, naming};
use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

/// Conventional name of the optimistic-locking property.
pub const VERSION: &str = "version";

/// Classification of a persistent property.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyKind {
    Identity,
    TenantId,
    /// Scalar value
    Simple,
    /// Collection or map of scalar values
    Basic,
    Embedded(String),
    EmbeddedCollection(String),
    Association(AssociationKind, String),
}

impl fmt::Display for PropertyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "Identity"),
            Self::TenantId => write!(f, "TenantId"),
            Self::Simple => write!(f, "Simple"),
            Self::Basic => write!(f, "Basic"),
            Self::Embedded(_) => write!(f, "Embedded"),
            Self::EmbeddedCollection(_) => write!(f, "EmbeddedCollection"),
            Self::Association(kind, _) => write!(f, "{}", kind),
        }
    }
}

/// One mapped attribute of an entity.
pub struct PersistentProperty {
    name: String,
    data_type: DataType,
    kind: PropertyKind,
    mapping: PropertyConfig,
    owner: Weak<PersistentEntity>,
    owner_name: String,
    inherited: OnceLock<bool>,
}

impl PersistentProperty {
    pub fn new(
        owner: &Arc<PersistentEntity>,
        name: &str,
        data_type: DataType,
        kind: PropertyKind,
        mapping: PropertyConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            kind,
            mapping,
            owner: Arc::downgrade(owner),
            owner_name: owner.name().to_string(),
            inherited: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn capitalized_name(&self) -> String {
        naming::capitalize(&self.name)
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn kind(&self) -> &PropertyKind {
        &self.kind
    }

    /// Mapped form of this property
    pub fn mapping(&self) -> &PropertyConfig {
        &self.mapping
    }

    pub fn is_nullable(&self) -> bool {
        self.mapping.nullable
    }

    pub fn is_derived(&self) -> bool {
        self.mapping.derived
    }

    pub fn target_name(&self) -> Option<&str> {
        self.mapping.target_name.as_deref()
    }

    pub fn owner(&self) -> Option<Arc<PersistentEntity>> {
        self.owner.upgrade()
    }

    pub fn owner_name(&self) -> &str {
        &self.owner_name
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.kind, PropertyKind::Identity)
    }

    pub fn is_tenant_id(&self) -> bool {
        matches!(self.kind, PropertyKind::TenantId)
    }

    pub fn is_association(&self) -> bool {
        matches!(self.kind, PropertyKind::Association(..))
    }

    pub fn is_embedded(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Embedded(_) | PropertyKind::EmbeddedCollection(_)
        )
    }

    pub fn is_one_to_many(&self) -> bool {
        matches!(
            self.kind,
            PropertyKind::Association(AssociationKind::OneToMany, _)
        )
    }

    pub fn association_kind(&self) -> Option<AssociationKind> {
        match &self.kind {
            PropertyKind::Association(kind, _) => Some(*kind),
            _ => None,
        }
    }

    /// Class name of the associated or embedded type
    pub fn associated_type(&self) -> Option<&str> {
        match &self.kind {
            PropertyKind::Association(_, target)
            | PropertyKind::Embedded(target)
            | PropertyKind::EmbeddedCollection(target) => Some(target),
            _ => None,
        }
    }

    /// True if an ancestor entity already defines a property of this name.
    ///
    /// Computed on the first call after the owner is initialized and cached
    /// from then on. Before that the answer is `false` and nothing is cached.
    pub fn is_inherited(&self) -> bool {
        if let Some(inherited) = self.inherited.get() {
            return *inherited;
        }
        let Some(owner) = self.owner.upgrade() else {
            return false;
        };
        if !owner.is_initialized() {
            return false;
        }
        *self.inherited.get_or_init(|| {
            let mut ancestor = owner.parent_entity();
            while let Some(entity) = ancestor {
                if entity.property_by_name(&self.name).is_some() {
                    return true;
                }
                ancestor = entity.parent_entity();
            }
            false
        })
    }

    pub fn reader(&self) -> Result<PropertyReader> {
        let owner = self
            .owner
            .upgrade()
            .ok_or_else(|| MappingError::NotInitialized(self.owner_name.clone()))?;
        Ok(owner.reflector()?.property_reader(&self.name)?.clone())
    }

    pub fn writer(&self) -> Result<PropertyWriter> {
        let owner = self
            .owner
            .upgrade()
            .ok_or_else(|| MappingError::NotInitialized(self.owner_name.clone()))?;
        Ok(owner.reflector()?.property_writer(&self.name)?.clone())
    }
}

impl fmt::Debug for PersistentProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentProperty")
            .field("name", &self.name)
            .field("data_type", &self.data_type)
            .field("kind", &self.kind)
            .field("owner", &self.owner_name)
            .finish()
    }
}

impl fmt::Display for PersistentProperty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.name, self.data_type, self.kind)
    }
}
