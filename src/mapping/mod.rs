//! Mapping configuration tree.
//!
//! An [`EntityMapping`] is a plain data block: declared identifier names,
//! versioning and per-property overrides. Blocks declared along a class
//! hierarchy are merged root-first by the [`MappingFactory`].

mod factory;

pub use factory::MappingFactory;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the catch-all property entry in a mapping block.
pub const DEFAULT_PROPERTY_KEY: &str = "*";

/// Association cardinality of a mapped property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    OneToOne,
    ManyToOne,
    OneToMany,
    ManyToMany,
}

impl AssociationKind {
    /// True for associations whose owning side holds a collection.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::OneToMany | Self::ManyToMany)
    }
}

impl fmt::Display for AssociationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneToOne => write!(f, "OneToOne"),
            Self::ManyToOne => write!(f, "ManyToOne"),
            Self::OneToMany => write!(f, "OneToMany"),
            Self::ManyToMany => write!(f, "ManyToMany"),
        }
    }
}

/// Mapped form of a single property.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyConfig {
    pub nullable: bool,
    pub derived: bool,
    /// External (column/field) name when it differs from the property name
    pub target_name: Option<String>,
    /// Overrides the association kind inferred from the property type
    pub association: Option<AssociationKind>,
}

impl PropertyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn derived(mut self, derived: bool) -> Self {
        self.derived = derived;
        self
    }

    pub fn target_name(mut self, name: &str) -> Self {
        self.target_name = Some(name.to_string());
        self
    }

    pub fn association(mut self, kind: AssociationKind) -> Self {
        self.association = Some(kind);
        self
    }

    /// Starts a new entry from a template. Only the template's values are
    /// carried over; the result shares nothing with it.
    pub fn from_template(template: &PropertyConfig) -> Self {
        Self {
            nullable: template.nullable,
            derived: template.derived,
            target_name: template.target_name.clone(),
            association: template.association,
        }
    }
}

/// Declared identifier of an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityMapping {
    pub names: Vec<String>,
    pub generator: Option<String>,
}

impl Default for IdentityMapping {
    fn default() -> Self {
        Self::single("id")
    }
}

impl IdentityMapping {
    pub fn single(name: &str) -> Self {
        Self {
            names: vec![name.to_string()],
            generator: None,
        }
    }

    pub fn composite<S: AsRef<str>>(names: &[S]) -> Self {
        Self {
            names: names.iter().map(|n| n.as_ref().to_string()).collect(),
            generator: None,
        }
    }

    pub fn generator(mut self, generator: &str) -> Self {
        self.generator = Some(generator.to_string());
        self
    }

    pub fn is_composite(&self) -> bool {
        self.names.len() > 1
    }
}

/// Static mapping block of one class.
///
/// Every scalar is optional so that a subclass only overrides what it
/// declares.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntityMapping {
    pub identifier: Option<IdentityMapping>,
    pub versioned: Option<bool>,
    /// Externally managed entities never evaluate versioning
    pub external: Option<bool>,
    pub table: Option<String>,
    pub tenant_id: Option<String>,
    pub mapping_strategy: Option<String>,
    pub transients: Vec<String>,
    pub properties: BTreeMap<String, PropertyConfig>,
    #[serde(rename = "*")]
    pub default_property: Option<PropertyConfig>,
}

impl EntityMapping {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare identifier names; more than one name declares a composite identity
    pub fn id<S: AsRef<str>>(mut self, names: &[S]) -> Self {
        self.identifier = Some(IdentityMapping::composite(names));
        self
    }

    pub fn identifier(mut self, identifier: IdentityMapping) -> Self {
        self.identifier = Some(identifier);
        self
    }

    pub fn versioned(mut self, versioned: bool) -> Self {
        self.versioned = Some(versioned);
        self
    }

    pub fn external(mut self, external: bool) -> Self {
        self.external = Some(external);
        self
    }

    pub fn table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }

    pub fn tenant_id(mut self, property: &str) -> Self {
        self.tenant_id = Some(property.to_string());
        self
    }

    pub fn mapping_strategy(mut self, strategy: &str) -> Self {
        self.mapping_strategy = Some(strategy.to_string());
        self
    }

    pub fn transient(mut self, property: &str) -> Self {
        self.transients.push(property.to_string());
        self
    }

    pub fn property(mut self, name: &str, config: PropertyConfig) -> Self {
        if name == DEFAULT_PROPERTY_KEY {
            self.default_property = Some(config);
        } else {
            self.properties.insert(name.to_string(), config);
        }
        self
    }

    /// Overlay `other` on top of `self`. Values declared in `other` win.
    pub fn merge(&mut self, other: &EntityMapping) {
        if other.identifier.is_some() {
            self.identifier = other.identifier.clone();
        }
        if other.versioned.is_some() {
            self.versioned = other.versioned;
        }
        if other.external.is_some() {
            self.external = other.external;
        }
        if other.table.is_some() {
            self.table = other.table.clone();
        }
        if other.tenant_id.is_some() {
            self.tenant_id = other.tenant_id.clone();
        }
        if other.mapping_strategy.is_some() {
            self.mapping_strategy = other.mapping_strategy.clone();
        }
        if other.default_property.is_some() {
            self.default_property = other.default_property.clone();
        }
        for name in &other.transients {
            if !self.transients.contains(name) {
                self.transients.push(name.clone());
            }
        }
        for (name, config) in &other.properties {
            self.properties.insert(name.clone(), config.clone());
        }
    }

    pub fn is_versioned(&self) -> bool {
        self.versioned.unwrap_or(true)
    }

    pub fn is_external(&self) -> bool {
        self.external.unwrap_or(false)
    }

    pub fn is_transient(&self, property: &str) -> bool {
        self.transients.iter().any(|t| t == property)
    }

    pub fn identifier_names(&self) -> Vec<String> {
        self.identifier
            .as_ref()
            .map(|id| id.names.clone())
            .unwrap_or_default()
    }

    pub fn property_config(&self, name: &str) -> Option<&PropertyConfig> {
        self.properties.get(name)
    }
}
