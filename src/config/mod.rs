//! Settings shared by every entity of a mapping context.
//!
//! Settings can be built in code, read from flat `persistmodel.*` properties
//! or loaded from JSON.

use crate::core::{MappingError, Result};
use crate::mapping::PropertyConfig;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Property prefix recognized by [`MappingSettings::from_properties`].
pub const SETTINGS_PREFIX: &str = "persistmodel.";

/// How tenants are separated from each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MultiTenancyMode {
    #[default]
    None,
    /// One datastore per tenant.
    Database,
    /// One schema per tenant inside a shared datastore.
    Schema,
    /// Shared tables, tenants distinguished by a tenant-id property.
    Discriminator,
}

impl MultiTenancyMode {
    pub fn is_discriminator(&self) -> bool {
        matches!(self, Self::Discriminator)
    }
}

impl FromStr for MultiTenancyMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "" => Ok(Self::None),
            "database" => Ok(Self::Database),
            "schema" => Ok(Self::Schema),
            "discriminator" => Ok(Self::Discriminator),
            other => Err(format!("Unknown multi-tenancy mode '{}'", other)),
        }
    }
}

impl fmt::Display for MultiTenancyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Database => write!(f, "database"),
            Self::Schema => write!(f, "schema"),
            Self::Discriminator => write!(f, "discriminator"),
        }
    }
}

/// Mapping context configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MappingSettings {
    /// Active multi-tenancy mode
    pub multi_tenancy: MultiTenancyMode,

    /// Whether entities are versioned unless their mapping says otherwise
    pub version_by_default: bool,

    /// Nullability of properties without explicit mapping
    pub default_nullable: bool,

    /// Identifier property name used when a mapping declares none
    pub default_identifier: String,

    /// Name of the mapping strategy reported by entities
    pub mapping_strategy: String,

    /// Mapping applied to every property without an explicit entry
    pub default_mapping: Option<PropertyConfig>,
}

impl Default for MappingSettings {
    fn default() -> Self {
        Self {
            multi_tenancy: MultiTenancyMode::None,
            version_by_default: true,
            default_nullable: false,
            default_identifier: "id".to_string(),
            mapping_strategy: "default".to_string(),
            default_mapping: None,
        }
    }
}

impl MappingSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the multi-tenancy mode
    pub fn multi_tenancy(mut self, mode: MultiTenancyMode) -> Self {
        self.multi_tenancy = mode;
        self
    }

    /// Set whether entities are versioned by default
    pub fn version_by_default(mut self, versioned: bool) -> Self {
        self.version_by_default = versioned;
        self
    }

    /// Set default nullability
    pub fn default_nullable(mut self, nullable: bool) -> Self {
        self.default_nullable = nullable;
        self
    }

    /// Set the default identifier name
    pub fn default_identifier(mut self, name: &str) -> Self {
        self.default_identifier = name.to_string();
        self
    }

    /// Set the mapping strategy name
    pub fn mapping_strategy(mut self, name: &str) -> Self {
        self.mapping_strategy = name.to_string();
        self
    }

    /// Set the default property mapping
    pub fn default_mapping(mut self, mapping: PropertyConfig) -> Self {
        self.default_mapping = Some(mapping);
        self
    }

    /// Build settings from flat `persistmodel.*` properties.
    ///
    /// Keys without the prefix and unknown keys are ignored.
    ///
    /// # Examples
    ///
    /// ```
    /// use persistmodel::config::{MappingSettings, MultiTenancyMode};
    ///
    /// let settings = MappingSettings::from_properties([
    ///     ("persistmodel.multi_tenancy.mode", "discriminator"),
    ///     ("persistmodel.default.versioned", "false"),
    /// ])
    /// .unwrap();
    ///
    /// assert_eq!(settings.multi_tenancy, MultiTenancyMode::Discriminator);
    /// assert!(!settings.version_by_default);
    /// ```
    pub fn from_properties<I, K, V>(properties: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut settings = Self::default();

        for (key, value) in properties {
            let Some(key) = key.as_ref().strip_prefix(SETTINGS_PREFIX) else {
                continue;
            };
            let value = value.as_ref();
            match key {
                "multi_tenancy.mode" => {
                    settings.multi_tenancy = value.parse().map_err(MappingError::Configuration)?;
                }
                "default.versioned" => settings.version_by_default = parse_flag(key, value)?,
                "default.nullable" => settings.default_nullable = parse_flag(key, value)?,
                "default.identifier" => settings.default_identifier = value.trim().to_string(),
                "mapping_strategy" => settings.mapping_strategy = value.trim().to_string(),
                _ => {}
            }
        }

        settings.validate().map_err(MappingError::Configuration)?;
        Ok(settings)
    }

    /// Parse settings from a JSON document. Missing fields keep their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)
            .map_err(|e| MappingError::Configuration(format!("Invalid settings JSON: {}", e)))?;
        settings.validate().map_err(MappingError::Configuration)?;
        Ok(settings)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            MappingError::Configuration(format!("Cannot read settings '{}': {}", path.display(), e))
        })?;
        Self::from_json_str(&json)
    }

    /// Validate configuration
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.default_identifier.trim().is_empty() {
            return Err("default_identifier cannot be empty".to_string());
        }

        if self.mapping_strategy.trim().is_empty() {
            return Err("mapping_strategy cannot be empty".to_string());
        }

        Ok(())
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => Err(MappingError::Configuration(format!(
            "Setting '{}{}' expects a boolean, got '{}'",
            SETTINGS_PREFIX, key, other
        ))),
    }
}
