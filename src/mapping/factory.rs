use super::{EntityMapping, IdentityMapping, PropertyConfig};
use crate::config::MappingSettings;
use crate::model::ClassDescriptor;
use std::sync::Arc;

/// Property name used for the tenant id when the mapping declares none.
pub const DEFAULT_TENANT_ID: &str = "tenantId";

/// Resolves mapped forms of entities and their properties.
#[derive(Debug, Clone)]
pub struct MappingFactory {
    settings: MappingSettings,
}

impl MappingFactory {
    pub fn new(settings: MappingSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    /// Effective mapping of the last class in `hierarchy` (root first).
    pub fn entity_mapping(&self, hierarchy: &[Arc<ClassDescriptor>]) -> EntityMapping {
        let mut mapping = EntityMapping {
            identifier: Some(IdentityMapping::single(&self.settings.default_identifier)),
            versioned: Some(self.settings.version_by_default),
            default_property: self.settings.default_mapping.clone(),
            ..EntityMapping::default()
        };

        for class in hierarchy {
            if let Some(block) = class.mapping() {
                mapping.merge(block);
            }
        }

        mapping
    }

    /// Mapped form of `property` under `mapping`.
    pub fn property_mapped_form(&self, mapping: &EntityMapping, property: &str) -> PropertyConfig {
        if let Some(explicit) = mapping.property_config(property) {
            return explicit.clone();
        }

        match &mapping.default_property {
            Some(template) => PropertyConfig::from_template(template),
            None => PropertyConfig::new().nullable(self.settings.default_nullable),
        }
    }

    /// Name of the tenant-id property for `class`, if it is multi-tenant.
    pub fn tenant_id_name(&self, class: &ClassDescriptor, mapping: &EntityMapping) -> Option<String> {
        if !class.is_multi_tenant() {
            return None;
        }
        if let Some(name) = &mapping.tenant_id {
            return Some(name.clone());
        }
        Some(DEFAULT_TENANT_ID.to_string())
    }

    /// Whether `field` of a `class` should be classified as its tenant id.
    pub fn is_tenant_id(
        &self,
        class: &ClassDescriptor,
        mapping: &EntityMapping,
        field: &str,
        marked: bool,
    ) -> bool {
        if !class.is_multi_tenant() {
            return false;
        }
        marked || self.tenant_id_name(class, mapping).as_deref() == Some(field)
    }
}

impl Default for MappingFactory {
    fn default() -> Self {
        Self::new(MappingSettings::default())
    }
}
