use super::EntityReflector;
use crate::core::{MappingError, Result, Value};
use crate::model::{Instance, PersistentEntity};
use std::sync::Arc;

/// Per-instance access converting written values to the declared property types.
pub struct EntityAccess<'a> {
    entity: Arc<PersistentEntity>,
    reflector: Arc<EntityReflector>,
    instance: &'a mut Instance,
}

impl<'a> EntityAccess<'a> {
    pub fn new(entity: Arc<PersistentEntity>, instance: &'a mut Instance) -> Result<Self> {
        let reflector = entity.reflector()?;
        Ok(Self {
            entity,
            reflector,
            instance,
        })
    }

    pub fn entity(&self) -> &Arc<PersistentEntity> {
        &self.entity
    }

    pub fn reflector(&self) -> &Arc<EntityReflector> {
        &self.reflector
    }

    pub fn instance(&self) -> &Instance {
        self.instance
    }

    pub fn get_property(&self, name: &str) -> Result<Value> {
        self.reflector.get_property(self.instance, name)
    }

    /// Converts `value` to the property's declared type and writes it.
    /// Change-tracking classes record the previous value.
    pub fn set_property(&mut self, name: &str, value: Value) -> Result<()> {
        let declared = self.reflector.property_writer(name)?.data_type().clone();
        let converted = declared
            .convert(value.clone())
            .map_err(|reason| MappingError::InvalidPropertyValue {
                property: name.to_string(),
                declared_type: declared.to_string(),
                class: self.entity.name().to_string(),
                value: value.to_string(),
                reason,
            })?;

        let previous = self.reflector.get_property(self.instance, name)?;
        if previous != converted {
            self.reflector.mark_dirty(self.instance, name, previous);
        }
        self.reflector.set_property(self.instance, name, converted)
    }

    pub fn set_property_no_conversion(&mut self, name: &str, value: Value) -> Result<()> {
        self.reflector.set_property(self.instance, name, value)
    }

    pub fn identifier(&self) -> Result<Value> {
        self.reflector.get_identifier(self.instance)
    }

    /// Converts and writes a single identifier. Composite identifiers are
    /// converted member by member.
    pub fn set_identifier(&mut self, value: Value) -> Result<()> {
        let converted = match (self.reflector.identifier_type(), value) {
            (Some(declared), value) => {
                declared
                    .convert(value.clone())
                    .map_err(|reason| MappingError::InvalidPropertyValue {
                        property: self.reflector.identifier_name().unwrap_or_default().to_string(),
                        declared_type: declared.to_string(),
                        class: self.entity.name().to_string(),
                        value: value.to_string(),
                        reason,
                    })?
            }
            (None, Value::List(values)) => Value::List(self.convert_composite(values)?),
            (None, other) => other,
        };
        self.reflector.set_identifier(self.instance, converted)
    }

    fn convert_composite(&self, values: Vec<Value>) -> Result<Vec<Value>> {
        let Some(members) = self.entity.composite_identity() else {
            return Ok(values);
        };
        if members.len() != values.len() {
            return Ok(values);
        }
        members
            .iter()
            .zip(values)
            .map(|(member, value)| {
                member
                    .data_type()
                    .convert(value.clone())
                    .map_err(|reason| MappingError::InvalidPropertyValue {
                        property: member.name().to_string(),
                        declared_type: member.data_type().to_string(),
                        class: self.entity.name().to_string(),
                        value: value.to_string(),
                        reason,
                    })
            })
            .collect()
    }

    pub fn set_identifier_no_conversion(&mut self, value: Value) -> Result<()> {
        self.reflector.set_identifier(self.instance, value)
    }

    /// Changed properties with their previous values, if the class tracks changes.
    pub fn dirty_checking_state(&self) -> Option<std::collections::BTreeMap<String, Value>> {
        self.reflector.dirty_checking_state(self.instance)
    }

    pub fn is_dirty(&self, name: &str) -> bool {
        self.dirty_checking_state()
            .is_some_and(|state| state.contains_key(name))
    }
}
