// ============================================================================
// Entity Reflector
// ============================================================================
//
// Compiled accessor set of one entity. Accessors are resolved once per
// property in this order:
//
//   1. a field of the property's name (paired with the bean getter/setter
//      when declared, reads and writes go through the field)
//   2. the bean getter/setter pair
//   3. for getters bridged from a composed trait, the synthesized trait
//      field, falling back to the methods when that field is absent
//
// Positional pairs follow the entity's persistent property order. The name
// index also covers identity members.
//
// ============================================================================

use super::accessor::{AccessorPair, PropertyReader, PropertyWriter};
use super::naming;
use crate::core::{DataType, MappingError, Result, Value};
use crate::model::{
    ClassDescriptor, EntityIdentity, FieldDef, Instance, MethodDef, PersistentProperty,
    ProxyHandler,
};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::{Level, event};

#[derive(Debug, Clone)]
struct IdentifierAccess {
    name: String,
    data_type: DataType,
    pair: AccessorPair,
}

pub struct EntityReflector {
    entity_name: String,
    pairs: Vec<AccessorPair>,
    property_names: Vec<String>,
    by_name: HashMap<String, AccessorPair>,
    identifier: Option<IdentifierAccess>,
    composite: Option<Vec<IdentifierAccess>>,
    dirty_field: Option<String>,
    proxy_handler: Arc<dyn ProxyHandler>,
}

impl EntityReflector {
    /// Compile accessors for `properties` of the last class in `hierarchy`.
    pub fn build(
        hierarchy: &[Arc<ClassDescriptor>],
        properties: &[Arc<PersistentProperty>],
        identity: &EntityIdentity,
        proxy_handler: Arc<dyn ProxyHandler>,
    ) -> Result<Self> {
        let entity_name = hierarchy
            .last()
            .map(|class| class.name().to_string())
            .ok_or_else(|| MappingError::Configuration("Empty class hierarchy".to_string()))?;

        let mut pairs = Vec::with_capacity(properties.len());
        let mut property_names = Vec::with_capacity(properties.len());
        let mut by_name = HashMap::new();

        for property in properties {
            let pair = resolve_pair(hierarchy, &entity_name, property)?;
            by_name.insert(property.name().to_string(), pair.clone());
            property_names.push(property.name().to_string());
            pairs.push(pair);
        }

        let mut identifier_access = |property: &Arc<PersistentProperty>| -> Result<IdentifierAccess> {
            let pair = resolve_pair(hierarchy, &entity_name, property)?;
            by_name.insert(property.name().to_string(), pair.clone());
            Ok(IdentifierAccess {
                name: property.name().to_string(),
                data_type: property.data_type().clone(),
                pair,
            })
        };

        let (identifier, composite) = match identity {
            EntityIdentity::Single(property) => (Some(identifier_access(property)?), None),
            EntityIdentity::Composite(members) => {
                let members = members
                    .iter()
                    .map(&mut identifier_access)
                    .collect::<Result<Vec<_>>>()?;
                (None, Some(members))
            }
        };

        let dirty_state = naming::dirty_state_field();
        let dirty_field = find_field(hierarchy, &dirty_state).map(|f| f.name.clone());

        event!(
            Level::DEBUG,
            entity = %entity_name,
            properties = pairs.len(),
            dirty_checking = dirty_field.is_some(),
            "compiled entity reflector"
        );

        Ok(Self {
            entity_name,
            pairs,
            property_names,
            by_name,
            identifier,
            composite,
            dirty_field,
            proxy_handler,
        })
    }

    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Names in positional order
    pub fn property_names(&self) -> &[String] {
        &self.property_names
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn identifier_name(&self) -> Option<&str> {
        self.identifier.as_ref().map(|id| id.name.as_str())
    }

    pub fn identifier_type(&self) -> Option<&DataType> {
        self.identifier.as_ref().map(|id| &id.data_type)
    }

    /// Whether positional pairs and identifier accessors line up with
    /// `properties` and `identity`.
    pub fn is_compiled_for(
        &self,
        properties: &[Arc<PersistentProperty>],
        identity: &EntityIdentity,
    ) -> bool {
        let same_properties = self.property_names.len() == properties.len()
            && self
                .property_names
                .iter()
                .zip(properties)
                .all(|(name, property)| name == property.name());
        let same_identity = match identity {
            EntityIdentity::Single(property) => self.identifier_name() == Some(property.name()),
            EntityIdentity::Composite(_) => {
                self.composite_identifier_names() == Some(identity.names())
            }
        };
        same_properties && same_identity
    }

    pub fn composite_identifier_names(&self) -> Option<Vec<&str>> {
        self.composite
            .as_ref()
            .map(|members| members.iter().map(|m| m.name.as_str()).collect())
    }

    pub fn identifier_reader(&self) -> Option<&PropertyReader> {
        self.identifier.as_ref().map(|id| id.pair.reader.as_ref())
    }

    pub fn identifier_writer(&self) -> Option<&PropertyWriter> {
        self.identifier
            .as_ref()
            .and_then(|id| id.pair.writer.as_deref())
    }

    pub fn property_reader(&self, name: &str) -> Result<&PropertyReader> {
        self.pair(name).map(|pair| pair.reader.as_ref())
    }

    pub fn property_writer(&self, name: &str) -> Result<&PropertyWriter> {
        self.pair(name)?
            .writer
            .as_deref()
            .ok_or_else(|| MappingError::ReadOnlyProperty {
                property: name.to_string(),
                class: self.entity_name.clone(),
            })
    }

    pub fn reader_at(&self, index: usize) -> Result<&PropertyReader> {
        self.pair_at(index).map(|pair| pair.reader.as_ref())
    }

    pub fn writer_at(&self, index: usize) -> Result<&PropertyWriter> {
        let pair = self.pair_at(index)?;
        pair.writer
            .as_deref()
            .ok_or_else(|| MappingError::ReadOnlyProperty {
                property: pair.reader.property_name().to_string(),
                class: self.entity_name.clone(),
            })
    }

    fn pair(&self, name: &str) -> Result<&AccessorPair> {
        self.by_name
            .get(name)
            .ok_or_else(|| MappingError::UnknownProperty {
                property: name.to_string(),
                class: self.entity_name.clone(),
            })
    }

    fn pair_at(&self, index: usize) -> Result<&AccessorPair> {
        self.pairs
            .get(index)
            .ok_or_else(|| MappingError::InvalidPropertyIndex {
                index,
                len: self.pairs.len(),
                class: self.entity_name.clone(),
            })
    }

    pub fn get_property(&self, obj: &Instance, name: &str) -> Result<Value> {
        self.property_reader(name)?
            .read(self.proxy_handler.unwrap(obj))
    }

    /// Writes without conversion.
    pub fn set_property(&self, obj: &mut Instance, name: &str, value: Value) -> Result<()> {
        self.property_writer(name)?
            .write(self.proxy_handler.unwrap_mut(obj), value)
    }

    pub fn get_property_at(&self, obj: &Instance, index: usize) -> Result<Value> {
        self.reader_at(index)?.read(self.proxy_handler.unwrap(obj))
    }

    pub fn set_property_at(&self, obj: &mut Instance, index: usize, value: Value) -> Result<()> {
        self.writer_at(index)?
            .write(self.proxy_handler.unwrap_mut(obj), value)
    }

    /// Identifier value; a list of member values for composite identities.
    pub fn get_identifier(&self, obj: &Instance) -> Result<Value> {
        let obj = self.proxy_handler.unwrap(obj);
        if let Some(id) = &self.identifier {
            return id.pair.reader.read(obj);
        }
        match &self.composite {
            Some(members) => members
                .iter()
                .map(|m| m.pair.reader.read(obj))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            None => Ok(Value::Null),
        }
    }

    /// Writes the identifier without conversion. Composite identities take a
    /// list with one value per member.
    pub fn set_identifier(&self, obj: &mut Instance, value: Value) -> Result<()> {
        let obj = self.proxy_handler.unwrap_mut(obj);
        if let Some(id) = &self.identifier {
            return self.identifier_member_writer(id)?.write(obj, value);
        }
        let Some(members) = &self.composite else {
            return Ok(());
        };
        match value {
            Value::List(values) if values.len() == members.len() => {
                for (member, value) in members.iter().zip(values) {
                    self.identifier_member_writer(member)?.write(obj, value)?;
                }
                Ok(())
            }
            other => Err(MappingError::InvalidPropertyValue {
                property: members
                    .iter()
                    .map(|m| m.name.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
                declared_type: format!("COMPOSITE<{}>", members.len()),
                class: self.entity_name.clone(),
                value: other.to_string(),
                reason: format!("expected a list of {} values", members.len()),
            }),
        }
    }

    fn identifier_member_writer<'a>(&self, id: &'a IdentifierAccess) -> Result<&'a PropertyWriter> {
        id.pair
            .writer
            .as_deref()
            .ok_or_else(|| MappingError::ReadOnlyProperty {
                property: id.name.clone(),
                class: self.entity_name.clone(),
            })
    }

    /// Member values of a composite identity, `None` for single identities.
    pub fn composite_identifier(&self, obj: &Instance) -> Result<Option<Vec<Value>>> {
        let Some(members) = &self.composite else {
            return Ok(None);
        };
        let obj = self.proxy_handler.unwrap(obj);
        members
            .iter()
            .map(|m| m.pair.reader.read(obj))
            .collect::<Result<Vec<_>>>()
            .map(Some)
    }

    pub fn is_dirty_checkable(&self) -> bool {
        self.dirty_field.is_some()
    }

    /// Changed properties with their previous values. `None` when the class
    /// does not track changes.
    pub fn dirty_checking_state(&self, obj: &Instance) -> Option<BTreeMap<String, Value>> {
        let field = self.dirty_field.as_ref()?;
        match self.proxy_handler.unwrap(obj).get(field) {
            Value::Map(entries) => Some(entries),
            _ => Some(BTreeMap::new()),
        }
    }

    /// Records `property` as changed, keeping the first previous value.
    /// Returns false when the class does not track changes.
    pub fn mark_dirty(&self, obj: &mut Instance, property: &str, previous: Value) -> bool {
        let Some(field) = &self.dirty_field else {
            return false;
        };
        let obj = self.proxy_handler.unwrap_mut(obj);
        let mut changed = match obj.get(field) {
            Value::Map(entries) => entries,
            _ => BTreeMap::new(),
        };
        changed.entry(property.to_string()).or_insert(previous);
        obj.set(field, Value::Map(changed));
        true
    }

    pub fn proxy_handler(&self) -> &Arc<dyn ProxyHandler> {
        &self.proxy_handler
    }
}

impl fmt::Debug for EntityReflector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityReflector")
            .field("entity", &self.entity_name)
            .field("properties", &self.property_names)
            .field("identifier", &self.identifier_name())
            .field("dirty_field", &self.dirty_field)
            .finish()
    }
}

fn find_field<'h>(hierarchy: &'h [Arc<ClassDescriptor>], name: &str) -> Option<&'h FieldDef> {
    hierarchy.iter().rev().find_map(|class| class.field(name))
}

fn find_getter<'h>(hierarchy: &'h [Arc<ClassDescriptor>], property: &str) -> Option<&'h MethodDef> {
    hierarchy.iter().rev().find_map(|class| class.getter(property))
}

fn find_setter<'h>(hierarchy: &'h [Arc<ClassDescriptor>], property: &str) -> Option<&'h MethodDef> {
    hierarchy.iter().rev().find_map(|class| class.setter(property))
}

fn field_pair(
    property: &PersistentProperty,
    field: &str,
    getter: Option<&MethodDef>,
    setter: Option<&MethodDef>,
) -> AccessorPair {
    AccessorPair {
        reader: Arc::new(PropertyReader::Field {
            property: property.name().to_string(),
            field: field.to_string(),
            data_type: property.data_type().clone(),
            getter: getter.and_then(|m| m.getter()).cloned(),
        }),
        writer: Some(Arc::new(PropertyWriter::Field {
            property: property.name().to_string(),
            field: field.to_string(),
            data_type: property.data_type().clone(),
            setter: setter.and_then(|m| m.setter()).cloned(),
        })),
    }
}

fn resolve_pair(
    hierarchy: &[Arc<ClassDescriptor>],
    entity_name: &str,
    property: &PersistentProperty,
) -> Result<AccessorPair> {
    let name = property.name();
    let getter = find_getter(hierarchy, name);
    let setter = find_setter(hierarchy, name);

    if let Some(field) = find_field(hierarchy, name) {
        return Ok(field_pair(property, &field.name, getter, setter));
    }

    let Some(getter_method) = getter else {
        return Err(MappingError::Configuration(format!(
            "No field or getter for property [{}] of class [{}]",
            name, entity_name
        )));
    };

    if let Some(trait_name) = getter_method.trait_name() {
        let mangled = naming::trait_field_name(trait_name, name);
        if let Some(field) = find_field(hierarchy, &mangled) {
            return Ok(field_pair(property, &field.name, getter, setter));
        }
        event!(
            Level::DEBUG,
            entity = %entity_name,
            property = %name,
            field = %mangled,
            "trait field not found, using accessor methods"
        );
    }

    let reader = getter_method
        .getter()
        .cloned()
        .map(|getter| PropertyReader::Method {
            property: name.to_string(),
            data_type: property.data_type().clone(),
            getter,
        })
        .ok_or_else(|| {
            MappingError::Configuration(format!(
                "Getter [{}] of class [{}] has no body",
                getter_method.name, entity_name
            ))
        })?;

    let writer = setter
        .and_then(|m| m.setter())
        .cloned()
        .map(|setter| {
            Arc::new(PropertyWriter::Method {
                property: name.to_string(),
                data_type: property.data_type().clone(),
                setter,
            })
        });

    Ok(AccessorPair {
        reader: Arc::new(reader),
        writer,
    })
}
