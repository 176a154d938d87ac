// ============================================================================
// Runtime Class Model
// ============================================================================
//
// Domain classes are described at runtime by a ClassDescriptor: declared
// fields, bean-style accessor methods and the markers the mapping layer
// looks at. Objects of a class are Instances holding one slot per field.
//
// Superclasses are referenced by name and resolved through the mapping
// context, so a broken hierarchy is detected there instead of here.
//
// ============================================================================

use crate::core::{DataType, MappingError, Result, Value};
use crate::mapping::EntityMapping;
use crate::reflect::naming;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Body of a getter method.
pub type GetterFn = Arc<dyn Fn(&Instance) -> Result<Value> + Send + Sync>;

/// Body of a setter method.
pub type SetterFn = Arc<dyn Fn(&mut Instance, Value) -> Result<()> + Send + Sync>;

/// A declared field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldDef {
    pub name: String,
    pub data_type: DataType,
    /// Carries the identity marker
    pub identity: bool,
    /// Carries the tenant-id marker
    pub tenant_id: bool,
    pub transient: bool,
}

impl FieldDef {
    pub fn new(name: &str, data_type: DataType) -> Self {
        Self {
            name: name.to_string(),
            data_type,
            identity: false,
            tenant_id: false,
            transient: false,
        }
    }
}

/// Where a method comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodOrigin {
    /// Declared directly on the class
    Declared,
    /// Bridge generated in the class for a method of a composed trait
    TraitBridge { trait_name: String },
    /// Implementation inherited from a composed type
    TraitImplemented { declaring_type: String },
}

#[derive(Clone)]
pub enum MethodBody {
    Getter(GetterFn),
    Setter(SetterFn),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Getter(_) => write!(f, "Getter(..)"),
            Self::Setter(_) => write!(f, "Setter(..)"),
        }
    }
}

/// A declared bean accessor method.
#[derive(Debug, Clone)]
pub struct MethodDef {
    pub name: String,
    /// Property this method reads or writes
    pub property: String,
    /// Return type for getters, parameter type for setters
    pub data_type: DataType,
    pub body: MethodBody,
    pub origin: MethodOrigin,
}

impl MethodDef {
    pub fn is_getter(&self) -> bool {
        matches!(self.body, MethodBody::Getter(_))
    }

    pub fn is_setter(&self) -> bool {
        matches!(self.body, MethodBody::Setter(_))
    }

    /// Trait whose synthesized field may back this method.
    pub fn trait_name(&self) -> Option<&str> {
        match &self.origin {
            MethodOrigin::TraitBridge { trait_name } => Some(trait_name),
            MethodOrigin::TraitImplemented { declaring_type } => Some(declaring_type),
            MethodOrigin::Declared => None,
        }
    }

    pub fn getter(&self) -> Option<&GetterFn> {
        match &self.body {
            MethodBody::Getter(f) => Some(f),
            MethodBody::Setter(_) => None,
        }
    }

    pub fn setter(&self) -> Option<&SetterFn> {
        match &self.body {
            MethodBody::Setter(f) => Some(f),
            MethodBody::Getter(_) => None,
        }
    }
}

/// Runtime description of a domain class.
#[derive(Debug, Clone)]
pub struct ClassDescriptor {
    name: String,
    superclass: Option<String>,
    entity: bool,
    is_abstract: bool,
    multi_tenant: bool,
    default_constructor: bool,
    dirty_checkable: bool,
    fields: Vec<FieldDef>,
    methods: Vec<MethodDef>,
    belongs_to: Vec<String>,
    mapping: Option<EntityMapping>,
}

impl ClassDescriptor {
    pub fn builder(name: &str) -> ClassBuilder {
        ClassBuilder::new(name)
    }

    /// Fully qualified name
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simple_name(&self) -> &str {
        naming::simple_name(&self.name)
    }

    pub fn superclass(&self) -> Option<&str> {
        self.superclass.as_deref()
    }

    /// Carries the entity marker
    pub fn is_entity(&self) -> bool {
        self.entity
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.multi_tenant
    }

    pub fn has_default_constructor(&self) -> bool {
        self.default_constructor
    }

    pub fn is_dirty_checkable(&self) -> bool {
        self.dirty_checkable
    }

    pub fn fields(&self) -> &[FieldDef] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn methods(&self) -> &[MethodDef] {
        &self.methods
    }

    pub fn method(&self, name: &str) -> Option<&MethodDef> {
        self.methods.iter().find(|m| m.name == name)
    }

    /// Bean getter of `property` (`getX`, or `isX` for booleans).
    pub fn getter(&self, property: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.is_getter() && m.property == property)
    }

    pub fn setter(&self, property: &str) -> Option<&MethodDef> {
        self.methods
            .iter()
            .find(|m| m.is_setter() && m.property == property)
    }

    /// Owning entity names declared through `belongs_to`
    pub fn belongs_to(&self) -> &[String] {
        &self.belongs_to
    }

    /// Static mapping block of this class only
    pub fn mapping(&self) -> Option<&EntityMapping> {
        self.mapping.as_ref()
    }

    /// Instantiate through the default constructor.
    pub fn new_instance(self: &Arc<Self>) -> Result<Instance> {
        if self.is_abstract {
            return Err(MappingError::EntityCreation {
                class: self.name.clone(),
                cause: "class is abstract".to_string(),
            });
        }
        if !self.default_constructor {
            return Err(MappingError::EntityCreation {
                class: self.name.clone(),
                cause: "no default constructor".to_string(),
            });
        }

        let mut instance = Instance::new(Arc::clone(self));
        if self.dirty_checkable {
            instance.set(&naming::dirty_state_field(), Value::Map(BTreeMap::new()));
        }
        Ok(instance)
    }
}

/// Builder for [`ClassDescriptor`].
pub struct ClassBuilder {
    class: ClassDescriptor,
}

impl ClassBuilder {
    fn new(name: &str) -> Self {
        Self {
            class: ClassDescriptor {
                name: name.to_string(),
                superclass: None,
                entity: false,
                is_abstract: false,
                multi_tenant: false,
                default_constructor: true,
                dirty_checkable: false,
                fields: Vec::new(),
                methods: Vec::new(),
                belongs_to: Vec::new(),
                mapping: None,
            },
        }
    }

    pub fn entity(mut self) -> Self {
        self.class.entity = true;
        self
    }

    pub fn extends(mut self, superclass: &str) -> Self {
        self.class.superclass = Some(superclass.to_string());
        self
    }

    pub fn abstract_class(mut self) -> Self {
        self.class.is_abstract = true;
        self
    }

    pub fn multi_tenant(mut self) -> Self {
        self.class.multi_tenant = true;
        self
    }

    pub fn no_default_constructor(mut self) -> Self {
        self.class.default_constructor = false;
        self
    }

    /// Adds the change-tracking state field.
    pub fn dirty_checkable(mut self) -> Self {
        self.class.dirty_checkable = true;
        self.class
            .fields
            .push(FieldDef::new(&naming::dirty_state_field(), DataType::Map));
        self
    }

    pub fn field(mut self, name: &str, data_type: DataType) -> Self {
        self.class.fields.push(FieldDef::new(name, data_type));
        self
    }

    pub fn identity_field(mut self, name: &str, data_type: DataType) -> Self {
        let mut field = FieldDef::new(name, data_type);
        field.identity = true;
        self.class.fields.push(field);
        self
    }

    pub fn tenant_field(mut self, name: &str, data_type: DataType) -> Self {
        let mut field = FieldDef::new(name, data_type);
        field.tenant_id = true;
        self.class.fields.push(field);
        self
    }

    pub fn transient_field(mut self, name: &str, data_type: DataType) -> Self {
        let mut field = FieldDef::new(name, data_type);
        field.transient = true;
        self.class.fields.push(field);
        self
    }

    /// Declared getter for `property`.
    pub fn getter<F>(self, property: &str, data_type: DataType, body: F) -> Self
    where
        F: Fn(&Instance) -> Result<Value> + Send + Sync + 'static,
    {
        self.getter_from(property, data_type, MethodOrigin::Declared, body)
    }

    pub fn getter_from<F>(
        mut self,
        property: &str,
        data_type: DataType,
        origin: MethodOrigin,
        body: F,
    ) -> Self
    where
        F: Fn(&Instance) -> Result<Value> + Send + Sync + 'static,
    {
        self.class.methods.push(MethodDef {
            name: naming::getter_name(property, &data_type),
            property: property.to_string(),
            data_type,
            body: MethodBody::Getter(Arc::new(body)),
            origin,
        });
        self
    }

    /// Declared setter for `property`.
    pub fn setter<F>(self, property: &str, data_type: DataType, body: F) -> Self
    where
        F: Fn(&mut Instance, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.setter_from(property, data_type, MethodOrigin::Declared, body)
    }

    pub fn setter_from<F>(
        mut self,
        property: &str,
        data_type: DataType,
        origin: MethodOrigin,
        body: F,
    ) -> Self
    where
        F: Fn(&mut Instance, Value) -> Result<()> + Send + Sync + 'static,
    {
        self.class.methods.push(MethodDef {
            name: naming::setter_name(property),
            property: property.to_string(),
            data_type,
            body: MethodBody::Setter(Arc::new(body)),
            origin,
        });
        self
    }

    /// Plain getter/setter pair over the field slot of the same name.
    pub fn bean_accessors(self, property: &str, data_type: DataType) -> Self {
        let read = property.to_string();
        let write = property.to_string();
        self.getter(property, data_type.clone(), move |obj| Ok(obj.get(&read)))
            .setter(property, data_type, move |obj, value| {
                obj.set(&write, value);
                Ok(())
            })
    }

    /// Property contributed by a composed trait: a synthesized backing field
    /// plus bridge accessors reading and writing it.
    pub fn trait_property(mut self, trait_name: &str, property: &str, data_type: DataType) -> Self {
        let field = naming::trait_field_name(trait_name, property);
        self.class.fields.push(FieldDef::new(&field, data_type.clone()));

        let origin = MethodOrigin::TraitBridge {
            trait_name: trait_name.to_string(),
        };
        let read = field.clone();
        self.getter_from(property, data_type.clone(), origin.clone(), move |obj| {
            Ok(obj.get(&read))
        })
        .setter_from(property, data_type, origin, move |obj, value| {
            obj.set(&field, value);
            Ok(())
        })
    }

    pub fn belongs_to(mut self, owner: &str) -> Self {
        self.class.belongs_to.push(owner.to_string());
        self
    }

    pub fn mapping(mut self, mapping: EntityMapping) -> Self {
        self.class.mapping = Some(mapping);
        self
    }

    pub fn build(self) -> ClassDescriptor {
        self.class
    }
}

/// An object of a [`ClassDescriptor`].
///
/// A proxy instance wraps its target; reflective access goes through the
/// proxy handler which unwraps it first.
#[derive(Debug, Clone)]
pub struct Instance {
    class: Arc<ClassDescriptor>,
    slots: BTreeMap<String, Value>,
    target: Option<Box<Instance>>,
}

impl Instance {
    pub(crate) fn new(class: Arc<ClassDescriptor>) -> Self {
        Self {
            class,
            slots: BTreeMap::new(),
            target: None,
        }
    }

    /// Wraps `target` in a proxy of the same class.
    pub fn proxy(target: Instance) -> Self {
        Self {
            class: Arc::clone(&target.class),
            slots: BTreeMap::new(),
            target: Some(Box::new(target)),
        }
    }

    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    pub fn class_name(&self) -> &str {
        self.class.name()
    }

    /// Raw slot read. Unset slots read as `Null`.
    pub fn get(&self, field: &str) -> Value {
        self.slots.get(field).cloned().unwrap_or(Value::Null)
    }

    /// Raw slot write, no conversion.
    pub fn set(&mut self, field: &str, value: Value) {
        self.slots.insert(field.to_string(), value);
    }

    pub fn slots(&self) -> &BTreeMap<String, Value> {
        &self.slots
    }

    pub fn is_proxy(&self) -> bool {
        self.target.is_some()
    }

    pub fn target(&self) -> Option<&Instance> {
        self.target.as_deref()
    }

    pub fn target_mut(&mut self) -> Option<&mut Instance> {
        self.target.as_deref_mut()
    }

    /// Innermost target of a proxy chain, or `self`.
    pub fn innermost_mut(&mut self) -> &mut Instance {
        match self.target {
            Some(ref mut target) => target.innermost_mut(),
            None => self,
        }
    }

    /// Snapshot of the slots as a JSON object.
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.slots
                .iter()
                .map(|(name, value)| (name.clone(), value.to_json()))
                .collect(),
        )
    }

    /// Restores an instance from a JSON object produced by [`Instance::to_json`].
    pub fn from_json(class: Arc<ClassDescriptor>, json: &serde_json::Value) -> Result<Self> {
        let serde_json::Value::Object(entries) = json else {
            return Err(MappingError::EntityCreation {
                class: class.name().to_string(),
                cause: "expected a JSON object".to_string(),
            });
        };

        let mut instance = Self::new(class);
        for (name, value) in entries {
            let value = match instance.class.field(name) {
                Some(field) => field.data_type.convert(Value::from_json(value)).map_err(|cause| {
                    MappingError::EntityCreation {
                        class: instance.class_name().to_string(),
                        cause: format!("field '{}': {}", name, cause),
                    }
                })?,
                None => Value::from_json(value),
            };
            instance.set(name, value);
        }
        Ok(instance)
    }
}
