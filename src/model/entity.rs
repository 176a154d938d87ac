// ============================================================================
// Persistent Entity
// ============================================================================
//
// Runtime metamodel of one mapped class. An entity is registered empty and
// populated exactly once by initialize(). Initialization is guarded by a
// small state machine:
//
//   Uninitialized ──initialize──> Initializing(thread) ──ok──> Ready
//         ^                              │
//         └────────────error─────────────┘
//
// Threads racing on the same entity wait for the initializing thread.
// Re-entry from the initializing thread itself is a configuration error.
//
// ============================================================================

use super::{ClassDescriptor, Instance, MappingContext, PersistentProperty, VERSION};
use crate::core::{DataType, MappingError, Result};
use crate::mapping::EntityMapping;
use crate::reflect::{EntityReflector, naming};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock};
use std::thread::{self, ThreadId};
use tracing::{Level, event, info_span};

/// Resolved identity of an entity.
#[derive(Debug, Clone)]
pub enum EntityIdentity {
    Single(Arc<PersistentProperty>),
    /// Ordered members, at least two
    Composite(Vec<Arc<PersistentProperty>>),
}

impl EntityIdentity {
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::Single(p) => vec![p.name()],
            Self::Composite(members) => members.iter().map(|p| p.name()).collect(),
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, Self::Composite(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InitState {
    Uninitialized,
    Initializing(ThreadId),
    Ready,
}

/// Everything resolved by `initialize`. Published once, read-only afterwards.
struct EntityModel {
    mapping: EntityMapping,
    mapping_strategy: String,
    owners: Vec<String>,
    parent: Option<Arc<PersistentEntity>>,
    properties: Vec<Arc<PersistentProperty>>,
    property_names: Vec<String>,
    by_name: HashMap<String, Arc<PersistentProperty>>,
    by_mapped_name: HashMap<String, Arc<PersistentProperty>>,
    associations: Vec<Arc<PersistentProperty>>,
    embedded: Vec<Arc<PersistentProperty>>,
    identity: EntityIdentity,
    version: Option<Arc<PersistentProperty>>,
    tenant_id: Option<Arc<PersistentProperty>>,
    reflector: Arc<EntityReflector>,
}

/// Runtime metamodel of a mapped class.
pub struct PersistentEntity {
    class: Arc<ClassDescriptor>,
    state: Mutex<InitState>,
    state_changed: Condvar,
    model: OnceLock<EntityModel>,
}

impl PersistentEntity {
    pub fn new(class: Arc<ClassDescriptor>) -> Self {
        Self {
            class,
            state: Mutex::new(InitState::Uninitialized),
            state_changed: Condvar::new(),
            model: OnceLock::new(),
        }
    }

    /// Populate the metamodel. Subsequent calls are no-ops.
    pub fn initialize(self: &Arc<Self>, context: &MappingContext) -> Result<()> {
        if !self.begin_initialization()? {
            return Ok(());
        }

        let mut guard = InitGuard {
            entity: &**self,
            completed: false,
        };

        let span = info_span!("entity.initialize", entity = %self.name());
        let _enter = span.enter();

        let model = self.build_model(context)?;
        // Only the thread holding Initializing reaches this point
        let _ = self.model.set(model);
        guard.completed = true;

        event!(Level::DEBUG, entity = %self.name(), "entity initialized");
        Ok(())
    }

    /// Returns true when the caller must run initialization.
    fn begin_initialization(&self) -> Result<bool> {
        let current = thread::current().id();
        let mut state = self.state.lock()?;
        loop {
            match *state {
                InitState::Ready => return Ok(false),
                InitState::Initializing(owner) if owner == current => {
                    return Err(MappingError::Configuration(format!(
                        "Cyclic initialization of entity [{}]",
                        self.name()
                    )));
                }
                InitState::Initializing(_) => {
                    state = self.state_changed.wait(state)?;
                }
                InitState::Uninitialized => {
                    *state = InitState::Initializing(current);
                    return Ok(true);
                }
            }
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, InitState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn build_model(self: &Arc<Self>, context: &MappingContext) -> Result<EntityModel> {
        let strategy = context.strategy();
        let hierarchy = context.hierarchy(self.name())?;

        let owners = strategy.owning_entities(&self.class, context);

        let parent = match self.class.superclass() {
            Some(superclass) => {
                let superclass = context.class(superclass)?;
                if strategy.is_persistent_entity(&superclass) {
                    Some(context.add_persistent_entity_named(superclass.name())?)
                } else {
                    None
                }
            }
            None => None,
        };

        let mapping = context.factory().entity_mapping(&hierarchy);
        let scanned = strategy.persistent_properties(self, &hierarchy, &mapping, context)?;

        let multi_tenancy =
            self.class.is_multi_tenant() && context.settings().multi_tenancy.is_discriminator();

        let mut identity: Option<Arc<PersistentProperty>> = None;
        let mut composite: Option<Vec<Arc<PersistentProperty>>> = None;
        let mut tenant_id = None;
        let mut properties = Vec::new();
        let mut property_names = Vec::new();
        let mut by_name = HashMap::new();
        let mut by_mapped_name = HashMap::new();
        let mut associations = Vec::new();
        let mut embedded = Vec::new();

        for property in scanned {
            let property = Arc::new(property);

            if multi_tenancy && property.is_tenant_id() {
                tenant_id = Some(Arc::clone(&property));
            }

            if property.is_identity() {
                if let Some(members) = composite.as_mut() {
                    members.push(Arc::clone(&property));
                } else if let Some(first) = identity.take() {
                    composite = Some(vec![first, Arc::clone(&property)]);
                } else {
                    identity = Some(Arc::clone(&property));
                }
            }

            if !property.is_one_to_many() {
                property_names.push(property.name().to_string());
            }
            if property.is_association() {
                associations.push(Arc::clone(&property));
            }
            if property.is_embedded() {
                embedded.push(Arc::clone(&property));
            }

            by_name.insert(property.name().to_string(), Arc::clone(&property));
            if let Some(target) = property.target_name() {
                if target != property.name() {
                    by_mapped_name.insert(target.to_string(), Arc::clone(&property));
                }
            }
            properties.push(property);
        }

        if identity.is_none() && composite.is_none() {
            if mapping.identifier_names().len() > 1 {
                let members = strategy.composite_identity(self, &hierarchy, &mapping, context)?;
                composite = Some(members.into_iter().map(Arc::new).collect());
            } else {
                let resolved = strategy.identity(self, &hierarchy, &mapping, context)?;
                identity = Some(Arc::new(resolved));
            }
        }

        if multi_tenancy && tenant_id.is_none() {
            return Err(MappingError::Configuration(format!(
                "Class [{}] is multi tenant but does not specify a tenant identifier property",
                self.name()
            )));
        }

        let mut version = None;
        if !mapping.is_external() && mapping.is_versioned() {
            match by_name.get(VERSION) {
                Some(property) if property.data_type().is_version_compatible() => {
                    version = Some(Arc::clone(property));
                }
                Some(property) => {
                    event!(
                        Level::DEBUG,
                        entity = %self.name(),
                        data_type = %property.data_type(),
                        "version property type is not version compatible, versioning disabled"
                    );
                }
                None => {
                    event!(
                        Level::DEBUG,
                        entity = %self.name(),
                        "no version property, versioning disabled"
                    );
                }
            }
        }

        let default_identifier = context.settings().default_identifier.clone();
        let mut unlisted: Vec<String> = Vec::new();
        let identity = match (identity, composite) {
            (_, Some(members)) => {
                for member in &members {
                    unlisted.push(member.name().to_string());
                }
                unlisted.push(default_identifier);
                EntityIdentity::Composite(members)
            }
            (Some(single), None) => {
                unlisted.push(single.name().to_string());
                if single.name() != default_identifier {
                    unlisted.push(default_identifier);
                }
                EntityIdentity::Single(single)
            }
            (None, None) => {
                return Err(MappingError::Configuration(format!(
                    "Class [{}] has no identity",
                    self.name()
                )));
            }
        };
        properties.retain(|p| !unlisted.iter().any(|name| name == p.name()));
        property_names.retain(|name| !unlisted.contains(name));
        associations.retain(|p| !unlisted.iter().any(|name| name == p.name()));
        embedded.retain(|p| !unlisted.iter().any(|name| name == p.name()));
        by_name.retain(|name, _| !unlisted.contains(name));
        by_mapped_name.retain(|_, p| !unlisted.iter().any(|name| name == p.name()));

        // Identity members stay reachable by name
        let members = match &identity {
            EntityIdentity::Single(single) => std::slice::from_ref(single),
            EntityIdentity::Composite(members) => members.as_slice(),
        };
        for member in members {
            by_name.insert(member.name().to_string(), Arc::clone(member));
            if let Some(target) = member.target_name() {
                if target != member.name() {
                    by_mapped_name.insert(target.to_string(), Arc::clone(member));
                }
            }
        }

        let reflector =
            context
                .reflector_cache()
                .get_or_build(&hierarchy, &properties, &identity, || {
                    EntityReflector::build(
                        &hierarchy,
                        &properties,
                        &identity,
                        Arc::clone(context.proxy_handler()),
                    )
                })?;

        let mapping_strategy = mapping
            .mapping_strategy
            .clone()
            .unwrap_or_else(|| context.settings().mapping_strategy.clone());

        Ok(EntityModel {
            mapping,
            mapping_strategy,
            owners,
            parent,
            properties,
            property_names,
            by_name,
            by_mapped_name,
            associations,
            embedded,
            identity,
            version,
            tenant_id,
            reflector,
        })
    }

    fn model(&self) -> Option<&EntityModel> {
        self.model.get()
    }

    fn require_model(&self) -> Result<&EntityModel> {
        self.model
            .get()
            .ok_or_else(|| MappingError::NotInitialized(self.name().to_string()))
    }

    pub fn is_initialized(&self) -> bool {
        self.model.get().is_some()
    }

    pub fn class(&self) -> &Arc<ClassDescriptor> {
        &self.class
    }

    /// Fully qualified class name
    pub fn name(&self) -> &str {
        self.class.name()
    }

    pub fn decapitalized_name(&self) -> String {
        naming::decapitalize(self.class.simple_name())
    }

    pub fn discriminator(&self) -> &str {
        self.class.simple_name()
    }

    pub fn mapping(&self) -> Option<&EntityMapping> {
        self.model().map(|m| &m.mapping)
    }

    pub fn mapping_strategy(&self) -> Option<&str> {
        self.model().map(|m| m.mapping_strategy.as_str())
    }

    pub fn parent_entity(&self) -> Option<Arc<PersistentEntity>> {
        self.model().and_then(|m| m.parent.clone())
    }

    pub fn root_entity(self: &Arc<Self>) -> Arc<PersistentEntity> {
        let mut root = Arc::clone(self);
        while let Some(parent) = root.parent_entity() {
            root = parent;
        }
        root
    }

    pub fn is_root(&self) -> bool {
        self.parent_entity().is_none()
    }

    pub fn owners(&self) -> &[String] {
        self.model().map(|m| m.owners.as_slice()).unwrap_or(&[])
    }

    pub fn is_owning_entity(&self, owner: &PersistentEntity) -> bool {
        self.owners().iter().any(|name| name == owner.name())
    }

    pub fn is_abstract(&self) -> bool {
        self.class.is_abstract()
    }

    pub fn is_external(&self) -> bool {
        self.model().is_some_and(|m| m.mapping.is_external())
    }

    pub fn is_multi_tenant(&self) -> bool {
        self.class.is_multi_tenant()
    }

    /// Persistent properties, excluding identity members.
    pub fn persistent_properties(&self) -> &[Arc<PersistentProperty>] {
        self.model().map(|m| m.properties.as_slice()).unwrap_or(&[])
    }

    /// Names of the persistent properties, excluding one-to-many associations.
    pub fn persistent_property_names(&self) -> &[String] {
        self.model().map(|m| m.property_names.as_slice()).unwrap_or(&[])
    }

    pub fn associations(&self) -> &[Arc<PersistentProperty>] {
        self.model().map(|m| m.associations.as_slice()).unwrap_or(&[])
    }

    pub fn embedded(&self) -> &[Arc<PersistentProperty>] {
        self.model().map(|m| m.embedded.as_slice()).unwrap_or(&[])
    }

    pub fn entity_identity(&self) -> Option<&EntityIdentity> {
        self.model().map(|m| &m.identity)
    }

    /// Single identity, if the entity is not composite.
    pub fn identity(&self) -> Option<&Arc<PersistentProperty>> {
        match self.entity_identity()? {
            EntityIdentity::Single(property) => Some(property),
            EntityIdentity::Composite(_) => None,
        }
    }

    pub fn composite_identity(&self) -> Option<&[Arc<PersistentProperty>]> {
        match self.entity_identity()? {
            EntityIdentity::Composite(members) => Some(members),
            EntityIdentity::Single(_) => None,
        }
    }

    pub fn is_identity_name(&self, name: &str) -> bool {
        self.entity_identity()
            .is_some_and(|identity| identity.names().contains(&name))
    }

    pub fn version(&self) -> Option<&Arc<PersistentProperty>> {
        self.model().and_then(|m| m.version.as_ref())
    }

    /// True when optimistic locking is active for this entity.
    pub fn is_versioned(&self) -> bool {
        self.version().is_some()
    }

    pub fn tenant_id(&self) -> Option<&Arc<PersistentProperty>> {
        self.model().and_then(|m| m.tenant_id.as_ref())
    }

    /// Property by name, falling back to its external target name.
    pub fn property_by_name(&self, name: &str) -> Option<&Arc<PersistentProperty>> {
        let model = self.model()?;
        model
            .by_name
            .get(name)
            .or_else(|| model.by_mapped_name.get(name))
    }

    /// True if a persistent property or bean member `name` has type `data_type`.
    pub fn has_property(&self, name: &str, data_type: &DataType) -> bool {
        if let Some(property) = self.property_by_name(name) {
            return property.data_type() == data_type;
        }
        self.class
            .field(name)
            .map(|f| &f.data_type)
            .or_else(|| self.class.getter(name).map(|m| &m.data_type))
            .is_some_and(|t| t == data_type)
    }

    pub fn reflector(&self) -> Result<Arc<EntityReflector>> {
        Ok(Arc::clone(&self.require_model()?.reflector))
    }

    pub fn new_instance(&self) -> Result<Instance> {
        self.class.new_instance()
    }

    /// True if `obj` (after proxy unwrapping) is of this entity's class or a subclass.
    pub fn is_instance(&self, obj: &Instance, context: &MappingContext) -> bool {
        let obj = context.proxy_handler().unwrap(obj);
        if obj.class_name() == self.name() {
            return true;
        }
        context
            .hierarchy(obj.class_name())
            .map(|hierarchy| hierarchy.iter().any(|class| class.name() == self.name()))
            .unwrap_or(false)
    }
}

impl fmt::Debug for PersistentEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PersistentEntity")
            .field("name", &self.name())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

impl fmt::Display for PersistentEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Settles the init state when `initialize` returns or unwinds.
struct InitGuard<'a> {
    entity: &'a PersistentEntity,
    completed: bool,
}

impl Drop for InitGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.entity.lock_state();
        *state = if self.completed {
            InitState::Ready
        } else {
            InitState::Uninitialized
        };
        self.entity.state_changed.notify_all();
    }
}
