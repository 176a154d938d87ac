use super::{
    ClassDescriptor, ConventionMappingStrategy, DefaultProxyHandler, Instance,
    MappingSyntaxStrategy, PersistentEntity, ProxyHandler,
};
use crate::config::MappingSettings;
use crate::core::{MappingError, Result};
use crate::mapping::MappingFactory;
use crate::reflect::{EntityAccess, EntityReflector, ReflectorCache};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

#[derive(Default)]
struct Registry {
    classes: HashMap<String, Arc<ClassDescriptor>>,
    entities: HashMap<String, Arc<PersistentEntity>>,
    /// Entity names in registration order
    order: Vec<String>,
}

/// Registry of classes and their persistent entities.
///
/// Entities are registered before they are initialized and no registry lock
/// is held while an entity initializes, so initialization may register and
/// initialize parent entities.
pub struct MappingContext {
    settings: MappingSettings,
    factory: MappingFactory,
    strategy: Arc<dyn MappingSyntaxStrategy>,
    proxy_handler: Arc<dyn ProxyHandler>,
    reflectors: Arc<ReflectorCache>,
    registry: RwLock<Registry>,
}

impl MappingContext {
    /// Context sharing the process-wide accessor cache.
    pub fn new(settings: MappingSettings) -> Self {
        Self::with_reflector_cache(settings, ReflectorCache::global())
    }

    /// Context with a private accessor cache.
    pub fn isolated(settings: MappingSettings) -> Self {
        Self::with_reflector_cache(settings, Arc::new(ReflectorCache::new()))
    }

    pub fn with_reflector_cache(settings: MappingSettings, reflectors: Arc<ReflectorCache>) -> Self {
        Self {
            factory: MappingFactory::new(settings.clone()),
            settings,
            strategy: Arc::new(ConventionMappingStrategy::new()),
            proxy_handler: Arc::new(DefaultProxyHandler),
            reflectors,
            registry: RwLock::new(Registry::default()),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn MappingSyntaxStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_proxy_handler(mut self, handler: Arc<dyn ProxyHandler>) -> Self {
        self.proxy_handler = handler;
        self
    }

    pub fn settings(&self) -> &MappingSettings {
        &self.settings
    }

    pub fn factory(&self) -> &MappingFactory {
        &self.factory
    }

    pub fn strategy(&self) -> &Arc<dyn MappingSyntaxStrategy> {
        &self.strategy
    }

    pub fn proxy_handler(&self) -> &Arc<dyn ProxyHandler> {
        &self.proxy_handler
    }

    pub fn reflector_cache(&self) -> &Arc<ReflectorCache> {
        &self.reflectors
    }

    /// Register (or replace) a class description.
    pub fn register_class(
        &self,
        class: impl Into<Arc<ClassDescriptor>>,
    ) -> Result<Arc<ClassDescriptor>> {
        let class: Arc<ClassDescriptor> = class.into();
        let mut registry = self.registry.write()?;
        registry
            .classes
            .insert(class.name().to_string(), Arc::clone(&class));
        Ok(class)
    }

    pub fn class(&self, name: &str) -> Result<Arc<ClassDescriptor>> {
        let registry = self.registry.read()?;
        registry
            .classes
            .get(name)
            .cloned()
            .ok_or_else(|| MappingError::Configuration(format!("Unknown class [{}]", name)))
    }

    /// Class hierarchy of `name`, root first.
    ///
    /// Fails on unknown superclasses and on cyclic superclass chains.
    pub fn hierarchy(&self, name: &str) -> Result<Vec<Arc<ClassDescriptor>>> {
        let registry = self.registry.read()?;
        let mut chain = Vec::new();
        let mut visited = HashSet::new();
        let mut current = Some(name.to_string());

        while let Some(class_name) = current {
            if !visited.insert(class_name.clone()) {
                return Err(MappingError::Configuration(format!(
                    "Cyclic class hierarchy for [{}] at [{}]",
                    name, class_name
                )));
            }
            let class = registry.classes.get(&class_name).ok_or_else(|| {
                MappingError::Configuration(format!(
                    "Invalid inheritance: class [{}] is not registered",
                    class_name
                ))
            })?;
            current = class.superclass().map(str::to_string);
            chain.push(Arc::clone(class));
        }

        chain.reverse();
        Ok(chain)
    }

    /// Register `class` and initialize its entity.
    pub fn add_persistent_entity(
        &self,
        class: impl Into<Arc<ClassDescriptor>>,
    ) -> Result<Arc<PersistentEntity>> {
        let class = self.register_class(class)?;
        self.add_persistent_entity_named(class.name())
    }

    /// Entity of the registered class `name`, created and initialized on first use.
    pub fn add_persistent_entity_named(&self, name: &str) -> Result<Arc<PersistentEntity>> {
        let entity = {
            let mut registry = self.registry.write()?;
            match registry.entities.get(name) {
                Some(existing) => Arc::clone(existing),
                None => {
                    let class = registry.classes.get(name).cloned().ok_or_else(|| {
                        MappingError::Configuration(format!("Unknown class [{}]", name))
                    })?;
                    if !self.strategy.is_persistent_entity(&class) {
                        return Err(MappingError::Configuration(format!(
                            "Class [{}] is not a persistent entity",
                            name
                        )));
                    }
                    let entity = Arc::new(PersistentEntity::new(class));
                    registry
                        .entities
                        .insert(name.to_string(), Arc::clone(&entity));
                    registry.order.push(name.to_string());
                    entity
                }
            }
        };

        entity.initialize(self)?;
        Ok(entity)
    }

    /// Registered entity, initialized or not.
    pub fn persistent_entity(&self, name: &str) -> Option<Arc<PersistentEntity>> {
        self.registry
            .read()
            .ok()
            .and_then(|registry| registry.entities.get(name).cloned())
    }

    /// All registered entities in registration order.
    pub fn persistent_entities(&self) -> Vec<Arc<PersistentEntity>> {
        let Ok(registry) = self.registry.read() else {
            return Vec::new();
        };
        registry
            .order
            .iter()
            .filter_map(|name| registry.entities.get(name).cloned())
            .collect()
    }

    /// Initialized entity for `name`.
    pub fn require_entity(&self, name: &str) -> Result<Arc<PersistentEntity>> {
        let entity = self
            .persistent_entity(name)
            .ok_or_else(|| MappingError::EntityNotFound(name.to_string()))?;
        entity.initialize(self)?;
        Ok(entity)
    }

    pub fn entity_reflector(&self, name: &str) -> Result<Arc<EntityReflector>> {
        self.require_entity(name)?.reflector()
    }

    /// Conversion-aware access to `instance` through its entity's accessors.
    pub fn entity_access<'a>(&self, instance: &'a mut Instance) -> Result<EntityAccess<'a>> {
        let name = self.proxy_handler.unwrap(instance).class_name().to_string();
        let entity = self.require_entity(&name)?;
        EntityAccess::new(entity, instance)
    }
}

impl Default for MappingContext {
    fn default() -> Self {
        Self::new(MappingSettings::default())
    }
}
