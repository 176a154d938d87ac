use super::EntityReflector;
use crate::core::Result;
use crate::model::{ClassDescriptor, EntityIdentity, PersistentProperty};
use lazy_static::lazy_static;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

// Process-wide cache shared by every context that does not bring its own
lazy_static! {
    static ref GLOBAL_REFLECTORS: Arc<ReflectorCache> = Arc::new(ReflectorCache::new());
}

/// A published reflector and the class chain it was compiled from.
#[derive(Debug)]
struct CachedReflector {
    hierarchy: Vec<Weak<ClassDescriptor>>,
    reflector: Arc<EntityReflector>,
}

impl CachedReflector {
    /// Reusable only for the same class descriptors and the same property layout.
    fn matches(
        &self,
        hierarchy: &[Arc<ClassDescriptor>],
        properties: &[Arc<PersistentProperty>],
        identity: &EntityIdentity,
    ) -> bool {
        self.hierarchy.len() == hierarchy.len()
            && self
                .hierarchy
                .iter()
                .zip(hierarchy)
                .all(|(cached, class)| Weak::ptr_eq(cached, &Arc::downgrade(class)))
            && self.reflector.is_compiled_for(properties, identity)
    }
}

/// Compiled reflectors keyed by entity name.
///
/// An entry is reused only by entities of the same class descriptors, so two
/// contexts describing the same name differently never share accessors.
/// Reflectors are built outside the lock and published with an
/// insert-if-absent, so threads racing on the first build all end up with
/// the same published instance.
#[derive(Debug, Default)]
pub struct ReflectorCache {
    reflectors: RwLock<HashMap<String, CachedReflector>>,
    builds: AtomicUsize,
}

impl ReflectorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> Arc<ReflectorCache> {
        Arc::clone(&GLOBAL_REFLECTORS)
    }

    pub fn get(&self, entity: &str) -> Result<Option<Arc<EntityReflector>>> {
        Ok(self
            .reflectors
            .read()?
            .get(entity)
            .map(|cached| Arc::clone(&cached.reflector)))
    }

    /// Reflector for the last class of `hierarchy`, compiled by `build` unless
    /// a matching one is already published.
    ///
    /// A published entry compiled from other descriptors is replaced.
    pub fn get_or_build<F>(
        &self,
        hierarchy: &[Arc<ClassDescriptor>],
        properties: &[Arc<PersistentProperty>],
        identity: &EntityIdentity,
        build: F,
    ) -> Result<Arc<EntityReflector>>
    where
        F: FnOnce() -> Result<EntityReflector>,
    {
        let Some(entity) = hierarchy.last().map(|class| class.name().to_string()) else {
            return Ok(Arc::new(build()?));
        };

        if let Some(existing) = self.reflectors.read()?.get(&entity) {
            if existing.matches(hierarchy, properties, identity) {
                return Ok(Arc::clone(&existing.reflector));
            }
        }

        let built = Arc::new(build()?);
        self.builds.fetch_add(1, Ordering::SeqCst);

        let mut reflectors = self.reflectors.write()?;
        if let Some(existing) = reflectors.get(&entity) {
            if existing.matches(hierarchy, properties, identity) {
                return Ok(Arc::clone(&existing.reflector));
            }
        }
        reflectors.insert(
            entity,
            CachedReflector {
                hierarchy: hierarchy.iter().map(Arc::downgrade).collect(),
                reflector: Arc::clone(&built),
            },
        );
        Ok(built)
    }

    /// Number of reflectors compiled by this cache, including discarded duplicates.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.reflectors.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove(&self, entity: &str) -> Result<Option<Arc<EntityReflector>>> {
        Ok(self
            .reflectors
            .write()?
            .remove(entity)
            .map(|cached| cached.reflector))
    }

    pub fn clear(&self) -> Result<()> {
        self.reflectors.write()?.clear();
        Ok(())
    }
}
