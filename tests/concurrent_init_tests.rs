/// Concurrent Initialization Tests
///
/// Entities and reflectors initialized from many threads at once
/// Run with: cargo test --test concurrent_init_tests

use persistmodel::{
    ClassDescriptor, DataType, MappingContext, MappingSettings, ReflectorCache, Value,
};
use std::sync::{Arc, Barrier};
use std::thread;

const THREADS: usize = 8;

fn fleet_classes() -> Vec<Arc<ClassDescriptor>> {
    vec![
        Arc::new(
            ClassDescriptor::builder("fleet.Vehicle")
                .entity()
                .field("id", DataType::Long)
                .field("version", DataType::Long)
                .field("make", DataType::Text)
                .build(),
        ),
        Arc::new(
            ClassDescriptor::builder("fleet.Truck")
                .entity()
                .extends("fleet.Vehicle")
                .field("payload", DataType::Float)
                .build(),
        ),
        Arc::new(
            ClassDescriptor::builder("fleet.Van")
                .entity()
                .extends("fleet.Vehicle")
                .field("seats", DataType::Integer)
                .build(),
        ),
    ]
}

fn register_hierarchy(ctx: &MappingContext, classes: &[Arc<ClassDescriptor>]) {
    for class in classes {
        ctx.register_class(Arc::clone(class)).unwrap();
    }
}

#[test]
fn test_concurrent_initialization_converges() {
    let ctx = Arc::new(MappingContext::isolated(MappingSettings::default()));
    register_hierarchy(&ctx, &fleet_classes());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let name = if i % 2 == 0 { "fleet.Truck" } else { "fleet.Van" };
                barrier.wait();
                let entity = ctx.add_persistent_entity_named(name).unwrap();
                assert!(entity.is_initialized());
                assert!(entity.is_versioned());
                let reflector = entity.reflector().unwrap();
                (entity, reflector)
            })
        })
        .collect();

    let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for (entity, reflector) in &results {
        let same = ctx.persistent_entity(entity.name()).unwrap();
        assert!(Arc::ptr_eq(entity, &same));
        assert!(Arc::ptr_eq(reflector, &same.reflector().unwrap()));
        assert_eq!(entity.parent_entity().unwrap().name(), "fleet.Vehicle");
    }

    assert_eq!(ctx.persistent_entities().len(), 3);
    assert_eq!(ctx.reflector_cache().len(), 3);
    assert_eq!(ctx.reflector_cache().build_count(), 3);
}

#[test]
fn test_racing_contexts_publish_one_reflector() {
    let cache = Arc::new(ReflectorCache::new());
    let classes = Arc::new(fleet_classes());
    let barrier = Arc::new(Barrier::new(THREADS));

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let classes = Arc::clone(&classes);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                let ctx = MappingContext::with_reflector_cache(MappingSettings::default(), cache);
                register_hierarchy(&ctx, &classes);
                barrier.wait();
                ctx.add_persistent_entity_named("fleet.Vehicle")
                    .and_then(|entity| entity.reflector())
                    .unwrap()
            })
        })
        .collect();

    let reflectors: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    let published = cache.get("fleet.Vehicle").unwrap().unwrap();

    for reflector in &reflectors {
        assert!(Arc::ptr_eq(reflector, &published));
    }
    assert_eq!(cache.len(), 1);
    assert!(cache.build_count() >= 1);
    assert!(cache.build_count() <= THREADS);
}

#[test]
fn test_entity_shared_across_threads_reads_consistently() {
    let ctx = Arc::new(MappingContext::isolated(MappingSettings::default()));
    register_hierarchy(&ctx, &fleet_classes());
    let truck = ctx.add_persistent_entity_named("fleet.Truck").unwrap();

    let handles: Vec<_> = (0..THREADS)
        .map(|i| {
            let ctx = Arc::clone(&ctx);
            let truck = Arc::clone(&truck);
            thread::spawn(move || {
                let mut obj = truck.new_instance().unwrap();
                let mut access = ctx.entity_access(&mut obj).unwrap();
                access.set_identifier(Value::from(i as i64)).unwrap();
                access
                    .set_property("payload", Value::from("12.5"))
                    .unwrap();
                (
                    access.identifier().unwrap(),
                    access.get_property("payload").unwrap(),
                )
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let (id, payload) = handle.join().unwrap();
        assert_eq!(id, Value::Integer(i as i64));
        assert_eq!(payload, Value::Float(12.5));
    }
}
