/// Accessor Tests
///
/// Compiled entity reflectors, conversion-aware access and the accessor cache
/// Run with: cargo test --test accessor_tests

use persistmodel::model::MethodOrigin;
use persistmodel::reflect::naming;
use persistmodel::{
    ClassDescriptor, DataType, EntityMapping, Instance, MappingContext, MappingError,
    MappingSettings, ReflectorCache, Value,
};
use std::sync::Arc;

fn context() -> MappingContext {
    MappingContext::isolated(MappingSettings::default())
}

fn book() -> ClassDescriptor {
    ClassDescriptor::builder("library.Book")
        .entity()
        .dirty_checkable()
        .field("id", DataType::Long)
        .field("title", DataType::Text)
        .field("pages", DataType::Integer)
        .field("price", DataType::Float)
        .field("published", DataType::Boolean)
        .getter("summary", DataType::Text, |obj| {
            Ok(Value::Text(format!("{} ({} pages)", obj.get("title"), obj.get("pages"))))
        })
        .build()
}

fn new_book(ctx: &MappingContext) -> Instance {
    ctx.add_persistent_entity(book()).unwrap();
    ctx.require_entity("library.Book").unwrap().new_instance().unwrap()
}

#[test]
fn test_set_property_converts_to_declared_type() {
    let ctx = context();
    let mut obj = new_book(&ctx);
    let mut access = ctx.entity_access(&mut obj).unwrap();

    access.set_property("pages", Value::from("320")).unwrap();
    access.set_property("price", Value::from(25)).unwrap();
    access.set_property("published", Value::from("true")).unwrap();
    access.set_property("title", Value::from("Dune")).unwrap();

    assert_eq!(access.get_property("pages").unwrap(), Value::Integer(320));
    assert_eq!(access.get_property("price").unwrap(), Value::Float(25.0));
    assert_eq!(access.get_property("published").unwrap(), Value::Boolean(true));
    assert_eq!(
        access.get_property("summary").unwrap(),
        Value::from("Dune (320 pages)")
    );
}

#[test]
fn test_set_property_rejects_unconvertible_value() {
    let ctx = context();
    let mut obj = new_book(&ctx);
    let mut access = ctx.entity_access(&mut obj).unwrap();

    let err = access.set_property("pages", Value::from("many")).unwrap_err();
    match err {
        MappingError::InvalidPropertyValue {
            property,
            declared_type,
            class,
            ..
        } => {
            assert_eq!(property, "pages");
            assert_eq!(declared_type, "INTEGER");
            assert_eq!(class, "library.Book");
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(access.get_property("pages").unwrap(), Value::Null);

    // Raw writes skip conversion
    access
        .set_property_no_conversion("pages", Value::from("many"))
        .unwrap();
    assert_eq!(access.get_property("pages").unwrap(), Value::from("many"));
}

#[test]
fn test_positional_and_named_access_agree() {
    let ctx = context();
    let mut obj = new_book(&ctx);
    let reflector = ctx.entity_reflector("library.Book").unwrap();

    reflector.set_property(&mut obj, "title", Value::from("Emma")).unwrap();
    reflector.set_property(&mut obj, "pages", Value::from(474)).unwrap();

    assert_eq!(
        reflector.property_names(),
        &["title", "pages", "price", "published", "summary"]
    );
    for (index, name) in reflector.property_names().iter().enumerate() {
        assert_eq!(
            reflector.get_property_at(&obj, index).unwrap(),
            reflector.get_property(&obj, name).unwrap()
        );
    }

    reflector.set_property_at(&mut obj, 2, Value::from(9.5)).unwrap();
    assert_eq!(reflector.get_property(&obj, "price").unwrap(), Value::Float(9.5));
}

#[test]
fn test_accessor_errors() {
    let ctx = context();
    let mut obj = new_book(&ctx);
    let reflector = ctx.entity_reflector("library.Book").unwrap();

    assert!(matches!(
        reflector.get_property(&obj, "isbn"),
        Err(MappingError::UnknownProperty { .. })
    ));
    assert!(matches!(
        reflector.get_property_at(&obj, reflector.len()),
        Err(MappingError::InvalidPropertyIndex { index: 5, len: 5, .. })
    ));

    let err = reflector
        .set_property(&mut obj, "summary", Value::from("nope"))
        .unwrap_err();
    assert!(matches!(err, MappingError::ReadOnlyProperty { .. }));
    assert_eq!(
        err.to_string(),
        "Property [summary] of class [library.Book] is read-only"
    );
}

#[test]
fn test_identifier_access() {
    let ctx = context();
    let mut obj = new_book(&ctx);
    let mut access = ctx.entity_access(&mut obj).unwrap();

    assert_eq!(access.reflector().identifier_name(), Some("id"));
    assert_eq!(access.reflector().identifier_type(), Some(&DataType::Long));
    assert_eq!(access.identifier().unwrap(), Value::Null);

    access.set_identifier(Value::from("42")).unwrap();
    assert_eq!(access.identifier().unwrap(), Value::Integer(42));

    assert!(matches!(
        access.set_identifier(Value::from("forty-two")),
        Err(MappingError::InvalidPropertyValue { .. })
    ));
    access.set_identifier_no_conversion(Value::from(7)).unwrap();
    assert_eq!(obj.get("id"), Value::Integer(7));
}

#[test]
fn test_composite_identifier_access() {
    let ctx = context();
    let entity = ctx
        .add_persistent_entity(
            ClassDescriptor::builder("shop.OrderLine")
                .entity()
                .field("orderId", DataType::Long)
                .field("productId", DataType::Text)
                .field("quantity", DataType::Integer)
                .mapping(EntityMapping::new().id(&["orderId", "productId"]))
                .build(),
        )
        .unwrap();
    let mut obj = entity.new_instance().unwrap();
    let mut access = ctx.entity_access(&mut obj).unwrap();

    assert_eq!(
        access.reflector().composite_identifier_names(),
        Some(vec!["orderId", "productId"])
    );
    assert!(access.reflector().identifier_name().is_none());

    access
        .set_identifier(Value::List(vec![Value::from("10"), Value::from("SKU-1")]))
        .unwrap();
    assert_eq!(
        access.identifier().unwrap(),
        Value::List(vec![Value::Integer(10), Value::from("SKU-1")])
    );

    let err = access
        .set_identifier(Value::List(vec![Value::from(1)]))
        .unwrap_err();
    assert!(matches!(err, MappingError::InvalidPropertyValue { .. }));

    let reflector = access.reflector().clone();
    assert_eq!(
        reflector.composite_identifier(&obj).unwrap(),
        Some(vec![Value::Integer(10), Value::from("SKU-1")])
    );
    assert_eq!(reflector.property_names(), &["quantity"]);
}

#[test]
fn test_dirty_checking_keeps_first_previous_value() {
    let ctx = context();
    let mut obj = new_book(&ctx);
    let mut access = ctx.entity_access(&mut obj).unwrap();
    assert!(access.reflector().is_dirty_checkable());
    assert_eq!(access.dirty_checking_state().unwrap().len(), 0);

    access.set_property("title", Value::from("Draft")).unwrap();
    access.set_property("title", Value::from("Final")).unwrap();
    access.set_property("pages", Value::Null).unwrap();

    let state = access.dirty_checking_state().unwrap();
    assert_eq!(state.get("title"), Some(&Value::Null));
    assert!(access.is_dirty("title"));
    assert!(!access.is_dirty("pages"));

    // The change-tracking field is not a persistent property
    let entity = access.entity().clone();
    assert!(entity.property_by_name(&naming::dirty_state_field()).is_none());
}

#[test]
fn test_classes_without_change_tracking() {
    let ctx = context();
    let entity = ctx
        .add_persistent_entity(
            ClassDescriptor::builder("app.Tag")
                .entity()
                .field("id", DataType::Long)
                .field("label", DataType::Text)
                .build(),
        )
        .unwrap();
    let mut obj = entity.new_instance().unwrap();
    let mut access = ctx.entity_access(&mut obj).unwrap();

    access.set_property("label", Value::from("rust")).unwrap();
    assert!(access.dirty_checking_state().is_none());
    assert!(!access.is_dirty("label"));
    assert!(!access.reflector().is_dirty_checkable());
}

#[test]
fn test_trait_property_uses_backing_field() {
    let ctx = context();
    let entity = ctx
        .add_persistent_entity(
            ClassDescriptor::builder("app.Memo")
                .entity()
                .field("id", DataType::Long)
                .trait_property("audit.Stamped", "stampedBy", DataType::Text)
                .build(),
        )
        .unwrap();
    let reflector = entity.reflector().unwrap();
    assert_eq!(reflector.property_names(), &["stampedBy"]);
    assert_eq!(
        reflector.property_reader("stampedBy").unwrap().field_name(),
        Some("audit_Stamped__stampedBy")
    );

    let mut obj = entity.new_instance().unwrap();
    reflector.set_property(&mut obj, "stampedBy", Value::from("ops")).unwrap();
    assert_eq!(
        obj.get(&naming::trait_field_name("audit.Stamped", "stampedBy")),
        Value::from("ops")
    );
    assert_eq!(obj.get("stampedBy"), Value::Null);
}

#[test]
fn test_trait_property_without_backing_field_uses_methods() {
    let ctx = context();
    let origin = MethodOrigin::TraitBridge {
        trait_name: "app.Rated".to_string(),
    };
    let entity = ctx
        .add_persistent_entity(
            ClassDescriptor::builder("app.Review")
                .entity()
                .field("id", DataType::Long)
                .transient_field("score", DataType::Integer)
                .getter_from("rating", DataType::Integer, origin.clone(), |obj| {
                    Ok(obj.get("score"))
                })
                .setter_from("rating", DataType::Integer, origin, |obj, value| {
                    obj.set("score", value);
                    Ok(())
                })
                .build(),
        )
        .unwrap();
    let reflector = entity.reflector().unwrap();
    assert!(reflector.property_reader("rating").unwrap().field_name().is_none());

    let mut obj = entity.new_instance().unwrap();
    ctx.entity_access(&mut obj)
        .unwrap()
        .set_property("rating", Value::from("4"))
        .unwrap();
    assert_eq!(obj.get("score"), Value::Integer(4));
    assert_eq!(reflector.get_property(&obj, "rating").unwrap(), Value::Integer(4));
}

#[test]
fn test_field_access_bypasses_declared_setter() {
    let ctx = context();
    let entity = ctx
        .add_persistent_entity(
            ClassDescriptor::builder("app.Label")
                .entity()
                .field("id", DataType::Long)
                .field("text", DataType::Text)
                .setter("text", DataType::Text, |obj, value| {
                    let upper = value.as_str().map(str::to_uppercase).map(Value::Text);
                    obj.set("text", upper.unwrap_or(value));
                    Ok(())
                })
                .build(),
        )
        .unwrap();
    let mut obj = entity.new_instance().unwrap();
    let text = entity.property_by_name("text").unwrap();

    text.writer().unwrap().write(&mut obj, Value::from("shout")).unwrap();
    assert_eq!(text.reader().unwrap().read(&obj).unwrap(), Value::from("shout"));
    assert!(text.writer().unwrap().setter().is_some());
}

#[test]
fn test_access_through_proxies() {
    let ctx = context();
    let target = new_book(&ctx);
    let mut proxy = Instance::proxy(Instance::proxy(target));
    let entity = ctx.require_entity("library.Book").unwrap();
    assert!(entity.is_instance(&proxy, &ctx));

    let mut access = ctx.entity_access(&mut proxy).unwrap();
    access.set_property("title", Value::from("Ulysses")).unwrap();
    access.set_identifier(Value::from(3)).unwrap();
    assert!(access.is_dirty("title"));

    let inner = proxy.target().and_then(Instance::target).unwrap();
    assert_eq!(inner.get("title"), Value::from("Ulysses"));
    assert_eq!(inner.get("id"), Value::Integer(3));
    assert!(proxy.slots().is_empty());
}

#[test]
fn test_reflector_cache_is_shared_between_contexts() {
    let cache = Arc::new(ReflectorCache::new());
    let first = MappingContext::with_reflector_cache(MappingSettings::default(), Arc::clone(&cache));
    let second =
        MappingContext::with_reflector_cache(MappingSettings::default(), Arc::clone(&cache));

    let class = Arc::new(book());
    first.add_persistent_entity(Arc::clone(&class)).unwrap();
    second.add_persistent_entity(class).unwrap();

    assert_eq!(cache.build_count(), 1);
    assert_eq!(cache.len(), 1);
    assert!(Arc::ptr_eq(
        &first.entity_reflector("library.Book").unwrap(),
        &second.entity_reflector("library.Book").unwrap()
    ));

    cache.remove("library.Book").unwrap();
    assert!(cache.get("library.Book").unwrap().is_none());
}

#[test]
fn test_reflector_cache_separates_same_name_with_different_classes() {
    let first = MappingContext::new(MappingSettings::default());
    let second = MappingContext::new(MappingSettings::default());

    let with_title = first
        .add_persistent_entity(
            ClassDescriptor::builder("library.Pamphlet")
                .entity()
                .field("id", DataType::Long)
                .field("title", DataType::Text)
                .build(),
        )
        .unwrap();
    let with_pages = second
        .add_persistent_entity(
            ClassDescriptor::builder("library.Pamphlet")
                .entity()
                .field("id", DataType::Long)
                .field("pages", DataType::Integer)
                .build(),
        )
        .unwrap();

    let title_reflector = with_title.reflector().unwrap();
    let pages_reflector = with_pages.reflector().unwrap();
    assert!(!Arc::ptr_eq(&title_reflector, &pages_reflector));
    assert_eq!(title_reflector.property_names(), ["title"]);
    assert_eq!(pages_reflector.property_names(), ["pages"]);

    let mut obj = with_pages.new_instance().unwrap();
    let mut access = second.entity_access(&mut obj).unwrap();
    access.set_property("pages", Value::from("48")).unwrap();
    assert_eq!(access.get_property("pages").unwrap(), Value::Integer(48));
    assert_eq!(
        access
            .reflector()
            .get_property_at(access.instance(), 0)
            .unwrap(),
        Value::Integer(48)
    );

    // The earlier context keeps its own accessors
    let mut obj = with_title.new_instance().unwrap();
    let mut access = first.entity_access(&mut obj).unwrap();
    access.set_property("title", Value::from("Common Sense")).unwrap();
    assert_eq!(
        access.get_property("title").unwrap(),
        Value::from("Common Sense")
    );

    ReflectorCache::global().remove("library.Pamphlet").unwrap();
}

#[test]
fn test_reflector_cache_rebuilds_for_replaced_class() {
    let cache = Arc::new(ReflectorCache::new());
    let first = MappingContext::with_reflector_cache(MappingSettings::default(), Arc::clone(&cache));
    let second =
        MappingContext::with_reflector_cache(MappingSettings::default(), Arc::clone(&cache));

    first.add_persistent_entity(book()).unwrap();
    second.add_persistent_entity(book()).unwrap();

    assert_eq!(cache.build_count(), 2);
    assert_eq!(cache.len(), 1);
    assert!(!Arc::ptr_eq(
        &first.entity_reflector("library.Book").unwrap(),
        &second.entity_reflector("library.Book").unwrap()
    ));
    assert!(Arc::ptr_eq(
        &cache.get("library.Book").unwrap().unwrap(),
        &second.entity_reflector("library.Book").unwrap()
    ));
}

#[test]
fn test_instance_json_round_trip_converts_fields() {
    let ctx = context();
    let mut obj = new_book(&ctx);
    let reflector = ctx.entity_reflector("library.Book").unwrap();
    reflector.set_property(&mut obj, "title", Value::from("Dracula")).unwrap();
    reflector.set_property(&mut obj, "pages", Value::from(418)).unwrap();

    let json = obj.to_json();
    assert_eq!(json["title"], serde_json::json!("Dracula"));

    let restored = Instance::from_json(Arc::clone(obj.class()), &json).unwrap();
    assert_eq!(restored.get("pages"), Value::Integer(418));

    let bad = serde_json::json!({ "pages": "lots" });
    assert!(matches!(
        Instance::from_json(Arc::clone(obj.class()), &bad),
        Err(MappingError::EntityCreation { .. })
    ));
}
