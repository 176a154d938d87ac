//! Naming conventions shared by the class model and the accessor compiler.
//!
//! All functions are pure so the conventions can be checked in isolation.

use crate::core::DataType;

/// Capability implemented by change-tracking classes.
pub const DIRTY_CHECKABLE_TRAIT: &str = "persistmodel.dirty.DirtyCheckable";

/// State field of [`DIRTY_CHECKABLE_TRAIT`], before mangling.
pub const CHANGED_PROPERTIES: &str = "$changedProperties";

/// Separator between the mangled trait name and the property name.
pub const TRAIT_FIELD_SEPARATOR: &str = "__";

/// `title` -> `Title`
pub fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `BookAuthor` -> `bookAuthor`, but `URL` -> `URL`.
pub fn decapitalize(name: &str) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    // Leading acronyms keep their case
    if let Some(second) = name.chars().nth(1) {
        if first.is_uppercase() && second.is_uppercase() {
            return name.to_string();
        }
    }
    first.to_lowercase().chain(chars).collect()
}

pub fn getter_name(property: &str, data_type: &DataType) -> String {
    if matches!(data_type, DataType::Boolean) {
        format!("is{}", capitalize(property))
    } else {
        format!("get{}", capitalize(property))
    }
}

pub fn setter_name(property: &str) -> String {
    format!("set{}", capitalize(property))
}

/// Property name of a bean getter: `getTitle` -> `title`, `isActive` -> `active`.
pub fn property_name_of_getter(method: &str) -> Option<String> {
    let rest = method
        .strip_prefix("get")
        .or_else(|| method.strip_prefix("is"))?;
    if rest.is_empty() || !rest.starts_with(|c: char| c.is_uppercase()) {
        return None;
    }
    Some(decapitalize(rest))
}

/// Property name of a bean setter: `setTitle` -> `title`.
pub fn property_name_of_setter(method: &str) -> Option<String> {
    let rest = method.strip_prefix("set")?;
    if rest.is_empty() || !rest.starts_with(|c: char| c.is_uppercase()) {
        return None;
    }
    Some(decapitalize(rest))
}

/// Backing field synthesized for `property` of a composed trait.
///
/// `("app.traits.Named", "name")` -> `app_traits_Named__name`
pub fn trait_field_name(trait_name: &str, property: &str) -> String {
    format!(
        "{}{}{}",
        trait_name.replace('.', "_"),
        TRAIT_FIELD_SEPARATOR,
        property
    )
}

/// True for names produced by [`trait_field_name`].
pub fn is_trait_field(name: &str) -> bool {
    name.contains(TRAIT_FIELD_SEPARATOR)
}

/// Mangled name of the dirty-checking state field.
pub fn dirty_state_field() -> String {
    trait_field_name(DIRTY_CHECKABLE_TRAIT, CHANGED_PROPERTIES)
}

/// `app.model.Book` -> `Book`
pub fn simple_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}
