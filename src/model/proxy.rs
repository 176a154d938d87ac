use super::Instance;
use std::fmt;

/// Resolves proxies to the instances they stand for.
pub trait ProxyHandler: Send + Sync + fmt::Debug {
    fn is_proxy(&self, obj: &Instance) -> bool;

    fn unwrap<'a>(&self, obj: &'a Instance) -> &'a Instance;

    fn unwrap_mut<'a>(&self, obj: &'a mut Instance) -> &'a mut Instance;
}

/// Unwraps [`Instance::proxy`] chains to the innermost target.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProxyHandler;

impl ProxyHandler for DefaultProxyHandler {
    fn is_proxy(&self, obj: &Instance) -> bool {
        obj.is_proxy()
    }

    fn unwrap<'a>(&self, obj: &'a Instance) -> &'a Instance {
        let mut current = obj;
        while let Some(target) = current.target() {
            current = target;
        }
        current
    }

    fn unwrap_mut<'a>(&self, obj: &'a mut Instance) -> &'a mut Instance {
        obj.innermost_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DataType, Value};
    use crate::model::ClassDescriptor;
    use std::sync::Arc;

    #[test]
    fn test_unwraps_nested_proxies() {
        let class = Arc::new(
            ClassDescriptor::builder("app.Note")
                .field("text", DataType::Text)
                .build(),
        );
        let mut target = class.new_instance().unwrap();
        target.set("text", Value::from("hi"));
        let mut proxy = Instance::proxy(Instance::proxy(target));

        let handler = DefaultProxyHandler;
        assert!(handler.is_proxy(&proxy));
        assert_eq!(handler.unwrap(&proxy).get("text"), Value::from("hi"));

        handler.unwrap_mut(&mut proxy).set("text", Value::from("bye"));
        assert_eq!(handler.unwrap(&proxy).get("text"), Value::from("bye"));
        assert!(!handler.is_proxy(handler.unwrap(&proxy)));
    }
}
