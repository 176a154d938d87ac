use crate::core::{DataType, Result, Value};
use crate::model::{GetterFn, Instance, SetterFn};
use std::fmt;
use std::sync::Arc;

/// Compiled read operation for one property.
#[derive(Clone)]
pub enum PropertyReader {
    /// Reads the field slot directly. The bean getter, when declared, is kept
    /// for callers that want it but is not used for reads.
    Field {
        property: String,
        field: String,
        data_type: DataType,
        getter: Option<GetterFn>,
    },
    /// Reads through the bean getter.
    Method {
        property: String,
        data_type: DataType,
        getter: GetterFn,
    },
}

impl PropertyReader {
    pub fn property_name(&self) -> &str {
        match self {
            Self::Field { property, .. } | Self::Method { property, .. } => property,
        }
    }

    pub fn data_type(&self) -> &DataType {
        match self {
            Self::Field { data_type, .. } | Self::Method { data_type, .. } => data_type,
        }
    }

    /// Backing field, for field-backed readers
    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field { field, .. } => Some(field),
            Self::Method { .. } => None,
        }
    }

    pub fn getter(&self) -> Option<&GetterFn> {
        match self {
            Self::Field { getter, .. } => getter.as_ref(),
            Self::Method { getter, .. } => Some(getter),
        }
    }

    pub fn read(&self, obj: &Instance) -> Result<Value> {
        match self {
            Self::Field { field, .. } => Ok(obj.get(field)),
            Self::Method { getter, .. } => (**getter)(obj),
        }
    }
}

impl fmt::Debug for PropertyReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { property, field, .. } => {
                write!(f, "FieldReader({} -> {})", property, field)
            }
            Self::Method { property, .. } => write!(f, "MethodReader({})", property),
        }
    }
}

/// Compiled write operation for one property.
#[derive(Clone)]
pub enum PropertyWriter {
    Field {
        property: String,
        field: String,
        data_type: DataType,
        setter: Option<SetterFn>,
    },
    Method {
        property: String,
        data_type: DataType,
        setter: SetterFn,
    },
}

impl PropertyWriter {
    pub fn property_name(&self) -> &str {
        match self {
            Self::Field { property, .. } | Self::Method { property, .. } => property,
        }
    }

    pub fn data_type(&self) -> &DataType {
        match self {
            Self::Field { data_type, .. } | Self::Method { data_type, .. } => data_type,
        }
    }

    pub fn field_name(&self) -> Option<&str> {
        match self {
            Self::Field { field, .. } => Some(field),
            Self::Method { .. } => None,
        }
    }

    pub fn setter(&self) -> Option<&SetterFn> {
        match self {
            Self::Field { setter, .. } => setter.as_ref(),
            Self::Method { setter, .. } => Some(setter),
        }
    }

    /// Writes `value` as is. Conversion is the caller's concern.
    pub fn write(&self, obj: &mut Instance, value: Value) -> Result<()> {
        match self {
            Self::Field { field, .. } => {
                obj.set(field, value);
                Ok(())
            }
            Self::Method { setter, .. } => (**setter)(obj, value),
        }
    }
}

impl fmt::Debug for PropertyWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field { property, field, .. } => {
                write!(f, "FieldWriter({} -> {})", property, field)
            }
            Self::Method { property, .. } => write!(f, "MethodWriter({})", property),
        }
    }
}

/// Reader and optional writer of one property. Read-only properties have no writer.
#[derive(Debug, Clone)]
pub struct AccessorPair {
    pub reader: Arc<PropertyReader>,
    pub writer: Option<Arc<PropertyWriter>>,
}

impl AccessorPair {
    pub fn is_read_only(&self) -> bool {
        self.writer.is_none()
    }
}
