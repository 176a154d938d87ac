use super::Value;
use chrono::{DateTime, TimeZone, Utc};
use std::fmt;
use uuid::Uuid;

/// Declared type of a field, accessor or mapped property.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DataType {
    /// 32-bit signed integer carried as `Value::Integer`.
    Integer,
    Long,
    Float,
    Text,
    Boolean,
    Timestamp,
    Uuid,
    /// Reference to another mapped entity, by class name.
    Entity(String),
    /// Component value type stored inline with its owner.
    Embedded(String),
    List(Box<DataType>),
    Map,
}

impl DataType {
    pub fn list_of(element: DataType) -> Self {
        Self::List(Box::new(element))
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Float)
    }

    pub fn is_temporal(&self) -> bool {
        matches!(self, Self::Timestamp)
    }

    /// Types usable for an optimistic-locking version property.
    pub fn is_version_compatible(&self) -> bool {
        self.is_numeric() || self.is_temporal()
    }

    pub fn is_simple(&self) -> bool {
        !matches!(
            self,
            Self::Entity(_) | Self::Embedded(_) | Self::List(_) | Self::Map
        )
    }

    /// Element type for collection types.
    pub fn element(&self) -> Option<&DataType> {
        match self {
            Self::List(inner) => Some(inner),
            _ => None,
        }
    }

    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(i)) => i32::try_from(*i).is_ok(),
            (Self::Long, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            (Self::Timestamp, Value::Timestamp(_)) => true,
            (Self::Uuid, Value::Uuid(_)) => true,
            (Self::List(inner), Value::List(items)) => items.iter().all(|v| inner.is_compatible(v)),
            (Self::Map, Value::Map(_)) => true,
            (Self::Embedded(_), Value::Map(_)) => true,
            (Self::Entity(_), _) => true,
            _ => false,
        }
    }

    /// Converts `value` into this type's canonical representation.
    ///
    /// The error string explains why the value is not acceptable; callers wrap
    /// it into a property-level error.
    pub fn convert(&self, value: Value) -> std::result::Result<Value, String> {
        if value.is_null() {
            return Ok(Value::Null);
        }
        match self {
            Self::Integer => {
                let wide = to_long(&value)?;
                i32::try_from(wide)
                    .map(|narrow| Value::Integer(narrow as i64))
                    .map_err(|_| format!("{} is out of range for INTEGER", wide))
            }
            Self::Long => to_long(&value).map(Value::Integer),
            Self::Float => match &value {
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Integer(i) => Ok(Value::Float(*i as f64)),
                Value::Text(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|e| format!("'{}' is not a number: {}", s, e)),
                other => Err(cannot_convert(other, self)),
            },
            Self::Text => match value {
                Value::Text(s) => Ok(Value::Text(s)),
                Value::List(_) | Value::Map(_) => Err(cannot_convert(&value, self)),
                other => Ok(Value::Text(other.to_string())),
            },
            Self::Boolean => match &value {
                Value::Boolean(b) => Ok(Value::Boolean(*b)),
                Value::Integer(0) => Ok(Value::Boolean(false)),
                Value::Integer(1) => Ok(Value::Boolean(true)),
                Value::Text(s) => match s.trim().to_ascii_lowercase().as_str() {
                    "true" => Ok(Value::Boolean(true)),
                    "false" => Ok(Value::Boolean(false)),
                    _ => Err(format!("'{}' is not a boolean", s)),
                },
                other => Err(cannot_convert(other, self)),
            },
            Self::Timestamp => match &value {
                Value::Timestamp(ts) => Ok(Value::Timestamp(*ts)),
                Value::Integer(millis) => Utc
                    .timestamp_millis_opt(*millis)
                    .single()
                    .map(Value::Timestamp)
                    .ok_or_else(|| format!("{} is not a valid epoch millisecond", millis)),
                Value::Text(s) => DateTime::parse_from_rfc3339(s.trim())
                    .map(|ts| Value::Timestamp(ts.with_timezone(&Utc)))
                    .map_err(|e| format!("'{}' is not an RFC 3339 timestamp: {}", s, e)),
                other => Err(cannot_convert(other, self)),
            },
            Self::Uuid => match &value {
                Value::Uuid(u) => Ok(Value::Uuid(*u)),
                Value::Text(s) => Uuid::parse_str(s.trim())
                    .map(Value::Uuid)
                    .map_err(|e| format!("'{}' is not a UUID: {}", s, e)),
                other => Err(cannot_convert(other, self)),
            },
            Self::List(inner) => match value {
                Value::List(items) => items
                    .into_iter()
                    .map(|item| inner.convert(item))
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map(Value::List),
                other => Err(cannot_convert(&other, self)),
            },
            Self::Map | Self::Embedded(_) => match value {
                Value::Map(entries) => Ok(Value::Map(entries)),
                other => Err(cannot_convert(&other, self)),
            },
            // Associations carry either the associated state or its identifier.
            Self::Entity(_) => Ok(value),
        }
    }
}

fn to_long(value: &Value) -> std::result::Result<i64, String> {
    match value {
        Value::Integer(i) => Ok(*i),
        Value::Float(f) if f.fract() == 0.0 => value
            .as_i64()
            .ok_or_else(|| format!("{} is out of range for LONG", f)),
        Value::Float(f) => Err(format!("{} has a fractional part", f)),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map_err(|e| format!("'{}' is not an integer: {}", s, e)),
        other => Err(format!("{} is not an integer", other.type_name())),
    }
}

fn cannot_convert(value: &Value, target: &DataType) -> String {
    format!("{} cannot be converted to {}", value.type_name(), target)
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "INTEGER"),
            Self::Long => write!(f, "LONG"),
            Self::Float => write!(f, "FLOAT"),
            Self::Text => write!(f, "TEXT"),
            Self::Boolean => write!(f, "BOOLEAN"),
            Self::Timestamp => write!(f, "TIMESTAMP"),
            Self::Uuid => write!(f, "UUID"),
            Self::Entity(name) => write!(f, "{}", name),
            Self::Embedded(name) => write!(f, "EMBEDDED<{}>", name),
            Self::List(inner) => write!(f, "LIST<{}>", inner),
            Self::Map => write!(f, "MAP"),
        }
    }
}
