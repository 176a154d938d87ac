use thiserror::Error;

#[derive(Error, Debug)]
pub enum MappingError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unable to create entity of type [{class}]: {cause}")]
    EntityCreation { class: String, cause: String },

    #[error("Property [{property}] is not a valid property of class [{class}]")]
    UnknownProperty { property: String, class: String },

    #[error("Property index {index} is out of bounds for class [{class}] with {len} properties")]
    InvalidPropertyIndex {
        index: usize,
        len: usize,
        class: String,
    },

    #[error(
        "Cannot assign value [{value}] to property [{property}] of type [{declared_type}] of class [{class}]: {reason}"
    )]
    InvalidPropertyValue {
        property: String,
        declared_type: String,
        class: String,
        value: String,
        reason: String,
    },

    #[error("Property [{property}] of class [{class}] is read-only")]
    ReadOnlyProperty { property: String, class: String },

    #[error("Entity '{0}' not found")]
    EntityNotFound(String),

    #[error("Entity '{0}' is not initialized")]
    NotInitialized(String),

    #[error("Illegal session state: {0}")]
    SessionState(String),

    #[error("Could not open datastore session: {0}")]
    DataAccessResourceFailure(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Lock error: {0}")]
    LockError(String),
}

pub type Result<T> = std::result::Result<T, MappingError>;

impl MappingError {
    /// True for errors raised while building a metamodel from its mapping.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }

    pub fn is_session_state(&self) -> bool {
        matches!(self, Self::SessionState(_))
    }
}

impl<T> From<std::sync::PoisonError<T>> for MappingError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::LockError(err.to_string())
    }
}
