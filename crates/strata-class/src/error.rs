//! Error types for the class runtime

use strata_engine::{EngineError, Value};

/// Result type for class operations
pub type ClassResult<T> = Result<T, ClassError>;

/// Class runtime errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum ClassError {
    /// No class is registered under the name
    #[error("class '{0}' is not registered")]
    ClassNotFound(String),

    /// The class was called directly but does not allow user construction
    #[error("class '{0}' cannot be constructed by calling it")]
    ConstructionForbidden(String),

    /// A value failed an instance or native-class check
    #[error("{expected} expected, got {got}")]
    TypeMismatch {
        /// Expected class name
        expected: String,
        /// Description of the value actually found
        got: String,
    },

    /// The initializer raised an error; the instance still exists
    #[error("error initializing '{class}' instance: {source}")]
    InitializationFailure {
        /// Name of the class being constructed
        class: String,
        /// The allocated instance, which will still be finalized
        instance: Value,
        /// Error raised by the initializer
        source: EngineError,
    },

    /// The value is not a recognized class
    #[error("{0} is not a class object")]
    InvalidClassObject(&'static str),

    /// Error from the host engine
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl ClassError {
    pub(crate) fn mismatch(expected: &str, got: impl Into<String>) -> Self {
        ClassError::TypeMismatch {
            expected: expected.to_string(),
            got: got.into(),
        }
    }
}

impl From<ClassError> for EngineError {
    fn from(err: ClassError) -> Self {
        match err {
            ClassError::Engine(e) => e,
            other => EngineError::runtime(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(
            ClassError::ClassNotFound("Ghost".into()).to_string(),
            "class 'Ghost' is not registered"
        );
        assert_eq!(
            ClassError::mismatch("Animal", "number").to_string(),
            "Animal expected, got number"
        );
    }

    #[test]
    fn test_into_engine_error() {
        let err: EngineError = ClassError::InvalidClassObject("table").into();
        assert_eq!(err.to_value(), Value::from("table is not a class object"));

        let err: EngineError = ClassError::Engine(EngineError::StackOverflow).into();
        assert!(matches!(err, EngineError::StackOverflow));
    }
}
