//! Strata host engine
//!
//! This crate provides the value model and the value-stack adapter the class
//! runtime is layered on:
//! - Values, tables with metatables, and foreign objects (userdata)
//! - Native functions using a stack calling convention
//! - An operand stack with call frames
//! - Protected calls with message handlers
//! - Per-state typed library slots

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod function;
pub mod stack;
pub mod state;
pub mod table;
pub mod userdata;
pub mod value;

pub use function::{Function, NativeFn};
pub use stack::{CallFrame, Stack};
pub use state::{State, StateId, StateOptions};
pub use table::TableRef;
pub use userdata::UserdataRef;
pub use value::{Key, Kind, Value};

/// Engine errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    /// Stack overflow
    #[error("stack overflow")]
    StackOverflow,

    /// Stack underflow
    #[error("stack underflow")]
    StackUnderflow,

    /// Native calls nested too deeply
    #[error("call depth exceeded (limit {0})")]
    CallDepthExceeded(usize),

    /// Stack index does not name a live slot
    #[error("invalid stack index {0}")]
    InvalidIndex(isize),

    /// Attempt to call a value with no `__call`
    #[error("attempt to call a {0} value")]
    NotCallable(&'static str),

    /// Table key is nil or NaN
    #[error("invalid table key ({0})")]
    InvalidKey(Kind),

    /// Type error
    #[error("{0}")]
    TypeError(String),

    /// Error value raised by running code
    #[error("{0}")]
    Raised(Value),
}

impl EngineError {
    /// Raise a string error
    pub fn runtime(message: impl Into<String>) -> Self {
        EngineError::Raised(Value::from(message.into()))
    }

    /// The value a protected call reports for this error
    pub fn to_value(&self) -> Value {
        match self {
            EngineError::Raised(value) => value.clone(),
            other => Value::from(other.to_string()),
        }
    }
}

/// Engine result
pub type EngineResult<T> = Result<T, EngineError>;
