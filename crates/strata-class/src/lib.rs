//! Strata class runtime
//!
//! Single-inheritance classes for the Strata engine:
//! - A per-state registry of named classes declared from Rust or by script
//! - Instances carrying an optional native payload and an attribute table
//! - Construction through the nearest `__init`, with finalization of payloads
//! - Runtime type queries and native-payload checks
//! - Method calls, lexical `super` calls and ancestor field lookup
//! - Method injection with access to the replaced method
//!
//! # Example
//!
//! ```ignore
//! let mut state = State::new();
//! strata_class::open(&mut state);
//! register_native(&mut state, NativeClass::new("Animal").method("speak", speak))?;
//! let dog = new_instance(&mut state, "Animal", vec![])?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod class;
pub mod construct;
pub mod descriptor;
pub mod dispatch;
pub mod error;
pub mod inject;
pub mod instance;
pub mod library;
pub mod loader;
pub mod object;
pub mod query;
pub mod register;
pub mod registry;

pub use class::{Class, ClassKind, ClassRef, Lineage};
pub use construct::{construct, instantiate, new_instance};
pub use descriptor::{Allocator, Destructor, NativeClass, NativeHooks};
pub use dispatch::{call_method, get_parent_field, mcall, pmcall, super_call, super_init};
pub use error::{ClassError, ClassResult};
pub use inject::{
    defer_index, defer_new_index, inject_index, inject_method, inject_new_index, inject_rc,
    Defer, InjectedFn,
};
pub use instance::{attributes, class_of, uv, Instance, ATTRIBUTES};
pub use library::{open, open_with, ClassLibOptions};
pub use loader::{DefinitionLoader, FunctionLibrary, LoadError, ScriptLoader};
pub use object::{class_from_object, ClassObject};
pub use query::{check_uclass, get_class, get_uclass, is_class, is_instance, is_object, push_class, to_class};
pub use register::{class_object, find_class, new_class, register_class, register_native};
pub use registry::ClassRegistry;
