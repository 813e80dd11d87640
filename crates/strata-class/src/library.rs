//! Script-visible class library
//!
//! [`open`] installs the registry and, unless disabled, a global table of
//! class functions for scripts:
//!
//! | function                    | result                                  |
//! |-----------------------------|-----------------------------------------|
//! | `isobject(v)`               | whether `v` is a registered instance    |
//! | `isclass(v)`                | whether `v` is a class object or table  |
//! | `isinstance(v, class)`      | lineage check by name or class object   |
//! | `getclass(name)`            | class object or nil                     |
//! | `construct(name, ...)`      | new instance                            |
//! | `registerclass(v)`          | whether a class was added               |
//! | `super(name, self, ...)`    | parent-class method results             |

use crate::construct::construct;
use crate::dispatch::super_call_from;
use crate::error::ClassError;
use crate::query::{get_class, is_class, is_instance, is_object, to_class};
use crate::register::register_class;
use crate::registry::ClassRegistry;
use strata_engine::{EngineError, EngineResult, Function, State, TableRef, Value};
use std::rc::Rc;

/// Default name of the global class table
pub const DEFAULT_GLOBAL: &str = "class";

/// Options for opening the class library
#[derive(Debug, Clone)]
pub struct ClassLibOptions {
    /// Global table to publish the script functions under; `None` publishes nothing
    pub global: Option<String>,
}

impl Default for ClassLibOptions {
    fn default() -> Self {
        Self {
            global: Some(DEFAULT_GLOBAL.to_string()),
        }
    }
}

impl ClassLibOptions {
    /// Publish the script functions under `name`
    pub fn with_global(name: &str) -> Self {
        Self {
            global: Some(name.to_string()),
        }
    }

    /// Install the registry only
    pub fn without_global() -> Self {
        Self { global: None }
    }
}

/// Open the class library with default options
pub fn open(state: &mut State) -> Rc<ClassRegistry> {
    open_with(state, ClassLibOptions::default())
}

/// Open the class library
pub fn open_with(state: &mut State, options: ClassLibOptions) -> Rc<ClassRegistry> {
    let registry = ClassRegistry::install(state);
    if let Some(name) = options.global {
        log::debug!("publishing class library as '{}'", name);
        state.set_global(&name, library_table());
    }
    registry
}

fn library_table() -> TableRef {
    let lib = TableRef::new();
    lib.raw_set_str("isobject", Function::named("isobject", lib_isobject));
    lib.raw_set_str("isclass", Function::named("isclass", lib_isclass));
    lib.raw_set_str("isinstance", Function::named("isinstance", lib_isinstance));
    lib.raw_set_str("getclass", Function::named("getclass", lib_getclass));
    lib.raw_set_str("construct", Function::named("construct", lib_construct));
    lib.raw_set_str("registerclass", Function::named("registerclass", lib_registerclass));
    lib.raw_set_str("super", Function::named("super", lib_super));
    lib
}

fn check_str(state: &State, n: usize, fname: &str) -> EngineResult<Rc<str>> {
    match state.arg(n) {
        Value::Str(s) => Ok(s),
        other => Err(EngineError::TypeError(format!(
            "bad argument #{} to '{}' (string expected, got {})",
            n,
            fname,
            other.type_name()
        ))),
    }
}

fn lib_isobject(state: &mut State) -> EngineResult<usize> {
    let value = state.arg(1);
    let result = is_object(state, &value);
    state.push(result)?;
    Ok(1)
}

fn lib_isclass(state: &mut State) -> EngineResult<usize> {
    let value = state.arg(1);
    state.push(is_class(&value))?;
    Ok(1)
}

fn lib_isinstance(state: &mut State) -> EngineResult<usize> {
    let value = state.arg(1);
    let target = state.arg(2);
    let name = match &target {
        Value::Str(name) => Some(name.clone()),
        other => to_class(state, other).map(|c| c.name_rc()),
    };
    let result = match name {
        Some(name) => is_instance(state, &value, &name),
        None => false,
    };
    state.push(result)?;
    Ok(1)
}

fn lib_getclass(state: &mut State) -> EngineResult<usize> {
    let name = check_str(state, 1, "getclass")?;
    let class = get_class(state, &name).unwrap_or_default();
    state.push(class)?;
    Ok(1)
}

fn lib_construct(state: &mut State) -> EngineResult<usize> {
    let name = check_str(state, 1, "construct")?;
    state.remove(1)?;
    let nargs = state.top();
    match construct(state, nargs, &name) {
        Ok(()) => Ok(1),
        Err(ClassError::InitializationFailure { source, .. }) => Err(source),
        Err(e) => Err(e.into()),
    }
}

fn lib_registerclass(state: &mut State) -> EngineResult<usize> {
    let value = state.arg(1);
    let added = register_class(state, &value)?;
    state.push(added)?;
    Ok(1)
}

fn lib_super(state: &mut State) -> EngineResult<usize> {
    let name = check_str(state, 1, "super")?;
    let args: Vec<Value> = (2..=state.top()).map(|i| state.arg(i)).collect();
    // frame 0 is this function; the calling method is one frame further out
    Ok(super_call_from(state, 1, &name, args)?)
}
