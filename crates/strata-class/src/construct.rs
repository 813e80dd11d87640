//! Instance construction
//!
//! Construction allocates the native payload (when some class in the lineage
//! provides an allocator), creates the instance with an empty attribute
//! table, then runs the nearest `__init` in protected mode with the instance
//! followed by the constructor arguments.

use crate::class::ClassRef;
use crate::error::{ClassError, ClassResult};
use crate::instance::{Instance, ATTRIBUTES, USER_VALUES};
use crate::registry::ClassRegistry;
use strata_engine::{State, TableRef, UserdataRef, Value};

/// Allocate a bare instance of `class` without running its initializer
pub fn instantiate(state: &mut State, class: &ClassRef) -> ClassResult<Value> {
    let registry = ClassRegistry::install(state);
    let (payload, finalizer) = match class.payload_hooks() {
        Some((alloc, gc)) => (Some(alloc(state)?), gc),
        None => (None, None),
    };

    let ud = UserdataRef::new(Instance::new(class.clone(), payload, finalizer), USER_VALUES);
    ud.set_user_value(ATTRIBUTES, Value::Table(TableRef::new()));
    ud.set_metatable(Some(registry.instance_metatable().clone()));
    Ok(Value::Userdata(ud))
}

/// Construct an instance of the class registered as `name`
///
/// The top `nargs` values are the constructor arguments; they are consumed
/// and the new instance is pushed. If the class is unknown the arguments are
/// popped and nothing is pushed. If `__init` fails the instance is not
/// pushed; its error message is left on the stack instead and the instance is
/// returned inside the error so callers may still inspect it.
pub fn construct(state: &mut State, nargs: usize, name: &str) -> ClassResult<()> {
    let class = ClassRegistry::of(state).and_then(|r| r.get(name));
    match class {
        Some(class) => construct_class(state, &class, nargs),
        None => {
            state.pop_n(nargs)?;
            Err(ClassError::ClassNotFound(name.to_string()))
        }
    }
}

pub(crate) fn construct_class(state: &mut State, class: &ClassRef, nargs: usize) -> ClassResult<()> {
    log::trace!("constructing {} with {} args", class.name(), nargs);
    let instance = match instantiate(state, class) {
        Ok(instance) => instance,
        Err(e) => {
            state.pop_n(nargs)?;
            return Err(e);
        }
    };

    let init = class.resolve_method("__init");
    if init.is_nil() {
        state.pop_n(nargs)?;
        state.push(instance)?;
        return Ok(());
    }

    // [args] -> [init, instance, args]
    let below_args = -(nargs as isize) - 1;
    state.push(instance.clone())?;
    state.insert(below_args)?;
    state.push(init)?;
    state.insert(below_args - 1)?;

    match state.pcall(nargs + 1, Some(0), None) {
        Ok(_) => {
            state.push(instance)?;
            Ok(())
        }
        Err(source) => {
            log::warn!("initializer of '{}' failed: {}", class.name(), source);
            Err(ClassError::InitializationFailure {
                class: class.name().to_string(),
                instance,
                source,
            })
        }
    }
}

/// Construct an instance of `name` from a list of arguments
///
/// On initializer failure the message pushed by [`construct`] is removed.
pub fn new_instance(state: &mut State, name: &str, args: Vec<Value>) -> ClassResult<Value> {
    let nargs = args.len();
    for arg in args {
        state.push(arg)?;
    }
    match construct(state, nargs, name) {
        Ok(()) => Ok(state.pop()?),
        Err(e @ ClassError::InitializationFailure { .. }) => {
            state.pop()?;
            Err(e)
        }
        Err(e) => Err(e),
    }
}
