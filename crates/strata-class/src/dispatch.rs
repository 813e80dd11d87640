//! Method dispatch and lexical super calls
//!
//! `super` is resolved against the class that *defines* the running method,
//! not the class of the receiver. Every method stored in a class is owned by
//! that class, and each call frame records the owner of the function it runs,
//! so the defining class is read from the innermost frame.

use crate::class::ClassRef;
use crate::error::{ClassError, ClassResult};
use crate::instance::class_of;
use crate::object::class_from_object;
use crate::registry::ClassRegistry;
use strata_engine::{EngineError, EngineResult, Kind, State, Value};

/// Call method `name` on the object below the top `nargs` values
///
/// The object stays on the stack below the results. Returns the number of
/// results pushed.
pub fn mcall(
    state: &mut State,
    name: &str,
    nargs: usize,
    nresults: Option<usize>,
) -> ClassResult<usize> {
    prepare_method(state, name, nargs)?;
    Ok(state.call(nargs + 1, nresults)?)
}

/// Protected version of [`mcall`]
///
/// On failure the object stays on the stack with the (handled) error message
/// above it, and the original error is returned.
pub fn pmcall(
    state: &mut State,
    name: &str,
    nargs: usize,
    nresults: Option<usize>,
    msgh: Option<isize>,
) -> EngineResult<usize> {
    let msgh = match msgh {
        Some(index) => Some(state.abs_index(index)?),
        None => None,
    };
    if let Err(e) = prepare_method(state, name, nargs) {
        // the arguments are gone; report like a failed call
        let e = EngineError::from(e);
        state.push(e.to_value())?;
        return Err(e);
    }
    state.pcall(nargs + 1, nresults, msgh)
}

/// [obj, args] -> [obj, method, obj, args]
fn prepare_method(state: &mut State, name: &str, nargs: usize) -> ClassResult<()> {
    let args = state.take(nargs)?;
    state.get_field(-1, name)?;
    state.push_value(-2)?;
    for arg in args {
        state.push(arg)?;
    }
    Ok(())
}

/// Call method `name` on `obj` with `args` and collect the results
pub fn call_method(
    state: &mut State,
    obj: &Value,
    name: &str,
    args: Vec<Value>,
) -> ClassResult<Vec<Value>> {
    let method = state.index(obj, &Value::from(name))?;
    let mut call_args = Vec::with_capacity(args.len() + 1);
    call_args.push(obj.clone());
    call_args.extend(args);
    Ok(state.call_value(&method, call_args)?)
}

/// Class that owns the function running `frames_up` frames below the innermost
fn owner_class(state: &State, frames_up: usize) -> Option<ClassRef> {
    let owner = state.stack().frames().nth(frames_up)?.owner.clone()?;
    let registry = ClassRegistry::of(state)?;
    match owner {
        Value::Str(name) => registry.get(&name),
        _ => None,
    }
}

/// Call the parent-class version of `name` for the running method
///
/// All values of the current frame (the receiver first) are passed as
/// arguments and remain in place; results are pushed above them. When the
/// defining class has no parent or no ancestor defines `name`, nothing
/// happens and 0 is returned.
pub fn super_call(state: &mut State, name: &str, nresults: Option<usize>) -> ClassResult<usize> {
    let origin = match owner_class(state, 0) {
        Some(class) => class,
        None => match class_of(&state.arg(1)) {
            Some(class) => {
                log::warn!(
                    "super '{}' called outside a class method; using the receiver's class",
                    name
                );
                class
            }
            None => return Ok(0),
        },
    };
    let args: Vec<Value> = (1..=state.top()).map(|i| state.arg(i)).collect();
    invoke_parent(state, &origin, name, args, nresults)
}

/// Call the parent-class version of `name` on behalf of the method running
/// `frames_up` frames below the innermost; `args` start with the receiver
pub(crate) fn super_call_from(
    state: &mut State,
    frames_up: usize,
    name: &str,
    args: Vec<Value>,
) -> ClassResult<usize> {
    let origin = owner_class(state, frames_up).or_else(|| args.first().and_then(class_of));
    match origin {
        Some(origin) => invoke_parent(state, &origin, name, args, None),
        None => Ok(0),
    }
}

fn invoke_parent(
    state: &mut State,
    origin: &ClassRef,
    name: &str,
    args: Vec<Value>,
    nresults: Option<usize>,
) -> ClassResult<usize> {
    let method = match origin.parent() {
        Some(parent) => parent.resolve_method(name),
        None => Value::Nil,
    };
    if method.is_nil() {
        log::trace!("super '{}' from {}: no parent definition", name, origin.name());
        return Ok(0);
    }

    log::trace!("super '{}' from {}", name, origin.name());
    let nargs = args.len();
    state.push(method)?;
    for arg in args {
        state.push(arg)?;
    }
    Ok(state.call(nargs, nresults)?)
}

/// Run the parent-class initializer for the running `__init`
pub fn super_init(state: &mut State) -> ClassResult<()> {
    super_call(state, "__init", Some(0)).map(|_| ())
}

/// Push the raw field `name` of the class `depth` levels above the class of
/// the object or class object at `index` (0 is the class itself)
///
/// Pushes nil when the lineage is shorter than `depth`.
pub fn get_parent_field(
    state: &mut State,
    index: isize,
    depth: usize,
    name: &str,
) -> ClassResult<Kind> {
    let value = state.get(index)?;
    let class = class_of(&value)
        .or_else(|| class_from_object(&value))
        .ok_or_else(|| ClassError::mismatch("object or class", value.type_name()))?;
    let field = class
        .ancestor(depth)
        .map_or(Value::Nil, |c| c.methods().raw_get_str(name));
    let kind = field.kind();
    state.push(field)?;
    Ok(kind)
}
