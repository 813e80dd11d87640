//! Runtime type queries

use crate::class::ClassRef;
use crate::error::{ClassError, ClassResult};
use crate::instance::{class_of, Instance};
use crate::object::class_from_object;
use crate::registry::ClassRegistry;
use strata_engine::{EngineResult, Kind, State, Value};
use std::any::Any;
use std::cell::RefMut;

/// Whether `value` is an instance of a class registered in `state`
pub fn is_object(state: &State, value: &Value) -> bool {
    match (class_of(value), ClassRegistry::of(state)) {
        (Some(class), Some(registry)) => registry.is_registered(&class),
        _ => false,
    }
}

/// Whether `value` is a class
///
/// Class objects are always classes. A table counts as a (possibly
/// unregistered) script class when it has a string `__name` and a table
/// `__base`.
pub fn is_class(value: &Value) -> bool {
    match value {
        Value::Userdata(_) => class_from_object(value).is_some(),
        Value::Table(t) => {
            matches!(t.raw_get_str("__name"), Value::Str(_))
                && matches!(t.raw_get_str("__base"), Value::Table(_))
        }
        _ => false,
    }
}

/// Whether `value` is an object whose class is `name` or descends from it
pub fn is_instance(state: &State, value: &Value, name: &str) -> bool {
    is_object(state, value) && class_of(value).map_or(false, |c| c.is_a(name))
}

fn describe(value: &Value) -> String {
    match class_of(value) {
        Some(class) => class.name().to_string(),
        None => value.type_name().to_string(),
    }
}

/// Check that `value` is an instance of native class `name` and borrow its payload
///
/// # Errors
///
/// Returns `ClassError::TypeMismatch` when the value is not an object, when
/// its lineage does not contain `name`, when the matching class is not a
/// native class, or when the payload is not a `T` (or is already borrowed).
pub fn check_uclass<'a, T: Any>(
    state: &State,
    value: &'a Value,
    name: &str,
) -> ClassResult<RefMut<'a, T>> {
    let native_match = is_object(state, value)
        && class_of(value)
            .and_then(|class| class.find(name).map(|c| c.is_native()))
            .unwrap_or(false);
    let ud = match value.as_userdata() {
        Some(ud) if native_match => ud,
        _ => return Err(ClassError::mismatch(name, describe(value))),
    };

    let instance = ud
        .borrow_mut::<Instance>()
        .ok_or_else(|| ClassError::mismatch(name, describe(value)))?;
    RefMut::filter_map(instance, |i| i.payload_mut::<T>())
        .map_err(|_| ClassError::mismatch(name, format!("{} without a matching payload", name)))
}

/// Class object of the class registered as `name`
pub fn get_class(state: &State, name: &str) -> Option<Value> {
    ClassRegistry::of(state)?.object_named(name)
}

/// Class behind a class object, provided it is a native class
pub fn get_uclass(value: &Value) -> Option<ClassRef> {
    class_from_object(value).filter(|c| c.is_native())
}

/// Resolve a class from a class object or a registered class name
pub fn to_class(state: &State, value: &Value) -> Option<ClassRef> {
    match value {
        Value::Str(name) => ClassRegistry::of(state)?.get(name),
        other => class_from_object(other),
    }
}

/// Push the class object of the object at `index`; pushes nil for non-objects
pub fn push_class(state: &mut State, index: isize) -> EngineResult<Kind> {
    let value = state.get(index)?;
    let class = match (class_of(&value), ClassRegistry::of(state)) {
        (Some(class), Some(registry)) => registry.object(&class),
        _ => Value::Nil,
    };
    let kind = class.kind();
    state.push(class)?;
    Ok(kind)
}
