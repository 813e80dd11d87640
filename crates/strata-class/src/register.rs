//! Class registration
//!
//! Classes enter the registry from Rust descriptors ([`register_native`],
//! [`new_class`]) or from script class tables ([`register_class`]). A script
//! class table carries `__name`, an optional `__parent` (another class table
//! or a class object), a `__base` table of methods and fields, and an optional
//! `__init`; tables accepted here are exactly those [`is_class`] accepts.
//! Registering a name that is already taken changes nothing.

use crate::class::{Class, ClassKind, ClassRef};
use crate::descriptor::NativeClass;
use crate::error::{ClassError, ClassResult};
use crate::object::class_from_object;
use crate::query::is_class;
use crate::registry::ClassRegistry;
use rustc_hash::FxHashSet;
use std::rc::Rc;
use strata_engine::{Function, State, TableRef, Value};

/// Keys of a class table that are not copied into the class's methods
const RESERVED_BASE_KEYS: &[&str] = &["__class"];

/// Register a class declared from Rust
///
/// Returns `true` if the class was added and `false` if a class with the
/// same name was already registered.
///
/// # Errors
///
/// Returns `ClassError::ClassNotFound` when the parent is not registered.
pub fn register_native(state: &mut State, desc: NativeClass) -> ClassResult<bool> {
    register_native_ref(state, desc).map(|(_, added)| added)
}

fn register_native_ref(state: &mut State, desc: NativeClass) -> ClassResult<(ClassRef, bool)> {
    let registry = ClassRegistry::install(state);
    if let Some(existing) = registry.get(&desc.name) {
        return Ok((existing, false));
    }

    let parent = match &desc.parent {
        Some(name) => Some(
            registry
                .get(name)
                .ok_or_else(|| ClassError::ClassNotFound(name.clone()))?,
        ),
        None => None,
    };

    let class = Class::new(&desc.name, parent, ClassKind::Native(desc.hooks), desc.user_ctor);
    for (name, function) in desc.methods {
        class.define_method(&name, function);
    }
    Ok(registry.insert(class))
}

/// Create and register a native class without a payload
///
/// Returns the class object and whether the class was newly added; when the
/// name is already taken the existing class object is returned.
pub fn new_class(
    state: &mut State,
    name: &str,
    parent: Option<&str>,
    methods: Vec<(String, Function)>,
) -> ClassResult<(Value, bool)> {
    let mut desc = NativeClass::new(name);
    desc.parent = parent.map(String::from);
    desc.methods = methods;

    let (class, added) = register_native_ref(state, desc)?;
    let registry = ClassRegistry::install(state);
    Ok((registry.object(&class), added))
}

/// Register a script class table or accept an existing class object
///
/// Parents given as class tables are registered first. Returns `true` if a
/// class was added.
///
/// # Errors
///
/// Returns `ClassError::InvalidClassObject` when `value` (or its parent) is
/// neither a class object nor a class table, or when the `__parent` chain
/// leads back to a class that is still being registered.
pub fn register_class(state: &mut State, value: &Value) -> ClassResult<bool> {
    register_value(state, value).map(|(_, added)| added)
}

pub(crate) fn register_value(state: &mut State, value: &Value) -> ClassResult<(ClassRef, bool)> {
    register_chain(state, value, &mut FxHashSet::default())
}

fn register_chain(
    state: &mut State,
    value: &Value,
    pending: &mut FxHashSet<Rc<str>>,
) -> ClassResult<(ClassRef, bool)> {
    if let Some(class) = class_from_object(value) {
        return Ok((class, false));
    }
    if !is_class(value) {
        return Err(ClassError::InvalidClassObject(match value {
            Value::Table(_) => "table without __name and __base",
            other => other.type_name(),
        }));
    }
    let table = match value {
        Value::Table(t) => t,
        other => return Err(ClassError::InvalidClassObject(other.type_name())),
    };
    let name = match table.raw_get_str("__name") {
        Value::Str(name) => name,
        _ => return Err(ClassError::InvalidClassObject("table without __name")),
    };

    let registry = ClassRegistry::install(state);
    if let Some(existing) = registry.get(&name) {
        return Ok((existing, false));
    }
    if !pending.insert(name.clone()) {
        return Err(ClassError::InvalidClassObject("class with a cyclic __parent chain"));
    }

    let parent = match table.raw_get_str("__parent") {
        Value::Nil => None,
        parent => Some(register_chain(state, &parent, pending)?.0),
    };

    let class = Class::new(&name, parent, ClassKind::Script, true);
    if let Value::Table(base) = table.raw_get_str("__base") {
        copy_base(&class, &base)?;
    }
    let init = table.raw_get_str("__init");
    if !init.is_nil() {
        class.define_method("__init", init);
    }
    pending.remove(&name);
    Ok(registry.insert(class))
}

/// Copy methods and fields from a script `__base` table
///
/// A self-referencing `__index` (the usual `base.__index = base` idiom) is
/// skipped so instances keep the attribute-table lookup.
fn copy_base(class: &Class, base: &TableRef) -> ClassResult<()> {
    for (key, value) in base.pairs() {
        if let Some(key) = key.as_str() {
            if RESERVED_BASE_KEYS.contains(&key) {
                continue;
            }
            if key == "__index" && matches!(&value, Value::Table(t) if TableRef::ptr_eq(t, base)) {
                continue;
            }
        }
        class.define(key, value)?;
    }
    Ok(())
}

/// Look up a registered class by name
pub fn find_class(state: &State, name: &str) -> ClassResult<ClassRef> {
    ClassRegistry::of(state)
        .and_then(|r| r.get(name))
        .ok_or_else(|| ClassError::ClassNotFound(name.to_string()))
}

/// Shorthand for the registry's class object of `class`
pub fn class_object(state: &mut State, class: &ClassRef) -> Value {
    ClassRegistry::install(state).object(class)
}
