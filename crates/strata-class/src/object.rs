//! Class objects
//!
//! The script-visible handle of a registered class. Indexing a class object
//! answers `__name`, `__parent` and `__base`, then resolves the key along the
//! lineage; assigning stores into the class's own methods; calling it
//! constructs an instance when the class allows user construction.

use crate::class::ClassRef;
use crate::construct;
use crate::error::ClassError;
use crate::registry::ClassRegistry;
use strata_engine::{EngineError, EngineResult, Function, State, TableRef, Value};

/// Foreign-object record behind every class object
#[derive(Debug)]
pub struct ClassObject {
    class: ClassRef,
}

impl ClassObject {
    pub(crate) fn new(class: ClassRef) -> Self {
        Self { class }
    }

    /// The class this object stands for
    pub fn class(&self) -> &ClassRef {
        &self.class
    }
}

/// Class behind a class object value
pub fn class_from_object(value: &Value) -> Option<ClassRef> {
    let ud = value.as_userdata()?;
    let object = ud.borrow::<ClassObject>()?;
    Some(object.class.clone())
}

fn expect_class(value: &Value) -> EngineResult<ClassRef> {
    class_from_object(value).ok_or_else(|| ClassError::InvalidClassObject(value.type_name()).into())
}

/// Shared class-object metatable
pub(crate) fn metatable() -> TableRef {
    let meta = TableRef::new();
    meta.raw_set_str("__name", "class");
    meta.raw_set_str(
        "__index",
        Function::named("__index", |state| {
            let class = expect_class(&state.arg(1))?;
            let key = state.arg(2);
            let value = match key.as_str() {
                Some("__name") => Value::Str(class.name_rc()),
                Some("__base") => Value::Table(class.methods().clone()),
                Some("__parent") => match (class.parent(), ClassRegistry::of(state)) {
                    (Some(parent), Some(registry)) => registry.object(parent),
                    _ => Value::Nil,
                },
                _ => class.resolve(&key),
            };
            state.push(value)?;
            Ok(1)
        }),
    );
    meta.raw_set_str(
        "__newindex",
        Function::named("__newindex", |state| {
            let class = expect_class(&state.arg(1))?;
            log::trace!("defining {}.{}", class.name(), state.arg(2));
            class.define(state.arg(2), state.arg(3))?;
            Ok(0)
        }),
    );
    meta.raw_set_str("__call", Function::named("__call", call_class));
    meta
}

/// Construct an instance by calling the class object
fn call_class(state: &mut State) -> EngineResult<usize> {
    let class = expect_class(&state.arg(1))?;
    if !class.user_ctor() {
        return Err(ClassError::ConstructionForbidden(class.name().to_string()).into());
    }
    state.remove(1)?;
    let nargs = state.top();
    match construct::construct(state, nargs, class.name()) {
        Ok(()) => Ok(1),
        Err(ClassError::InitializationFailure { source, .. }) => Err(source),
        Err(e) => Err(EngineError::from(e)),
    }
}
