//! Instances
//!
//! Every instance is a foreign object holding an [`Instance`] record (its
//! class plus an optional native payload) and one user value, the attribute
//! table. All instances share one metatable whose handlers look the real
//! handler up on the instance's class at access time, so methods injected
//! after an instance was created still take effect.

use crate::class::ClassRef;
use crate::descriptor::Destructor;
use crate::registry::ClassRegistry;
use strata_engine::{EngineError, EngineResult, Function, TableRef, Value};
use std::any::Any;
use std::fmt;

/// User-value slot holding the attribute table
pub const ATTRIBUTES: usize = 0;

/// Number of user-value slots on an instance
pub const USER_VALUES: usize = 1;

/// Foreign-object record behind every instance
pub struct Instance {
    class: ClassRef,
    payload: Option<Box<dyn Any>>,
    finalizer: Option<Destructor>,
}

impl Instance {
    pub(crate) fn new(
        class: ClassRef,
        payload: Option<Box<dyn Any>>,
        finalizer: Option<Destructor>,
    ) -> Self {
        Self {
            class,
            payload,
            finalizer,
        }
    }

    /// The class this instance was constructed from
    pub fn class(&self) -> &ClassRef {
        &self.class
    }

    /// Whether a native payload was allocated
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }

    /// Borrow the payload as `T`
    pub fn payload<T: Any>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref::<T>()
    }

    /// Mutably borrow the payload as `T`
    pub fn payload_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.payload.as_mut()?.downcast_mut::<T>()
    }
}

impl Drop for Instance {
    fn drop(&mut self) {
        if let (Some(payload), Some(gc)) = (self.payload.as_mut(), self.finalizer.take()) {
            log::trace!("finalizing {} payload", self.class.name());
            gc(payload.as_mut());
        }
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instance")
            .field("class", &self.class.name())
            .field("payload", &self.payload.is_some())
            .finish()
    }
}

/// Class of an instance value
pub fn class_of(value: &Value) -> Option<ClassRef> {
    let ud = value.as_userdata()?;
    let instance = ud.borrow::<Instance>()?;
    Some(instance.class.clone())
}

/// Attribute table of an instance value
pub fn attributes(value: &Value) -> Option<TableRef> {
    match value.as_userdata()?.user_value(ATTRIBUTES) {
        Value::Table(t) => Some(t),
        _ => None,
    }
}

fn expect_class(value: &Value) -> EngineResult<ClassRef> {
    class_of(value).ok_or_else(|| {
        EngineError::TypeError(format!("instance expected, got {}", value.type_name()))
    })
}

fn first(results: Vec<Value>) -> Value {
    results.into_iter().next().unwrap_or_default()
}

/// Shared instance metatable
pub(crate) fn metatable() -> TableRef {
    let meta = TableRef::new();
    meta.raw_set_str("__name", "instance");
    meta.raw_set_str(
        "__index",
        Function::named("__index", |state| {
            let obj = state.arg(1);
            let key = state.arg(2);
            let class = expect_class(&obj)?;
            let value = match class.resolve_method("__index") {
                Value::Nil => Value::Nil,
                handler @ Value::Function(_) => first(state.call_value(&handler, vec![obj, key])?),
                other => state.index(&other, &key)?,
            };
            state.push(value)?;
            Ok(1)
        }),
    );
    meta.raw_set_str(
        "__newindex",
        Function::named("__newindex", |state| {
            let obj = state.arg(1);
            let key = state.arg(2);
            let value = state.arg(3);
            let class = expect_class(&obj)?;
            match class.resolve_method("__newindex") {
                Value::Nil => raw_assign(&obj, key, value)?,
                handler @ Value::Function(_) => {
                    state.call_value(&handler, vec![obj, key, value])?;
                }
                other => state.new_index(&other, key, value)?,
            }
            Ok(0)
        }),
    );
    meta.raw_set_str(
        "__call",
        Function::named("__call", |state| {
            let class = expect_class(&state.arg(1))?;
            let handler = class.resolve_method("__call");
            if handler.is_nil() {
                return Err(EngineError::TypeError(format!(
                    "attempt to call a {} instance",
                    class.name()
                )));
            }
            let args = state.take(state.top())?;
            let results = state.call_value(&handler, args)?;
            let n = results.len();
            for value in results {
                state.push(value)?;
            }
            Ok(n)
        }),
    );
    meta
}

fn raw_assign(obj: &Value, key: Value, value: Value) -> EngineResult<()> {
    match attributes(obj) {
        Some(attrs) => attrs.raw_set(key, value),
        None => Err(EngineError::TypeError(format!(
            "instance of {} has no attribute table",
            class_of(obj).map_or_else(|| "?".to_string(), |c| c.name().to_string())
        ))),
    }
}

/// Default `__index` installed on root classes
///
/// Looks in the attribute table, then answers `__class` with the class
/// object, then resolves the key along the class lineage.
pub(crate) fn default_index() -> Function {
    Function::named("__index", |state| {
        let obj = state.arg(1);
        let key = state.arg(2);
        let class = expect_class(&obj)?;

        let mut value = attributes(&obj).map_or(Value::Nil, |a| a.raw_get(&key));
        if value.is_nil() {
            value = if key.as_str() == Some("__class") {
                ClassRegistry::of(state).map_or(Value::Nil, |r| r.object(&class))
            } else {
                class.resolve(&key)
            };
        }
        state.push(value)?;
        Ok(1)
    })
}

/// Default `__newindex` installed on root classes: store into the attribute table
pub(crate) fn default_newindex() -> Function {
    Function::named("__newindex", |state| {
        let obj = state.arg(1);
        raw_assign(&obj, state.arg(2), state.arg(3))?;
        Ok(0)
    })
}

/// Stack-level helpers for user-value tables
///
/// Each helper addresses the table stored in user value `uv` of the foreign
/// object at `index`. Getters push nil and setters report `false` when that
/// slot does not hold a table.
pub mod uv {
    use strata_engine::{EngineResult, Kind, State, TableRef, Value};

    fn table(state: &State, index: isize, uv: usize) -> EngineResult<Option<TableRef>> {
        Ok(match state.get(index)? {
            Value::Userdata(u) => match u.user_value(uv) {
                Value::Table(t) => Some(t),
                _ => None,
            },
            _ => None,
        })
    }

    fn push(state: &mut State, value: Value) -> EngineResult<Kind> {
        let kind = value.kind();
        state.push(value)?;
        Ok(kind)
    }

    /// Replace the key on top with `uvtable[key]` (raw)
    pub fn raw_get(state: &mut State, index: isize, uv: usize) -> EngineResult<Kind> {
        let t = table(state, index, uv)?;
        let key = state.pop()?;
        push(state, t.map_or(Value::Nil, |t| t.raw_get(&key)))
    }

    /// Pop a value and a key and store `uvtable[key] = value` (raw)
    pub fn raw_set(state: &mut State, index: isize, uv: usize) -> EngineResult<bool> {
        let t = table(state, index, uv)?;
        let value = state.pop()?;
        let key = state.pop()?;
        match t {
            Some(t) => t.raw_set(key, value).map(|_| true),
            None => Ok(false),
        }
    }

    /// Push `uvtable[p]` for an identity pointer key
    pub fn raw_getp(state: &mut State, index: isize, uv: usize, p: usize) -> EngineResult<Kind> {
        let t = table(state, index, uv)?;
        push(state, t.map_or(Value::Nil, |t| t.raw_getp(p)))
    }

    /// Pop a value and store `uvtable[p] = value` for an identity pointer key
    pub fn raw_setp(state: &mut State, index: isize, uv: usize, p: usize) -> EngineResult<bool> {
        let t = table(state, index, uv)?;
        let value = state.pop()?;
        Ok(match t {
            Some(t) => {
                t.raw_setp(p, value);
                true
            }
            None => false,
        })
    }

    /// Replace the key on top with `uvtable[key]`, honoring metamethods
    pub fn get(state: &mut State, index: isize, uv: usize) -> EngineResult<Kind> {
        let t = table(state, index, uv)?;
        let key = state.pop()?;
        let value = match t {
            Some(t) => state.index(&Value::Table(t), &key)?,
            None => Value::Nil,
        };
        push(state, value)
    }

    /// Pop a value and a key and assign `uvtable[key] = value`, honoring metamethods
    pub fn set(state: &mut State, index: isize, uv: usize) -> EngineResult<bool> {
        let t = table(state, index, uv)?;
        let value = state.pop()?;
        let key = state.pop()?;
        match t {
            Some(t) => state.new_index(&Value::Table(t), key, value).map(|_| true),
            None => Ok(false),
        }
    }

    /// Push `uvtable[name]`, honoring metamethods
    pub fn get_field(state: &mut State, index: isize, uv: usize, name: &str) -> EngineResult<Kind> {
        let index = state.abs_index(index)?;
        state.push(name)?;
        get(state, index, uv)
    }

    /// Pop a value and assign `uvtable[name] = value`, honoring metamethods
    pub fn set_field(state: &mut State, index: isize, uv: usize, name: &str) -> EngineResult<bool> {
        let index = state.abs_index(index)?;
        let value = state.pop()?;
        state.push(name)?;
        state.push(value)?;
        set(state, index, uv)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{Class, ClassKind};
    use std::cell::Cell;
    use std::rc::Rc;
    use strata_engine::{Kind, State, UserdataRef};

    fn object_with_table() -> (Value, TableRef) {
        let attrs = TableRef::new();
        let ud = UserdataRef::new((), 2);
        ud.set_user_value(ATTRIBUTES, Value::Table(attrs.clone()));
        (Value::Userdata(ud), attrs)
    }

    #[test]
    fn test_finalizer_runs_once_with_payload() {
        thread_local! {
            static RUNS: Cell<u32> = Cell::new(0);
        }
        let class = Rc::new(Class::new("T", None, ClassKind::Script, true));
        let gc: Destructor = Rc::new(|_| RUNS.with(|r| r.set(r.get() + 1)));

        drop(Instance::new(class.clone(), Some(Box::new(1u8)), Some(gc.clone())));
        assert_eq!(RUNS.with(Cell::get), 1);

        // no payload, nothing to finalize
        drop(Instance::new(class, None, Some(gc)));
        assert_eq!(RUNS.with(Cell::get), 1);
    }

    #[test]
    fn test_payload_access() {
        let class = Rc::new(Class::new("T", None, ClassKind::Script, true));
        let mut instance = Instance::new(class, Some(Box::new(3i32)), None);
        assert!(instance.has_payload());
        assert_eq!(instance.payload::<i32>(), Some(&3));
        assert!(instance.payload::<u8>().is_none());
        *instance.payload_mut::<i32>().unwrap() = 4;
        assert_eq!(instance.payload::<i32>(), Some(&4));
    }

    #[test]
    fn test_uv_raw_access() {
        let mut state = State::new();
        let (obj, attrs) = object_with_table();
        state.push(obj).unwrap();

        state.push("x").unwrap();
        state.push(1).unwrap();
        assert!(uv::raw_set(&mut state, 1, ATTRIBUTES).unwrap());
        assert_eq!(attrs.raw_get_str("x"), Value::Int(1));

        state.push("x").unwrap();
        assert_eq!(uv::raw_get(&mut state, 1, ATTRIBUTES).unwrap(), Kind::Number);
        state.pop().unwrap();

        state.push(true).unwrap();
        assert!(uv::raw_setp(&mut state, 1, ATTRIBUTES, 0x10).unwrap());
        assert_eq!(uv::raw_getp(&mut state, 1, ATTRIBUTES, 0x10).unwrap(), Kind::Bool);
        state.pop().unwrap();
        assert_eq!(state.top(), 1);
    }

    #[test]
    fn test_uv_missing_table() {
        let mut state = State::new();
        let (obj, _) = object_with_table();
        state.push(obj).unwrap();

        // slot 1 exists but holds no table
        state.push(5).unwrap();
        assert!(!uv::set_field(&mut state, 1, 1, "x").unwrap());
        assert_eq!(uv::get_field(&mut state, 1, 1, "x").unwrap(), Kind::Nil);
        assert_eq!(state.top(), 2);

        state.push(Value::Int(9)).unwrap();
        state.push("k").unwrap();
        assert_eq!(uv::raw_get(&mut state, -2, ATTRIBUTES).unwrap(), Kind::Nil);
    }

    #[test]
    fn test_uv_fields_follow_metamethods() {
        let mut state = State::new();
        let (obj, attrs) = object_with_table();
        attrs.set_metatable(Some(TableRef::from_pairs([(
            "__index",
            TableRef::from_pairs([("fallback", "yes")]),
        )])));
        state.push(obj).unwrap();

        assert_eq!(uv::get_field(&mut state, 1, ATTRIBUTES, "fallback").unwrap(), Kind::Str);
        assert_eq!(state.pop().unwrap(), Value::from("yes"));

        state.push("v").unwrap();
        assert!(uv::set_field(&mut state, -2, ATTRIBUTES, "k").unwrap());
        assert_eq!(attrs.raw_get_str("k"), Value::from("v"));
    }
}
