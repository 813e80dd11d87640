//! Method injection
//!
//! Injection replaces a method on a class with a wrapper around a new
//! function. The new function receives a [`Defer`] handle that reaches
//! exactly the method that was in effect when it was injected, so repeated
//! injections nest and each layer defers to the one below it.

use crate::error::{ClassError, ClassResult};
use crate::object::class_from_object;
use strata_engine::{EngineResult, Function, Kind, State, Value};
use std::fmt;
use std::rc::Rc;

/// Body of an injected method
pub type InjectedFn = dyn Fn(&mut State, &Defer) -> EngineResult<usize>;

/// Handle to the method an injected layer replaced
#[derive(Clone)]
pub struct Defer {
    class: Rc<str>,
    method: Rc<str>,
    previous: Value,
}

impl Defer {
    /// Class the layer was injected into
    pub fn class(&self) -> &str {
        &self.class
    }

    /// Method name the layer replaced
    pub fn method(&self) -> &str {
        &self.method
    }

    /// The replaced method; nil when there was none
    pub fn previous(&self) -> &Value {
        &self.previous
    }

    /// Whether a method was replaced
    pub fn has_previous(&self) -> bool {
        !self.previous.is_nil()
    }

    /// Call the replaced method with every value of the current frame
    ///
    /// The frame's values stay in place; results are pushed above them.
    /// Returns 0 without calling anything when there was no previous method.
    pub fn call(&self, state: &mut State, nresults: Option<usize>) -> EngineResult<usize> {
        if self.previous.is_nil() {
            return Ok(0);
        }
        let nargs = state.top();
        state.push(self.previous.clone())?;
        for i in 1..=nargs {
            state.push_value(i as isize)?;
        }
        state.call(nargs, nresults)
    }

    /// Run the replaced `__index` for the key at argument 2 and push its value
    ///
    /// Function handlers are called with the receiver and the key; table
    /// handlers are indexed with the key; without a previous handler nil is
    /// pushed. Returns the kind of the pushed value.
    pub fn index(&self, state: &mut State) -> EngineResult<Kind> {
        let obj = state.arg(1);
        let key = state.arg(2);
        let value = match &self.previous {
            Value::Nil => Value::Nil,
            Value::Function(_) => state
                .call_value(&self.previous, vec![obj, key])?
                .into_iter()
                .next()
                .unwrap_or_default(),
            other => state.index(other, &key)?,
        };
        let kind = value.kind();
        state.push(value)?;
        Ok(kind)
    }

    /// Run the replaced `__newindex` with arguments 1 to 3; a no-op without one
    pub fn new_index(&self, state: &mut State) -> EngineResult<()> {
        let obj = state.arg(1);
        let key = state.arg(2);
        let value = state.arg(3);
        match &self.previous {
            Value::Nil => Ok(()),
            Value::Function(_) => state
                .call_value(&self.previous, vec![obj, key, value])
                .map(|_| ()),
            other => state.new_index(other, key, value),
        }
    }
}

impl fmt::Debug for Defer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Defer")
            .field("class", &self.class)
            .field("method", &self.method)
            .field("previous", &self.previous)
            .finish()
    }
}

/// Inject `body` as method `name` of the class behind `class_obj`
///
/// The replaced method is whatever the class resolved `name` to at the time
/// of injection, including inherited definitions.
///
/// # Errors
///
/// Returns `ClassError::InvalidClassObject` when `class_obj` is not a class object.
pub fn inject_method<F>(class_obj: &Value, name: &str, body: F) -> ClassResult<()>
where
    F: Fn(&mut State, &Defer) -> EngineResult<usize> + 'static,
{
    inject_rc(class_obj, name, Rc::new(body))
}

/// Inject a shared body; see [`inject_method`]
pub fn inject_rc(class_obj: &Value, name: &str, body: Rc<InjectedFn>) -> ClassResult<()> {
    let class = class_from_object(class_obj)
        .ok_or_else(|| ClassError::InvalidClassObject(class_obj.type_name()))?;

    let defer = Defer {
        class: class.name_rc(),
        method: Rc::from(name),
        previous: class.resolve_method(name),
    };
    log::debug!(
        "injecting {}.{} (previous: {})",
        class.name(),
        name,
        defer.previous.type_name()
    );

    let wrapper = Function::named(name, move |state| body(state, &defer));
    class.define_method(name, wrapper);
    Ok(())
}

/// Inject an `__index` handler; see [`Defer::index`]
pub fn inject_index<F>(class_obj: &Value, body: F) -> ClassResult<()>
where
    F: Fn(&mut State, &Defer) -> EngineResult<usize> + 'static,
{
    inject_method(class_obj, "__index", body)
}

/// Inject a `__newindex` handler; see [`Defer::new_index`]
pub fn inject_new_index<F>(class_obj: &Value, body: F) -> ClassResult<()>
where
    F: Fn(&mut State, &Defer) -> EngineResult<usize> + 'static,
{
    inject_method(class_obj, "__newindex", body)
}

/// Free-function form of [`Defer::index`]
pub fn defer_index(state: &mut State, defer: &Defer) -> EngineResult<Kind> {
    defer.index(state)
}

/// Free-function form of [`Defer::new_index`]
pub fn defer_new_index(state: &mut State, defer: &Defer) -> EngineResult<()> {
    defer.new_index(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_engine::TableRef;

    fn defer(previous: Value) -> Defer {
        Defer {
            class: Rc::from("Vault"),
            method: Rc::from("__newindex"),
            previous,
        }
    }

    fn push_args(state: &mut State, args: Vec<Value>) {
        for arg in args {
            state.push(arg).unwrap();
        }
    }

    #[test]
    fn test_defer_without_previous() {
        let mut state = State::new();
        let target = TableRef::new();
        push_args(
            &mut state,
            vec![Value::Table(target.clone()), "gold".into(), Value::Int(10)],
        );

        let d = defer(Value::Nil);
        assert!(!d.has_previous());
        d.new_index(&mut state).unwrap();
        assert!(target.raw_get_str("gold").is_nil());
        assert_eq!(state.top(), 3);

        assert_eq!(d.call(&mut state, None).unwrap(), 0);
        assert_eq!(d.index(&mut state).unwrap(), Kind::Nil);
        assert_eq!(state.top(), 4);
    }

    #[test]
    fn test_defer_to_table_handler() {
        let mut state = State::new();
        let storage = TableRef::new();
        push_args(
            &mut state,
            vec![Value::Table(TableRef::new()), "gold".into(), Value::Int(10)],
        );

        let d = defer(Value::Table(storage.clone()));
        d.new_index(&mut state).unwrap();
        assert_eq!(storage.raw_get_str("gold"), Value::Int(10));

        assert_eq!(d.index(&mut state).unwrap(), Kind::Number);
        assert_eq!(state.get(-1).unwrap(), Value::Int(10));
    }

    #[test]
    fn test_inject_requires_class_object() {
        let err = inject_method(&Value::Int(1), "speak", |_, _| Ok(0)).unwrap_err();
        assert!(matches!(err, ClassError::InvalidClassObject("number")));
    }
}
