//! Integration tests for method injection
//!
//! Tests cover:
//! - Nested injections deferring in LIFO order
//! - Computed properties through `__index` injection
//! - Intercepted assignments through `__newindex` injection
//! - Injection into classes without a previous method or assignment handler
//! - `super` from injected methods

use std::cell::RefCell;
use std::rc::Rc;
use strata_class::{
    attributes, call_method, defer_new_index, get_class, inject_index, inject_method,
    inject_new_index, new_instance, register_native, super_call, ClassError, NativeClass,
};
use strata_engine::{EngineError, Kind, State, TableRef, Value};

fn setup() -> State {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut state = State::new();
    strata_class::open(&mut state);

    register_native(
        &mut state,
        NativeClass::new("Animal")
            .init(|state| {
                let obj = state.arg(1);
                state.new_index(&obj, Value::from("sound"), state.arg(2))?;
                Ok(0)
            })
            .method("speak", |state| {
                state.get_field(1, "sound")?;
                Ok(1)
            }),
    )
    .unwrap();
    register_native(
        &mut state,
        NativeClass::new("Dog").parent("Animal").method("speak", |state| {
            super_call(state, "speak", Some(1))?;
            let sound = state.pop()?;
            state.push(format!("{}!", sound))?;
            Ok(1)
        }),
    )
    .unwrap();
    state
}

fn speak(state: &mut State, obj: &Value) -> Value {
    call_method(state, obj, "speak", vec![])
        .unwrap()
        .into_iter()
        .next()
        .unwrap_or_default()
}

#[test]
fn test_nested_injection_defers_lifo() {
    let mut state = setup();
    let dog_class = get_class(&state, "Dog").unwrap();
    let dog = new_instance(&mut state, "Dog", vec![Value::from("Woof")]).unwrap();

    for tag in ["f1", "f2"] {
        inject_method(&dog_class, "speak", move |state, defer| {
            defer.call(state, Some(1))?;
            let inner = state.pop()?;
            state.push(format!("{} {}", inner, tag))?;
            Ok(1)
        })
        .unwrap();
    }

    // the instance existed before both injections
    assert_eq!(speak(&mut state, &dog), Value::from("Woof! f1 f2"));
}

#[test]
fn test_defer_passes_arguments() {
    let mut state = setup();
    register_native(
        &mut state,
        NativeClass::new("Calc").method("add", |state| {
            let a = state.arg(2).as_int().unwrap_or(0);
            let b = state.arg(3).as_int().unwrap_or(0);
            state.push(a + b)?;
            Ok(1)
        }),
    )
    .unwrap();
    let calc_class = get_class(&state, "Calc").unwrap();
    inject_method(&calc_class, "add", |state, defer| {
        defer.call(state, Some(1))?;
        let sum = state.pop()?.as_int().unwrap_or(0);
        state.push(sum * 10)?;
        Ok(1)
    })
    .unwrap();

    let calc = new_instance(&mut state, "Calc", vec![]).unwrap();
    let result = call_method(&mut state, &calc, "add", vec![Value::Int(2), Value::Int(3)]).unwrap();
    assert_eq!(result, vec![Value::Int(50)]);
}

#[test]
fn test_inherited_method_is_the_deferred_one() {
    let mut state = setup();
    register_native(&mut state, NativeClass::new("Puppy").parent("Dog")).unwrap();
    let puppy_class = get_class(&state, "Puppy").unwrap();
    inject_method(&puppy_class, "speak", |state, defer| {
        assert_eq!(defer.class(), "Puppy");
        assert_eq!(defer.method(), "speak");
        assert!(defer.has_previous());
        defer.call(state, Some(1))?;
        let inner = state.pop()?;
        state.push(format!("tiny {}", inner))?;
        Ok(1)
    })
    .unwrap();

    let puppy = new_instance(&mut state, "Puppy", vec![Value::from("yip")]).unwrap();
    let dog = new_instance(&mut state, "Dog", vec![Value::from("Woof")]).unwrap();
    assert_eq!(speak(&mut state, &puppy), Value::from("tiny yip!"));
    // the parent class is untouched
    assert_eq!(speak(&mut state, &dog), Value::from("Woof!"));
}

#[test]
fn test_computed_property() {
    let mut state = setup();
    let dog_class = get_class(&state, "Dog").unwrap();
    inject_index(&dog_class, |state, defer| {
        if state.arg(2).as_str() == Some("magic") {
            state.push(42)?;
        } else {
            defer.index(state)?;
        }
        Ok(1)
    })
    .unwrap();

    let dog = new_instance(&mut state, "Dog", vec![Value::from("Woof")]).unwrap();
    assert_eq!(state.index(&dog, &Value::from("magic")).unwrap(), Value::Int(42));
    assert_eq!(state.index(&dog, &Value::from("sound")).unwrap(), Value::from("Woof"));
    assert_eq!(speak(&mut state, &dog), Value::from("Woof!"));

    // Animal instances keep the default lookup
    let cat = new_instance(&mut state, "Animal", vec![Value::from("Meow")]).unwrap();
    assert_eq!(state.index(&cat, &Value::from("magic")).unwrap(), Value::Nil);
}

#[test]
fn test_defer_index_reports_kind() {
    let mut state = setup();
    let kinds = Rc::new(RefCell::new(Vec::new()));
    let seen = kinds.clone();
    let animal_class = get_class(&state, "Animal").unwrap();
    inject_index(&animal_class, move |state, defer| {
        let kind = defer.index(state)?;
        seen.borrow_mut().push(kind);
        Ok(1)
    })
    .unwrap();

    let dog = new_instance(&mut state, "Dog", vec![Value::from("Woof")]).unwrap();
    state.index(&dog, &Value::from("sound")).unwrap();
    state.index(&dog, &Value::from("speak")).unwrap();
    state.index(&dog, &Value::from("nothing")).unwrap();
    assert_eq!(*kinds.borrow(), vec![Kind::Str, Kind::Function, Kind::Nil]);
}

#[test]
fn test_intercepted_assignment() {
    let mut state = setup();
    let journal = TableRef::new();
    let writes = journal.clone();
    let animal_class = get_class(&state, "Animal").unwrap();
    inject_new_index(&animal_class, move |state, defer| {
        let key = state.arg(2);
        if key.as_str() == Some("locked") {
            return Err(EngineError::runtime("locked is read-only"));
        }
        writes.raw_set(key, Value::Bool(true))?;
        defer.new_index(state)?;
        Ok(0)
    })
    .unwrap();

    let dog = new_instance(&mut state, "Dog", vec![Value::from("Woof")]).unwrap();
    state.new_index(&dog, Value::from("name"), Value::from("Rex")).unwrap();
    assert_eq!(state.index(&dog, &Value::from("name")).unwrap(), Value::from("Rex"));
    assert_eq!(journal.raw_get_str("name"), Value::Bool(true));
    // the initializer's assignment went through the injected handler too
    assert_eq!(journal.raw_get_str("sound"), Value::Bool(true));

    let err = state
        .new_index(&dog, Value::from("locked"), Value::Int(1))
        .unwrap_err();
    assert_eq!(err.to_value(), Value::from("locked is read-only"));
    assert_eq!(state.index(&dog, &Value::from("locked")).unwrap(), Value::Nil);
}

#[test]
fn test_injection_without_previous_method() {
    let mut state = setup();
    let animal_class = get_class(&state, "Animal").unwrap();
    inject_method(&animal_class, "fetch", |state, defer| {
        assert!(!defer.has_previous());
        let n = defer.call(state, None)?;
        state.push(n as i64)?;
        Ok(1)
    })
    .unwrap();

    let dog = new_instance(&mut state, "Dog", vec![]).unwrap();
    assert_eq!(
        call_method(&mut state, &dog, "fetch", vec![Value::from("ball")]).unwrap(),
        vec![Value::Int(0)]
    );
}

#[test]
fn test_deferred_assignment_without_previous_handler() {
    let mut state = setup();
    register_native(&mut state, NativeClass::new("Vault")).unwrap();
    let vault_class = get_class(&state, "Vault").unwrap();
    // drop the default attribute-table assignment
    state
        .new_index(&vault_class, Value::from("__newindex"), Value::Nil)
        .unwrap();

    let attempts = Rc::new(RefCell::new(Vec::new()));
    let seen = attempts.clone();
    inject_new_index(&vault_class, move |state, defer| {
        assert!(!defer.has_previous());
        seen.borrow_mut().push(state.arg(2));
        defer_new_index(state, defer)?;
        Ok(0)
    })
    .unwrap();

    let vault = new_instance(&mut state, "Vault", vec![]).unwrap();
    state
        .new_index(&vault, Value::from("gold"), Value::Int(10))
        .unwrap();

    assert_eq!(*attempts.borrow(), vec![Value::from("gold")]);
    let attrs = attributes(&vault).unwrap();
    assert!(attrs.raw_get_str("gold").is_nil());
    assert!(attrs.pairs().is_empty());
    assert_eq!(state.index(&vault, &Value::from("gold")).unwrap(), Value::Nil);
}

#[test]
fn test_injected_method_super_is_lexical() {
    let mut state = setup();
    let dog_class = get_class(&state, "Dog").unwrap();
    inject_method(&dog_class, "speak", |state, _defer| {
        // skips Dog's own "!" and reaches Animal directly
        super_call(state, "speak", Some(1))?;
        Ok(1)
    })
    .unwrap();

    let dog = new_instance(&mut state, "Dog", vec![Value::from("Woof")]).unwrap();
    assert_eq!(speak(&mut state, &dog), Value::from("Woof"));
}

#[test]
fn test_inject_rejects_non_class() {
    let mut state = setup();
    let dog = new_instance(&mut state, "Dog", vec![]).unwrap();

    for target in [Value::Nil, Value::from("Dog"), dog] {
        let err = inject_method(&target, "speak", |_, _| Ok(0)).unwrap_err();
        assert!(matches!(err, ClassError::InvalidClassObject(_)));
    }
}
