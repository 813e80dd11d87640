//! Integration tests for the script-visible class library
//!
//! Tests cover:
//! - Library installation and options
//! - Query, lookup and construction functions called as script functions
//! - `super` called from a method through the library

use strata_class::{open_with, register_native, ClassLibOptions, ClassRegistry, NativeClass};
use strata_engine::{EngineError, State, TableRef, Value};

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
    // Dog reaches Animal's speak through the library's super
    register_native(
        &mut state,
        NativeClass::new("Dog").parent("Animal").method("speak", |state| {
            let lib = state.get_global("class");
            let sup = state.index(&lib, &Value::from("super"))?;
            let results = state.call_value(&sup, vec![Value::from("speak"), state.arg(1)])?;
            let sound = results.into_iter().next().unwrap_or_default();
            state.push(format!("{}!", sound))?;
            Ok(1)
        }),
    )
    .unwrap();
    state
}

fn lib_call(state: &mut State, name: &str, args: Vec<Value>) -> Result<Vec<Value>, EngineError> {
    let lib = state.get_global("class");
    let func = state.index(&lib, &Value::from(name))?;
    state.call_value(&func, args)
}

fn first(results: Vec<Value>) -> Value {
    results.into_iter().next().unwrap_or_default()
}

#[test]
fn test_library_installed() {
    let state = setup();
    let lib = state.get_global("class");
    let lib = lib.as_table().unwrap();
    for name in [
        "isobject",
        "isclass",
        "isinstance",
        "getclass",
        "construct",
        "registerclass",
        "super",
    ] {
        assert!(lib.raw_get_str(name).as_function().is_some(), "missing {}", name);
    }
}

#[test]
fn test_library_options() {
    let mut state = State::new();
    open_with(&mut state, ClassLibOptions::without_global());
    assert!(ClassRegistry::of(&state).is_some());
    assert!(state.get_global("class").is_nil());

    let mut state = State::new();
    open_with(&mut state, ClassLibOptions::with_global("oop"));
    assert!(state.get_global("oop").as_table().is_some());
    assert!(state.get_global("class").is_nil());
}

#[test]
fn test_construct_and_query() {
    let mut state = setup();
    let dog = first(lib_call(&mut state, "construct", vec!["Dog".into(), "Woof".into()]).unwrap());

    assert_eq!(
        first(lib_call(&mut state, "isobject", vec![dog.clone()]).unwrap()),
        Value::Bool(true)
    );
    assert_eq!(
        first(lib_call(&mut state, "isinstance", vec![dog.clone(), "Animal".into()]).unwrap()),
        Value::Bool(true)
    );

    let dog_class = first(lib_call(&mut state, "getclass", vec!["Dog".into()]).unwrap());
    assert_eq!(
        first(lib_call(&mut state, "isclass", vec![dog_class.clone()]).unwrap()),
        Value::Bool(true)
    );
    assert_eq!(
        first(lib_call(&mut state, "isinstance", vec![dog.clone(), dog_class]).unwrap()),
        Value::Bool(true)
    );
    assert_eq!(
        first(lib_call(&mut state, "getclass", vec!["Ghost".into()]).unwrap()),
        Value::Nil
    );

    let results = strata_class::call_method(&mut state, &dog, "speak", vec![]).unwrap();
    assert_eq!(results, vec![Value::from("Woof!")]);
}

#[test]
fn test_construct_errors_raise() {
    let mut state = setup();
    let err = lib_call(&mut state, "construct", vec!["Ghost".into()]).unwrap_err();
    assert_eq!(err.to_value(), Value::from("class 'Ghost' is not registered"));

    let err = lib_call(&mut state, "getclass", vec![Value::Int(1)]).unwrap_err();
    assert!(matches!(err, EngineError::TypeError(_)));
}

#[test]
fn test_registerclass() {
    let mut state = setup();
    let class = TableRef::new();
    class.raw_set_str("__name", "Bird");
    class.raw_set_str("__base", TableRef::from_pairs([("wings", 2)]));
    let dog_class = first(lib_call(&mut state, "getclass", vec!["Dog".into()]).unwrap());
    class.raw_set_str("__parent", dog_class);

    let added = first(lib_call(&mut state, "registerclass", vec![Value::Table(class.clone())]).unwrap());
    assert_eq!(added, Value::Bool(true));
    let again = first(lib_call(&mut state, "registerclass", vec![Value::Table(class)]).unwrap());
    assert_eq!(again, Value::Bool(false));

    let bird = first(lib_call(&mut state, "construct", vec!["Bird".into(), "Tweet".into()]).unwrap());
    assert_eq!(state.index(&bird, &Value::from("wings")).unwrap(), Value::Int(2));
    let results = strata_class::call_method(&mut state, &bird, "speak", vec![]).unwrap();
    assert_eq!(results, vec![Value::from("Tweet!")]);

    assert!(lib_call(&mut state, "registerclass", vec![Value::Int(3)]).is_err());
}
