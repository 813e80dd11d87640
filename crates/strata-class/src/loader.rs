//! Class definition loading
//!
//! Setup code and tests obtain script class tables through a [`ScriptLoader`].
//! The bundled [`DefinitionLoader`] reads JSON class definitions and binds
//! method names to native functions from a [`FunctionLibrary`]:
//!
//! ```json
//! {
//!   "name": "Base",
//!   "parent": "Object",
//!   "fields": { "var": "Eek!" },
//!   "methods": { "squeak": "base.squeak" },
//!   "init": "base.init"
//! }
//! ```
//!
//! A file holds one definition or an array of them; a parent may be a
//! registered class or a class defined earlier in the same file. Loading
//! produces class tables but does not register them.

use crate::registry::ClassRegistry;
use rustc_hash::FxHashMap;
use serde::Deserialize;
use strata_engine::{Function, State, TableRef, Value};
use std::collections::BTreeMap;
use std::path::Path;

/// Errors from loading class definitions
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The file could not be read
    #[error("failed to read class definitions: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for a class definition
    #[error("invalid class definition: {0}")]
    Parse(#[from] serde_json::Error),

    /// A method refers to a function missing from the library
    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    /// A parent is neither registered nor defined earlier in the file
    #[error("unknown parent class '{0}'")]
    UnknownParent(String),

    /// The definition is structurally invalid
    #[error("malformed class definition: {0}")]
    Malformed(String),
}

/// Loads a script file and returns the class definition it produces
pub trait ScriptLoader {
    /// Load and run the script at `path`
    fn load_and_run(&self, state: &mut State, path: &Path) -> Result<Value, LoadError>;
}

/// Native functions available to class definitions, by name
#[derive(Default)]
pub struct FunctionLibrary {
    functions: FxHashMap<String, Function>,
}

impl FunctionLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function by name
    pub fn register<F>(&mut self, name: &str, body: F)
    where
        F: Fn(&mut State) -> strata_engine::EngineResult<usize> + 'static,
    {
        self.functions
            .insert(name.to_string(), Function::named(name, body));
    }

    /// Register an existing function by name
    pub fn insert(&mut self, name: &str, function: Function) {
        self.functions.insert(name.to_string(), function);
    }

    /// Get a function by name
    pub fn get(&self, name: &str) -> Option<Function> {
        self.functions.get(name).cloned()
    }

    /// Check if a function is registered
    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Number of registered functions
    pub fn len(&self) -> usize {
        self.functions.len()
    }

    /// Check if the library is empty
    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassDefinition {
    name: String,
    #[serde(default)]
    parent: Option<String>,
    #[serde(default)]
    fields: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    methods: BTreeMap<String, String>,
    #[serde(default)]
    init: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DefinitionFile {
    Many(Vec<ClassDefinition>),
    One(ClassDefinition),
}

/// Loader for JSON class definitions
pub struct DefinitionLoader {
    functions: FunctionLibrary,
}

impl DefinitionLoader {
    /// Create a loader binding methods from `functions`
    pub fn new(functions: FunctionLibrary) -> Self {
        Self { functions }
    }

    /// Functions available to definitions
    pub fn functions(&self) -> &FunctionLibrary {
        &self.functions
    }

    /// Build class tables from JSON source; returns the last class defined
    pub fn load_str(&self, state: &mut State, source: &str) -> Result<Value, LoadError> {
        let definitions = match serde_json::from_str(source)? {
            DefinitionFile::Many(defs) => defs,
            DefinitionFile::One(def) => vec![def],
        };

        let mut defined: FxHashMap<String, TableRef> = FxHashMap::default();
        let mut last = None;
        for def in definitions {
            let table = self.build(state, &def, &defined)?;
            log::debug!("loaded class definition '{}'", def.name);
            defined.insert(def.name, table.clone());
            last = Some(table);
        }
        last.map(Value::Table)
            .ok_or_else(|| LoadError::Malformed("no classes defined".to_string()))
    }

    fn build(
        &self,
        state: &State,
        def: &ClassDefinition,
        defined: &FxHashMap<String, TableRef>,
    ) -> Result<TableRef, LoadError> {
        if def.name.is_empty() {
            return Err(LoadError::Malformed("empty class name".to_string()));
        }

        let class = TableRef::new();
        class.raw_set_str("__name", def.name.as_str());

        if let Some(parent) = &def.parent {
            let parent_value = match defined.get(parent) {
                Some(table) => Value::Table(table.clone()),
                None => ClassRegistry::of(state)
                    .and_then(|r| r.object_named(parent))
                    .ok_or_else(|| LoadError::UnknownParent(parent.clone()))?,
            };
            class.raw_set_str("__parent", parent_value);
        }

        let base = TableRef::new();
        for (name, value) in &def.fields {
            base.raw_set_str(name, json_to_value(value));
        }
        for (name, function) in &def.methods {
            base.raw_set_str(name, self.function(function)?);
        }
        class.raw_set_str("__base", base);

        if let Some(init) = &def.init {
            class.raw_set_str("__init", self.function(init)?);
        }
        Ok(class)
    }

    fn function(&self, name: &str) -> Result<Function, LoadError> {
        self.functions
            .get(name)
            .ok_or_else(|| LoadError::UnknownFunction(name.to_string()))
    }
}

impl ScriptLoader for DefinitionLoader {
    fn load_and_run(&self, state: &mut State, path: &Path) -> Result<Value, LoadError> {
        log::debug!("loading class definitions from {}", path.display());
        let source = std::fs::read_to_string(path)?;
        self.load_str(state, &source)
    }
}

fn json_to_value(value: &serde_json::Value) -> Value {
    match value {
        serde_json::Value::Null => Value::Nil,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Value::from(s.as_str()),
        serde_json::Value::Array(items) => {
            let table = TableRef::new();
            for (i, item) in items.iter().enumerate() {
                let _ = table.raw_set(Value::Int(i as i64 + 1), json_to_value(item));
            }
            Value::Table(table)
        }
        serde_json::Value::Object(entries) => {
            let table = TableRef::new();
            for (key, item) in entries {
                table.raw_set_str(key, json_to_value(item));
            }
            Value::Table(table)
        }
    }
}
