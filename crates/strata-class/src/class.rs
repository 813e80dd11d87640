//! Registered classes
//!
//! A `Class` is the runtime form of a registered class: its name, a link to
//! its parent, the methods it defines itself, and (for native classes) the
//! hooks that manage instance payloads. Lookups walk the parent chain and the
//! nearest definition wins.

use crate::descriptor::{Allocator, Destructor, NativeHooks};
use rustc_hash::FxHashSet;
use strata_engine::{EngineResult, TableRef, Value};
use std::fmt;
use std::rc::Rc;

/// Shared handle to a registered class
pub type ClassRef = Rc<Class>;

/// Where a class comes from
#[derive(Debug, Clone)]
pub enum ClassKind {
    /// Declared from Rust, possibly with a native payload
    Native(NativeHooks),
    /// Declared by script as a class table
    Script,
}

/// A registered class
pub struct Class {
    /// Class name (unique within a registry)
    name: Rc<str>,

    /// Parent class
    parent: Option<ClassRef>,

    /// Native or script
    kind: ClassKind,

    /// Whether calling the class object constructs instances
    user_ctor: bool,

    /// Methods defined directly on this class
    methods: TableRef,

    /// Names of this class and all its ancestors
    lineage: FxHashSet<Rc<str>>,

    /// Number of ancestors
    depth: usize,
}

impl Class {
    /// Create a class; functions already in `methods` are not re-owned
    pub(crate) fn new(
        name: &str,
        parent: Option<ClassRef>,
        kind: ClassKind,
        user_ctor: bool,
    ) -> Self {
        let name: Rc<str> = Rc::from(name);
        let mut lineage = parent
            .as_ref()
            .map(|p| p.lineage.clone())
            .unwrap_or_default();
        lineage.insert(name.clone());
        let depth = parent.as_ref().map_or(0, |p| p.depth + 1);

        Self {
            name,
            parent,
            kind,
            user_ctor,
            methods: TableRef::new(),
            lineage,
            depth,
        }
    }

    /// Class name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Class name as a shared string
    pub fn name_rc(&self) -> Rc<str> {
        self.name.clone()
    }

    /// Parent class
    pub fn parent(&self) -> Option<&ClassRef> {
        self.parent.as_ref()
    }

    /// Native or script
    pub fn kind(&self) -> &ClassKind {
        &self.kind
    }

    /// Native hooks, when declared from Rust
    pub fn native(&self) -> Option<&NativeHooks> {
        match &self.kind {
            ClassKind::Native(hooks) => Some(hooks),
            ClassKind::Script => None,
        }
    }

    /// Whether the class was declared from Rust
    pub fn is_native(&self) -> bool {
        matches!(self.kind, ClassKind::Native(_))
    }

    /// Whether calling the class object constructs instances
    pub fn user_ctor(&self) -> bool {
        self.user_ctor
    }

    /// Methods defined directly on this class
    pub fn methods(&self) -> &TableRef {
        &self.methods
    }

    /// Number of ancestors (0 for a root class)
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Whether this class is `name` or descends from it
    #[inline]
    pub fn is_a(&self, name: &str) -> bool {
        self.lineage.contains(name)
    }

    /// Iterate over this class and its ancestors, nearest first
    pub fn lineage(&self) -> Lineage<'_> {
        Lineage { next: Some(self) }
    }

    /// The ancestor `depth` levels up (0 is this class)
    pub fn ancestor(&self, depth: usize) -> Option<&Class> {
        self.lineage().nth(depth)
    }

    /// The nearest class in the lineage named `name`
    pub fn find(&self, name: &str) -> Option<&Class> {
        if !self.is_a(name) {
            return None;
        }
        self.lineage().find(|c| c.name() == name)
    }

    /// Resolve `key` along the lineage; nil when no class defines it
    pub fn resolve(&self, key: &Value) -> Value {
        for class in self.lineage() {
            let value = class.methods.raw_get(key);
            if !value.is_nil() {
                return value;
            }
        }
        Value::Nil
    }

    /// Resolve a method by name
    #[inline]
    pub fn resolve_method(&self, name: &str) -> Value {
        self.resolve(&Value::from(name))
    }

    /// Define `key` directly on this class
    ///
    /// Functions are re-owned by this class so that `super` calls made from
    /// them resolve relative to it.
    pub fn define(&self, key: Value, value: Value) -> EngineResult<()> {
        let value = match value {
            Value::Function(f) => Value::Function(f.with_owner(Value::Str(self.name.clone()))),
            other => other,
        };
        self.methods.raw_set(key, value)
    }

    /// Define a method by name
    pub fn define_method(&self, name: &str, value: impl Into<Value>) {
        // string keys are always valid
        let _ = self.define(Value::from(name), value.into());
    }

    /// Allocator and finalizer of the nearest class that provides an allocator
    pub fn payload_hooks(&self) -> Option<(Allocator, Option<Destructor>)> {
        self.lineage().find_map(|c| {
            let hooks = c.native()?;
            let alloc = hooks.alloc.clone()?;
            Some((alloc, hooks.gc.clone()))
        })
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("name", &self.name)
            .field("parent", &self.parent.as_ref().map(|p| p.name()))
            .field("kind", &self.kind)
            .field("user_ctor", &self.user_ctor)
            .field("methods", &self.methods.len())
            .finish()
    }
}

/// Iterator over a class and its ancestors
pub struct Lineage<'a> {
    next: Option<&'a Class>,
}

impl<'a> Iterator for Lineage<'a> {
    type Item = &'a Class;

    fn next(&mut self) -> Option<&'a Class> {
        let current = self.next?;
        self.next = current.parent.as_deref();
        Some(current)
    }
}
