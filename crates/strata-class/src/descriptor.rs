//! Native class descriptors
//!
//! A `NativeClass` describes a class declared from Rust before it is
//! registered: its name, optional parent, whether calling the class object
//! constructs instances, and the hooks that allocate and finalize the native
//! payload carried by each instance.

use strata_engine::{EngineResult, Function, State};
use std::any::Any;
use std::fmt;
use std::rc::Rc;

/// Allocates the native payload of a new instance
pub type Allocator = Rc<dyn Fn(&mut State) -> EngineResult<Box<dyn Any>>>;

/// Finalizes a native payload when its instance is collected
pub type Destructor = Rc<dyn Fn(&mut dyn Any)>;

/// Native backing of a class
#[derive(Clone, Default)]
pub struct NativeHooks {
    /// Payload allocator
    pub alloc: Option<Allocator>,
    /// Payload finalizer
    pub gc: Option<Destructor>,
}

impl fmt::Debug for NativeHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHooks")
            .field("alloc", &self.alloc.is_some())
            .field("gc", &self.gc.is_some())
            .finish()
    }
}

/// Descriptor for a class declared from Rust
#[derive(Clone)]
pub struct NativeClass {
    /// Class name
    pub name: String,
    /// Name of an already registered parent class
    pub parent: Option<String>,
    /// Whether calling the class object constructs an instance
    pub user_ctor: bool,
    /// Allocation and finalization hooks
    pub hooks: NativeHooks,
    /// Methods in declaration order
    pub methods: Vec<(String, Function)>,
}

impl NativeClass {
    /// Create a descriptor with no parent, no hooks and no methods
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            parent: None,
            user_ctor: true,
            hooks: NativeHooks::default(),
            methods: Vec::new(),
        }
    }

    /// Set the parent class
    pub fn parent(mut self, parent: &str) -> Self {
        self.parent = Some(parent.to_string());
        self
    }

    /// Allow or forbid construction by calling the class object
    pub fn user_ctor(mut self, allowed: bool) -> Self {
        self.user_ctor = allowed;
        self
    }

    /// Allocate a `T` payload for every instance
    pub fn alloc<T, F>(mut self, alloc: F) -> Self
    where
        T: Any,
        F: Fn(&mut State) -> EngineResult<T> + 'static,
    {
        self.hooks.alloc = Some(Rc::new(move |state: &mut State| {
            Ok(Box::new(alloc(state)?) as Box<dyn Any>)
        }));
        self
    }

    /// Finalize `T` payloads; payloads of another type are left alone
    pub fn gc<T, F>(mut self, gc: F) -> Self
    where
        T: Any,
        F: Fn(&mut T) + 'static,
    {
        self.hooks.gc = Some(Rc::new(move |payload: &mut dyn Any| {
            if let Some(payload) = payload.downcast_mut::<T>() {
                gc(payload);
            }
        }));
        self
    }

    /// Add a method
    pub fn method<F>(mut self, name: &str, body: F) -> Self
    where
        F: Fn(&mut State) -> EngineResult<usize> + 'static,
    {
        self.methods
            .push((name.to_string(), Function::named(name, body)));
        self
    }

    /// Add the initializer, run with the new instance followed by the constructor arguments
    pub fn init<F>(self, body: F) -> Self
    where
        F: Fn(&mut State) -> EngineResult<usize> + 'static,
    {
        self.method("__init", body)
    }

    /// Add an existing function as a method
    pub fn function(mut self, name: &str, function: Function) -> Self {
        self.methods.push((name.to_string(), function));
        self
    }

    /// Whether instances carry a native payload
    pub fn has_payload(&self) -> bool {
        self.hooks.alloc.is_some()
    }
}

impl fmt::Debug for NativeClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeClass")
            .field("name", &self.name)
            .field("parent", &self.parent)
            .field("user_ctor", &self.user_ctor)
            .field("hooks", &self.hooks)
            .field(
                "methods",
                &self.methods.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_builder() {
        let desc = NativeClass::new("Point")
            .parent("Shape")
            .user_ctor(false)
            .alloc(|_| Ok((0.0f64, 0.0f64)))
            .method("length", |_| Ok(0))
            .init(|_| Ok(0));

        assert_eq!(desc.name, "Point");
        assert_eq!(desc.parent.as_deref(), Some("Shape"));
        assert!(!desc.user_ctor);
        assert!(desc.has_payload());
        assert!(desc.hooks.gc.is_none());
        let names: Vec<_> = desc.methods.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["length", "__init"]);
    }

    #[test]
    fn test_alloc_boxes_payload() {
        let desc = NativeClass::new("Counter").alloc(|_| Ok(7u32));
        let mut state = State::new();
        let alloc = desc.hooks.alloc.unwrap();
        let payload = alloc(&mut state).unwrap();
        assert_eq!(payload.downcast_ref::<u32>(), Some(&7));
    }

    #[test]
    fn test_gc_ignores_other_types() {
        thread_local! {
            static SEEN: Cell<u32> = Cell::new(0);
        }
        let desc = NativeClass::new("Counter").gc(|n: &mut u32| SEEN.with(|s| s.set(*n)));
        let gc = desc.hooks.gc.unwrap();

        let mut wrong = String::from("not a counter");
        gc(&mut wrong);
        assert_eq!(SEEN.with(Cell::get), 0);

        let mut right = 5u32;
        gc(&mut right);
        assert_eq!(SEEN.with(Cell::get), 5);
    }
}
