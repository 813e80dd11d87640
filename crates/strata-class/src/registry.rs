//! Class registry
//!
//! Each `State` has at most one registry, kept in the state's library slots.
//! It maps class names to classes, owns the class objects handed to scripts,
//! and holds the metatables shared by all instances and all class objects.

use crate::class::{Class, ClassRef};
use crate::{instance, object};
use rustc_hash::FxHashMap;
use strata_engine::{State, TableRef, UserdataRef, Value};
use std::cell::RefCell;
use std::rc::Rc;

/// Name-indexed table of registered classes
pub struct ClassRegistry {
    /// Classes by name
    classes: RefCell<FxHashMap<Rc<str>, ClassRef>>,

    /// Class objects by class name
    objects: RefCell<FxHashMap<Rc<str>, UserdataRef>>,

    /// Metatable shared by every instance
    instance_meta: TableRef,

    /// Metatable shared by every class object
    class_meta: TableRef,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            classes: RefCell::new(FxHashMap::default()),
            objects: RefCell::new(FxHashMap::default()),
            instance_meta: instance::metatable(),
            class_meta: object::metatable(),
        }
    }

    /// The registry installed in `state`, if any
    pub fn of(state: &State) -> Option<Rc<Self>> {
        state.lib::<Self>()
    }

    /// The registry installed in `state`, installing an empty one if needed
    pub fn install(state: &mut State) -> Rc<Self> {
        match state.lib::<Self>() {
            Some(registry) => registry,
            None => {
                log::debug!("installing class registry in state {}", state.id().as_u64());
                state.set_lib(Self::new())
            }
        }
    }

    /// Look up a class by name
    pub fn get(&self, name: &str) -> Option<ClassRef> {
        self.classes.borrow().get(name).cloned()
    }

    /// Check whether a class is registered
    pub fn contains(&self, name: &str) -> bool {
        self.classes.borrow().contains_key(name)
    }

    /// Check whether `class` is the class registered under its name
    pub fn is_registered(&self, class: &ClassRef) -> bool {
        self.classes
            .borrow()
            .get(class.name())
            .map_or(false, |c| Rc::ptr_eq(c, class))
    }

    /// Number of registered classes
    pub fn len(&self) -> usize {
        self.classes.borrow().len()
    }

    /// Check whether no class is registered
    pub fn is_empty(&self) -> bool {
        self.classes.borrow().is_empty()
    }

    /// Names of all registered classes, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.classes.borrow().keys().map(|k| k.to_string()).collect();
        names.sort();
        names
    }

    /// Register a class, or return the class already registered under its name
    ///
    /// The flag is `true` when `class` was inserted. Root classes without their
    /// own `__index` or `__newindex` get the attribute-table defaults.
    pub(crate) fn insert(&self, class: Class) -> (ClassRef, bool) {
        if let Some(existing) = self.get(class.name()) {
            log::debug!("class '{}' already registered", existing.name());
            return (existing, false);
        }

        if class.parent().is_none() {
            if !class.methods().contains("__index") {
                class.define_method("__index", instance::default_index());
            }
            if !class.methods().contains("__newindex") {
                class.define_method("__newindex", instance::default_newindex());
            }
        }

        let class = Rc::new(class);
        log::debug!(
            "registered class '{}' (parent: {})",
            class.name(),
            class.parent().map_or("none", |p| p.name())
        );
        self.classes
            .borrow_mut()
            .insert(class.name_rc(), class.clone());
        (class, true)
    }

    /// The class object for `class`, created on first use
    pub fn object(&self, class: &ClassRef) -> Value {
        let mut objects = self.objects.borrow_mut();
        let ud = objects.entry(class.name_rc()).or_insert_with(|| {
            let ud = UserdataRef::new(object::ClassObject::new(class.clone()), 0);
            ud.set_metatable(Some(self.class_meta.clone()));
            ud
        });
        Value::Userdata(ud.clone())
    }

    /// The class object for the class registered under `name`
    pub fn object_named(&self, name: &str) -> Option<Value> {
        self.get(name).map(|class| self.object(&class))
    }

    /// Metatable shared by every instance
    pub fn instance_metatable(&self) -> &TableRef {
        &self.instance_meta
    }

    /// Metatable shared by every class object
    pub fn class_metatable(&self) -> &TableRef {
        &self.class_meta
    }
}

impl Default for ClassRegistry {
    fn default() -> Self {
        Self::new()
    }
}
