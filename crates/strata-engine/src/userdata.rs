//! Foreign objects
//!
//! A userdata is an opaque native payload plus a fixed number of user-value
//! slots and an optional metatable. The payload is dropped when the last
//! handle goes away, which is the host's finalization point.

use crate::table::TableRef;
use crate::value::Value;
use std::any::Any;
use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

/// Userdata storage
pub struct Userdata {
    data: RefCell<Box<dyn Any>>,
    user_values: RefCell<Vec<Value>>,
    metatable: RefCell<Option<TableRef>>,
}

/// Shared handle to a userdata
#[derive(Clone)]
pub struct UserdataRef(Rc<Userdata>);

impl UserdataRef {
    /// Create a userdata holding `data` with `user_values` nil-initialized slots
    pub fn new<T: Any>(data: T, user_values: usize) -> Self {
        Self::from_box(Box::new(data), user_values)
    }

    /// Create a userdata from an already boxed payload
    pub fn from_box(data: Box<dyn Any>, user_values: usize) -> Self {
        UserdataRef(Rc::new(Userdata {
            data: RefCell::new(data),
            user_values: RefCell::new(vec![Value::Nil; user_values]),
            metatable: RefCell::new(None),
        }))
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(a: &UserdataRef, b: &UserdataRef) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Address of the userdata, used as its identity
    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Check the payload type
    pub fn is<T: Any>(&self) -> bool {
        self.0
            .data
            .try_borrow()
            .map(|d| d.is::<T>())
            .unwrap_or(false)
    }

    /// Borrow the payload as `T`; `None` on a type mismatch or an active mutable borrow
    pub fn borrow<T: Any>(&self) -> Option<Ref<'_, T>> {
        let data = self.0.data.try_borrow().ok()?;
        Ref::filter_map(data, |d| d.downcast_ref::<T>()).ok()
    }

    /// Mutably borrow the payload as `T`; `None` on a type mismatch or an active borrow
    pub fn borrow_mut<T: Any>(&self) -> Option<RefMut<'_, T>> {
        let data = self.0.data.try_borrow_mut().ok()?;
        RefMut::filter_map(data, |d| d.downcast_mut::<T>()).ok()
    }

    /// Number of user-value slots
    pub fn user_value_count(&self) -> usize {
        self.0.user_values.borrow().len()
    }

    /// Get user value `n` (0-based); nil when out of range
    pub fn user_value(&self, n: usize) -> Value {
        self.0
            .user_values
            .borrow()
            .get(n)
            .cloned()
            .unwrap_or_default()
    }

    /// Set user value `n` (0-based); returns false when out of range
    pub fn set_user_value(&self, n: usize, value: Value) -> bool {
        match self.0.user_values.borrow_mut().get_mut(n) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    /// Get the metatable
    pub fn metatable(&self) -> Option<TableRef> {
        self.0.metatable.borrow().clone()
    }

    /// Set or clear the metatable
    pub fn set_metatable(&self, metatable: Option<TableRef>) {
        *self.0.metatable.borrow_mut() = metatable;
    }
}

impl fmt::Debug for UserdataRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "userdata: {:#x}", self.addr())
    }
}
