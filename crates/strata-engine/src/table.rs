//! Tables
//!
//! A table is a shared, mutable key/value map with an optional metatable.
//! All operations here are raw: they never consult metamethods. Metamethod
//! dispatch lives in [`State::index`](crate::State::index) and friends.

use crate::value::{Key, Value};
use crate::{EngineError, EngineResult};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

/// Table storage
#[derive(Default)]
pub struct Table {
    entries: RefCell<FxHashMap<Key, Value>>,
    metatable: RefCell<Option<TableRef>>,
}

/// Shared handle to a table
#[derive(Clone, Default)]
pub struct TableRef(Rc<Table>);

impl TableRef {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a table from key/value pairs; nil keys and values are skipped
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Value>,
        V: Into<Value>,
    {
        let table = Self::new();
        {
            let mut entries = table.0.entries.borrow_mut();
            for (k, v) in pairs {
                let v = v.into();
                if let (Some(key), false) = (Key::new(k.into()), v.is_nil()) {
                    entries.insert(key, v);
                }
            }
        }
        table
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(a: &TableRef, b: &TableRef) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Address of the table, used as its identity
    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Raw get: `t[k]` without metamethods
    pub fn raw_get(&self, key: &Value) -> Value {
        match Key::new(key.clone()) {
            Some(key) => self.0.entries.borrow().get(&key).cloned().unwrap_or_default(),
            None => Value::Nil,
        }
    }

    /// Raw get by string key
    pub fn raw_get_str(&self, key: &str) -> Value {
        self.0
            .entries
            .borrow()
            .get(&Key::from(key))
            .cloned()
            .unwrap_or_default()
    }

    /// Raw get keyed by an identity pointer
    pub fn raw_getp(&self, p: usize) -> Value {
        self.raw_get(&Value::LightPtr(p))
    }

    /// Raw set: `t[k] = v` without metamethods. Assigning nil removes the entry.
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidKey` if `key` is nil or NaN.
    pub fn raw_set(&self, key: Value, value: Value) -> EngineResult<()> {
        let key_kind = key.kind();
        let key = Key::new(key).ok_or(EngineError::InvalidKey(key_kind))?;
        let mut entries = self.0.entries.borrow_mut();
        if value.is_nil() {
            entries.remove(&key);
        } else {
            entries.insert(key, value);
        }
        Ok(())
    }

    /// Raw set by string key
    pub fn raw_set_str(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        let mut entries = self.0.entries.borrow_mut();
        if value.is_nil() {
            entries.remove(&Key::from(key));
        } else {
            entries.insert(Key::from(key), value);
        }
    }

    /// Raw set keyed by an identity pointer
    pub fn raw_setp(&self, p: usize, value: Value) {
        // a light pointer is always a valid key
        let _ = self.raw_set(Value::LightPtr(p), value);
    }

    /// Check whether a key is present
    pub fn contains(&self, key: &str) -> bool {
        self.0.entries.borrow().contains_key(&Key::from(key))
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.0.entries.borrow().len()
    }

    /// Check if the table has no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all entries, in no particular order
    pub fn pairs(&self) -> Vec<(Value, Value)> {
        self.0
            .entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.value().clone(), v.clone()))
            .collect()
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

impl fmt::Debug for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table: {:#x}", self.addr())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_get_set() {
        let t = TableRef::new();
        t.raw_set(Value::from("x"), Value::from(7)).unwrap();
        assert_eq!(t.raw_get(&Value::from("x")), Value::Int(7));
        assert_eq!(t.raw_get_str("x"), Value::Int(7));
        assert_eq!(t.raw_get_str("y"), Value::Nil);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_nil_removes() {
        let t = TableRef::new();
        t.raw_set_str("x", 1);
        t.raw_set_str("x", Value::Nil);
        assert!(t.is_empty());
    }

    #[test]
    fn test_invalid_keys() {
        let t = TableRef::new();
        assert!(matches!(
            t.raw_set(Value::Nil, Value::Int(1)),
            Err(EngineError::InvalidKey(_))
        ));
        assert!(t.raw_set(Value::Number(f64::NAN), Value::Int(1)).is_err());
        assert_eq!(t.raw_get(&Value::Nil), Value::Nil);
    }

    #[test]
    fn test_identity_keys() {
        let t = TableRef::new();
        let other = TableRef::new();
        t.raw_setp(0x10, Value::from("light"));
        t.raw_set(Value::Table(other.clone()), Value::from("table"))
            .unwrap();

        assert_eq!(t.raw_getp(0x10), Value::from("light"));
        assert_eq!(t.raw_get(&Value::Table(other)), Value::from("table"));
        assert_eq!(t.raw_get(&Value::Table(TableRef::new())), Value::Nil);
    }

    #[test]
    fn test_from_pairs_and_metatable() {
        let t = TableRef::from_pairs([("a", 1), ("b", 2)]);
        assert_eq!(t.len(), 2);
        assert!(t.metatable().is_none());

        let meta = TableRef::new();
        t.set_metatable(Some(meta.clone()));
        assert!(TableRef::ptr_eq(&t.metatable().unwrap(), &meta));
    }
}
