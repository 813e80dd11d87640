//! Value representation
//!
//! Values are a tagged enum. Scalars (nil, booleans, numbers, light pointers)
//! are stored inline; strings are shared `Rc<str>` and the reference types
//! (tables, functions, userdata) are reference-counted handles compared by
//! identity.
//!
//! # Kinds
//!
//! ```text
//! Nil       nil
//! Bool      true / false
//! Number    Int(i64) or Number(f64), compared numerically
//! Str       immutable shared string
//! Table     TableRef   (identity)
//! Function  Function   (identity)
//! Userdata  UserdataRef (identity)
//! LightPtr  usize, an opaque identity key
//! ```

use crate::function::Function;
use crate::table::TableRef;
use crate::userdata::UserdataRef;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Type tag of a value, as reported by field and index operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// `nil`
    Nil,
    /// Boolean
    Bool,
    /// Integer or float
    Number,
    /// String
    Str,
    /// Table
    Table,
    /// Native function
    Function,
    /// Foreign object with a native payload
    Userdata,
    /// Opaque identity pointer
    LightPtr,
}

impl Kind {
    /// Name of the kind, as used in error messages
    pub fn name(self) -> &'static str {
        match self {
            Kind::Nil => "nil",
            Kind::Bool => "boolean",
            Kind::Number => "number",
            Kind::Str => "string",
            Kind::Table => "table",
            Kind::Function => "function",
            Kind::Userdata => "userdata",
            Kind::LightPtr => "lightuserdata",
        }
    }
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A host value
#[derive(Clone, Default)]
pub enum Value {
    /// `nil`
    #[default]
    Nil,
    /// Boolean
    Bool(bool),
    /// Integer
    Int(i64),
    /// Float
    Number(f64),
    /// String
    Str(Rc<str>),
    /// Table
    Table(TableRef),
    /// Native function
    Function(Function),
    /// Foreign object
    Userdata(UserdataRef),
    /// Opaque identity pointer
    LightPtr(usize),
}

impl Value {
    /// Create a string value
    pub fn string(s: &str) -> Self {
        Value::Str(Rc::from(s))
    }

    /// Get the kind of this value
    #[inline]
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) | Value::Number(_) => Kind::Number,
            Value::Str(_) => Kind::Str,
            Value::Table(_) => Kind::Table,
            Value::Function(_) => Kind::Function,
            Value::Userdata(_) => Kind::Userdata,
            Value::LightPtr(_) => Kind::LightPtr,
        }
    }

    /// Get the type name of this value
    #[inline]
    pub fn type_name(&self) -> &'static str {
        self.kind().name()
    }

    /// Check if this value is nil
    #[inline]
    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    /// Everything except `nil` and `false` is truthy
    #[inline]
    pub fn is_truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as integer; floats with an exact integer value convert
    pub fn as_int(&self) -> Option<i64> {
        match *self {
            Value::Int(i) => Some(i),
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => Some(n as i64),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_number(&self) -> Option<f64> {
        match *self {
            Value::Int(i) => Some(i as f64),
            Value::Number(n) => Some(n),
            _ => None,
        }
    }

    /// Get as string slice
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Get as table
    pub fn as_table(&self) -> Option<&TableRef> {
        match self {
            Value::Table(t) => Some(t),
            _ => None,
        }
    }

    /// Get as function
    pub fn as_function(&self) -> Option<&Function> {
        match self {
            Value::Function(f) => Some(f),
            _ => None,
        }
    }

    /// Get as userdata
    pub fn as_userdata(&self) -> Option<&UserdataRef> {
        match self {
            Value::Userdata(u) => Some(u),
            _ => None,
        }
    }

    /// Identity comparison: reference types compare by pointer, scalars by value
    pub fn raw_equal(&self, other: &Value) -> bool {
        self == other
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (Value::Int(a), Value::Number(b)) | (Value::Number(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Table(a), Value::Table(b)) => TableRef::ptr_eq(a, b),
            (Value::Function(a), Value::Function(b)) => Function::ptr_eq(a, b),
            (Value::Userdata(a), Value::Userdata(b)) => UserdataRef::ptr_eq(a, b),
            (Value::LightPtr(a), Value::LightPtr(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Number(n) => write!(f, "{:?}", n),
            Value::Str(s) => write!(f, "{:?}", s),
            Value::Table(t) => write!(f, "table: {:#x}", t.addr()),
            Value::Function(func) => match func.name() {
                Some(name) => write!(f, "function '{}': {:#x}", name, func.addr()),
                None => write!(f, "function: {:#x}", func.addr()),
            },
            Value::Userdata(u) => write!(f, "userdata: {:#x}", u.addr()),
            Value::LightPtr(p) => write!(f, "lightuserdata: {:#x}", p),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            other => fmt::Debug::fmt(other, f),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(Rc::from(s))
    }
}

impl From<Rc<str>> for Value {
    fn from(s: Rc<str>) -> Self {
        Value::Str(s)
    }
}

impl From<TableRef> for Value {
    fn from(t: TableRef) -> Self {
        Value::Table(t)
    }
}

impl From<Function> for Value {
    fn from(f: Function) -> Self {
        Value::Function(f)
    }
}

impl From<UserdataRef> for Value {
    fn from(u: UserdataRef) -> Self {
        Value::Userdata(u)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Nil, Into::into)
    }
}

/// A table key
///
/// Floats with an exact integer value are normalized to integers so that
/// `t[1]` and `t[1.0]` address the same slot. `nil` and NaN are not keys.
#[derive(Clone, Debug)]
pub struct Key(Value);

impl Key {
    /// Convert a value into a key
    pub fn new(value: Value) -> Option<Key> {
        match value {
            Value::Nil => None,
            Value::Number(n) if n.is_nan() => None,
            Value::Number(n) if n.fract() == 0.0 && n.is_finite() => {
                Some(Key(Value::Int(n as i64)))
            }
            other => Some(Key(other)),
        }
    }

    /// Get the key as a value
    pub fn value(&self) -> &Value {
        &self.0
    }

    /// Convert back into a value
    pub fn into_value(self) -> Value {
        self.0
    }
}

impl PartialEq for Key {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl Eq for Key {}

impl Hash for Key {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(&self.0).hash(state);
        match &self.0 {
            Value::Nil => {}
            Value::Bool(b) => b.hash(state),
            Value::Int(i) => i.hash(state),
            Value::Number(n) => n.to_bits().hash(state),
            Value::Str(s) => s.hash(state),
            Value::Table(t) => t.addr().hash(state),
            Value::Function(f) => f.addr().hash(state),
            Value::Userdata(u) => u.addr().hash(state),
            Value::LightPtr(p) => p.hash(state),
        }
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(Value::string(s))
    }
}
