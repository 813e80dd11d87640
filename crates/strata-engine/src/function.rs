//! Native functions
//!
//! Functions follow the stack calling convention: on entry the current frame
//! holds the arguments at indices `1..=n`; the function pushes its results and
//! returns how many it pushed.
//!
//! Every function may carry an *owner* value. The owner is copied into the
//! call frame when the function runs, so code executing inside it can find out
//! which entity (for example, which class) the running function belongs to.

use crate::state::State;
use crate::EngineResult;
use std::fmt;
use std::rc::Rc;

/// Body of a native function
pub type NativeFn = dyn Fn(&mut State) -> EngineResult<usize>;

struct FunctionInner {
    name: Option<Rc<str>>,
    owner: Option<crate::Value>,
    body: Rc<NativeFn>,
}

/// Shared handle to a native function
#[derive(Clone)]
pub struct Function(Rc<FunctionInner>);

impl Function {
    /// Create an anonymous function
    pub fn new<F>(body: F) -> Self
    where
        F: Fn(&mut State) -> EngineResult<usize> + 'static,
    {
        Function(Rc::new(FunctionInner {
            name: None,
            owner: None,
            body: Rc::new(body),
        }))
    }

    /// Create a named function
    pub fn named<F>(name: &str, body: F) -> Self
    where
        F: Fn(&mut State) -> EngineResult<usize> + 'static,
    {
        Function(Rc::new(FunctionInner {
            name: Some(Rc::from(name)),
            owner: None,
            body: Rc::new(body),
        }))
    }

    /// Create a new function sharing this body and name, owned by `owner`
    pub fn with_owner(&self, owner: crate::Value) -> Self {
        Function(Rc::new(FunctionInner {
            name: self.0.name.clone(),
            owner: Some(owner),
            body: self.0.body.clone(),
        }))
    }

    /// Identity comparison
    #[inline]
    pub fn ptr_eq(a: &Function, b: &Function) -> bool {
        Rc::ptr_eq(&a.0, &b.0)
    }

    /// Check whether two handles share the same body
    #[inline]
    pub fn same_body(a: &Function, b: &Function) -> bool {
        Rc::ptr_eq(&a.0.body, &b.0.body)
    }

    /// Address of the function, used as its identity
    #[inline]
    pub fn addr(&self) -> usize {
        Rc::as_ptr(&self.0) as usize
    }

    /// Function name, if any
    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    /// Owner value, if any
    pub fn owner(&self) -> Option<&crate::Value> {
        self.0.owner.as_ref()
    }

    pub(crate) fn body(&self) -> Rc<NativeFn> {
        self.0.body.clone()
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "function '{}': {:#x}", name, self.addr()),
            None => write!(f, "function: {:#x}", self.addr()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Value;

    #[test]
    fn test_with_owner_shares_body() {
        let f = Function::named("speak", |_| Ok(0));
        let owned = f.with_owner(Value::from("Animal"));

        assert!(!Function::ptr_eq(&f, &owned));
        assert!(Function::same_body(&f, &owned));
        assert_eq!(owned.name(), Some("speak"));
        assert_eq!(owned.owner(), Some(&Value::from("Animal")));
        assert!(f.owner().is_none());
    }
}
