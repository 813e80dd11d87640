//! Execution state
//!
//! A `State` is one isolated execution context: an operand stack with call
//! frames, a globals table, and typed library slots where extensions (such as
//! the class runtime) keep their per-context data. Nothing in a `State` is
//! shared with another `State`.

use crate::function::Function;
use crate::stack::{Stack, DEFAULT_MAX_STACK_SIZE};
use crate::table::TableRef;
use crate::value::{Kind, Value};
use crate::{EngineError, EngineResult};
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default maximum nesting of native calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 200;

/// Maximum length of an `__index` / `__newindex` table chain
const MAX_META_CHAIN: usize = 100;

/// Unique identifier for a State
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(u64);

impl StateId {
    /// Create a new unique state ID
    pub fn new() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        StateId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for StateId {
    fn default() -> Self {
        Self::new()
    }
}

/// Options for creating a State
#[derive(Debug, Clone)]
pub struct StateOptions {
    /// Maximum number of stack slots
    pub max_stack_size: usize,

    /// Maximum nesting of native calls
    pub max_call_depth: usize,
}

impl Default for StateOptions {
    fn default() -> Self {
        Self {
            max_stack_size: DEFAULT_MAX_STACK_SIZE,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl StateOptions {
    /// Create options with a specific stack size
    pub fn with_stack_limit(max_stack_size: usize) -> Self {
        Self {
            max_stack_size,
            ..Default::default()
        }
    }

    /// Create options with a specific call depth
    pub fn with_call_depth(max_call_depth: usize) -> Self {
        Self {
            max_call_depth,
            ..Default::default()
        }
    }
}

/// Execution state
pub struct State {
    /// Unique state ID
    id: StateId,

    /// Operand stack and call frames
    stack: Stack,

    /// Global variables
    globals: TableRef,

    /// Typed library slots
    libs: FxHashMap<TypeId, Rc<dyn Any>>,

    /// Options the state was created with
    options: StateOptions,
}

impl State {
    /// Create a new state with default options
    pub fn new() -> Self {
        Self::with_options(StateOptions::default())
    }

    /// Create a new state with specific options
    pub fn with_options(options: StateOptions) -> Self {
        Self {
            id: StateId::new(),
            stack: Stack::with_capacity(options.max_stack_size),
            globals: TableRef::new(),
            libs: FxHashMap::default(),
            options,
        }
    }

    /// Get the state ID
    pub fn id(&self) -> StateId {
        self.id
    }

    /// Get the options
    pub fn options(&self) -> &StateOptions {
        &self.options
    }

    /// Get the stack
    pub fn stack(&self) -> &Stack {
        &self.stack
    }

    // ========================================================================
    // Globals and libraries
    // ========================================================================

    /// Get the globals table
    pub fn globals(&self) -> &TableRef {
        &self.globals
    }

    /// Get a global variable
    pub fn get_global(&self, name: &str) -> Value {
        self.globals.raw_get_str(name)
    }

    /// Set a global variable
    pub fn set_global(&mut self, name: &str, value: impl Into<Value>) {
        self.globals.raw_set_str(name, value);
    }

    /// Install a library, replacing any previous library of the same type
    pub fn set_lib<T: Any>(&mut self, lib: T) -> Rc<T> {
        let lib = Rc::new(lib);
        self.libs.insert(TypeId::of::<T>(), lib.clone());
        lib
    }

    /// Get an installed library
    pub fn lib<T: Any>(&self) -> Option<Rc<T>> {
        self.libs
            .get(&TypeId::of::<T>())
            .cloned()
            .and_then(|lib| lib.downcast::<T>().ok())
    }

    /// Check whether a library is installed
    pub fn has_lib<T: Any>(&self) -> bool {
        self.libs.contains_key(&TypeId::of::<T>())
    }

    // ========================================================================
    // Stack access
    // ========================================================================

    /// Push a value
    #[inline]
    pub fn push(&mut self, value: impl Into<Value>) -> EngineResult<()> {
        self.stack.push(value.into())
    }

    /// Pop the top value
    #[inline]
    pub fn pop(&mut self) -> EngineResult<Value> {
        self.stack.pop()
    }

    /// Drop `n` values from the top
    #[inline]
    pub fn pop_n(&mut self, n: usize) -> EngineResult<()> {
        self.stack.pop_n(n)
    }

    /// Number of values in the current frame
    #[inline]
    pub fn top(&self) -> usize {
        self.stack.top()
    }

    /// Set the number of values in the current frame, padding with nil
    pub fn set_top(&mut self, n: usize) -> EngineResult<()> {
        self.stack.set_top(n)
    }

    /// Get the value at `index`
    #[inline]
    pub fn get(&self, index: isize) -> EngineResult<Value> {
        self.stack.get(index)
    }

    /// Get argument `n` (1-based) of the running function; nil when absent
    pub fn arg(&self, n: usize) -> Value {
        if n == 0 || n > self.stack.top() {
            return Value::Nil;
        }
        self.stack.get(n as isize).unwrap_or_default()
    }

    /// Kind of the value at `index`, or `None` for an invalid index
    pub fn kind(&self, index: isize) -> Option<Kind> {
        self.stack.get(index).ok().map(|v| v.kind())
    }

    /// Convert an index into a positive frame-relative index
    pub fn abs_index(&self, index: isize) -> EngineResult<isize> {
        self.stack.abs_index(index)
    }

    /// Push a copy of the value at `index`
    pub fn push_value(&mut self, index: isize) -> EngineResult<()> {
        let value = self.stack.get(index)?;
        self.stack.push(value)
    }

    /// Pop the top value into `index`
    pub fn replace(&mut self, index: isize) -> EngineResult<()> {
        let index = self.stack.abs_index(index)?;
        let value = self.stack.pop()?;
        self.stack.set(index, value)
    }

    /// Move the top value into `index`
    pub fn insert(&mut self, index: isize) -> EngineResult<()> {
        self.stack.insert(index)
    }

    /// Remove the value at `index`
    pub fn remove(&mut self, index: isize) -> EngineResult<Value> {
        self.stack.remove(index)
    }

    /// Remove and return the top `n` values, bottom first
    pub fn take(&mut self, n: usize) -> EngineResult<Vec<Value>> {
        self.stack.take(n)
    }

    /// Owner of the innermost running function, if any
    pub fn frame_owner(&self) -> Option<Value> {
        self.stack.current_frame().and_then(|f| f.owner.clone())
    }

    /// Number of active call frames
    pub fn call_depth(&self) -> usize {
        self.stack.frame_count()
    }

    /// Render the current call stack
    pub fn traceback(&self) -> String {
        self.stack.trace()
    }

    // ========================================================================
    // Metamethod-aware access
    // ========================================================================

    /// Get the metamethod `event` of a value (raw access on its metatable)
    pub fn metamethod(&self, value: &Value, event: &str) -> Value {
        let metatable = match value {
            Value::Table(t) => t.metatable(),
            Value::Userdata(u) => u.metatable(),
            _ => None,
        };
        metatable.map_or(Value::Nil, |m| m.raw_get_str(event))
    }

    /// `obj[key]`, following `__index`
    ///
    /// # Errors
    ///
    /// Returns `EngineError::TypeError` when indexing a value with no `__index`
    /// that is not a table, and propagates errors raised by `__index` functions.
    pub fn index(&mut self, obj: &Value, key: &Value) -> EngineResult<Value> {
        let mut current = obj.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let value = t.raw_get(key);
                    if !value.is_nil() {
                        return Ok(value);
                    }
                    let handler = self.metamethod(&current, "__index");
                    if handler.is_nil() {
                        return Ok(Value::Nil);
                    }
                    handler
                }
                other => {
                    let handler = self.metamethod(other, "__index");
                    if handler.is_nil() {
                        return Err(EngineError::TypeError(format!(
                            "attempt to index a {} value",
                            other.type_name()
                        )));
                    }
                    handler
                }
            };

            if let Value::Function(_) = handler {
                let results = self.call_value(&handler, vec![current, key.clone()])?;
                return Ok(results.into_iter().next().unwrap_or_default());
            }
            current = handler;
        }
        Err(EngineError::runtime("'__index' chain too long; possible loop"))
    }

    /// `obj[key] = value`, following `__newindex`
    ///
    /// # Errors
    ///
    /// Returns `EngineError::TypeError` when assigning into a value with no
    /// `__newindex` that is not a table, or `EngineError::InvalidKey` for a nil key.
    pub fn new_index(&mut self, obj: &Value, key: Value, value: Value) -> EngineResult<()> {
        let mut current = obj.clone();
        for _ in 0..MAX_META_CHAIN {
            let handler = match &current {
                Value::Table(t) => {
                    let handler = self.metamethod(&current, "__newindex");
                    if handler.is_nil() || !t.raw_get(&key).is_nil() {
                        return t.raw_set(key, value);
                    }
                    handler
                }
                other => {
                    let handler = self.metamethod(other, "__newindex");
                    if handler.is_nil() {
                        return Err(EngineError::TypeError(format!(
                            "attempt to index a {} value",
                            other.type_name()
                        )));
                    }
                    handler
                }
            };

            if let Value::Function(_) = handler {
                self.call_value(&handler, vec![current, key, value])?;
                return Ok(());
            }
            current = handler;
        }
        Err(EngineError::runtime("'__newindex' chain too long; possible loop"))
    }

    // ========================================================================
    // Stack-based field access
    // ========================================================================

    /// Push `t[name]` where `t` is the value at `index`; returns the pushed kind
    pub fn get_field(&mut self, index: isize, name: &str) -> EngineResult<Kind> {
        let obj = self.stack.get(index)?;
        let value = self.index(&obj, &Value::from(name))?;
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// `t[name] = v` where `t` is the value at `index` and `v` is popped from the top
    pub fn set_field(&mut self, index: isize, name: &str) -> EngineResult<()> {
        let obj = self.stack.get(index)?;
        let value = self.stack.pop()?;
        self.new_index(&obj, Value::from(name), value)
    }

    /// Replace the key on top with `t[key]` where `t` is the value at `index`
    pub fn get_table(&mut self, index: isize) -> EngineResult<Kind> {
        let obj = self.stack.get(index)?;
        let key = self.stack.pop()?;
        let value = self.index(&obj, &key)?;
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// `t[k] = v` where `t` is at `index`, `v` is the top and `k` is just below it
    pub fn set_table(&mut self, index: isize) -> EngineResult<()> {
        let obj = self.stack.get(index)?;
        let value = self.stack.pop()?;
        let key = self.stack.pop()?;
        self.new_index(&obj, key, value)
    }

    fn table_at(&self, index: isize) -> EngineResult<TableRef> {
        match self.stack.get(index)? {
            Value::Table(t) => Ok(t),
            other => Err(EngineError::TypeError(format!(
                "table expected, got {}",
                other.type_name()
            ))),
        }
    }

    /// Raw version of [`get_table`](Self::get_table)
    pub fn raw_get(&mut self, index: isize) -> EngineResult<Kind> {
        let table = self.table_at(index)?;
        let key = self.stack.pop()?;
        let value = table.raw_get(&key);
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Raw version of [`set_table`](Self::set_table)
    pub fn raw_set(&mut self, index: isize) -> EngineResult<()> {
        let table = self.table_at(index)?;
        let value = self.stack.pop()?;
        let key = self.stack.pop()?;
        table.raw_set(key, value)
    }

    /// Push `t[p]` where `t` is the table at `index` and `p` is an identity pointer
    pub fn raw_getp(&mut self, index: isize, p: usize) -> EngineResult<Kind> {
        let table = self.table_at(index)?;
        let value = table.raw_getp(p);
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// `t[p] = v` where `t` is the table at `index` and `v` is popped from the top
    pub fn raw_setp(&mut self, index: isize, p: usize) -> EngineResult<()> {
        let table = self.table_at(index)?;
        let value = self.stack.pop()?;
        table.raw_setp(p, value);
        Ok(())
    }

    /// Push user value `n` of the userdata at `index`; pushes nil for non-userdata
    pub fn get_user_value(&mut self, index: isize, n: usize) -> EngineResult<Kind> {
        let value = match self.stack.get(index)? {
            Value::Userdata(u) => u.user_value(n),
            _ => Value::Nil,
        };
        let kind = value.kind();
        self.stack.push(value)?;
        Ok(kind)
    }

    /// Pop the top into user value `n` of the userdata at `index`; false if impossible
    pub fn set_user_value(&mut self, index: isize, n: usize) -> EngineResult<bool> {
        let target = self.stack.get(index)?;
        let value = self.stack.pop()?;
        Ok(match target {
            Value::Userdata(u) => u.set_user_value(n, value),
            _ => false,
        })
    }

    // ========================================================================
    // Calls
    // ========================================================================

    /// Call the function below the top `nargs` values
    ///
    /// The function and its arguments are replaced by its results, truncated
    /// or nil-padded to `nresults` when given. Returns the number of values
    /// pushed. On error the function and its arguments are removed.
    pub fn call(&mut self, nargs: usize, nresults: Option<usize>) -> EngineResult<usize> {
        if nargs + 1 > self.stack.top() {
            return Err(EngineError::StackUnderflow);
        }
        let func_slot = self.stack.depth() - nargs - 1;
        let func = match self.resolve_callee(nargs) {
            Ok(f) => f,
            Err(e) => {
                self.stack.truncate(func_slot);
                return Err(e);
            }
        };
        let nargs = self.stack.depth() - func_slot - 1;

        if self.stack.frame_count() >= self.options.max_call_depth {
            self.stack.truncate(func_slot);
            return Err(EngineError::CallDepthExceeded(self.options.max_call_depth));
        }

        log::trace!("call {:?} with {} args", func, nargs);
        self.stack
            .push_frame(func.name().map(String::from), func.owner().cloned(), nargs)?;
        let body = func.body();
        let outcome = body(self);
        let frame = self.stack.pop_frame()?;

        let pushed = match outcome {
            Ok(n) => n,
            Err(e) => {
                self.stack.truncate(func_slot);
                return Err(e);
            }
        };
        let available = self.stack.depth() - frame.base_pointer;
        if pushed > available {
            self.stack.truncate(func_slot);
            return Err(EngineError::StackUnderflow);
        }

        let mut results = self.stack.take(pushed)?;
        self.stack.truncate(func_slot);
        if let Some(n) = nresults {
            results.resize(n, Value::Nil);
        }
        let count = results.len();
        for value in results {
            self.stack.push(value)?;
        }
        Ok(count)
    }

    /// Resolve the callee at `-(nargs + 1)`, inserting a `__call` handler if needed
    fn resolve_callee(&mut self, nargs: usize) -> EngineResult<Function> {
        let callee_index = -(nargs as isize) - 1;
        match self.stack.get(callee_index)? {
            Value::Function(f) => Ok(f),
            other => match self.metamethod(&other, "__call") {
                Value::Function(handler) => {
                    self.stack.push(Value::Function(handler.clone()))?;
                    self.stack.insert(callee_index - 1)?;
                    Ok(handler)
                }
                _ => Err(EngineError::NotCallable(other.type_name())),
            },
        }
    }

    /// Call in protected mode
    ///
    /// On success behaves like [`call`](Self::call). On failure the function
    /// and its arguments are removed, the error value is passed through the
    /// message handler at `msgh` (if any), the handled message is pushed, and
    /// the original error is returned.
    pub fn pcall(
        &mut self,
        nargs: usize,
        nresults: Option<usize>,
        msgh: Option<isize>,
    ) -> EngineResult<usize> {
        let handler = match msgh {
            Some(index) => Some(self.stack.get(index)?),
            None => None,
        };

        match self.call(nargs, nresults) {
            Ok(n) => Ok(n),
            Err(e) => {
                let mut message = e.to_value();
                if let Some(handler) = handler {
                    message = match self.call_value(&handler, vec![message.clone()]) {
                        Ok(results) => results.into_iter().next().unwrap_or_default(),
                        Err(handler_error) => handler_error.to_value(),
                    };
                }
                self.stack.push(message)?;
                Err(e)
            }
        }
    }

    /// Call `func` with `args` and collect all of its results
    pub fn call_value(&mut self, func: &Value, args: Vec<Value>) -> EngineResult<Vec<Value>> {
        let nargs = args.len();
        self.stack.push(func.clone())?;
        for arg in args {
            self.stack.push(arg)?;
        }
        let n = self.call(nargs, None)?;
        self.stack.take(n)
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}
