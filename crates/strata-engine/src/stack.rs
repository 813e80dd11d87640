//! Stack and call frame management
//!
//! This module provides the operand stack shared by native functions and the
//! call frames that delimit each function's slice of it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────┐
//! │ Frame N (current)                   │  ← sp (stack pointer)
//! │   result / temporaries              │
//! │   arg₂                              │
//! │   arg₁                              │  ← base (index 1 of the frame)
//! ├─────────────────────────────────────┤
//! │ callee function slot                │
//! │ Frame N-1                           │
//! │   ...                               │
//! └─────────────────────────────────────┘
//! ```
//!
//! Frame-relative indices are 1-based: `1` is the first argument of the
//! running function. Negative indices count from the top: `-1` is the top.

use crate::value::Value;
use crate::{EngineError, EngineResult};

/// Default maximum stack size (in slots)
pub const DEFAULT_MAX_STACK_SIZE: usize = 1024 * 64;

/// Call frame for function invocation
#[derive(Debug, Clone)]
pub struct CallFrame {
    /// Name of the running function, if it has one
    pub name: Option<String>,

    /// Owner value of the running function
    pub owner: Option<Value>,

    /// Base pointer (absolute slot of the first argument)
    pub base_pointer: usize,

    /// Number of arguments passed to this function
    pub arg_count: usize,
}

impl CallFrame {
    /// Create a new call frame
    pub fn new(
        name: Option<String>,
        owner: Option<Value>,
        base_pointer: usize,
        arg_count: usize,
    ) -> Self {
        Self {
            name,
            owner,
            base_pointer,
            arg_count,
        }
    }
}

/// Operand and call frame stack
///
/// The bottom of the stack (no active frame) behaves like a frame with base 0,
/// so host code can push values and call functions before any native function
/// is running.
pub struct Stack {
    /// Stack slots
    slots: Vec<Value>,

    /// Call frames
    frames: Vec<CallFrame>,

    /// Maximum stack size (in slots)
    max_size: usize,
}

impl Stack {
    /// Create a new stack with default size
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_STACK_SIZE)
    }

    /// Create a stack with specific capacity
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            slots: Vec::with_capacity(max_size.min(1024)),
            frames: Vec::with_capacity(64),
            max_size,
        }
    }

    // ========================================================================
    // Operand Stack Operations
    // ========================================================================

    /// Push a value onto the stack
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StackOverflow` if the stack is full.
    #[inline]
    pub fn push(&mut self, value: Value) -> EngineResult<()> {
        if self.slots.len() >= self.max_size {
            return Err(EngineError::StackOverflow);
        }
        self.slots.push(value);
        Ok(())
    }

    /// Pop a value from the current frame
    ///
    /// # Errors
    ///
    /// Returns `EngineError::StackUnderflow` if the frame is empty.
    #[inline]
    pub fn pop(&mut self) -> EngineResult<Value> {
        if self.top() == 0 {
            return Err(EngineError::StackUnderflow);
        }
        self.slots.pop().ok_or(EngineError::StackUnderflow)
    }

    /// Drop `n` values from the top of the current frame
    pub fn pop_n(&mut self, n: usize) -> EngineResult<()> {
        if n > self.top() {
            return Err(EngineError::StackUnderflow);
        }
        let len = self.slots.len() - n;
        self.slots.truncate(len);
        Ok(())
    }

    /// Number of values in the current frame
    #[inline]
    pub fn top(&self) -> usize {
        self.slots.len() - self.base()
    }

    /// Absolute slot of index 1 in the current frame
    #[inline]
    pub fn base(&self) -> usize {
        self.frames.last().map_or(0, |f| f.base_pointer)
    }

    /// Convert a frame-relative index into an absolute slot
    ///
    /// # Errors
    ///
    /// Returns `EngineError::InvalidIndex` if the index does not name a live slot.
    pub fn slot(&self, index: isize) -> EngineResult<usize> {
        let top = self.top() as isize;
        let relative = if index > 0 && index <= top {
            index - 1
        } else if index < 0 && -index <= top {
            top + index
        } else {
            return Err(EngineError::InvalidIndex(index));
        };
        Ok(self.base() + relative as usize)
    }

    /// Convert a possibly negative index into a positive frame-relative index
    pub fn abs_index(&self, index: isize) -> EngineResult<isize> {
        let slot = self.slot(index)?;
        Ok((slot - self.base() + 1) as isize)
    }

    /// Get the value at a frame-relative index
    pub fn get(&self, index: isize) -> EngineResult<Value> {
        Ok(self.slots[self.slot(index)?].clone())
    }

    /// Replace the value at a frame-relative index
    pub fn set(&mut self, index: isize, value: Value) -> EngineResult<()> {
        let slot = self.slot(index)?;
        self.slots[slot] = value;
        Ok(())
    }

    /// Move the top value into `index`, shifting values above it up
    pub fn insert(&mut self, index: isize) -> EngineResult<()> {
        let slot = self.slot(index)?;
        let value = self.pop()?;
        self.slots.insert(slot, value);
        Ok(())
    }

    /// Remove the value at `index`, shifting values above it down
    pub fn remove(&mut self, index: isize) -> EngineResult<Value> {
        let slot = self.slot(index)?;
        Ok(self.slots.remove(slot))
    }

    /// Set the number of values in the current frame, padding with nil
    pub fn set_top(&mut self, n: usize) -> EngineResult<()> {
        let target = self.base() + n;
        if target > self.max_size {
            return Err(EngineError::StackOverflow);
        }
        self.slots.resize(target, Value::Nil);
        Ok(())
    }

    /// Remove and return the top `n` values of the current frame, bottom first
    pub fn take(&mut self, n: usize) -> EngineResult<Vec<Value>> {
        if n > self.top() {
            return Err(EngineError::StackUnderflow);
        }
        let at = self.slots.len() - n;
        Ok(self.slots.split_off(at))
    }

    /// Total number of slots in use
    #[inline]
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    /// Check if the stack is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Get maximum stack size
    #[inline]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub(crate) fn truncate(&mut self, depth: usize) {
        self.slots.truncate(depth);
    }

    // ========================================================================
    // Call Frame Management
    // ========================================================================

    /// Push a new call frame whose arguments are the top `arg_count` slots
    pub fn push_frame(
        &mut self,
        name: Option<String>,
        owner: Option<Value>,
        arg_count: usize,
    ) -> EngineResult<()> {
        if arg_count > self.top() {
            return Err(EngineError::StackUnderflow);
        }
        let base = self.slots.len() - arg_count;
        self.frames
            .push(CallFrame::new(name, owner, base, arg_count));
        Ok(())
    }

    /// Pop the current call frame, leaving its slots in place
    ///
    /// # Errors
    ///
    /// Returns `EngineError::Runtime` if no frames to pop.
    pub fn pop_frame(&mut self) -> EngineResult<CallFrame> {
        self.frames
            .pop()
            .ok_or_else(|| EngineError::runtime("no call frame to pop"))
    }

    /// Get the current call frame
    #[inline]
    pub fn current_frame(&self) -> Option<&CallFrame> {
        self.frames.last()
    }

    /// Get the number of active frames
    #[inline]
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Iterate over call frames, innermost first
    pub fn frames(&self) -> impl Iterator<Item = &CallFrame> + '_ {
        self.frames.iter().rev()
    }

    // ========================================================================
    // Debugging & Inspection
    // ========================================================================

    /// Render a stack trace, innermost frame first
    pub fn trace(&self) -> String {
        let mut out = String::from("stack traceback:");
        for frame in self.frames() {
            out.push_str("\n\t");
            out.push_str(frame.name.as_deref().unwrap_or("?"));
            if let Some(owner) = &frame.owner {
                out.push_str(&format!(" (in {})", owner));
            }
        }
        out
    }

    /// Get all stack values as a slice
    pub fn as_slice(&self) -> &[Value] {
        &self.slots
    }
}

impl Default for Stack {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
