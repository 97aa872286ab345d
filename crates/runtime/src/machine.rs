//! Machine collaborator ABI and exception stack
//!
//! The bytecode interpreter owns the opcode loop; this module is the
//! surface it shares with the built-in dispatcher. A built-in handler reads
//! its operands from the current parameter block, calls into the core, and
//! pushes exactly its declared number of results.
//!
//! # Panics and recover
//!
//! Recoverable exceptions are `{value, frame}` pairs. `panic_scope` counts
//! entries into deferred invocations; `defer_panic_scope` snapshots
//! `panic_scope` when a deferred function itself panics. Deferred
//! invocations push *non-call* frames, so from inside a `recover()` call
//! the frame two call-positions down is the frame that deferred the
//! function currently executing.
//!
//! One machine step executes to completion without yielding; machines never
//! share an allocator, store view, or exception stack.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::io::{self, Write};
use std::rc::Rc;
use tern_core::alloc::Allocator;
use tern_core::errors::RuntimeError;
use tern_core::realm::{ObjectRef, Realm};
use tern_core::store::{MemStore, Store};
use tern_core::typed_value::TypedValue;
use tern_core::value::Block;
use tracing::debug;

pub type NativeFn = fn(&mut Machine) -> Result<(), RuntimeError>;

/// A call-stack entry. Function calls are call frames; deferred
/// invocations are tagged frames that do not count as call positions.
#[derive(Debug)]
pub struct Frame {
    pub func: String,
    pub is_call: bool,
    pub is_defer: bool,
    popped: Cell<bool>,
}

impl Frame {
    pub fn popped(&self) -> bool {
        self.popped.get()
    }
}

/// A recoverable exception: the panic value plus the frame it was raised
/// in. The frame handle outlives its stack slot so `recover` can tell
/// whether the panicking frame is still live.
#[derive(Debug, Clone)]
pub struct Exception {
    pub value: TypedValue,
    pub frame: Rc<Frame>,
}

pub struct Machine {
    pub alloc: Allocator,
    pub store: Box<dyn Store>,
    pub realm: Option<Box<dyn Realm>>,
    /// Opaque host execution context (chain height, message, etc.).
    pub context: Option<Box<dyn Any>>,
    pub output: Box<dyn Write>,
    frames: Vec<Rc<Frame>>,
    blocks: Vec<Block>,
    values: Vec<TypedValue>,
    pub exceptions: Vec<Exception>,
    pub panic_scope: u64,
    pub defer_panic_scope: u64,
}

impl Machine {
    pub fn builder() -> MachineBuilder {
        MachineBuilder::new()
    }

    /// An unmetered machine with an in-memory store and discarded output.
    pub fn new() -> Self {
        Self::builder().build()
    }

    // ---- value stack ----

    pub fn push_value(&mut self, tv: TypedValue) {
        self.values.push(tv);
    }

    pub fn pop_value(&mut self) -> Option<TypedValue> {
        self.values.pop()
    }

    pub fn value_depth(&self) -> usize {
        self.values.len()
    }

    // ---- parameter blocks ----

    pub fn last_block(&self) -> &Block {
        self.blocks
            .last()
            .expect("built-in invoked without a parameter block")
    }

    pub fn params1(&self) -> TypedValue {
        self.last_block().get_params1()
    }

    pub fn params2(&self) -> (TypedValue, TypedValue) {
        self.last_block().get_params2()
    }

    pub fn params3(&self) -> (TypedValue, TypedValue, TypedValue) {
        self.last_block().get_params3()
    }

    // ---- frames ----

    pub fn push_frame_call(&mut self, func: &str) {
        self.frames.push(Rc::new(Frame {
            func: func.to_string(),
            is_call: true,
            is_defer: false,
            popped: Cell::new(false),
        }));
    }

    /// Enter a deferred invocation. Deferred frames are not call positions;
    /// each entry widens the panic scope.
    pub fn push_frame_defer(&mut self, func: &str) {
        self.panic_scope += 1;
        self.frames.push(Rc::new(Frame {
            func: func.to_string(),
            is_call: false,
            is_defer: true,
            popped: Cell::new(false),
        }));
    }

    pub fn pop_frame(&mut self) {
        if let Some(f) = self.frames.pop() {
            f.popped.set(true);
            if f.is_defer {
                self.panic_scope = self.panic_scope.saturating_sub(1);
            }
        }
    }

    pub fn frame_depth(&self) -> usize {
        self.frames.len()
    }

    /// The n-th call frame from the top of the stack (1-based). Deferred
    /// frames are skipped.
    pub fn last_call_frame(&self, n: usize) -> Option<Rc<Frame>> {
        self.frames
            .iter()
            .rev()
            .filter(|f| f.is_call)
            .nth(n.saturating_sub(1))
            .cloned()
    }

    // ---- exceptions ----

    /// Raise a recoverable exception in the current frame.
    pub fn push_panic(&mut self, value: TypedValue) {
        debug!(value = %value.sprint(), "panic raised");
        if self.frames.last().map(|f| f.is_defer).unwrap_or(false) {
            // A deferred function itself panicked; recovers opened before
            // this point can no longer see the exception.
            self.defer_panic_scope = self.panic_scope;
        }
        let frame = self.last_call_frame(1).unwrap_or_else(|| {
            // Panic outside any call frame: attach a detached, already
            // popped frame so recover skips the frame identity check.
            Rc::new(Frame {
                func: String::new(),
                is_call: true,
                is_defer: false,
                popped: Cell::new(true),
            })
        });
        self.exceptions.push(Exception { value, frame });
    }

    /// After unwinding past every frame, an unrecovered exception fails the
    /// machine step.
    pub fn take_unrecovered(&mut self) -> Option<RuntimeError> {
        if self.frames.is_empty() {
            if let Some(e) = self.exceptions.last() {
                let err = RuntimeError::UnrecoveredPanic(Box::new(e.value.clone()));
                self.exceptions.clear();
                return Some(err);
            }
        }
        None
    }

    // ---- realm ----

    /// Report a per-slot mutation to the realm, if one is attached.
    pub fn did_update(
        &mut self,
        container: &ObjectRef,
        old_child: Option<&ObjectRef>,
        new_child: Option<&ObjectRef>,
    ) {
        if let Some(realm) = &mut self.realm {
            realm.did_update(container, old_child, new_child);
        }
    }

    // ---- built-in invocation ----

    /// Invoke a universe built-in with pre-collected operands (variadic
    /// arguments are collected into a slice by the interpreter). Returns
    /// the values the handler pushed. A recoverable handler failure is
    /// raised as a panic on this machine before being returned.
    pub fn call_builtin(
        &mut self,
        name: &str,
        params: Vec<TypedValue>,
    ) -> Result<Vec<TypedValue>, RuntimeError> {
        let handler = crate::universe::builtin(name).ok_or_else(|| {
            RuntimeError::static_type(format!("unknown built-in function {}", name))
        })?;
        let depth = self.values.len();
        self.push_frame_call(name);
        self.blocks.push(Block::with_params(params));
        let res = handler(self);
        self.blocks.pop();
        self.pop_frame();
        match res {
            Ok(()) => Ok(self.values.split_off(depth)),
            Err(RuntimeError::Exception(v)) => {
                self.values.truncate(depth);
                self.push_panic((*v).clone());
                Err(RuntimeError::Exception(v))
            }
            Err(e) => {
                self.values.truncate(depth);
                Err(e)
            }
        }
    }

    // ---- resource accounting ----

    pub fn gc(&mut self) -> u64 {
        self.alloc.gc()
    }

    pub fn mem_stats(&self) -> String {
        self.alloc.mem_stats()
    }
}

impl Default for Machine {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder-style machine configuration.
pub struct MachineBuilder {
    alloc_limit: u64,
    store: Option<Box<dyn Store>>,
    realm: Option<Box<dyn Realm>>,
    context: Option<Box<dyn Any>>,
    output: Option<Box<dyn Write>>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self {
            alloc_limit: 0,
            store: None,
            realm: None,
            context: None,
            output: None,
        }
    }

    /// Allocation budget in bytes; 0 means unlimited.
    pub fn with_alloc_limit(mut self, limit: u64) -> Self {
        self.alloc_limit = limit;
        self
    }

    pub fn with_store(mut self, store: Box<dyn Store>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_realm(mut self, realm: Box<dyn Realm>) -> Self {
        self.realm = Some(realm);
        self
    }

    pub fn with_context(mut self, context: Box<dyn Any>) -> Self {
        self.context = Some(context);
        self
    }

    pub fn with_output(mut self, output: Box<dyn Write>) -> Self {
        self.output = Some(output);
        self
    }

    pub fn build(self) -> Machine {
        Machine {
            alloc: Allocator::new(self.alloc_limit),
            store: self.store.unwrap_or_else(|| Box::new(MemStore::new())),
            realm: self.realm,
            context: self.context,
            output: self.output.unwrap_or_else(|| Box::new(io::sink())),
            frames: Vec::new(),
            blocks: Vec::new(),
            values: Vec::new(),
            exceptions: Vec::new(),
            panic_scope: 0,
            defer_panic_scope: 0,
        }
    }
}

impl Default for MachineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A cloneable output sink backed by shared memory, for embedders (and
/// tests) that need to read what a machine printed.
#[derive(Debug, Clone, Default)]
pub struct SharedBuffer {
    buf: Rc<RefCell<Vec<u8>>>,
}

impl SharedBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.buf.borrow()).into_owned()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.borrow_mut().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tern_core::typed_value::typed_string;

    #[test]
    fn test_frames_and_call_positions() {
        let mut m = Machine::new();
        m.push_frame_call("f");
        m.push_frame_defer("anon");
        m.push_frame_call("recover");

        // deferred frames are not call positions
        assert_eq!(m.last_call_frame(1).unwrap().func, "recover");
        assert_eq!(m.last_call_frame(2).unwrap().func, "f");
        assert!(m.last_call_frame(3).is_none());
    }

    #[test]
    fn test_defer_widens_panic_scope() {
        let mut m = Machine::new();
        assert_eq!(m.panic_scope, 0);
        m.push_frame_defer("anon");
        assert_eq!(m.panic_scope, 1);
        m.pop_frame();
        assert_eq!(m.panic_scope, 0);
    }

    #[test]
    fn test_panic_inside_defer_snapshots_scope() {
        let mut m = Machine::new();
        m.push_frame_call("f");
        m.push_frame_defer("anon");
        m.push_panic(typed_string("boom"));
        assert_eq!(m.defer_panic_scope, 1);
        assert_eq!(m.exceptions.len(), 1);
        assert_eq!(m.exceptions[0].frame.func, "f");
    }

    #[test]
    fn test_unrecovered_panic_surfaces_after_unwind() {
        let mut m = Machine::new();
        m.push_frame_call("f");
        m.push_panic(typed_string("boom"));
        assert!(m.take_unrecovered().is_none(), "frame still live");
        m.pop_frame();
        match m.take_unrecovered() {
            Some(RuntimeError::UnrecoveredPanic(v)) => assert_eq!(v.sprint(), "boom"),
            other => panic!("expected unrecovered panic, got {:?}", other),
        }
        assert!(m.exceptions.is_empty());
    }

    #[test]
    fn test_shared_buffer_captures_output() {
        let out = SharedBuffer::new();
        let mut m = Machine::builder().with_output(Box::new(out.clone())).build();
        m.output.write_all(b"hello").unwrap();
        assert_eq!(out.contents(), "hello");
    }
}
