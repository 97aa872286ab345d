//! Runtime error taxonomy
//!
//! Every fallible core operation returns `Result<_, RuntimeError>` so that
//! built-in handlers can propagate with `?`. Two of the variants carry a
//! runtime value rather than a message:
//!
//! - `Exception` is a *recoverable* panic. The value travels verbatim (by
//!   convention a typed string, but user programs may panic with any value
//!   and recover the original type).
//! - `UnrecoveredPanic` is the terminal form of an `Exception` that escaped
//!   every call frame.
//!
//! Everything else is fatal to the current machine step.

use crate::typed_value::TypedValue;
use std::fmt;

#[derive(Debug)]
pub enum RuntimeError {
    /// Allocator byte budget exhausted
    QuotaExceeded { requested: u64, limit: u64 },
    /// The store could not resolve an identity, type, or package
    StoreFault(String),
    /// Declared but unimplemented behaviour (e.g. channel make)
    Unimplemented(String),
    /// Recoverable panic carrying the panic value
    Exception(Box<TypedValue>),
    /// A panic that escaped all call frames
    UnrecoveredPanic(Box<TypedValue>),
    /// Operand shape mismatch that static typing should have rejected
    StaticType(String),
    /// Cyclic type declaration found during predefinition
    CyclicDependency(String),
}

impl RuntimeError {
    pub fn static_type(msg: impl Into<String>) -> Self {
        RuntimeError::StaticType(msg.into())
    }

    pub fn store_fault(msg: impl Into<String>) -> Self {
        RuntimeError::StoreFault(msg.into())
    }

    pub fn unimplemented(msg: impl Into<String>) -> Self {
        RuntimeError::Unimplemented(msg.into())
    }

    pub fn exception(value: TypedValue) -> Self {
        RuntimeError::Exception(Box::new(value))
    }

    /// Recoverable exception carrying a typed string, the conventional
    /// payload for panics raised by built-ins.
    pub fn exception_str(msg: &str) -> Self {
        RuntimeError::Exception(Box::new(crate::typed_value::typed_string(msg)))
    }

    /// True for the recoverable variant; everything else fails the step.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RuntimeError::Exception(_))
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeError::QuotaExceeded { requested, limit } => write!(
                f,
                "allocation limit exceeded: requested {} bytes, limit {}",
                requested, limit
            ),
            RuntimeError::StoreFault(msg) => write!(f, "store fault: {}", msg),
            RuntimeError::Unimplemented(msg) => write!(f, "not yet implemented: {}", msg),
            RuntimeError::Exception(v) => write!(f, "exception: {}", v.sprint()),
            RuntimeError::UnrecoveredPanic(v) => write!(f, "unrecovered panic: {}", v.sprint()),
            RuntimeError::StaticType(msg) => write!(f, "static type error: {}", msg),
            RuntimeError::CyclicDependency(msg) => write!(f, "{}", msg),
        }
    }
}

impl std::error::Error for RuntimeError {}
