//! The seam between worker lifecycle and the script engine that executes code.
//!
//! A binding implements [`Engine`] for process-level operations and
//! [`EngineContext`] for one isolated execution context. Everything a context
//! does runs on the thread that owns it; only its [`Terminate`] handle may be
//! shared with other threads.

use std::fmt;
use std::sync::Arc;

use crate::error::EngineError;
use crate::registry::Handle;

mod ops;
pub(crate) mod v8_engine;

pub use self::v8_engine::{V8Context, V8Engine};

/// Why a `load` or `send` did not complete. Details live in the context's last
/// exception text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    /// Source failed to compile
    Compile,
    /// Script threw, or failed at runtime
    Runtime,
    /// A message was sent before script registered receive logic
    NoReceiver,
    /// Execution was forcibly halted from another thread
    Terminated,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FailureKind::Compile => "compile error",
            FailureKind::Runtime => "runtime error",
            FailureKind::NoReceiver => "no receiver",
            FailureKind::Terminated => "terminated",
        };
        f.write_str(label)
    }
}

pub type Status = Result<(), FailureKind>;

/// Process-level operations of a script engine binding
pub trait Engine {
    type Context: EngineContext;

    /// Version string of the embedded engine
    fn version(&self) -> &'static str;

    /// One-time process-wide initialization. Must be idempotent.
    fn init_once(&self);

    /// Creates a context whose outbound messages are tagged with `handle`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot allocate the context
    fn create_context(&self, handle: Handle) -> Result<Self::Context, EngineError>;

    /// Destroys a context. Called exactly once per created context.
    fn dispose_context(&self, context: Self::Context);
}

/// One isolated, single-threaded execution context
pub trait EngineContext {
    /// Compiles and runs `source`, reporting faults under `name`
    ///
    /// # Errors
    ///
    /// Returns the failure kind; the description is in [`Self::last_exception`]
    fn load(&mut self, name: &str, source: &str) -> Status;

    /// Hands `message` to the receive logic registered by script
    ///
    /// # Errors
    ///
    /// Returns the failure kind; the description is in [`Self::last_exception`]
    fn send(&mut self, message: &[u8]) -> Status;

    /// Text of the most recent failure
    fn last_exception(&self) -> &str;

    /// Thread-safe handle that interrupts this context's running script
    fn terminator(&self) -> Arc<dyn Terminate>;
}

/// Forcibly halts script running in a context, from any thread
pub trait Terminate: Send + Sync {
    /// Interrupts running script. No effect when nothing is running.
    fn terminate(&self);
}
