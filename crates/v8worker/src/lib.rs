//! # v8worker
//!
//! Isolated V8 script workers exchanging byte messages with the host.
//!
//! ## Overview
//!
//! Each [`Worker`] owns one V8 execution context and one host receive
//! callback. Script talks to the host through a single global:
//!
//! - `V8Worker.print(...args)` - write a line to stdout
//! - `V8Worker.recv(fn)` - register the handler for messages sent by the host
//! - `V8Worker.send(buffer)` - deliver bytes to the host callback; returns the
//!   callback's reply as an `ArrayBuffer`, or `undefined`
//!
//! The engine reaches the host callback through a process-wide registry keyed
//! by an integer [`Handle`], never through a pointer to host state. Disposing a
//! worker removes its handle before destroying the context, so a late callback
//! for a disposed worker is dropped instead of touching freed memory.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::{Arc, Mutex};
//! use v8worker::Worker;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let received = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&received);
//!
//! let mut worker = Worker::new(move |msg| {
//!     sink.lock().unwrap().push(msg);
//!     None
//! })?;
//!
//! worker.load("echo.js", r"
//!     V8Worker.recv((buf) => V8Worker.send(buf));
//! ")?;
//! worker.send(b"ping")?;
//!
//! assert_eq!(received.lock().unwrap()[0], b"ping");
//! worker.dispose()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Threading
//!
//! A worker is driven by one thread at a time; `load` and `send` block until
//! script, including every callback it triggers, finishes. Workers are
//! independent, so hosts run several concurrently on separate threads. Use
//! [`Worker::terminate_handle`] to stop runaway script from another thread.

pub mod bridge;
pub mod engine;
mod error;
pub mod registry;
mod worker;

#[cfg(test)]
mod tests;

pub use engine::{Engine, EngineContext, FailureKind, Terminate, V8Engine};
pub use error::{EngineError, Result, WorkerError};
pub use registry::{Handle, HandleRegistry, ReceiveCallback};
pub use v8worker_config::engine::EngineConfig;
pub use worker::{TerminateHandle, Worker, WorkerState};

/// Version of the embedded V8 engine, e.g. "13.0.245.12"
pub fn version() -> &'static str {
    V8Engine.version()
}

/// Sets process-wide engine options.
///
/// Must run before the first [`Worker`] is created, at most once.
///
/// # Errors
///
/// Returns [`WorkerError::Config`] if the engine is already initialized or
/// options were already set
pub fn configure(config: &EngineConfig) -> Result<()> {
    engine::v8_engine::configure(config)
}
