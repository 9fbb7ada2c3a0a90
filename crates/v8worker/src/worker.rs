use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, error, warn};

use crate::engine::{Engine, EngineContext, Terminate, V8Engine};
use crate::error::{Result, WorkerError};
use crate::registry::{Handle, HandleRegistry, ReceiveCallback, WorkerRecord};

/// Lifecycle of a [`Worker`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Context allocated, no script loaded yet
    Created,
    /// At least one script ran to completion
    Loaded,
    /// Handle removed and context destroyed
    Disposed,
}

/// One isolated script execution context plus the host callback receiving
/// its outbound messages.
///
/// A worker exclusively owns its engine context. Script runs on the thread
/// calling [`Worker::load`] and [`Worker::send`]; the receive callback is
/// invoked synchronously on that same thread. Use [`Worker::terminate_handle`]
/// to interrupt a running script from elsewhere.
///
/// Dropping a worker that was never disposed disposes it.
pub struct Worker<E: Engine = V8Engine> {
    engine: E,
    handle: Handle,
    // Keeps the registry's weak entry alive until dispose
    record: Option<Arc<WorkerRecord>>,
    context: Option<E::Context>,
    state: WorkerState,
    disposed: Arc<AtomicBool>,
    terminator: Arc<dyn Terminate>,
}

impl Worker<V8Engine> {
    /// Creates a V8 worker delivering script messages to `callback`
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to create the context
    pub fn new<F>(callback: F) -> Result<Self>
    where
        F: Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        Self::with_engine(V8Engine, callback)
    }
}

impl<E: Engine> Worker<E> {
    /// Creates a worker on a specific engine binding
    ///
    /// Initializes the engine on first use, registers a handle, then asks the
    /// engine for a context tagged with that handle.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine fails to create the context. The handle
    /// is released in that case.
    pub fn with_engine<F>(engine: E, callback: F) -> Result<Self>
    where
        F: Fn(Vec<u8>) -> Option<Vec<u8>> + Send + Sync + 'static,
    {
        engine.init_once();

        let callback: ReceiveCallback = Arc::new(callback);
        let record = Arc::new(WorkerRecord::new(callback));
        let registry = HandleRegistry::global();
        let handle = registry.register(&record);

        let context = match engine.create_context(handle) {
            Ok(context) => context,
            Err(e) => {
                registry.unregister(handle);
                warn!(%handle, error = %e, "Failed creating worker context");
                return Err(e.into());
            }
        };
        let terminator = context.terminator();

        debug!(%handle, "Worker created");
        Ok(Self {
            engine,
            handle,
            record: Some(record),
            context: Some(context),
            state: WorkerState::Created,
            disposed: Arc::new(AtomicBool::new(false)),
            terminator,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle
    }

    pub fn state(&self) -> WorkerState {
        self.state
    }

    pub fn is_disposed(&self) -> bool {
        self.state == WorkerState::Disposed
    }

    /// Version of the engine backing this worker
    pub fn engine_version(&self) -> &'static str {
        self.engine.version()
    }

    fn context_mut(&mut self) -> Result<&mut E::Context> {
        let handle = self.handle;
        self.context
            .as_mut()
            .ok_or(WorkerError::Disposed { handle })
    }

    /// Loads and runs `source`, reporting faults under `name`.
    ///
    /// Any messages the script sends during top-level evaluation reach the
    /// receive callback before this returns.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ScriptLoad`] carrying the engine's exception text
    /// on syntax errors, uncaught exceptions, or termination, and
    /// [`WorkerError::Disposed`] after dispose. The worker stays usable after
    /// a script error.
    pub fn load(&mut self, name: &str, source: &str) -> Result<()> {
        let handle = self.handle;
        let context = self.context_mut()?;

        debug!(%handle, name, len = source.len(), "Loading script");
        if let Err(kind) = context.load(name, source) {
            let message = context.last_exception().to_owned();
            warn!(%handle, name, %kind, "Script load failed");
            return Err(WorkerError::ScriptLoad {
                name: name.to_owned(),
                kind,
                message,
            });
        }

        self.state = WorkerState::Loaded;
        Ok(())
    }

    /// Delivers `message` to the receive logic registered by script.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::ScriptSend`] carrying the engine's exception text
    /// when the script handler throws, no handler is registered, or execution
    /// is terminated, and [`WorkerError::Disposed`] after dispose.
    pub fn send(&mut self, message: &[u8]) -> Result<()> {
        let handle = self.handle;
        let context = self.context_mut()?;

        debug!(%handle, len = message.len(), "Sending message to script");
        if let Err(kind) = context.send(message) {
            let message = context.last_exception().to_owned();
            warn!(%handle, %kind, "Script failed handling message");
            return Err(WorkerError::ScriptSend { kind, message });
        }
        Ok(())
    }

    /// Most recent script error text, empty if none or after dispose
    pub fn last_exception(&self) -> &str {
        self.context
            .as_ref()
            .map_or("", EngineContext::last_exception)
    }

    /// Forcibly halts script currently running in this worker. No effect when
    /// idle.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disposed`] after dispose
    pub fn terminate_execution(&self) -> Result<()> {
        self.terminate_handle().terminate_execution()
    }

    /// A `Send + Sync` handle for terminating this worker's script from
    /// another thread
    pub fn terminate_handle(&self) -> TerminateHandle {
        TerminateHandle {
            handle: self.handle,
            disposed: Arc::clone(&self.disposed),
            terminator: Arc::clone(&self.terminator),
        }
    }

    /// Unregisters the handle and destroys the engine context.
    ///
    /// The handle is removed before the context is destroyed, so a late
    /// dispatch for it is dropped rather than reaching a dead context.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::AlreadyDisposed`] on a second call. That signals
    /// a resource-management bug in the host; nothing is freed twice.
    pub fn dispose(&mut self) -> Result<()> {
        let handle = self.handle;
        let Some(context) = self.context.take() else {
            error!(%handle, "Worker disposed twice");
            return Err(WorkerError::AlreadyDisposed { handle });
        };

        self.disposed.store(true, Ordering::Release);
        self.state = WorkerState::Disposed;
        HandleRegistry::global().unregister(handle);
        drop(self.record.take());
        self.engine.dispose_context(context);

        debug!(%handle, "Worker disposed");
        Ok(())
    }
}

impl<E: Engine> Drop for Worker<E> {
    fn drop(&mut self) {
        if self.context.is_some() {
            debug!(handle = %self.handle, "Disposing worker on drop");
            let _ = self.dispose();
        }
    }
}

impl<E: Engine> fmt::Debug for Worker<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Worker")
            .field("handle", &self.handle)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

/// Interrupts a worker's running script from any thread
#[derive(Clone)]
pub struct TerminateHandle {
    handle: Handle,
    disposed: Arc<AtomicBool>,
    terminator: Arc<dyn Terminate>,
}

impl TerminateHandle {
    pub fn handle(&self) -> Handle {
        self.handle
    }

    /// Forcibly halts script currently running in the worker. The interrupted
    /// `load` or `send` returns an error; the worker stays usable.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerError::Disposed`] once the worker has been disposed
    pub fn terminate_execution(&self) -> Result<()> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(WorkerError::Disposed {
                handle: self.handle,
            });
        }
        debug!(handle = %self.handle, "Terminating script execution");
        self.terminator.terminate();
        Ok(())
    }
}

impl fmt::Debug for TerminateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TerminateHandle")
            .field("handle", &self.handle)
            .finish_non_exhaustive()
    }
}
