//! V8 binding built on `deno_core`.
//!
//! Each context is a `JsRuntime` with the `V8Worker` global installed. Script
//! sends go through `op_worker_send` into the dispatch bridge; host sends park
//! the bytes in the op state mailbox and invoke the registered receiver.
//!
//! V8 keeps a per-thread stack of entered isolates. A context's isolate is
//! entered only while a call into it runs (see [`Entered`]) and once more
//! right before it is destroyed, so workers sharing a thread can be used,
//! nested through callbacks, and disposed in any order.

use std::fmt::Write as _;
use std::ptr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use deno_core::error::JsError;
use deno_core::{JsRuntime, ModuleCodeString, ModuleName, RuntimeOptions, v8};
use tracing::{debug, info, warn};
use v8worker_config::engine::EngineConfig;

use super::ops::{self, WorkerInbox};
use super::{Engine, EngineContext, FailureKind, Status, Terminate};
use crate::error::{EngineError, Result, WorkerError};
use crate::registry::Handle;

const BOOTSTRAP: &str = include_str!("bootstrap.js");
const BOOTSTRAP_NAME: &str = "<v8worker_bootstrap>";
const DISPATCH_NAME: &str = "<v8worker_dispatch>";
const DISPATCH_CODE: &str = "globalThis.__v8workerDispatch();";
const DISPATCH_LABEL: &str = "V8Worker.recv handler";
const NO_RECEIVER: &str = "V8Worker.recv has not been called.";

static INIT: Mutex<EngineInit> = Mutex::new(EngineInit::new());

deno_core::extension!(
    v8worker_ops,
    ops = [
        ops::op_worker_send,
        ops::op_worker_reply_present,
        ops::op_worker_take_inbound,
        ops::op_worker_mark_receiver,
        ops::op_worker_print,
    ],
    options = {
        handle: Handle,
    },
    state = |state, options| {
        state.put(options.handle);
        state.put(WorkerInbox::default());
    },
);

/// One-time engine setup. Flags and the initialized mark share a lock, so
/// flags are either applied or rejected, never silently dropped.
#[derive(Debug)]
struct EngineInit {
    initialized: bool,
    flags: Option<Vec<String>>,
}

impl EngineInit {
    const fn new() -> Self {
        Self {
            initialized: false,
            flags: None,
        }
    }

    fn configure(&mut self, flags: &[String]) -> Result<()> {
        if self.initialized {
            return Err(WorkerError::Config(
                "engine already initialized, flags must be set before the first worker".into(),
            ));
        }
        if self.flags.is_some() {
            return Err(WorkerError::Config("engine already configured".into()));
        }
        self.flags = Some(flags.to_vec());
        Ok(())
    }

    /// Marks the engine initialized and hands out the flags to apply.
    /// `None` once initialization already happened.
    fn begin(&mut self) -> Option<Vec<String>> {
        if self.initialized {
            return None;
        }
        self.initialized = true;
        Some(self.flags.take().unwrap_or_default())
    }
}

fn init_state() -> MutexGuard<'static, EngineInit> {
    INIT.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Records engine flags to apply during one-time initialization
pub(crate) fn configure(config: &EngineConfig) -> Result<()> {
    init_state().configure(&config.flags)
}

/// The V8 engine, shared by every worker in the process
#[derive(Debug, Clone, Copy, Default)]
pub struct V8Engine;

impl Engine for V8Engine {
    type Context = V8Context;

    fn version(&self) -> &'static str {
        deno_core::v8::V8::get_version()
    }

    fn init_once(&self) {
        // Held while flags are applied, so no context is created before that
        let mut init = init_state();
        let Some(flags) = init.begin() else {
            return;
        };
        if !flags.is_empty() {
            let mut args = vec!["v8worker".to_string()];
            args.extend(flags);
            // V8 hands back argv[0] along with anything it did not understand
            for flag in deno_core::v8_set_flags(args).iter().skip(1) {
                warn!(flag = %flag, "Ignoring unrecognized engine flag");
            }
        }
        info!(version = self.version(), "Script engine initialized");
    }

    fn create_context(&self, handle: Handle) -> std::result::Result<V8Context, EngineError> {
        let mut runtime = JsRuntime::new(RuntimeOptions {
            extensions: vec![v8worker_ops::init(handle)],
            ..Default::default()
        });

        // A new isolate starts out entered on this thread
        let bootstrap = runtime.execute_script(BOOTSTRAP_NAME, BOOTSTRAP).map(drop);
        let isolate = runtime.v8_isolate().thread_safe_handle();
        // SAFETY: balances the enter done when the isolate was created
        unsafe { runtime.v8_isolate().exit() };

        let context = V8Context {
            runtime,
            handle,
            last_exception: String::new(),
            termination: Arc::new(Termination {
                isolate,
                state: Mutex::new(RunState::default()),
            }),
        };
        bootstrap.map_err(|e| EngineError::CreateContext(e.to_string()))?;

        debug!(%handle, "Created V8 context");
        Ok(context)
    }

    fn dispose_context(&self, context: V8Context) {
        let handle = context.handle;
        drop(context);
        debug!(%handle, "Disposed V8 context");
    }
}

/// Keeps an isolate entered on the current thread until dropped.
///
/// Entries nest: the isolate entered before this one becomes current again
/// on drop.
struct Entered(*mut v8::Isolate);

impl Entered {
    fn new(runtime: &mut JsRuntime) -> Self {
        let isolate: &mut v8::Isolate = runtime.v8_isolate();
        // SAFETY: the isolate is alive for as long as the runtime, and the
        // guard never outlives the borrow of the context that created it
        unsafe { isolate.enter() };
        Self(ptr::from_mut(isolate))
    }
}

impl Drop for Entered {
    fn drop(&mut self) {
        // SAFETY: pairs with the enter in `Entered::new` on the same thread
        unsafe { (*self.0).exit() };
    }
}

/// One `JsRuntime` plus the bookkeeping needed to report its failures
pub struct V8Context {
    runtime: JsRuntime,
    handle: Handle,
    last_exception: String,
    termination: Arc<Termination>,
}

impl V8Context {
    /// Runs `code` as script `name`. Failures are reported under `label`,
    /// quoting from `source` when the engine has no source line to offer.
    fn run(&mut self, name: &str, label: &str, code: String, source: Option<&str>) -> Status {
        self.termination.begin();
        let result = {
            let _entered = Entered::new(&mut self.runtime);
            // The completion value is a global handle; release it while entered
            self.runtime
                .execute_script(ModuleName::from(name.to_owned()), ModuleCodeString::from(code))
                .map(drop)
        };
        let terminated = self.termination.finish();

        match result {
            Ok(()) => Ok(()),
            Err(_) if terminated => {
                self.last_exception = format!("{label}: execution terminated");
                Err(FailureKind::Terminated)
            }
            Err(error) => {
                self.last_exception = describe(&error, label, source);
                if is_compile_error(&error) {
                    Err(FailureKind::Compile)
                } else {
                    Err(FailureKind::Runtime)
                }
            }
        }
    }

    fn inbox<R>(&mut self, f: impl FnOnce(&mut WorkerInbox) -> R) -> R {
        let state = self.runtime.op_state();
        let mut state = state.borrow_mut();
        f(state.borrow_mut::<WorkerInbox>())
    }
}

impl EngineContext for V8Context {
    fn load(&mut self, name: &str, source: &str) -> Status {
        self.run(name, name, source.to_owned(), Some(source))
    }

    fn send(&mut self, message: &[u8]) -> Status {
        let has_receiver = self.inbox(|inbox| {
            if inbox.receiver {
                inbox.inbound = Some(message.to_vec());
            }
            inbox.receiver
        });
        if !has_receiver {
            self.last_exception = NO_RECEIVER.to_owned();
            return Err(FailureKind::NoReceiver);
        }

        let status = self.run(DISPATCH_NAME, DISPATCH_LABEL, DISPATCH_CODE.to_owned(), None);
        self.inbox(|inbox| inbox.inbound = None);
        status
    }

    fn last_exception(&self) -> &str {
        &self.last_exception
    }

    fn terminator(&self) -> Arc<dyn Terminate> {
        self.termination.clone()
    }
}

impl Drop for V8Context {
    fn drop(&mut self) {
        // The isolate asserts on drop that it is the current one
        // SAFETY: the runtime, and with it the isolate, is dropped right after
        // this and exits it again
        unsafe { self.runtime.v8_isolate().enter() };
    }
}

/// Formats an exception as `file:line`, the source line, a caret under the
/// faulty column, then the stack trace.
fn describe(error: &JsError, label: &str, source: Option<&str>) -> String {
    let mut out = String::new();
    let frame = error.frames.first();
    let file = frame
        .and_then(|f| f.file_name.as_deref())
        .unwrap_or(label);

    match frame.and_then(|f| f.line_number) {
        Some(line) => {
            let _ = writeln!(out, "{file}:{line}");
            // Only the script being loaded is at hand; frames pointing at
            // other scripts rely on the engine's own source line
            let fallback = source
                .filter(|_| file == label)
                .and_then(|text| source_line(text, line));
            if let Some(source_line) = error.source_line.as_deref().or(fallback) {
                let _ = writeln!(out, "{source_line}");
                if let Some(column) = frame.and_then(|f| f.column_number).filter(|c| *c > 0) {
                    let _ = writeln!(out, "{}^", " ".repeat((column - 1) as usize));
                }
            }
        }
        None => {
            let _ = writeln!(out, "{file}");
        }
    }

    match error.stack.as_deref().filter(|s| s.lines().count() > 1) {
        Some(stack) => out.push_str(stack),
        None => out.push_str(&error.exception_message),
    }
    out
}

/// 1-based line lookup
fn source_line(text: &str, line: i64) -> Option<&str> {
    let index = usize::try_from(line).ok()?.checked_sub(1)?;
    text.lines().nth(index)
}

fn is_compile_error(error: &JsError) -> bool {
    let single_line_stack = error.stack.as_deref().is_none_or(|s| s.lines().count() <= 1);
    error.name.as_deref() == Some("SyntaxError") && single_line_stack
}

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    requested: bool,
}

/// Cross-thread termination for one isolate.
///
/// Termination only fires while script is running, and any pending request is
/// cancelled once the run returns, so an idle or recovered context accepts
/// new work.
struct Termination {
    isolate: v8::IsolateHandle,
    state: Mutex<RunState>,
}

impl Termination {
    fn state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) {
        let mut state = self.state();
        state.running = true;
        state.requested = false;
    }

    /// Ends a run; returns whether it was asked to terminate
    fn finish(&self) -> bool {
        let mut state = self.state();
        state.running = false;
        let requested = std::mem::take(&mut state.requested);
        if requested {
            self.isolate.cancel_terminate_execution();
        }
        requested
    }
}

impl Terminate for Termination {
    fn terminate(&self) {
        let mut state = self.state();
        if state.running && !state.requested {
            state.requested = true;
            self.isolate.terminate_execution();
        }
    }
}
