use thiserror::Error;

use crate::{engine::FailureKind, registry::Handle};

pub type Result<T> = std::result::Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Failed loading script {name}: {message}")]
    ScriptLoad {
        name: String,
        kind: FailureKind,
        message: String,
    },

    #[error("Failed sending message: {message}")]
    ScriptSend { kind: FailureKind, message: String },

    #[error("Worker {handle} already disposed")]
    AlreadyDisposed { handle: Handle },

    #[error("Worker {handle} used after dispose")]
    Disposed { handle: Handle },

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Config error: {0}")]
    Config(String),
}

impl WorkerError {
    /// Engine-reported failure kind, for script errors
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            WorkerError::ScriptLoad { kind, .. } | WorkerError::ScriptSend { kind, .. } => {
                Some(*kind)
            }
            _ => None,
        }
    }

    /// True when the error came from `terminate_execution` interrupting script
    pub fn is_terminated(&self) -> bool {
        self.failure_kind() == Some(FailureKind::Terminated)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed creating execution context: {0}")]
    CreateContext(String),
}
