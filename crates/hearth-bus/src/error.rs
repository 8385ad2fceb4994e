//! Error types for registration and fan-out.
//!
//! Registration and handler-logic failures surface as [`BusError`]; transport
//! failures never do, they only reach the logs (see `transport`).

use thiserror::Error;

use crate::handler::HandlerId;

/// Handler source failed to compile.
#[derive(Debug, Clone, Error)]
#[error("failed to compile handler `{name}`: {message}")]
pub struct CompileError {
    /// Chunk name shown in script tracebacks
    pub name: String,
    pub message: String,
}

impl CompileError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

/// Failure raised by a handler while processing one event.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Native handler logic failed
    #[error("{0}")]
    Failed(String),

    /// A script handler raised a runtime error
    #[error("script error: {0}")]
    Script(String),

    /// A downstream dispatcher aborted its own fan-out
    #[error("chained dispatcher failed: {0}")]
    Chained(#[source] Box<BusError>),
}

impl HandlerError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }
}

impl From<BusError> for HandlerError {
    fn from(err: BusError) -> Self {
        Self::Chained(Box::new(err))
    }
}

/// Errors returned to callers of the dispatcher API.
#[derive(Debug, Error)]
pub enum BusError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error("handler not registered: {0}")]
    NotFound(String),

    #[error("handler {id} ({handler}) failed during fan-out: {source}")]
    HandlerExecution {
        id: HandlerId,
        handler: String,
        #[source]
        source: HandlerError,
    },
}

impl BusError {
    pub fn is_compile(&self) -> bool {
        matches!(self, Self::Compile(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_handler_execution(&self) -> bool {
        matches!(self, Self::HandlerExecution { .. })
    }
}

pub type BusResult<T> = Result<T, BusError>;
