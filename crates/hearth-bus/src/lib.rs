//! # Hearth Bus
//!
//! In-process event bus for build-lifecycle events.
//!
//! A [`Dispatcher`] owns an ordered list of handlers and fans each fired
//! event out to them synchronously on the caller's thread. Handlers can be
//! native closures ([`FnHandler`]), sandboxed Lua snippets compiled by
//! [`HandlerCompiler`], transport adapters that relay events to another
//! process or thread ([`PipeHandler`], [`QueueHandler`]), or other
//! dispatchers ([`ChainedHandler`], [`MetadataDispatcher`]).
//!
//! ## Example
//!
//! ```rust,ignore
//! use hearth_bus::{Dispatcher, PipeHandler, BuildTracker};
//! use std::sync::Arc;
//!
//! let tracker = Arc::new(BuildTracker::new());
//! let mut bus = Dispatcher::named("cooker");
//! bus.register(tracker.clone())?;
//! bus.register(Arc::new(PipeHandler::new(std::io::stdout())))?;
//! bus.register("if e.kind == 'TaskFailed' then log('error', e.package) end")?;
//!
//! bus.fire(&Event::task_started(TaskInfo::new("zlib", "do_fetch", 4242)))?;
//! ```

pub mod chained;
pub mod compiler;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod log_bridge;
pub mod scoped;
pub mod tracker;
pub mod transport;

pub use chained::ChainedHandler;
pub use compiler::{HandlerCompiler, ScriptHandler};
pub use dispatcher::{Dispatcher, EventSink, FireOutcome, HandlerFailure, SharedDispatcher};
pub use error::{BusError, BusResult, CompileError, HandlerError};
pub use handler::{
    FnHandler, Handler, HandlerId, HandlerRef, HandlerResult, Registration, SharedHandler,
};
pub use log_bridge::LogBridge;
pub use scoped::MetadataDispatcher;
pub use tracker::{
    BuildOutcome, BuildSummary, BuildTracker, PackageState, Progress, ProgressPhase, TaskState,
    TaskStatus,
};
pub use transport::{
    event_queue, EventQueue, PipeHandler, QueueClosed, QueueHandler, TransportCounts,
    TransportStats,
};

pub use hearth_core::{Event, EventPayload, FailurePolicy, LogLevel, LogRecord};
