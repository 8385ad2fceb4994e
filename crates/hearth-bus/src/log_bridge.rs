//! Routes log output onto the event bus.
//!
//! [`LogBridge::emit`] is the sink entry point: the record is fired as a
//! `LogRecord` event exactly as given. The bridge is also a
//! [`tracing_subscriber::Layer`], so installing it next to the usual fmt
//! layer turns every `tracing` event into a bus event:
//!
//! ```rust,ignore
//! use tracing_subscriber::prelude::*;
//!
//! tracing_subscriber::registry()
//!     .with(tracing_subscriber::fmt::layer())
//!     .with(LogBridge::new(bus.clone()))
//!     .init();
//! ```
//!
//! Handlers that log while the bridge is already forwarding would feed back
//! into the bus; those records are suppressed and only counted.

use std::cell::Cell;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use hearth_core::{Event, LogLevel, LogRecord};
use tracing::field::{Field, Visit};
use tracing::Subscriber;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::dispatcher::{EventSink, FireOutcome};
use crate::error::BusResult;

thread_local! {
    static FORWARDING: Cell<bool> = const { Cell::new(false) };
}

pub struct LogBridge {
    sink: Arc<dyn EventSink>,
    suppressed: AtomicU64,
    failed: AtomicU64,
}

impl LogBridge {
    pub fn new(sink: Arc<dyn EventSink>) -> Self {
        Self {
            sink,
            suppressed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    /// Fire `record` on the held dispatcher, unmodified.
    ///
    /// Records starting with "Running task" are passed through like any
    /// other; filtering them is up to consumers.
    pub fn emit(&self, record: LogRecord) -> BusResult<FireOutcome> {
        self.sink.fire(&Event::log(record))
    }

    /// Records dropped because they were logged from inside a forward.
    pub fn suppressed(&self) -> u64 {
        self.suppressed.load(Ordering::Relaxed)
    }

    /// Forwards whose fan-out returned an error.
    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

/// Clears the forwarding flag even if a handler panics.
struct ForwardGuard;

impl ForwardGuard {
    fn enter() -> Option<Self> {
        FORWARDING.with(|flag| {
            if flag.replace(true) {
                None
            } else {
                Some(ForwardGuard)
            }
        })
    }
}

impl Drop for ForwardGuard {
    fn drop(&mut self) {
        FORWARDING.with(|flag| flag.set(false));
    }
}

/// Splits tracing fields into the message and `key=value` args.
#[derive(Default)]
struct RecordVisitor {
    message: Option<String>,
    args: Vec<String>,
}

impl Visit for RecordVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_string());
        } else {
            self.args.push(format!("{}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = Some(format!("{:?}", value));
        } else {
            self.args.push(format!("{}={:?}", field.name(), value));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogBridge {
    fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
        let Some(_guard) = ForwardGuard::enter() else {
            self.suppressed.fetch_add(1, Ordering::Relaxed);
            return;
        };

        let metadata = event.metadata();
        let mut visitor = RecordVisitor::default();
        event.record(&mut visitor);

        let record = LogRecord::new(
            LogLevel::from(metadata.level()),
            visitor.message.unwrap_or_default(),
        )
        .with_target(metadata.target())
        .with_args(visitor.args)
        .with_pid(std::process::id());

        if self.emit(record).is_err() {
            self.failed.fetch_add(1, Ordering::Relaxed);
        }
    }
}
