//! Handler trait and handler identity.
//!
//! A handler is anything invoked once per fired event: a native closure, a
//! compiled script, a transport adapter or a chained dispatcher. Each
//! registration gets a [`HandlerId`]; compiled handlers are also keyed by their
//! source text and native handlers by `Arc` identity, so membership checks
//! never recompile or re-run anything.

use std::fmt;
use std::sync::Arc;

use hearth_core::Event;

use crate::error::HandlerError;

pub type HandlerResult = Result<(), HandlerError>;

/// A capability invoked with each event a dispatcher fires.
///
/// Implementations run synchronously on the firing thread and must not
/// mutate shared state visible to sibling handlers through the event; they
/// only receive `&Event`.
pub trait Handler: Send + Sync {
    /// Name used in logs and error reports
    fn name(&self) -> &str;

    /// Process one event. An `Err` is a handler-logic failure and is subject
    /// to the dispatcher's failure policy.
    fn handle(&self, event: &Event) -> HandlerResult;

    /// Source text for compiled handlers, used as a stable identity key
    fn source(&self) -> Option<&str> {
        None
    }
}

impl std::fmt::Debug for dyn Handler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handler")
            .field("name", &self.name())
            .field("source", &self.source())
            .finish()
    }
}

pub type SharedHandler = Arc<dyn Handler>;

/// Identity of one dispatcher entry, unique per dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(u64);

impl HandlerId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Wraps a Rust closure as a handler.
pub struct FnHandler<F> {
    name: String,
    func: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, func: F) -> Self {
        Self {
            name: name.into(),
            func,
        }
    }

    pub fn arc(name: impl Into<String>, func: F) -> Arc<Self> {
        Arc::new(Self::new(name, func))
    }
}

impl<F> Handler for FnHandler<F>
where
    F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        (self.func)(event)
    }
}

/// What to register: an existing handler or source text to compile.
pub enum Registration {
    Native(SharedHandler),
    Source(String),
}

impl From<SharedHandler> for Registration {
    fn from(handler: SharedHandler) -> Self {
        Self::Native(handler)
    }
}

impl<H: Handler + 'static> From<Arc<H>> for Registration {
    fn from(handler: Arc<H>) -> Self {
        Self::Native(handler)
    }
}

impl From<&str> for Registration {
    fn from(source: &str) -> Self {
        Self::Source(source.to_string())
    }
}

impl From<String> for Registration {
    fn from(source: String) -> Self {
        Self::Source(source)
    }
}

/// Lookup key for `unregister` / `contains`.
#[derive(Debug, Clone, Copy)]
pub enum HandlerRef<'a> {
    Id(HandlerId),
    Source(&'a str),
    /// Address of a registered `Arc`'s pointee
    Instance(*const ()),
}

impl fmt::Display for HandlerRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "id {}", id),
            Self::Source(source) => write!(f, "source `{}`", excerpt(source)),
            Self::Instance(ptr) => write!(f, "instance {:p}", ptr),
        }
    }
}

impl From<HandlerId> for HandlerRef<'_> {
    fn from(id: HandlerId) -> Self {
        Self::Id(id)
    }
}

impl<'a> From<&'a str> for HandlerRef<'a> {
    fn from(source: &'a str) -> Self {
        Self::Source(source)
    }
}

impl<'a> From<&'a String> for HandlerRef<'a> {
    fn from(source: &'a String) -> Self {
        Self::Source(source.as_str())
    }
}

impl<'a> From<&'a SharedHandler> for HandlerRef<'a> {
    fn from(handler: &'a SharedHandler) -> Self {
        Self::Instance(Arc::as_ptr(handler) as *const ())
    }
}

impl<'a, H: Handler + 'static> From<&'a Arc<H>> for HandlerRef<'a> {
    fn from(handler: &'a Arc<H>) -> Self {
        Self::Instance(Arc::as_ptr(handler) as *const ())
    }
}

/// One registered handler with its identity keys.
pub(crate) struct HandlerEntry {
    pub(crate) id: HandlerId,
    pub(crate) handler: SharedHandler,
    pub(crate) source: Option<Arc<str>>,
}

impl HandlerEntry {
    pub(crate) fn new(id: HandlerId, handler: SharedHandler) -> Self {
        let source = handler.source().map(Arc::from);
        Self {
            id,
            handler,
            source,
        }
    }

    pub(crate) fn matches(&self, key: &HandlerRef<'_>) -> bool {
        match key {
            HandlerRef::Id(id) => self.id == *id,
            HandlerRef::Source(source) => self.source.as_deref() == Some(*source),
            HandlerRef::Instance(ptr) => Arc::as_ptr(&self.handler) as *const () == *ptr,
        }
    }
}

/// First line of `source`, shortened for log output.
pub(crate) fn excerpt(source: &str) -> String {
    const MAX: usize = 48;
    let line = source.trim().lines().next().unwrap_or_default();
    if line.chars().count() > MAX {
        let cut: String = line.chars().take(MAX).collect();
        format!("{}...", cut)
    } else {
        line.to_string()
    }
}
