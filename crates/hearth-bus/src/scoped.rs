//! Dispatcher that binds build metadata into every event it delivers.
//!
//! At construction the dispatcher reads [`HANDLERS_VAR`] from its metadata and
//! compiles each snippet into a handler. On every fire it clones the incoming
//! event, points the clone's context at its metadata and fans the clone out,
//! so the caller's event is never touched and the same event can go through
//! several scoped dispatchers without one context leaking into another.

use std::sync::Arc;

use hearth_core::{Event, HearthConfig, MetadataRef, HANDLERS_VAR};
use tracing::debug;

use crate::dispatcher::{Dispatcher, EventSink, FireOutcome};
use crate::error::{BusResult, HandlerError};
use crate::handler::{Handler, HandlerId, HandlerRef, HandlerResult, Registration, SharedHandler};

pub struct MetadataDispatcher {
    metadata: MetadataRef,
    dispatcher: Dispatcher,
}

impl std::fmt::Debug for MetadataDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetadataDispatcher")
            .field("metadata", &self.metadata)
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl MetadataDispatcher {
    /// Create a scoped dispatcher and register the metadata's handler snippets.
    ///
    /// Fails on the first snippet that does not compile.
    pub fn new(metadata: MetadataRef) -> BusResult<Self> {
        Self::with_dispatcher(metadata, Dispatcher::named("metadata"))
    }

    /// Like [`MetadataDispatcher::new`], using the configured policy and sandbox.
    pub fn from_config(metadata: MetadataRef, config: &HearthConfig) -> BusResult<Self> {
        Self::with_dispatcher(metadata, Dispatcher::from_config("metadata", config))
    }

    /// Use `dispatcher` (policy, compiler, any pre-registered handlers) as the base.
    pub fn with_dispatcher(metadata: MetadataRef, mut dispatcher: Dispatcher) -> BusResult<Self> {
        let snippets = metadata.get_var(HANDLERS_VAR).unwrap_or_default();
        for source in snippets.iter().filter(|s| !s.trim().is_empty()) {
            dispatcher.register_source(source)?;
        }
        debug!(
            dispatcher = %dispatcher.name(),
            handlers = dispatcher.len(),
            "Registered metadata handlers"
        );

        Ok(Self {
            metadata,
            dispatcher,
        })
    }

    pub fn metadata(&self) -> &MetadataRef {
        &self.metadata
    }

    pub fn register(&mut self, registration: impl Into<Registration>) -> BusResult<HandlerId> {
        self.dispatcher.register(registration)
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F) -> HandlerId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.dispatcher.register_fn(name, func)
    }

    pub fn unregister<'a>(&mut self, key: impl Into<HandlerRef<'a>>) -> BusResult<SharedHandler> {
        self.dispatcher.unregister(key)
    }

    pub fn contains<'a>(&self, key: impl Into<HandlerRef<'a>>) -> bool {
        self.dispatcher.contains(key)
    }

    pub fn len(&self) -> usize {
        self.dispatcher.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dispatcher.is_empty()
    }

    /// Fan out a private copy of `event` bound to this dispatcher's metadata.
    ///
    /// The copy is made on every call.
    pub fn fire(&self, event: &Event) -> BusResult<FireOutcome> {
        let scoped = event.clone().with_context(Arc::clone(&self.metadata));
        self.dispatcher.fire(&scoped)
    }
}

impl EventSink for MetadataDispatcher {
    fn fire(&self, event: &Event) -> BusResult<FireOutcome> {
        MetadataDispatcher::fire(self, event)
    }
}

impl Handler for MetadataDispatcher {
    fn name(&self) -> &str {
        self.dispatcher.name()
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        self.fire(event).map(|_| ()).map_err(HandlerError::from)
    }
}
