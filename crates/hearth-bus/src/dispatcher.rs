//! Ordered handler registry with synchronous fan-out.
//!
//! ## Semantics
//!
//! - Handlers run on the caller's thread, in registration order.
//! - Every handler receives the same `&Event`; the base dispatcher makes no copy.
//! - Under [`FailurePolicy::Abort`] (the default) the first handler error
//!   stops the fan-out and is returned from [`Dispatcher::fire`]. Under
//!   [`FailurePolicy::Continue`] it is logged and collected instead.
//! - No locking happens here. Share a dispatcher across threads through
//!   [`SharedDispatcher`] (`Arc<RwLock<Dispatcher>>`), which serializes
//!   registration against concurrent fires.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hearth_bus::{Dispatcher, FnHandler};
//!
//! let mut bus = Dispatcher::named("cooker");
//! bus.register(FnHandler::arc("print", |e| { println!("{e}"); Ok(()) }))?;
//! bus.register("log('info', e.kind)")?;
//!
//! bus.fire(&event)?;
//! ```

use std::sync::Arc;

use hearth_core::{Event, FailurePolicy, HearthConfig, MetadataRef};
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::compiler::HandlerCompiler;
use crate::error::{BusError, BusResult, HandlerError};
use crate::handler::{
    FnHandler, HandlerEntry, HandlerId, HandlerRef, HandlerResult, Registration, SharedHandler,
};
use crate::scoped::MetadataDispatcher;

/// A dispatcher shared between threads.
pub type SharedDispatcher = Arc<RwLock<Dispatcher>>;

/// A handler that failed under [`FailurePolicy::Continue`].
#[derive(Debug)]
pub struct HandlerFailure {
    pub id: HandlerId,
    pub handler: String,
    pub error: HandlerError,
}

/// Result of one fan-out.
#[derive(Debug, Default)]
pub struct FireOutcome {
    /// Handlers that returned `Ok`
    pub delivered: usize,
    /// Handlers that failed (only populated under `Continue`)
    pub failures: Vec<HandlerFailure>,
}

impl FireOutcome {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Fold a nested fan-out's counts into this one.
    pub fn merge(&mut self, other: FireOutcome) {
        self.delivered += other.delivered;
        self.failures.extend(other.failures);
    }
}

/// Anything events can be fired into.
pub trait EventSink: Send + Sync {
    fn fire(&self, event: &Event) -> BusResult<FireOutcome>;
}

pub struct Dispatcher {
    name: String,
    entries: Vec<HandlerEntry>,
    next_id: u64,
    policy: FailurePolicy,
    compiler: HandlerCompiler,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::named("dispatcher")
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("name", &self.name)
            .field("handlers", &self.handler_names())
            .field("policy", &self.policy)
            .finish()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            next_id: 1,
            policy: FailurePolicy::default(),
            compiler: HandlerCompiler::default(),
        }
    }

    /// Build a dispatcher with the configured failure policy and sandbox.
    pub fn from_config(name: impl Into<String>, config: &HearthConfig) -> Self {
        Self::named(name)
            .with_policy(config.bus.failure_policy)
            .with_compiler(HandlerCompiler::from(&config.sandbox))
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_compiler(mut self, compiler: HandlerCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    pub fn set_policy(&mut self, policy: FailurePolicy) {
        self.policy = policy;
    }

    pub fn compiler(&self) -> &HandlerCompiler {
        &self.compiler
    }

    pub fn into_shared(self) -> SharedDispatcher {
        Arc::new(RwLock::new(self))
    }

    /// Register a handler, compiling it first when given source text.
    ///
    /// Registering source text or an `Arc` that is already present is a
    /// no-op returning the existing id; the source is not recompiled.
    pub fn register(&mut self, registration: impl Into<Registration>) -> BusResult<HandlerId> {
        match registration.into() {
            Registration::Native(handler) => Ok(self.register_handler(handler)),
            Registration::Source(source) => self.register_source(&source),
        }
    }

    pub fn register_handler(&mut self, handler: SharedHandler) -> HandlerId {
        if let Some(id) = self.find(&HandlerRef::from(&handler)) {
            debug!(dispatcher = %self.name, handler = %handler.name(), %id, "Handler already registered");
            return id;
        }
        if let Some(id) = handler.source().and_then(|src| self.find(&HandlerRef::Source(src))) {
            debug!(dispatcher = %self.name, handler = %handler.name(), %id, "Handler source already registered");
            return id;
        }
        self.push(handler)
    }

    pub fn register_source(&mut self, source: &str) -> BusResult<HandlerId> {
        if let Some(id) = self.find(&HandlerRef::Source(source)) {
            debug!(dispatcher = %self.name, %id, "Handler source already registered");
            return Ok(id);
        }
        let handler = self.compiler.compile(source)?;
        Ok(self.push(Arc::new(handler)))
    }

    pub fn register_fn<F>(&mut self, name: impl Into<String>, func: F) -> HandlerId
    where
        F: Fn(&Event) -> HandlerResult + Send + Sync + 'static,
    {
        self.push(FnHandler::arc(name, func))
    }

    /// Build a metadata-scoped dispatcher for `metadata` and register it here.
    ///
    /// The scoped dispatcher inherits this dispatcher's policy and sandbox.
    pub fn register_metadata_handlers(
        &mut self,
        metadata: MetadataRef,
    ) -> BusResult<(HandlerId, Arc<MetadataDispatcher>)> {
        let scoped = Arc::new(MetadataDispatcher::with_dispatcher(
            metadata,
            Dispatcher::named(format!("{}:metadata", self.name))
                .with_policy(self.policy)
                .with_compiler(self.compiler.clone()),
        )?);
        let id = self.register_handler(scoped.clone());
        Ok((id, scoped))
    }

    /// Remove the first entry matching `key`, returning its handler.
    pub fn unregister<'a>(&mut self, key: impl Into<HandlerRef<'a>>) -> BusResult<SharedHandler> {
        let key = key.into();
        let index = self
            .entries
            .iter()
            .position(|entry| entry.matches(&key))
            .ok_or_else(|| BusError::NotFound(key.to_string()))?;

        let entry = self.entries.remove(index);
        debug!(dispatcher = %self.name, handler = %entry.handler.name(), id = %entry.id, "Unregistered handler");
        Ok(entry.handler)
    }

    pub fn contains<'a>(&self, key: impl Into<HandlerRef<'a>>) -> bool {
        self.find(&key.into()).is_some()
    }

    /// Invoke every handler with `event`, in registration order.
    pub fn fire(&self, event: &Event) -> BusResult<FireOutcome> {
        let mut outcome = FireOutcome::default();

        for entry in &self.entries {
            debug!(
                dispatcher = %self.name,
                handler = %entry.handler.name(),
                id = %entry.id,
                event = event.kind_name(),
                "Handling event"
            );

            match entry.handler.handle(event) {
                Ok(()) => outcome.delivered += 1,
                Err(error) => match self.policy {
                    FailurePolicy::Abort => {
                        return Err(BusError::HandlerExecution {
                            id: entry.id,
                            handler: entry.handler.name().to_string(),
                            source: error,
                        });
                    }
                    FailurePolicy::Continue => {
                        warn!(
                            dispatcher = %self.name,
                            handler = %entry.handler.name(),
                            id = %entry.id,
                            event = event.kind_name(),
                            error = %error,
                            "Handler failed, continuing fan-out"
                        );
                        outcome.failures.push(HandlerFailure {
                            id: entry.id,
                            handler: entry.handler.name().to_string(),
                            error,
                        });
                    }
                },
            }
        }

        Ok(outcome)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn handler_ids(&self) -> Vec<HandlerId> {
        self.entries.iter().map(|entry| entry.id).collect()
    }

    pub fn handler_names(&self) -> Vec<&str> {
        self.entries.iter().map(|entry| entry.handler.name()).collect()
    }

    fn find(&self, key: &HandlerRef<'_>) -> Option<HandlerId> {
        self.entries
            .iter()
            .find(|entry| entry.matches(key))
            .map(|entry| entry.id)
    }

    fn push(&mut self, handler: SharedHandler) -> HandlerId {
        let id = HandlerId::new(self.next_id);
        self.next_id += 1;
        debug!(dispatcher = %self.name, handler = %handler.name(), %id, "Registered handler");
        self.entries.push(HandlerEntry::new(id, handler));
        id
    }
}

impl EventSink for Dispatcher {
    fn fire(&self, event: &Event) -> BusResult<FireOutcome> {
        Dispatcher::fire(self, event)
    }
}

impl<T: EventSink> EventSink for RwLock<T> {
    fn fire(&self, event: &Event) -> BusResult<FireOutcome> {
        self.read().fire(event)
    }
}

impl<T: EventSink + ?Sized> EventSink for Arc<T> {
    fn fire(&self, event: &Event) -> BusResult<FireOutcome> {
        (**self).fire(event)
    }
}
