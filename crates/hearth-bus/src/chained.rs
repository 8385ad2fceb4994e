//! Handler that forwards every event into another dispatcher.
//!
//! Lets dispatchers be composed into a tree: a top-level bus fans out to
//! several sub-dispatchers, each keeping its own handler list and failure
//! policy.

use std::sync::Arc;

use hearth_core::Event;
use tracing::debug;

use crate::dispatcher::{Dispatcher, EventSink, SharedDispatcher};
use crate::error::HandlerError;
use crate::handler::{Handler, HandlerResult};

pub struct ChainedHandler {
    name: String,
    target: Arc<dyn EventSink>,
}

impl ChainedHandler {
    pub fn new(target: Arc<dyn EventSink>) -> Self {
        Self {
            name: "chained".to_string(),
            target,
        }
    }

    /// Take ownership of `dispatcher`; nothing else can register on it afterwards.
    pub fn from_dispatcher(dispatcher: Dispatcher) -> Self {
        let name = format!("chained:{}", dispatcher.name());
        Self::new(Arc::new(dispatcher)).with_name(name)
    }

    /// Forward into a dispatcher that stays open for registration elsewhere.
    pub fn shared(dispatcher: SharedDispatcher) -> Self {
        let name = format!("chained:{}", dispatcher.read().name());
        Self::new(dispatcher).with_name(name)
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn target(&self) -> &Arc<dyn EventSink> {
        &self.target
    }
}

impl Handler for ChainedHandler {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        let outcome = self.target.fire(event).map_err(HandlerError::from)?;
        if !outcome.is_clean() {
            debug!(
                handler = %self.name,
                event = %event.kind_name(),
                failures = outcome.failures.len(),
                "Chained dispatcher continued past failures"
            );
        }
        Ok(())
    }
}
