use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use hearth_bus::{BuildSummary, BuildTracker, Dispatcher, SharedDispatcher};
use hearth_core::{EventReader, HearthConfig, WireCodec};
use tracing::info;

use crate::output::EventPrinter;

pub fn execute(
    config: &HearthConfig,
    log_bus: &SharedDispatcher,
    input: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let reader: Box<dyn BufRead> = match input {
        Some(path) => Box::new(BufReader::new(
            File::open(&path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    };

    let tracker = Arc::new(BuildTracker::new());
    log_bus.write().register(tracker.clone())?;

    let summary = consume(config, reader, tracker, Some(EventPrinter::new(json)))?;
    eprintln!("{}", summary);
    Ok(())
}

/// Decode every record from `reader` and fire it through a dispatcher
/// holding `tracker`, the configured metadata handlers and `printer`.
pub fn consume<R: BufRead>(
    config: &HearthConfig,
    reader: R,
    tracker: Arc<BuildTracker>,
    printer: Option<EventPrinter>,
) -> Result<BuildSummary> {
    let mut bus = Dispatcher::from_config("watch", config);
    bus.register(tracker.clone())?;
    if !config.metadata.is_empty() {
        bus.register_metadata_handlers(config.metadata.clone().into_shared())?;
    }
    if let Some(printer) = printer {
        bus.register(Arc::new(printer))?;
    }

    let mut events = 0usize;
    for event in EventReader::new(reader, WireCodec::from(&config.transport)) {
        let event = event.context("failed to decode event stream")?;
        bus.fire(&event)?;
        events += 1;
    }
    info!(events, "Event stream ended");

    Ok(tracker.summary())
}
