use std::io;
use std::sync::Arc;

use anyhow::Result;
use hearth_bus::{
    event_queue, BuildSummary, BuildTracker, Dispatcher, PipeHandler, QueueHandler,
    SharedDispatcher,
};
use hearth_core::{
    BuildInfo, DepGraph, Event, EventPayload, HearthConfig, LogLevel, LogRecord, ParseStats,
    TaskInfo, WireCodec,
};
use tracing::{debug, info};

use crate::output::EventPrinter;

const PACKAGES: &[&str] = &["base-files", "zlib", "busybox"];
const TASKS: &[&str] = &["do_fetch", "do_compile", "do_install"];

/// Event sequence of a small, successful build.
pub fn synthetic_build() -> Vec<Event> {
    let recipes = PACKAGES.len() as u32;
    let mut events = vec![Event::new(EventPayload::ConfigParsed)];

    events.push(Event::new(EventPayload::CacheLoadStarted { total: recipes }));
    for current in 1..=recipes {
        events.push(Event::new(EventPayload::CacheLoadProgress { current }));
    }
    events.push(Event::new(EventPayload::CacheLoadCompleted {
        total: recipes,
        num_entries: recipes,
    }));

    events.push(Event::new(EventPayload::ParseStarted { total: recipes }));
    for (i, package) in PACKAGES.iter().enumerate() {
        events.push(Event::new(EventPayload::RecipeParsed {
            file: format!("recipes/{}.bb", package),
        }));
        events.push(Event::new(EventPayload::ParseProgress {
            current: i as u32 + 1,
        }));
    }
    events.push(Event::new(EventPayload::ParseCompleted(ParseStats {
        cached: 0,
        parsed: recipes,
        total: recipes,
        ..ParseStats::default()
    })));

    let mut depgraph = DepGraph::new();
    depgraph.insert("zlib".to_string(), vec!["base-files".to_string()]);
    depgraph.insert("busybox".to_string(), vec!["zlib".to_string()]);
    depgraph.insert("base-files".to_string(), Vec::new());
    events.push(Event::new(EventPayload::DepTreeGenerated { depgraph }));

    let packages: Vec<String> = PACKAGES.iter().map(|p| p.to_string()).collect();
    events.push(Event::build_started(BuildInfo::new("world", packages.clone())));

    let total = (PACKAGES.len() * TASKS.len()) as u32;
    let mut pid = 1000;
    let mut number = 0;
    for package in PACKAGES {
        for task in TASKS {
            pid += 1;
            number += 1;
            let info = TaskInfo::new(*package, *task, pid);
            events.push(Event::log(
                LogRecord::new(LogLevel::Info, "Running task {} of {} ({} {})")
                    .with_target("runqueue")
                    .with_args([
                        number.to_string(),
                        total.to_string(),
                        package.to_string(),
                        task.to_string(),
                    ]),
            ));
            events.push(Event::task_started(info.clone()));
            events.push(Event::log(
                LogRecord::new(LogLevel::Debug, "{} finished in the sandbox")
                    .with_target("build")
                    .with_args([*task])
                    .with_pid(pid),
            ));
            events.push(Event::task_succeeded(info));
        }
    }

    events.push(Event::build_completed(BuildInfo::new("world", packages)));
    events
}

pub async fn execute(
    config: &HearthConfig,
    log_bus: &SharedDispatcher,
    pipe: bool,
    json: bool,
) -> Result<()> {
    let mut bus = Dispatcher::from_config("cooker", config);
    let (_, scoped) = bus.register_metadata_handlers(config.metadata.clone().into_shared())?;
    debug!(handlers = scoped.len(), "Metadata handlers registered");

    let codec = WireCodec::from(&config.transport);
    if pipe {
        bus.register(Arc::new(PipeHandler::new(io::stdout()).with_codec(codec)))?;
        for event in synthetic_build() {
            bus.fire(&event)?;
        }
        return Ok(());
    }

    let tracker = Arc::new(BuildTracker::new());
    log_bus.write().register(tracker.clone())?;
    let summary = run_queued(config, bus, tracker, Some(EventPrinter::new(json))).await?;
    eprintln!("{}", summary);
    Ok(())
}

/// Fire the synthetic build through `bus` on one blocking task while a
/// second one drains the queue into a tracking dispatcher.
pub async fn run_queued(
    config: &HearthConfig,
    mut bus: Dispatcher,
    tracker: Arc<BuildTracker>,
    printer: Option<EventPrinter>,
) -> Result<BuildSummary> {
    let (tx, rx) = event_queue(config.transport.queue_capacity);
    bus.register(Arc::new(
        QueueHandler::new(tx).with_codec(WireCodec::from(&config.transport)),
    ))?;

    let mut ui = Dispatcher::named("ui");
    ui.register(tracker.clone())?;
    if let Some(printer) = printer {
        ui.register(Arc::new(printer))?;
    }

    // The queue's sender lives in `bus`; dropping it at the end of the
    // producer closes the queue and ends the consumer loop.
    let producer = tokio::task::spawn_blocking(move || {
        for event in synthetic_build() {
            bus.fire(&event)?;
        }
        Ok::<_, hearth_bus::BusError>(())
    });
    let consumer = tokio::task::spawn_blocking(move || {
        let mut consumed = 0usize;
        for event in rx.iter() {
            ui.fire(&event)?;
            consumed += 1;
        }
        Ok::<_, hearth_bus::BusError>(consumed)
    });

    producer.await??;
    let consumed = consumer.await??;
    info!(events = consumed, "Simulated build consumed");

    Ok(tracker.summary())
}
