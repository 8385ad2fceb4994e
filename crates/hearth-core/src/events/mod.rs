//! Build-lifecycle event taxonomy.
//!
//! Events are plain discriminated records: an [`EventPayload`] variant carrying
//! the occurrence data, plus an optional context reference that only
//! metadata-scoped dispatchers set. Payloads are serde types so every variant
//! round-trips through the wire codec; the context never crosses a process
//! boundary.
//!
//! # Variants
//!
//! | Group | Variants |
//! |-------|----------|
//! | Build | `BuildStarted`, `BuildCompleted`, `ConfigParsed`, `StampUpdate`, `DepTreeGenerated` |
//! | Task | `TaskStarted`, `TaskSucceeded`, `TaskFailed` |
//! | Parse | `ParseStarted`, `ParseProgress`, `ParseCompleted`, `RecipeParsed` |
//! | Cache | `CacheLoadStarted`, `CacheLoadProgress`, `CacheLoadCompleted` |
//! | Providers | `NoProvider`, `MultipleProviders` |
//! | Logging | `Log` |

mod build_event;
mod log_record;

pub use build_event::{BuildInfo, DepGraph, Event, EventPayload, ParseStats, TaskInfo};
pub use log_record::{LogLevel, LogRecord};
