//! # Hearth Core
//!
//! Shared data types for the Hearth build event bus:
//!
//! - **Events**: the build-lifecycle taxonomy ([`Event`], [`EventPayload`], [`LogRecord`])
//! - **Metadata**: the configuration boundary scoped dispatchers bind into events ([`Metadata`])
//! - **Wire**: the self-framing binary encoding used by pipe transports ([`WireCodec`], [`EventReader`])
//! - **Config**: TOML configuration shared by the bus and the CLI ([`HearthConfig`])
//!
//! The dispatch machinery lives in `hearth-bus`. This crate holds only data
//! types and conversions and is enough on its own to decode a stream in
//! another process.
//!
//! ## Example
//!
//! ```rust
//! use hearth_core::{Event, EventReader, TaskInfo, WireCodec};
//!
//! let codec = WireCodec::default();
//! let event = Event::task_started(TaskInfo::new("zlib", "do_compile", 4242));
//! let bytes = codec.encode(&event).unwrap();
//!
//! let mut reader = EventReader::new(bytes.as_slice(), codec);
//! let decoded = reader.next_event().unwrap().unwrap();
//! assert_eq!(decoded, event);
//! ```

pub mod config;
pub mod events;
pub mod metadata;
pub mod wire;

pub use config::{
    BusConfig, ConfigError, FailurePolicy, HearthConfig, LoggingConfig, SandboxConfig,
    TransportConfig,
};
pub use events::{
    BuildInfo, DepGraph, Event, EventPayload, LogLevel, LogRecord, ParseStats, TaskInfo,
};
pub use metadata::{Metadata, MetadataRef, MetadataStore, HANDLERS_VAR};
pub use wire::{
    EventReader, WireCodec, WireError, DEFAULT_MAX_FRAME_BYTES, FRAME_BYTES_CEILING,
};
