use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use super::log_record::LogRecord;
use crate::metadata::MetadataRef;

/// Package name → names of the packages it depends on.
pub type DepGraph = BTreeMap<String, Vec<String>>;

/// Identifies a running task and the process executing it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskInfo {
    pub package: String,
    pub task: String,
    /// Process id of the worker running the task
    pub pid: u32,
}

impl TaskInfo {
    pub fn new(package: impl Into<String>, task: impl Into<String>, pid: u32) -> Self {
        Self {
            package: package.into(),
            task: task.into(),
            pid,
        }
    }
}

/// Shared fields of `BuildStarted` / `BuildCompleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    pub name: String,
    pub packages: Vec<String>,
    /// Number of failed tasks (always 0 for `BuildStarted`)
    pub failures: u32,
}

impl BuildInfo {
    pub fn new(name: impl Into<String>, packages: Vec<String>) -> Self {
        Self {
            name: name.into(),
            packages,
            failures: 0,
        }
    }

    pub fn with_failures(mut self, failures: u32) -> Self {
        self.failures = failures;
        self
    }
}

/// Counters reported when recipe parsing finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ParseStats {
    pub cached: u32,
    pub parsed: u32,
    pub skipped: u32,
    pub masked: u32,
    pub virtuals: u32,
    pub errors: u32,
    pub total: u32,
}

impl ParseStats {
    /// Recipes handled so far, from cache or freshly parsed.
    pub fn sofar(&self) -> u32 {
        self.cached + self.parsed
    }
}

/// The occurrence carried by an [`Event`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventPayload {
    ConfigParsed,
    RecipeParsed {
        file: String,
    },
    /// Trigger for any adjustment of stamp files
    StampUpdate {
        targets: Vec<String>,
        stamp_prefixes: Vec<String>,
    },
    BuildStarted(BuildInfo),
    BuildCompleted(BuildInfo),
    TaskStarted(TaskInfo),
    TaskSucceeded(TaskInfo),
    TaskFailed(TaskInfo),
    NoProvider {
        item: String,
        runtime: bool,
        dependees: Vec<String>,
    },
    MultipleProviders {
        item: String,
        candidates: Vec<String>,
        runtime: bool,
    },
    ParseStarted {
        total: u32,
    },
    ParseProgress {
        current: u32,
    },
    ParseCompleted(ParseStats),
    CacheLoadStarted {
        total: u32,
    },
    CacheLoadProgress {
        current: u32,
    },
    CacheLoadCompleted {
        total: u32,
        num_entries: u32,
    },
    DepTreeGenerated {
        depgraph: DepGraph,
    },
    Log(LogRecord),
}

impl EventPayload {
    /// Variant tag, e.g. `"TaskStarted"`.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::ConfigParsed => "ConfigParsed",
            Self::RecipeParsed { .. } => "RecipeParsed",
            Self::StampUpdate { .. } => "StampUpdate",
            Self::BuildStarted(_) => "BuildStarted",
            Self::BuildCompleted(_) => "BuildCompleted",
            Self::TaskStarted(_) => "TaskStarted",
            Self::TaskSucceeded(_) => "TaskSucceeded",
            Self::TaskFailed(_) => "TaskFailed",
            Self::NoProvider { .. } => "NoProvider",
            Self::MultipleProviders { .. } => "MultipleProviders",
            Self::ParseStarted { .. } => "ParseStarted",
            Self::ParseProgress { .. } => "ParseProgress",
            Self::ParseCompleted(_) => "ParseCompleted",
            Self::CacheLoadStarted { .. } => "CacheLoadStarted",
            Self::CacheLoadProgress { .. } => "CacheLoadProgress",
            Self::CacheLoadCompleted { .. } => "CacheLoadCompleted",
            Self::DepTreeGenerated { .. } => "DepTreeGenerated",
            Self::Log(_) => "LogRecord",
        }
    }

    /// Process id attached to the occurrence, if any.
    pub fn pid(&self) -> Option<u32> {
        match self {
            Self::TaskStarted(info) | Self::TaskSucceeded(info) | Self::TaskFailed(info) => {
                Some(info.pid)
            }
            Self::Log(record) => record.pid,
            _ => None,
        }
    }
}

/// A fired build-lifecycle event.
///
/// `context` is the context-reference field: `None` when produced, set only on
/// the private copy a metadata-scoped dispatcher hands to its handlers. It is
/// skipped by serde, so decoded events always arrive without a context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub payload: EventPayload,
    #[serde(skip)]
    pub context: Option<MetadataRef>,
}

impl Event {
    pub fn new(payload: EventPayload) -> Self {
        Self {
            payload,
            context: None,
        }
    }

    pub fn task_started(info: TaskInfo) -> Self {
        Self::new(EventPayload::TaskStarted(info))
    }

    pub fn task_succeeded(info: TaskInfo) -> Self {
        Self::new(EventPayload::TaskSucceeded(info))
    }

    pub fn task_failed(info: TaskInfo) -> Self {
        Self::new(EventPayload::TaskFailed(info))
    }

    pub fn build_started(info: BuildInfo) -> Self {
        Self::new(EventPayload::BuildStarted(info))
    }

    pub fn build_completed(info: BuildInfo) -> Self {
        Self::new(EventPayload::BuildCompleted(info))
    }

    pub fn log(record: LogRecord) -> Self {
        Self::new(EventPayload::Log(record))
    }

    /// Returns a copy of this event bound to `context`.
    pub fn with_context(mut self, context: MetadataRef) -> Self {
        self.context = Some(context);
        self
    }

    pub fn kind_name(&self) -> &'static str {
        self.payload.kind_name()
    }

    pub fn context(&self) -> Option<&MetadataRef> {
        self.context.as_ref()
    }

    /// True when this event is bound to exactly `context` (pointer identity).
    pub fn context_is(&self, context: &MetadataRef) -> bool {
        self.context
            .as_ref()
            .is_some_and(|own| same_context(own, context))
    }

    pub fn as_log(&self) -> Option<&LogRecord> {
        match &self.payload {
            EventPayload::Log(record) => Some(record),
            _ => None,
        }
    }

    /// Flat JSON view: `{"kind": <tag>, ...payload fields}`.
    ///
    /// Newtype payloads that are not structs land under a `value` key.
    pub fn to_json(&self) -> serde_json::Result<JsonValue> {
        let kind = self.kind_name();
        let tagged = serde_json::to_value(&self.payload)?;

        let mut view = match tagged {
            JsonValue::Object(outer) => match outer.into_iter().next() {
                Some((_, JsonValue::Object(fields))) => fields,
                Some((_, other)) => {
                    let mut fields = Map::new();
                    fields.insert("value".to_string(), other);
                    fields
                }
                None => Map::new(),
            },
            _ => Map::new(),
        };
        view.insert("kind".to_string(), JsonValue::String(kind.to_string()));
        Ok(JsonValue::Object(view))
    }
}

fn same_context(a: &MetadataRef, b: &MetadataRef) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        let context_eq = match (&self.context, &other.context) {
            (None, None) => true,
            (Some(a), Some(b)) => same_context(a, b),
            _ => false,
        };
        context_eq && self.payload == other.payload
    }
}

impl From<EventPayload> for Event {
    fn from(payload: EventPayload) -> Self {
        Self::new(payload)
    }
}

impl From<LogRecord> for Event {
    fn from(record: LogRecord) -> Self {
        Self::log(record)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.payload {
            EventPayload::TaskStarted(t)
            | EventPayload::TaskSucceeded(t)
            | EventPayload::TaskFailed(t) => {
                write!(f, "{} {}:{} (pid {})", self.kind_name(), t.package, t.task, t.pid)
            }
            EventPayload::BuildStarted(b) | EventPayload::BuildCompleted(b) => write!(
                f,
                "{} {} ({} packages, {} failures)",
                self.kind_name(),
                b.name,
                b.packages.len(),
                b.failures
            ),
            EventPayload::ParseStarted { total } | EventPayload::CacheLoadStarted { total } => {
                write!(f, "{} total={}", self.kind_name(), total)
            }
            EventPayload::ParseProgress { current }
            | EventPayload::CacheLoadProgress { current } => {
                write!(f, "{} current={}", self.kind_name(), current)
            }
            EventPayload::Log(record) => {
                write!(f, "{} [{}] {}", self.kind_name(), record.level, record.render())
            }
            _ => f.write_str(self.kind_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::LogLevel;
    use crate::metadata::MetadataStore;

    #[test]
    fn test_kind_name_matches_variant() {
        let event = Event::task_started(TaskInfo::new("busybox", "do_fetch", 7));
        assert_eq!(event.kind_name(), "TaskStarted");
        assert_eq!(Event::new(EventPayload::ConfigParsed).kind_name(), "ConfigParsed");
        assert_eq!(
            Event::log(LogRecord::new(LogLevel::Info, "hi")).kind_name(),
            "LogRecord"
        );
    }

    #[test]
    fn test_parse_stats_sofar() {
        let stats = ParseStats {
            cached: 10,
            parsed: 5,
            total: 20,
            ..Default::default()
        };
        assert_eq!(stats.sofar(), 15);
    }

    #[test]
    fn test_to_json_flattens_struct_variant() {
        let event = Event::new(EventPayload::CacheLoadCompleted {
            total: 12,
            num_entries: 300,
        });
        let json = event.to_json().unwrap();
        assert_eq!(json["kind"], "CacheLoadCompleted");
        assert_eq!(json["total"], 12);
        assert_eq!(json["num_entries"], 300);
    }

    #[test]
    fn test_to_json_flattens_newtype_variant() {
        let event = Event::task_failed(TaskInfo::new("glibc", "do_install", 99));
        let json = event.to_json().unwrap();
        assert_eq!(json["kind"], "TaskFailed");
        assert_eq!(json["package"], "glibc");
        assert_eq!(json["pid"], 99);
    }

    #[test]
    fn test_to_json_unit_variant() {
        let json = Event::new(EventPayload::ConfigParsed).to_json().unwrap();
        assert_eq!(json, serde_json::json!({"kind": "ConfigParsed"}));
    }

    #[test]
    fn test_with_context_leaves_receiver_copy_untouched() {
        let original = Event::new(EventPayload::ParseStarted { total: 3 });
        let context: MetadataRef = Arc::new(MetadataStore::new());

        let scoped = original.clone().with_context(context.clone());

        assert!(original.context().is_none());
        assert!(scoped.context_is(&context));
        assert_ne!(original, scoped);
        assert_eq!(original.payload, scoped.payload);
    }

    #[test]
    fn test_context_identity_is_pointer_based() {
        let a: MetadataRef = Arc::new(MetadataStore::new());
        let b: MetadataRef = Arc::new(MetadataStore::new());
        let event = Event::new(EventPayload::ConfigParsed).with_context(a.clone());
        assert!(event.context_is(&a));
        assert!(!event.context_is(&b));
    }

    #[test]
    fn test_pid_lookup() {
        let task = EventPayload::TaskSucceeded(TaskInfo::new("a", "b", 12));
        assert_eq!(task.pid(), Some(12));

        let log = EventPayload::Log(LogRecord::new(LogLevel::Warn, "x").with_pid(44));
        assert_eq!(log.pid(), Some(44));

        assert_eq!(EventPayload::ParseProgress { current: 1 }.pid(), None);
    }

    #[test]
    fn test_display() {
        let event = Event::task_started(TaskInfo::new("zlib", "do_compile", 3));
        assert_eq!(event.to_string(), "TaskStarted zlib:do_compile (pid 3)");
    }
}
