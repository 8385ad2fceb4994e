//! Build-state consumer.
//!
//! [`BuildTracker`] turns the ordered event stream into the state a build UI
//! renders: which task each worker pid is running, per-package activity and
//! failure, log lines attached to the task that produced them, progress for
//! the cache-load and parse phases, and the final outcome.
//!
//! All state belongs to the tracker instance; two trackers never share it.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use hearth_core::{Event, EventPayload, LogRecord, TaskInfo};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::handler::{Handler, HandlerResult};

/// Marker of the per-task progress chatter that the tracker never records.
const RUNNING_TASK_PREFIX: &str = "Running task";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Running,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskState {
    pub status: TaskStatus,
    /// Log records emitted by the task's worker while it ran
    pub messages: Vec<LogRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageState {
    /// Tasks started and not yet finished
    pub active: u32,
    /// Sticky once any task of the package fails
    pub failed: bool,
    pub tasks: BTreeMap<String, TaskState>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    CacheLoad,
    Parse,
}

impl ProgressPhase {
    pub fn title(&self) -> &'static str {
        match self {
            Self::CacheLoad => "Loading cache",
            Self::Parse => "Processing recipes",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub phase: ProgressPhase,
    pub current: u32,
    pub total: u32,
    pub done: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Running,
    Succeeded,
    Failed,
}

/// Counts derived from the tracked state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSummary {
    pub outcome: Option<BuildOutcome>,
    pub packages: usize,
    pub failed_packages: Vec<String>,
    pub running_tasks: usize,
    pub failed_tasks: usize,
    pub messages: usize,
}

impl fmt::Display for BuildSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let outcome = match self.outcome {
            None => "not started",
            Some(BuildOutcome::Running) => "running",
            Some(BuildOutcome::Succeeded) => "succeeded",
            Some(BuildOutcome::Failed) => "failed",
        };
        write!(
            f,
            "build {}: {} packages, {} running tasks, {} failed tasks, {} messages",
            outcome, self.packages, self.running_tasks, self.failed_tasks, self.messages
        )?;
        if !self.failed_packages.is_empty() {
            write!(f, " (failed: {})", self.failed_packages.join(", "))?;
        }
        Ok(())
    }
}

/// Stream inconsistency found while folding an event.
///
/// Reported after the state lock is released: a bridged log record lands back
/// on this tracker.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Anomaly {
    UnstartedTask { package: String, task: String },
    StrayProgress { phase: ProgressPhase, current: u32 },
}

impl Anomaly {
    fn report(&self) {
        match self {
            Self::UnstartedTask { package, task } => {
                warn!(package = %package, task = %task, "Task finished without a start event")
            }
            Self::StrayProgress { phase, current } => {
                debug!(phase = phase.title(), current, "Progress update outside its phase")
            }
        }
    }
}

#[derive(Debug, Default)]
struct TrackerState {
    /// Worker pid → (package, task)
    running: HashMap<u32, (String, String)>,
    packages: BTreeMap<String, PackageState>,
    /// Log records not attributable to a running task
    messages: Vec<LogRecord>,
    progress: Option<Progress>,
    outcome: Option<BuildOutcome>,
}

impl TrackerState {
    fn apply(&mut self, payload: &EventPayload) -> Option<Anomaly> {
        match payload {
            EventPayload::TaskSucceeded(info) => {
                return self.task_finished(info, TaskStatus::Succeeded)
            }
            EventPayload::TaskFailed(info) => return self.task_finished(info, TaskStatus::Failed),
            EventPayload::CacheLoadProgress { current } => {
                return self.advance(ProgressPhase::CacheLoad, *current)
            }
            EventPayload::ParseProgress { current } => {
                return self.advance(ProgressPhase::Parse, *current)
            }
            EventPayload::Log(record) => self.log(record),
            EventPayload::TaskStarted(info) => self.task_started(info),
            EventPayload::BuildStarted(_) => self.outcome = Some(BuildOutcome::Running),
            EventPayload::BuildCompleted(info) => {
                self.outcome = Some(if info.failures > 0 {
                    BuildOutcome::Failed
                } else {
                    BuildOutcome::Succeeded
                });
            }
            EventPayload::CacheLoadStarted { total } => {
                self.start_phase(ProgressPhase::CacheLoad, *total)
            }
            EventPayload::CacheLoadCompleted { .. } => self.finish(ProgressPhase::CacheLoad),
            EventPayload::ParseStarted { total } => self.start_phase(ProgressPhase::Parse, *total),
            EventPayload::ParseCompleted(_) => self.finish(ProgressPhase::Parse),
            _ => {}
        }
        None
    }

    fn log(&mut self, record: &LogRecord) {
        if record.message.starts_with(RUNNING_TASK_PREFIX) {
            return;
        }

        let owner = record.pid.and_then(|pid| self.running.get(&pid)).cloned();
        let task = owner.and_then(|(package, task)| {
            self.packages.get_mut(&package)?.tasks.get_mut(&task)
        });
        match task {
            Some(task) => task.messages.push(record.clone()),
            None => self.messages.push(record.clone()),
        }
    }

    fn task_started(&mut self, info: &TaskInfo) {
        self.running
            .insert(info.pid, (info.package.clone(), info.task.clone()));

        let package = self.packages.entry(info.package.clone()).or_default();
        package.active += 1;
        package.tasks.insert(
            info.task.clone(),
            TaskState {
                status: TaskStatus::Running,
                messages: Vec::new(),
            },
        );
    }

    fn task_finished(&mut self, info: &TaskInfo, status: TaskStatus) -> Option<Anomaly> {
        let (package_name, task_name) = self
            .running
            .remove(&info.pid)
            .unwrap_or_else(|| (info.package.clone(), info.task.clone()));

        let Some(package) = self.packages.get_mut(&package_name) else {
            return Some(Anomaly::UnstartedTask {
                package: package_name,
                task: task_name,
            });
        };
        package.active = package.active.saturating_sub(1);
        if status == TaskStatus::Failed {
            package.failed = true;
        }
        match package.tasks.get_mut(&task_name) {
            Some(task) => task.status = status,
            None => {
                package.tasks.insert(
                    task_name,
                    TaskState {
                        status,
                        messages: Vec::new(),
                    },
                );
            }
        }
        None
    }

    fn start_phase(&mut self, phase: ProgressPhase, total: u32) {
        self.progress = Some(Progress {
            phase,
            current: 0,
            total,
            done: false,
        });
    }

    fn advance(&mut self, phase: ProgressPhase, current: u32) -> Option<Anomaly> {
        match self.progress.as_mut() {
            Some(progress) if progress.phase == phase && !progress.done => {
                progress.current = progress.current.max(current);
                None
            }
            _ => Some(Anomaly::StrayProgress { phase, current }),
        }
    }

    fn finish(&mut self, phase: ProgressPhase) {
        if let Some(progress) = self.progress.as_mut().filter(|p| p.phase == phase) {
            progress.current = progress.current.max(progress.total);
            progress.done = true;
        }
    }
}

/// Handler that folds events into per-build state.
#[derive(Debug)]
pub struct BuildTracker {
    name: String,
    state: Mutex<TrackerState>,
}

impl Default for BuildTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildTracker {
    pub fn new() -> Self {
        Self {
            name: "tracker".to_string(),
            state: Mutex::new(TrackerState::default()),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fold one event into the state.
    pub fn apply(&self, event: &Event) {
        let anomaly = self.state.lock().apply(&event.payload);
        if let Some(anomaly) = anomaly {
            anomaly.report();
        }
    }

    /// (package, task) the worker `pid` is running.
    pub fn running_task(&self, pid: u32) -> Option<(String, String)> {
        self.state.lock().running.get(&pid).cloned()
    }

    pub fn package(&self, name: &str) -> Option<PackageState> {
        self.state.lock().packages.get(name).cloned()
    }

    pub fn task_status(&self, package: &str, task: &str) -> Option<TaskStatus> {
        self.state
            .lock()
            .packages
            .get(package)
            .and_then(|state| state.tasks.get(task))
            .map(|task| task.status)
    }

    /// Log records not attached to any task.
    pub fn messages(&self) -> Vec<LogRecord> {
        self.state.lock().messages.clone()
    }

    pub fn progress(&self) -> Option<Progress> {
        self.state.lock().progress
    }

    pub fn outcome(&self) -> Option<BuildOutcome> {
        self.state.lock().outcome
    }

    pub fn summary(&self) -> BuildSummary {
        let state = self.state.lock();
        let tasks = state.packages.values().flat_map(|p| p.tasks.values());
        let (running_tasks, failed_tasks, task_messages) =
            tasks.fold((0, 0, 0), |(running, failed, messages), task| {
                (
                    running + usize::from(task.status == TaskStatus::Running),
                    failed + usize::from(task.status == TaskStatus::Failed),
                    messages + task.messages.len(),
                )
            });

        BuildSummary {
            outcome: state.outcome,
            packages: state.packages.len(),
            failed_packages: state
                .packages
                .iter()
                .filter(|(_, p)| p.failed)
                .map(|(name, _)| name.clone())
                .collect(),
            running_tasks,
            failed_tasks,
            messages: state.messages.len() + task_messages,
        }
    }
}

impl Handler for BuildTracker {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        self.apply(event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{BuildInfo, LogLevel, ParseStats};

    fn started(package: &str, task: &str, pid: u32) -> Event {
        Event::task_started(TaskInfo::new(package, task, pid))
    }

    #[test]
    fn test_task_lifecycle_updates_package() {
        let tracker = BuildTracker::new();
        tracker.apply(&started("zlib", "do_fetch", 10));
        tracker.apply(&started("zlib", "do_unpack", 11));

        assert_eq!(tracker.package("zlib").unwrap().active, 2);
        assert_eq!(
            tracker.running_task(10),
            Some(("zlib".to_string(), "do_fetch".to_string()))
        );

        tracker.apply(&Event::task_succeeded(TaskInfo::new("zlib", "do_fetch", 10)));
        let package = tracker.package("zlib").unwrap();
        assert_eq!(package.active, 1);
        assert!(!package.failed);
        assert_eq!(
            tracker.task_status("zlib", "do_fetch"),
            Some(TaskStatus::Succeeded)
        );
        assert_eq!(tracker.running_task(10), None);
    }

    #[test]
    fn test_failure_is_sticky_on_package() {
        let tracker = BuildTracker::new();
        tracker.apply(&started("busybox", "do_compile", 1));
        tracker.apply(&started("busybox", "do_install", 2));
        tracker.apply(&Event::task_failed(TaskInfo::new("busybox", "do_compile", 1)));
        tracker.apply(&Event::task_succeeded(TaskInfo::new("busybox", "do_install", 2)));

        let package = tracker.package("busybox").unwrap();
        assert!(package.failed);
        assert_eq!(package.active, 0);
        assert_eq!(tracker.summary().failed_packages, vec!["busybox"]);
    }

    #[test]
    fn test_log_attaches_to_running_task() {
        let tracker = BuildTracker::new();
        tracker.apply(&started("glib", "do_configure", 42));
        tracker.apply(&Event::log(
            LogRecord::new(LogLevel::Warn, "checking for {}").with_args(["cc"]).with_pid(42),
        ));
        tracker.apply(&Event::log(LogRecord::new(LogLevel::Info, "unattributed")));

        let package = tracker.package("glib").unwrap();
        assert_eq!(package.tasks["do_configure"].messages.len(), 1);
        assert_eq!(tracker.messages().len(), 1);
        assert_eq!(tracker.messages()[0].message, "unattributed");
    }

    #[test]
    fn test_running_task_records_are_ignored() {
        let tracker = BuildTracker::new();
        tracker.apply(&Event::log(LogRecord::new(
            LogLevel::Info,
            "Running task 1 of 12 (zlib do_fetch)",
        )));
        assert!(tracker.messages().is_empty());
    }

    #[test]
    fn test_build_outcome_from_failure_count() {
        let tracker = BuildTracker::new();
        assert_eq!(tracker.outcome(), None);

        tracker.apply(&Event::build_started(BuildInfo::new("world", vec![])));
        assert_eq!(tracker.outcome(), Some(BuildOutcome::Running));

        tracker.apply(&Event::build_completed(
            BuildInfo::new("world", vec![]).with_failures(1),
        ));
        assert_eq!(tracker.outcome(), Some(BuildOutcome::Failed));

        tracker.apply(&Event::build_completed(BuildInfo::new("world", vec![])));
        assert_eq!(tracker.outcome(), Some(BuildOutcome::Succeeded));
    }

    #[test]
    fn test_progress_is_non_decreasing() {
        let tracker = BuildTracker::new();
        tracker.apply(&Event::new(EventPayload::ParseStarted { total: 10 }));
        tracker.apply(&Event::new(EventPayload::ParseProgress { current: 4 }));
        tracker.apply(&Event::new(EventPayload::ParseProgress { current: 3 }));
        assert_eq!(tracker.progress().unwrap().current, 4);

        tracker.apply(&Event::new(EventPayload::ParseCompleted(ParseStats {
            parsed: 10,
            total: 10,
            ..ParseStats::default()
        })));
        let progress = tracker.progress().unwrap();
        assert_eq!(progress.phase, ProgressPhase::Parse);
        assert_eq!(progress.current, 10);
        assert!(progress.done);
    }

    #[test]
    fn test_cache_progress_ignored_during_parse() {
        let tracker = BuildTracker::new();
        tracker.apply(&Event::new(EventPayload::ParseStarted { total: 5 }));
        tracker.apply(&Event::new(EventPayload::CacheLoadProgress { current: 3 }));
        assert_eq!(tracker.progress().unwrap().current, 0);
    }

    #[test]
    fn test_unstarted_finish_is_reported_through_bridge() {
        use std::sync::Arc;

        use tracing_subscriber::layer::SubscriberExt;

        use crate::dispatcher::Dispatcher;
        use crate::log_bridge::LogBridge;

        let tracker = Arc::new(BuildTracker::new());
        let mut bus = Dispatcher::named("log");
        bus.register(tracker.clone()).unwrap();
        let subscriber = tracing_subscriber::registry().with(LogBridge::new(Arc::new(bus)));

        tracing::subscriber::with_default(subscriber, || {
            tracker.apply(&Event::task_succeeded(TaskInfo::new("zlib", "do_fetch", 7)));
        });

        let messages = tracker.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].level, LogLevel::Warn);
        assert_eq!(messages[0].message, "Task finished without a start event");
        assert!(tracker.package("zlib").is_none());
    }

    #[test]
    fn test_trackers_do_not_share_state() {
        let a = BuildTracker::new();
        let b = BuildTracker::new();
        a.apply(&started("zlib", "do_fetch", 1));
        assert!(b.package("zlib").is_none());
        assert!(b.running_task(1).is_none());
    }

    #[test]
    fn test_summary_display() {
        let tracker = BuildTracker::new();
        tracker.apply(&Event::build_started(BuildInfo::new("world", vec![])));
        tracker.apply(&started("zlib", "do_fetch", 1));
        tracker.apply(&Event::task_failed(TaskInfo::new("zlib", "do_fetch", 1)));

        let text = tracker.summary().to_string();
        assert!(text.starts_with("build running: 1 packages"));
        assert!(text.contains("1 failed tasks"));
        assert!(text.ends_with("(failed: zlib)"));
    }
}
