use std::io::{self, Write};

use hearth_bus::{Handler, HandlerError, HandlerResult};
use hearth_core::Event;

/// One line of human-readable or JSON output for `event`.
pub fn format_event(event: &Event, json: bool) -> Result<String, serde_json::Error> {
    if json {
        return Ok(event.to_json()?.to_string());
    }

    Ok(match event.as_log() {
        Some(record) if record.target.is_empty() => {
            format!("{:>5} {}", record.level.as_str().to_uppercase(), record.render())
        }
        Some(record) => format!(
            "{:>5} {}: {}",
            record.level.as_str().to_uppercase(),
            record.target,
            record.render()
        ),
        None => event.to_string(),
    })
}

/// Prints every event to stdout.
pub struct EventPrinter {
    json: bool,
}

impl EventPrinter {
    pub fn new(json: bool) -> Self {
        Self { json }
    }
}

impl Handler for EventPrinter {
    fn name(&self) -> &str {
        "printer"
    }

    fn handle(&self, event: &Event) -> HandlerResult {
        let line = format_event(event, self.json).map_err(|e| HandlerError::failed(e.to_string()))?;
        writeln!(io::stdout().lock(), "{}", line).map_err(|e| HandlerError::failed(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{LogLevel, LogRecord, TaskInfo};

    #[test]
    fn test_format_task_event() {
        let event = Event::task_started(TaskInfo::new("zlib", "do_fetch", 7));
        assert_eq!(
            format_event(&event, false).unwrap(),
            "TaskStarted zlib:do_fetch (pid 7)"
        );
    }

    #[test]
    fn test_format_log_record_renders_args() {
        let event = Event::log(
            LogRecord::new(LogLevel::Warn, "fetching {} from {}")
                .with_target("fetch")
                .with_args(["zlib", "mirror"]),
        );
        assert_eq!(
            format_event(&event, false).unwrap(),
            " WARN fetch: fetching zlib from mirror"
        );
    }

    #[test]
    fn test_format_json_line() {
        let event = Event::task_failed(TaskInfo::new("zlib", "do_compile", 9));
        let line = format_event(&event, true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&line).unwrap();
        assert_eq!(value["kind"], "TaskFailed");
        assert_eq!(value["task"], "do_compile");
    }
}
