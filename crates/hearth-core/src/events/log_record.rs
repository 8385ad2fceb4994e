use std::fmt;

use serde::{Deserialize, Serialize};

/// Severity of a [`LogRecord`], ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Parse log level from string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" | "note" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" | "fatal" | "critical" => Some(Self::Error),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warn,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// A log line routed onto the bus.
///
/// `message` may contain `{}` placeholders filled from `args` by [`LogRecord::render`];
/// the record itself is kept unformatted so consumers can group by template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    pub level: LogLevel,
    /// Logger name / module path that produced the record
    pub target: String,
    pub message: String,
    pub args: Vec<String>,
    pub pid: Option<u32>,
}

impl LogRecord {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            target: String::new(),
            message: message.into(),
            args: Vec::new(),
            pid: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_pid(mut self, pid: u32) -> Self {
        self.pid = Some(pid);
        self
    }

    /// Message with `{}` placeholders substituted by `args`, in order.
    ///
    /// Surplus placeholders are kept verbatim; surplus args are ignored.
    pub fn render(&self) -> String {
        if self.args.is_empty() {
            return self.message.clone();
        }

        let mut out = String::with_capacity(self.message.len());
        let mut args = self.args.iter();
        let mut rest = self.message.as_str();
        while let Some(pos) = rest.find("{}") {
            out.push_str(&rest[..pos]);
            match args.next() {
                Some(arg) => out.push_str(arg),
                None => out.push_str("{}"),
            }
            rest = &rest[pos + 2..];
        }
        out.push_str(rest);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_ordering() {
        assert!(LogLevel::Error > LogLevel::Warn);
        assert!(LogLevel::Warn > LogLevel::Info);
        assert!(LogLevel::Trace < LogLevel::Debug);
    }

    #[test]
    fn test_level_from_str() {
        assert_eq!(LogLevel::from_str("WARNING"), Some(LogLevel::Warn));
        assert_eq!(LogLevel::from_str("fatal"), Some(LogLevel::Error));
        assert_eq!(LogLevel::from_str("note"), Some(LogLevel::Info));
        assert_eq!(LogLevel::from_str("loud"), None);
    }

    #[test]
    fn test_level_from_tracing() {
        assert_eq!(LogLevel::from(&tracing::Level::ERROR), LogLevel::Error);
        assert_eq!(LogLevel::from(&tracing::Level::TRACE), LogLevel::Trace);
    }

    #[test]
    fn test_render_without_args() {
        let record = LogRecord::new(LogLevel::Info, "Running task 3 of 10");
        assert_eq!(record.render(), "Running task 3 of 10");
    }

    #[test]
    fn test_render_substitutes_in_order() {
        let record =
            LogRecord::new(LogLevel::Warn, "{} failed after {} attempts").with_args(["fetch", "3"]);
        assert_eq!(record.render(), "fetch failed after 3 attempts");
    }

    #[test]
    fn test_render_keeps_surplus_placeholders() {
        let record = LogRecord::new(LogLevel::Warn, "{} and {}").with_args(["one"]);
        assert_eq!(record.render(), "one and {}");
    }

    #[test]
    fn test_builder() {
        let record = LogRecord::new(LogLevel::Error, "boom")
            .with_target("hearth::build")
            .with_pid(77);
        assert_eq!(record.target, "hearth::build");
        assert_eq!(record.pid, Some(77));
        assert!(record.args.is_empty());
    }
}
