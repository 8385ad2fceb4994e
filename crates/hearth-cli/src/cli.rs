use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::filter::LevelFilter;

/// Log level options for CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    /// No logging output
    Off,
    /// Error messages only
    Error,
    /// Warnings and errors
    Warn,
    /// Informational messages
    Info,
    /// Debug messages, including one line per handler invocation
    Debug,
    /// Trace-level messages (most verbose)
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Off => LevelFilter::OFF,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

#[derive(Parser)]
#[command(name = "hearth")]
#[command(about = "hearth - build event bus: fire, relay and watch build-lifecycle events")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Set log level (off, error, warn, info, debug, trace)
    /// If not specified, uses the config file value
    #[arg(short = 'l', long, global = true, value_enum)]
    pub log_level: Option<LogLevel>,

    /// Enable verbose logging (shortcut for --log-level=debug)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Config file path (defaults to ~/.config/hearth/config.toml)
    #[arg(short = 'C', long, global = true)]
    pub config: Option<PathBuf>,
}

impl Cli {
    /// Level requested on the command line, if any.
    pub fn level_override(&self) -> Option<LevelFilter> {
        if self.verbose {
            Some(LevelFilter::DEBUG)
        } else {
            self.log_level.map(Into::into)
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Decode an event stream and track the build it describes
    Watch {
        /// Read the stream from a file instead of stdin
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Print each event as a JSON line
        #[arg(long)]
        json: bool,
    },

    /// Fire a synthetic build through a metadata-scoped dispatcher
    Simulate {
        /// Write the encoded stream to stdout instead of consuming it in-process
        #[arg(long)]
        pipe: bool,

        /// Print each consumed event as a JSON line
        #[arg(long, conflicts_with = "pipe")]
        json: bool,
    },

    /// Compile a handler snippet and report errors
    Check {
        /// Handler source
        #[arg(required_unless_present = "file", conflicts_with = "file")]
        snippet: Option<String>,

        /// Read the handler source from a file
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}
