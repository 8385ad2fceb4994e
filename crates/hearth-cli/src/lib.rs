//! Hearth CLI library
//!
//! Argument parsing, subscriber setup and the `watch`, `simulate` and
//! `check` commands behind the `hearth` binary.

pub mod cli;
pub mod commands;
pub mod logging;
pub mod output;
