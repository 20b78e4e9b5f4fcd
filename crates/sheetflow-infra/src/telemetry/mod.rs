//! Tracing initialization
//!
//! Console output is always on. When a log file is configured, a second layer
//! writes to a daily-rolling file through a non-blocking writer.

mod init;

pub use init::{init_telemetry, LogFormat, TelemetryConfig};
