//! Log sink collaborator.
//!
//! The engine emits structured one-line messages (`FileNotFoundError: ...`,
//! `Move Operations Completed X/Y`, ...) through this trait and does no
//! timestamp formatting or file handling of its own; those belong to
//! whichever front end implements the sink. One sink instance is created
//! per run and injected into the scanner and executor constructors.

/// Receives the engine's log messages.
pub trait LogSink {
    fn log(&self, message: &str);
}

/// Sink that writes straight to stderr. Suitable default for headless use.
#[derive(Debug, Default)]
pub struct StderrLog;

impl LogSink for StderrLog {
    fn log(&self, message: &str) {
        eprintln!("{}", message);
    }
}

/// Sink that drops every message.
#[derive(Debug, Default)]
pub struct NullLog;

impl LogSink for NullLog {
    fn log(&self, _message: &str) {}
}
