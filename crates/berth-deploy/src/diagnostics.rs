//! Diagnostic sink: where the pipeline reports progress
//!
//! Sink methods cannot fail; an implementation that cannot write simply drops
//! the line.

use std::sync::{Mutex, PoisonError};

use crate::error::Stage;

/// Receiver for pipeline progress lines
pub trait DiagnosticSink: Send + Sync {
    fn info(&self, message: &str);

    fn warn(&self, message: &str);

    /// Called on every stage transition
    fn stage(&self, _stage: Stage) {}
}

/// Forwards everything to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn info(&self, message: &str) {
        tracing::info!("{}", message);
    }

    fn warn(&self, message: &str) {
        tracing::warn!("{}", message);
    }

    fn stage(&self, stage: Stage) {
        tracing::debug!(%stage, "stage");
    }
}

/// Severity of a recorded line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
}

/// Keeps every line in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<(Level, String)>>,
    stages: Mutex<Vec<Stage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<(Level, String)> {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn infos(&self) -> Vec<String> {
        self.filter(Level::Info)
    }

    pub fn warnings(&self) -> Vec<String> {
        self.filter(Level::Warn)
    }

    /// Stage transitions in the order they happened
    pub fn stages(&self) -> Vec<Stage> {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn filter(&self, level: Level) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, line)| line)
            .collect()
    }

    fn push(&self, level: Level, message: &str) {
        self.lines
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((level, message.to_string()));
    }
}

impl DiagnosticSink for MemorySink {
    fn info(&self, message: &str) {
        self.push(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.push(Level::Warn, message);
    }

    fn stage(&self, stage: Stage) {
        self.stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(stage);
    }
}
