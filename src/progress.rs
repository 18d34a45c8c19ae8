// src/progress.rs

//! Progress reporting for bundle builds
//!
//! The pipeline reports each stage it enters and a short message per unit
//! of work to a [`ProgressTracker`]. Implementations:
//! - `CliProgress`: spinner with the current stage, using indicatif
//! - `LogProgress`: logs stage transitions to tracing
//! - `SilentProgress`: no-op for quiet mode and tests
//! - `CallbackProgress`: forwards [`ProgressEvent`]s to a closure

use crate::pipeline::Stage;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tracing::{error, info};

/// Receives progress from a running pipeline
///
/// Implementations must be thread-safe; per-archive work inside a stage
/// may report from rayon worker threads.
pub trait ProgressTracker: Send + Sync {
    /// A new stage has started
    fn set_stage(&self, stage: Stage);

    /// Set the current status message
    fn set_message(&self, message: &str);

    /// Number of stages entered so far
    fn position(&self) -> u64;

    /// Finish successfully with a message
    fn finish_with_message(&self, message: &str);

    /// Finish with an error message
    fn finish_with_error(&self, message: &str);

    fn is_finished(&self) -> bool;
}

/// Progress tracker that reports nothing
#[derive(Debug, Default)]
pub struct SilentProgress {
    position: AtomicU64,
    finished: AtomicBool,
}

impl SilentProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProgressTracker for SilentProgress {
    fn set_stage(&self, _stage: Stage) {
        self.position.fetch_add(1, Ordering::Relaxed);
    }

    fn set_message(&self, _message: &str) {}

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn finish_with_error(&self, _message: &str) {
        self.finished.store(true, Ordering::Relaxed);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Logging progress tracker
///
/// Stage transitions and results go to `info`, per-item messages to `debug`.
#[derive(Debug)]
pub struct LogProgress {
    name: String,
    position: AtomicU64,
    finished: AtomicBool,
}

impl LogProgress {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }
}

impl ProgressTracker for LogProgress {
    fn set_stage(&self, stage: Stage) {
        let n = self.position.fetch_add(1, Ordering::Relaxed) + 1;
        info!("{}: [{}/{}] {}", self.name, n, Stage::COUNT, stage.description());
    }

    fn set_message(&self, message: &str) {
        tracing::debug!("{}: {}", self.name, message);
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        info!("{}: {}", self.name, message);
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        error!("{}: {}", self.name, message);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Events emitted by [`CallbackProgress`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProgressEvent {
    Stage(Stage),
    Message(String),
    Finished(String),
    Error(String),
}

/// Progress tracker that calls a closure for every event
pub struct CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    callback: F,
    position: AtomicU64,
    finished: AtomicBool,
}

impl<F> CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self {
            callback,
            position: AtomicU64::new(0),
            finished: AtomicBool::new(false),
        }
    }
}

impl<F> ProgressTracker for CallbackProgress<F>
where
    F: Fn(ProgressEvent) + Send + Sync,
{
    fn set_stage(&self, stage: Stage) {
        self.position.fetch_add(1, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Stage(stage));
    }

    fn set_message(&self, message: &str) {
        (self.callback)(ProgressEvent::Message(message.to_string()));
    }

    fn position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Finished(message.to_string()));
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        (self.callback)(ProgressEvent::Error(message.to_string()));
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}

/// Terminal progress: a stage bar with the current item as its message
pub struct CliProgress {
    bar: ProgressBar,
    stage: Mutex<Option<Stage>>,
    finished: AtomicBool,
}

impl CliProgress {
    pub fn new() -> Self {
        let bar = ProgressBar::new(Stage::COUNT);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{pos}/{len}] {prefix:.bold} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));
        Self {
            bar,
            stage: Mutex::new(None),
            finished: AtomicBool::new(false),
        }
    }
}

impl Default for CliProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressTracker for CliProgress {
    fn set_stage(&self, stage: Stage) {
        if let Ok(mut current) = self.stage.lock() {
            *current = Some(stage);
        }
        self.bar.inc(1);
        self.bar.set_prefix(stage.description());
        self.bar.set_message(String::new());
    }

    fn set_message(&self, message: &str) {
        self.bar.set_message(message.to_string());
    }

    fn position(&self) -> u64 {
        self.bar.position()
    }

    fn finish_with_message(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        self.bar.finish_with_message(message.to_string());
    }

    fn finish_with_error(&self, message: &str) {
        self.finished.store(true, Ordering::Relaxed);
        let stage = self.stage.lock().ok().and_then(|s| *s);
        let text = match stage {
            Some(stage) => format!("{} failed: {}", stage, message),
            None => message.to_string(),
        };
        self.bar.abandon_with_message(text);
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Relaxed)
    }
}
