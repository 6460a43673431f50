//! Progress reporting and cooperative cancellation for one generation run.
//!
//! The [`Coordinator`] is the only writer of a run's [`ProgressState`].
//! Readers hold a [`ProgressHandle`]; an optional [`ProgressSink`] receives
//! every accepted update and a [`CancelProbe`] is polled at suspension points.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;

use crate::error::{CatalogError, CatalogResult};

/// Progress at which the fetch phase starts
pub const FETCH_START: u8 = 10;
/// Progress at which page building starts (end of the fetch band)
pub const BUILD_START: u8 = 35;
/// Progress at which the document is serialized (end of the build band)
pub const FINALIZE_START: u8 = 95;
pub const COMPLETE: u8 = 100;

/// Percent inside `[start, end]` after `done` of `total` units
pub fn band_percent(start: u8, end: u8, done: usize, total: usize) -> u8 {
    let span = (end - start) as usize;
    let done = done.min(total.max(1));
    start + (done * span / total.max(1)) as u8
}

/// Lifecycle of a run
#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Starting,
    Fetching,
    Building,
    Finalizing,
    Complete,
    Error,
    Cancelled,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Complete | Phase::Error | Phase::Cancelled)
    }
}

/// What the task layer sees
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct ProgressState {
    pub percent: u8,
    #[serde(rename = "status")]
    pub phase: Phase,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<PathBuf>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self {
            percent: 0,
            phase: Phase::Starting,
            message: "Initializing catalog generation...".to_string(),
            result_path: None,
        }
    }
}

/// Receives `(percent, message)` updates
pub trait ProgressSink: Send + Sync {
    fn report(&self, percent: u8, message: &str);
}

impl<F> ProgressSink for F
where
    F: Fn(u8, &str) + Send + Sync,
{
    fn report(&self, percent: u8, message: &str) {
        self(percent, message)
    }
}

/// Answers "has cancellation been requested?"
pub trait CancelProbe: Send + Sync {
    fn is_cancelled(&self) -> bool;
}

impl<F> CancelProbe for F
where
    F: Fn() -> bool + Send + Sync,
{
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// A probe that never fires
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverCancel;

impl CancelProbe for NeverCancel {
    fn is_cancelled(&self) -> bool {
        false
    }
}

/// Shareable cancellation flag, e.g. flipped by a cancel endpoint or Ctrl-C
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

impl CancelProbe for CancelFlag {
    fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only view of a run's progress
#[derive(Debug, Clone)]
pub struct ProgressHandle(Arc<Mutex<ProgressState>>);

impl ProgressHandle {
    pub fn snapshot(&self) -> ProgressState {
        lock(&self.0).clone()
    }
}

fn lock(state: &Mutex<ProgressState>) -> MutexGuard<'_, ProgressState> {
    // A poisoned lock still holds a consistent state: every write is a plain assignment
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Single-run progress state machine
pub struct Coordinator {
    state: Arc<Mutex<ProgressState>>,
    sink: Option<Box<dyn ProgressSink>>,
    cancel: Box<dyn CancelProbe>,
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("state", &*lock(&self.state))
            .finish()
    }
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ProgressState::default())),
            sink: None,
            cancel: Box::new(NeverCancel),
        }
    }

    pub fn with_sink(mut self, sink: impl ProgressSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    pub fn with_cancel(mut self, probe: impl CancelProbe + 'static) -> Self {
        self.cancel = Box::new(probe);
        self
    }

    pub fn handle(&self) -> ProgressHandle {
        ProgressHandle(self.state.clone())
    }

    pub fn snapshot(&self) -> ProgressState {
        lock(&self.state).clone()
    }

    /// Enter a non-terminal phase
    pub fn enter(&self, phase: Phase, percent: u8, message: impl Into<String>) {
        debug_assert!(!phase.is_terminal());
        self.apply(Some(phase), percent, message.into(), None);
    }

    /// Progress within the current phase
    pub fn report(&self, percent: u8, message: impl Into<String>) {
        self.apply(None, percent, message.into(), None);
    }

    pub fn complete(&self, result_path: PathBuf, message: impl Into<String>) {
        self.apply(Some(Phase::Complete), COMPLETE, message.into(), Some(result_path));
    }

    /// Terminal state for a failed or cancelled run
    pub fn finish_with(&self, err: &CatalogError) {
        let phase = if err.is_cancellation() {
            Phase::Cancelled
        } else {
            Phase::Error
        };
        let percent = lock(&self.state).percent;
        self.apply(Some(phase), percent, err.to_string(), None);
    }

    /// Poll the cancel probe; a positive answer becomes [`CatalogError::Cancelled`]
    pub fn checkpoint(&self) -> CatalogResult<()> {
        if self.cancel.is_cancelled() {
            tracing::info!("cancellation observed");
            return Err(CatalogError::Cancelled);
        }
        Ok(())
    }

    fn apply(&self, phase: Option<Phase>, percent: u8, message: String, result_path: Option<PathBuf>) {
        let percent = {
            let mut state = lock(&self.state);
            if state.phase.is_terminal() {
                tracing::debug!(phase = ?state.phase, "ignoring update after terminal state");
                return;
            }
            // Never move backwards within a run
            state.percent = state.percent.max(percent.min(COMPLETE));
            if let Some(phase) = phase {
                state.phase = phase;
            }
            state.message = message.clone();
            state.result_path = result_path;
            state.percent
        };
        tracing::debug!(percent, message = %message, "progress");
        if let Some(sink) = &self.sink {
            sink.report(percent, &message);
        }
    }
}
