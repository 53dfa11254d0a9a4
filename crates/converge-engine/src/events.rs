//! Execution events and notifiers for observability.
//!
//! Events are emitted while a run progresses so consumers can stream
//! progress, persist results or drive a UI.

use converge_task::RenderOutcome;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::report::SkipReason;

/// Events emitted during a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionEvent {
  /// The run has started.
  RunStarted {
    run_id: String,
    tasks: usize,
    levels: usize,
  },

  /// Every task of a level is about to be dispatched.
  LevelStarted {
    run_id: String,
    level: usize,
    tasks: Vec<String>,
  },

  /// A task has been dispatched.
  TaskStarted { run_id: String, key: String },

  /// A task rendered successfully.
  TaskSucceeded {
    run_id: String,
    key: String,
    outcome: RenderOutcome,
  },

  /// A task failed.
  TaskFailed {
    run_id: String,
    key: String,
    error: String,
  },

  /// A task was not attempted.
  TaskSkipped {
    run_id: String,
    key: String,
    reason: SkipReason,
  },

  /// Every task has reached a terminal state.
  RunCompleted {
    run_id: String,
    succeeded: usize,
    failed: usize,
    skipped: usize,
  },
}

/// Trait for receiving execution events.
///
/// The executor calls `notify` for each event; implementations decide what to
/// do with them.
pub trait ExecutionNotifier: Send + Sync {
  fn notify(&self, event: ExecutionEvent);
}

/// A notifier that discards all events.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

impl ExecutionNotifier for NoopNotifier {
  fn notify(&self, _event: ExecutionEvent) {}
}

/// A notifier that sends events to an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
  // Unbounded so a slow consumer never stalls a level. Volume is a handful of
  // events per task.
  sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelNotifier {
  pub fn new(sender: mpsc::UnboundedSender<ExecutionEvent>) -> Self {
    Self { sender }
  }
}

impl ExecutionNotifier for ChannelNotifier {
  fn notify(&self, event: ExecutionEvent) {
    // Receiver may have been dropped
    let _ = self.sender.send(event);
  }
}
