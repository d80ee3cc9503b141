use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::pipeline::{PipelineState, RunOutcome};

/// Represents the current phase of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProgressPhase {
    /// Nothing started yet
    Idle,
    /// Frames are being decoded and converted
    Converting,
    /// The source ran out of frames
    Complete,
    /// The run was stopped before the source ran out
    Cancelled,
    /// Decoding or conversion failed
    Failed,
}

impl From<&RunOutcome> for ProgressPhase {
    fn from(outcome: &RunOutcome) -> Self {
        match outcome {
            RunOutcome::NotStarted => Self::Idle,
            RunOutcome::Running => Self::Converting,
            RunOutcome::Completed => Self::Complete,
            RunOutcome::Cancelled => Self::Cancelled,
            RunOutcome::Failed(_) => Self::Failed,
        }
    }
}

/// Percentage of `processed` over `total`, or `None` while the total is unknown.
pub fn percent(processed: u64, total: u64) -> Option<f64> {
    if total == 0 {
        return None;
    }
    Some(processed as f64 / total as f64 * 100.0)
}

/// Point-in-time progress information for UI integration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Progress {
    pub phase: ProgressPhase,
    /// Frames converted and queued so far
    pub completed: u64,
    /// Frames expected (0 if unknown)
    pub total: u64,
    /// `None` when the total is unknown
    pub percentage: Option<f64>,
    /// Human-readable status line
    pub message: String,
}

impl Progress {
    pub fn snapshot(state: &PipelineState) -> Self {
        let outcome = state.outcome();
        Self::from_counts(ProgressPhase::from(&outcome), state.processed_frames(), state.total_frames())
    }

    pub fn from_counts(phase: ProgressPhase, completed: u64, total: u64) -> Self {
        let percentage = percent(completed, total);
        let message = match (phase, percentage) {
            (ProgressPhase::Idle, _) => "Ready".to_string(),
            (ProgressPhase::Converting, Some(p)) => {
                format!("Converting: {}/{} frames ({:.1}%)", completed, total, p)
            }
            (ProgressPhase::Converting, None) => format!("Converting: {} frames", completed),
            (ProgressPhase::Complete, _) => format!("Conversion complete: {} frames", completed),
            (ProgressPhase::Cancelled, _) => format!("Stopped after {} frames", completed),
            (ProgressPhase::Failed, _) => format!("Failed after {} frames", completed),
        };
        Self { phase, completed, total, percentage, message }
    }

    pub fn is_known(&self) -> bool {
        self.percentage.is_some()
    }
}

/// Read-only view of a run's progress, for polling from another thread.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    state: Arc<PipelineState>,
}

impl ProgressReporter {
    pub fn new(state: Arc<PipelineState>) -> Self {
        Self { state }
    }

    pub fn snapshot(&self) -> Progress {
        Progress::snapshot(&self.state)
    }

    /// `(processed, total)` as raw counters.
    pub fn counts(&self) -> (u64, u64) {
        (self.state.processed_frames(), self.state.total_frames())
    }
}
