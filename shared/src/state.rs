/// Per-asset transfer states and the aggregate batch counter.
use serde::{Deserialize, Serialize};

use crate::errors::DownloadError;

/// Status of one asset's transfer within the current session.
///
/// `NotStarted -> InProgress -> Completed | Failed`, and `Failed -> InProgress` on a new
/// `download` call. `InProgress(None)` means the server did not report a size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum DownloadState {
    #[default]
    NotStarted,
    InProgress(Option<f64>),
    Completed,
    Failed(DownloadError),
}

impl DownloadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadState::Completed | DownloadState::Failed(_))
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, DownloadState::Completed)
    }

    pub fn failure(&self) -> Option<&DownloadError> {
        match self {
            DownloadState::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl std::fmt::Display for DownloadState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DownloadState::NotStarted => write!(f, "not started"),
            DownloadState::InProgress(Some(fraction)) => {
                write!(f, "downloading {:.1}%", fraction * 100.0)
            }
            DownloadState::InProgress(None) => write!(f, "downloading"),
            DownloadState::Completed => write!(f, "completed"),
            DownloadState::Failed(err) => write!(f, "failed: {}", err),
        }
    }
}

/// Aggregate progress of a batch: how many assets reached a terminal state.
///
/// `completed` counts both successes and failures; in-flight bytes are not weighted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct BatchProgress {
    pub completed: usize,
    pub failed: usize,
    pub total: usize,
}

impl BatchProgress {
    pub fn new(total: usize) -> Self {
        Self {
            completed: 0,
            failed: 0,
            total,
        }
    }

    /// Record one terminal transition.
    pub fn record(&mut self, state: &DownloadState) {
        if !state.is_terminal() {
            return;
        }
        self.completed += 1;
        if !state.is_completed() {
            self.failed += 1;
        }
    }

    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }

    pub fn is_finished(&self) -> bool {
        self.completed >= self.total
    }
}
