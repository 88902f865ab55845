//! Engine state machine, outcome, and progress types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frontier::QueueStats;
use crate::storage::{StorageError, StorageStats};

/// Engine lifecycle. Legal transitions: Pending -> Running,
/// Running <-> Paused, Running -> {Complete, Failed, Cancelled}.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineState {
    Pending,
    Running,
    Paused,
    Complete,
    Failed,
    Cancelled,
}

impl EngineState {
    /// Whether the engine has reached a terminal state.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Cancelled)
    }
}

impl std::fmt::Display for EngineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Complete => "complete",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// One entry of the per-URL error history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UrlError {
    pub url: String,
    /// Error code, e.g. `SSRF`, `RATE_LIMITED`, `HTTP`.
    pub code: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// On-demand progress snapshot for the job layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    pub status: EngineState,
    pub pages_processed: usize,
    pub total_pages: usize,
    pub assets_processed: usize,
    pub bytes_downloaded: u64,
    pub current_url: Option<String>,
    pub errors: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub elapsed_ms: u64,
    pub queue_stats: QueueStats,
    pub storage_stats: StorageStats,
}

/// Terminal result of a crawl run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlOutcome {
    /// True iff the run was not cancelled and no per-URL errors occurred.
    pub success: bool,
    pub pages: usize,
    pub assets: usize,
    pub bytes: u64,
    pub errors: Vec<UrlError>,
    pub duration_ms: u64,
}

/// Engine-fatal failures. Per-URL trouble never surfaces here; it lands in
/// the error history and the crawl continues.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("cannot {action} while {state}")]
    InvalidTransition {
        action: &'static str,
        state: EngineState,
    },
    #[error(transparent)]
    Storage(#[from] StorageError),
}
