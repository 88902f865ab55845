//! Event type definitions for the crawl event stream.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::engine::types::{CrawlOutcome, ProgressSnapshot};

/// Severity of a structured log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Structured context attached to log events: job id, the URL involved,
/// and free-form numeric fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogContext {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty", default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

/// Event types emitted during the crawl process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CrawlEvent {
    /// Emitted once when a crawl session starts.
    Started {
        job_id: String,
        seed_url: String,
        timestamp: DateTime<Utc>,
    },
    /// Periodic progress snapshot.
    Progress {
        snapshot: ProgressSnapshot,
        timestamp: DateTime<Utc>,
    },
    /// Structured per-URL log line.
    Log {
        level: LogLevel,
        message: String,
        context: LogContext,
        timestamp: DateTime<Utc>,
    },
    /// Emitted once when the crawl reaches a terminal state successfully.
    Completed {
        outcome: CrawlOutcome,
        timestamp: DateTime<Utc>,
    },
    /// Emitted when the engine unwinds with a fatal error.
    Error {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl CrawlEvent {
    #[must_use]
    pub fn started(job_id: String, seed_url: String) -> Self {
        Self::Started {
            job_id,
            seed_url,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn progress(snapshot: ProgressSnapshot) -> Self {
        Self::Progress {
            snapshot,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn log(level: LogLevel, message: impl Into<String>, context: LogContext) -> Self {
        Self::Log {
            level,
            message: message.into(),
            context,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn completed(outcome: CrawlOutcome) -> Self {
        Self::Completed {
            outcome,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}
