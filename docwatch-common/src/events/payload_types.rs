//! Push event payload definitions
//!
//! One struct per `data` object the job service sends on the task channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `analysis_started`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartedPayload {
    pub task_id: String,
    #[serde(default)]
    pub source_path: Option<String>,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub total_dirs: u64,
}

/// `analysis_progress`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressPayload {
    pub task_id: String,
    #[serde(default)]
    pub current: u64,
    #[serde(default)]
    pub total: u64,
    /// Percentage complete (0.0 - 100.0)
    pub percentage: f64,
    /// Empty string means "no file"
    #[serde(default)]
    pub current_file: Option<String>,
    /// Free-text phase description
    #[serde(default)]
    pub status: Option<String>,
}

/// `analysis_level_complete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelCompletePayload {
    pub task_id: String,
    pub depth: u32,
    #[serde(default)]
    pub completed: u64,
    #[serde(default)]
    pub failed: u64,
    #[serde(default)]
    pub total: u64,
}

/// `analysis_file_complete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileCompletePayload {
    pub task_id: String,
    pub file_path: String,
    #[serde(default)]
    pub doc_path: Option<String>,
}

/// `analysis_file_failed`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailedPayload {
    pub task_id: String,
    pub file_path: String,
    #[serde(default)]
    pub error: Option<String>,
}

/// `analysis_complete`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletePayload {
    pub task_id: String,
    #[serde(default)]
    pub stats: Value,
}

/// `analysis_error`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub task_id: String,
    pub error: String,
}

/// `connected`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ConnectedPayload {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub task_id: Option<String>,
}
