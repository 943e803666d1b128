//! Shared API request/response types
//!
//! Field names follow the job service JSON (`task_id`, `source_path`, ...).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ========================================
// Task Types
// ========================================

/// Task lifecycle state
///
/// Pending → Running → {Completed, Failed, Cancelled}. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl TaskStatus {
    /// Completed, Failed and Cancelled are terminal
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Position in the lifecycle; a status never moves to a lower rank
    pub fn rank(self) -> u8 {
        match self {
            TaskStatus::Pending => 0,
            TaskStatus::Running => 1,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One analysis job as reported by `GET /tasks` and `GET /tasks/{id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque identifier assigned by the job runner
    #[serde(rename = "task_id")]
    pub id: String,
    pub status: TaskStatus,
    /// Root directory being analyzed
    pub source_path: String,
    /// Generated documentation directory (set once Completed)
    #[serde(default)]
    pub docs_path: Option<String>,
    #[serde(with = "crate::time::lenient")]
    pub created_at: DateTime<Utc>,
    #[serde(default, with = "crate::time::lenient_opt")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "crate::time::lenient_opt")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Percentage complete (0.0 - 100.0)
    #[serde(default)]
    pub progress: f64,
    /// Last file touched (only delivered by push events)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_file: Option<String>,
    #[serde(default)]
    pub total_files: u64,
    #[serde(default)]
    pub processed_files: u64,
    #[serde(default)]
    pub failed_files: u64,
    /// Failure message (set once Failed)
    #[serde(default)]
    pub error: Option<String>,
    /// Statistics attached by the completion event
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
}

impl Task {
    /// A fresh Pending task, as the runner creates it
    pub fn pending(id: impl Into<String>, source_path: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: TaskStatus::Pending,
            source_path: source_path.into(),
            docs_path: None,
            created_at: crate::time::now(),
            started_at: None,
            completed_at: None,
            progress: 0.0,
            current_file: None,
            total_files: 0,
            processed_files: 0,
            failed_files: 0,
            error: None,
            stats: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// ========================================
// File Tree Types
// ========================================

/// File or directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeKind {
    File,
    Directory,
}

/// Per-file analysis status, independent from [`TaskStatus`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NodeStatus {
    #[default]
    #[serde(rename = "pending")]
    NotStarted,
    #[serde(rename = "in_progress")]
    InProgress,
    #[serde(rename = "completed")]
    Completed,
    #[serde(rename = "failed")]
    Failed,
    #[serde(rename = "skipped")]
    Skipped,
}

impl NodeStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeStatus::NotStarted => "pending",
            NodeStatus::InProgress => "in_progress",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
            NodeStatus::Skipped => "skipped",
        }
    }
}

/// Recursive file tree node as served by `/scan` and `/tasks/{id}/tree`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNodeDto {
    /// Absolute path on the runner
    #[serde(default)]
    pub path: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub depth: u32,
    pub relative_path: String,
    #[serde(default)]
    pub status: NodeStatus,
    #[serde(default)]
    pub doc_path: Option<String>,
    #[serde(default)]
    pub children: Vec<FileNodeDto>,
}

impl FileNodeDto {
    /// Convenience constructor for a file leaf
    pub fn file(relative_path: &str) -> Self {
        Self::leaf(relative_path, NodeKind::File)
    }

    /// Convenience constructor for an empty directory
    pub fn directory(relative_path: &str, children: Vec<FileNodeDto>) -> Self {
        let mut node = Self::leaf(relative_path, NodeKind::Directory);
        node.children = children;
        node
    }

    fn leaf(relative_path: &str, kind: NodeKind) -> Self {
        let name = relative_path
            .rsplit('/')
            .next()
            .unwrap_or(relative_path)
            .to_string();
        Self {
            path: relative_path.to_string(),
            name,
            kind,
            depth: relative_path.split('/').filter(|s| !s.is_empty()).count() as u32,
            relative_path: relative_path.to_string(),
            status: NodeStatus::NotStarted,
            doc_path: None,
            children: Vec::new(),
        }
    }
}

/// GET /tasks/{id}/tree response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskTreeResponse {
    pub root: FileNodeDto,
}

// ========================================
// Scan / Analyze Types
// ========================================

/// POST /scan request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanRequest {
    pub source_path: String,
}

/// Scan summary counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanStats {
    pub total_files: u64,
    pub total_dirs: u64,
    pub max_depth: u32,
}

/// POST /scan response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub root: FileNodeDto,
    pub stats: ScanStats,
}

/// POST /analyze request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeRequest {
    pub source_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docs_path: Option<String>,
    /// Resume from the runner's checkpoint
    #[serde(default = "default_resume")]
    pub resume: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_overrides: Option<HashMap<String, Value>>,
}

fn default_resume() -> bool {
    true
}

impl AnalyzeRequest {
    pub fn new(source_path: impl Into<String>) -> Self {
        Self {
            source_path: source_path.into(),
            docs_path: None,
            resume: true,
            config_overrides: None,
        }
    }
}

/// POST /analyze response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalyzeResponse {
    pub task_id: String,
    #[serde(default)]
    pub message: String,
}

/// Plain `{message}` response (cancel)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: String,
}

/// GET /health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    #[serde(default)]
    pub timestamp: Option<String>,
}

// ========================================
// Error Response Types
// ========================================

/// Structured failure body: `{"detail": ...}`
///
/// `detail` is usually a string; request validation failures carry a list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: Value,
}

impl ErrorDetail {
    /// Human-readable message for the operator
    pub fn message(&self) -> String {
        match &self.detail {
            Value::String(s) => s.clone(),
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.get("msg")
                        .and_then(Value::as_str)
                        .map(str::to_string)
                        .unwrap_or_else(|| item.to_string())
                })
                .collect::<Vec<_>>()
                .join("; "),
            other => other.to_string(),
        }
    }
}
