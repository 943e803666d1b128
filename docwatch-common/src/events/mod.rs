//! Event types for the per-task push channel
//!
//! Every frame is one whole JSON object:
//!
//! ```json
//! {"type": "analysis_progress", "data": {"task_id": "t1", "percentage": 42.5}, "timestamp": "..."}
//! ```
//!
//! The `type` discriminator selects the payload shape. The short names
//! (`progress`, `complete`, `error`, `file_complete`, `file_failed`) are
//! accepted as aliases of the `analysis_*` names.

mod payload_types;

pub use payload_types::{
    CompletePayload, ConnectedPayload, ErrorPayload, FileCompletePayload, FileFailedPayload,
    LevelCompletePayload, ProgressPayload, StartedPayload,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Typed push event
#[derive(Debug, Clone, PartialEq)]
pub enum PushEvent {
    /// Connection acknowledged by the service
    Connected(ConnectedPayload),
    /// Analysis began; carries the file count
    Started(StartedPayload),
    /// Fractional progress
    Progress(ProgressPayload),
    /// One depth level of the tree finished
    LevelComplete(LevelCompletePayload),
    /// A single file was analyzed successfully
    FileComplete(FileCompletePayload),
    /// A single file failed
    FileFailed(FileFailedPayload),
    /// Whole task completed
    Complete(CompletePayload),
    /// Whole task failed
    Error(ErrorPayload),
    /// Any other `type` (`disconnected`, `scan_complete`, `status_update`, ...)
    Other { kind: String, data: Value },
}

impl PushEvent {
    /// Canonical wire name, used for logging and serialization
    pub fn event_type(&self) -> &str {
        match self {
            PushEvent::Connected(_) => "connected",
            PushEvent::Started(_) => "analysis_started",
            PushEvent::Progress(_) => "analysis_progress",
            PushEvent::LevelComplete(_) => "analysis_level_complete",
            PushEvent::FileComplete(_) => "analysis_file_complete",
            PushEvent::FileFailed(_) => "analysis_file_failed",
            PushEvent::Complete(_) => "analysis_complete",
            PushEvent::Error(_) => "analysis_error",
            PushEvent::Other { kind, .. } => kind,
        }
    }

    /// Task the event is about, if the payload names one
    pub fn task_id(&self) -> Option<&str> {
        match self {
            PushEvent::Connected(p) => p.task_id.as_deref(),
            PushEvent::Started(p) => Some(&p.task_id),
            PushEvent::Progress(p) => Some(&p.task_id),
            PushEvent::LevelComplete(p) => Some(&p.task_id),
            PushEvent::FileComplete(p) => Some(&p.task_id),
            PushEvent::FileFailed(p) => Some(&p.task_id),
            PushEvent::Complete(p) => Some(&p.task_id),
            PushEvent::Error(p) => Some(&p.task_id),
            PushEvent::Other { data, .. } => data.get("task_id").and_then(Value::as_str),
        }
    }

    fn data(&self) -> Result<Value> {
        let value = match self {
            PushEvent::Connected(p) => serde_json::to_value(p),
            PushEvent::Started(p) => serde_json::to_value(p),
            PushEvent::Progress(p) => serde_json::to_value(p),
            PushEvent::LevelComplete(p) => serde_json::to_value(p),
            PushEvent::FileComplete(p) => serde_json::to_value(p),
            PushEvent::FileFailed(p) => serde_json::to_value(p),
            PushEvent::Complete(p) => serde_json::to_value(p),
            PushEvent::Error(p) => serde_json::to_value(p),
            PushEvent::Other { data, .. } => return Ok(data.clone()),
        };
        value.map_err(|e| Error::InvalidInput(format!("event payload: {e}")))
    }
}

/// One push frame: event plus the service-side timestamp
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event: PushEvent,
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    timestamp: Option<String>,
}

impl EventEnvelope {
    pub fn new(event: PushEvent) -> Self {
        Self {
            event,
            timestamp: Some(crate::time::now()),
        }
    }

    /// Parse a single text frame
    ///
    /// Unknown `type` values parse to [`PushEvent::Other`]; a known type with a
    /// malformed payload is an error.
    pub fn parse(text: &str) -> Result<Self> {
        let raw: RawEnvelope = serde_json::from_str(text)
            .map_err(|e| Error::InvalidInput(format!("push frame is not an event envelope: {e}")))?;

        let event = decode_event(&raw.kind, raw.data)?;
        let timestamp = raw.timestamp.as_deref().and_then(crate::time::parse_timestamp);

        Ok(Self { event, timestamp })
    }

    /// Serialize to the wire form
    pub fn to_json(&self) -> Result<String> {
        let raw = RawEnvelope {
            kind: self.event.event_type().to_string(),
            data: self.event.data()?,
            timestamp: self.timestamp.map(|t| t.to_rfc3339()),
        };
        serde_json::to_string(&raw).map_err(|e| Error::InvalidInput(format!("event envelope: {e}")))
    }
}

fn decode_event(kind: &str, data: Value) -> Result<PushEvent> {
    fn payload<T: serde::de::DeserializeOwned>(kind: &str, data: Value) -> Result<T> {
        serde_json::from_value(data)
            .map_err(|e| Error::InvalidInput(format!("malformed {kind} payload: {e}")))
    }

    let event = match kind {
        "connected" => PushEvent::Connected(if data.is_null() {
            ConnectedPayload::default()
        } else {
            payload(kind, data)?
        }),
        "analysis_started" | "started" => PushEvent::Started(payload(kind, data)?),
        "analysis_progress" | "progress" => PushEvent::Progress(payload(kind, data)?),
        "analysis_level_complete" | "level_complete" => {
            PushEvent::LevelComplete(payload(kind, data)?)
        }
        "analysis_file_complete" | "file_complete" => PushEvent::FileComplete(payload(kind, data)?),
        "analysis_file_failed" | "file_failed" => PushEvent::FileFailed(payload(kind, data)?),
        "analysis_complete" | "complete" => PushEvent::Complete(payload(kind, data)?),
        "analysis_error" | "error" => PushEvent::Error(payload(kind, data)?),
        other => PushEvent::Other {
            kind: other.to_string(),
            data,
        },
    };
    Ok(event)
}
