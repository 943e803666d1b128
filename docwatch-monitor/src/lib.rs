//! # docwatch-monitor
//!
//! Live view of analysis jobs run by the documentation job service.
//!
//! The [`TaskMonitor`] keeps a local registry of tasks and a per-file status
//! tree for the focused task, fed by a WebSocket push channel and a polling
//! fallback that are reconciled field by field.

pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod sync;

pub use config::MonitorConfig;
pub use error::{MonitorError, MonitorResult};
pub use models::FileStatusTree;
pub use sync::{ApplyOutcome, ChannelState, RegistryState, TaskMonitor, TaskPatch, TaskRegistry};
