//! Collaborator clients and background workers

pub mod event_channel;
pub mod job_client;
pub mod poller;
pub mod push_transport;

pub use job_client::{HttpJobService, JobService};
pub use push_transport::{FrameStream, PushTransport, WebSocketTransport};
