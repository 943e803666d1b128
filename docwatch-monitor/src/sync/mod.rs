//! Task-state synchronization engine

pub(crate) mod context;
pub mod monitor;
pub mod reconcile;
pub mod registry;
pub mod subscription;

pub use monitor::TaskMonitor;
pub use reconcile::{ApplyOutcome, LogicalClock, Stamp, TaskPatch};
pub use registry::{ChannelState, FocusedTask, RegistryState, TaskRegistry};
pub use subscription::Subscription;
