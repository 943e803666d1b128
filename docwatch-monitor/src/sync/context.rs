//! Shared engine state
//!
//! One [`SyncContext`] is shared (via `Arc`) by the monitor facade and the
//! background tasks of its subscription. It never points back at the
//! monitor, so dropping the monitor tears everything down.

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::models::FileStatusTree;
use crate::services::{JobService, PushTransport};
use crate::sync::registry::TaskRegistry;
use docwatch_common::api::Task;
use std::sync::Arc;
use tracing::{debug, warn};

pub(crate) struct SyncContext {
    pub registry: TaskRegistry,
    pub service: Arc<dyn JobService>,
    pub transport: Option<Arc<dyn PushTransport>>,
    pub config: MonitorConfig,
}

impl SyncContext {
    /// Fetch and replace the task list
    ///
    /// User-visible failures are recorded on the list scope.
    pub async fn refresh_list(&self) -> MonitorResult<Vec<Task>> {
        let stamp = self.registry.stamp();
        match self.service.list_tasks().await {
            Ok(tasks) => {
                self.registry.replace_tasks(tasks.clone(), stamp);
                Ok(tasks)
            }
            Err(e) => {
                warn!(error = %e, "Task list refresh failed");
                self.registry.set_list_error(e.to_string());
                Err(e)
            }
        }
    }

    /// Fetch the task's tree and install it for focus `generation`
    ///
    /// `Ok(false)` when the runner has not scanned yet or a tree is already
    /// installed.
    pub async fn load_tree(&self, generation: u64, task_id: &str) -> MonitorResult<bool> {
        match self.service.get_task_tree(task_id).await {
            Ok(root) => {
                let tree = FileStatusTree::from_dto(&root);
                debug!(task_id = %task_id, nodes = tree.len(), "File tree loaded");
                Ok(self.registry.set_tree(generation, task_id, tree))
            }
            Err(MonitorError::NotFound(_)) => {
                debug!(task_id = %task_id, "File tree not available yet");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// True while `generation` is focused and its task is not terminal
    pub fn is_live(&self, generation: u64) -> bool {
        self.registry.read(|state| {
            state
                .focused
                .as_ref()
                .is_some_and(|f| f.generation == generation && !f.task.is_terminal())
        })
    }
}
