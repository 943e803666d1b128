//! Task monitor facade
//!
//! Owns the shared [`SyncContext`] and the focus slot. At most one
//! [`Subscription`] exists, and only while the focused task is Running.

use crate::config::MonitorConfig;
use crate::error::{MonitorError, MonitorResult};
use crate::models::FileStatusTree;
use crate::services::{HttpJobService, JobService, PushTransport, WebSocketTransport};
use crate::sync::context::SyncContext;
use crate::sync::registry::{RegistryState, TaskRegistry};
use crate::sync::subscription::Subscription;
use docwatch_common::api::{AnalyzeRequest, AnalyzeResponse, HealthResponse, ScanStats, Task, TaskStatus};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

pub struct TaskMonitor {
    ctx: Arc<SyncContext>,
    subscription: Mutex<Option<Subscription>>,
}

impl TaskMonitor {
    pub fn new(
        service: Arc<dyn JobService>,
        transport: Option<Arc<dyn PushTransport>>,
        config: MonitorConfig,
    ) -> Self {
        Self {
            ctx: Arc::new(SyncContext {
                registry: TaskRegistry::new(),
                service,
                transport,
                config,
            }),
            subscription: Mutex::new(None),
        }
    }

    /// Monitor talking HTTP + WebSocket to `config.base_url`
    pub fn connect(config: MonitorConfig) -> MonitorResult<Self> {
        let service = HttpJobService::new(config.base_url.clone())?;
        let transport: Option<Arc<dyn PushTransport>> = if config.channel_enabled {
            Some(Arc::new(WebSocketTransport::from_base_url(&config.base_url)?))
        } else {
            None
        };
        info!(base_url = %config.base_url, push = config.channel_enabled, "Task monitor configured");
        Ok(Self::new(Arc::new(service), transport, config))
    }

    pub fn registry(&self) -> &TaskRegistry {
        &self.ctx.registry
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.ctx.config
    }

    /// Observe every state change
    pub fn subscribe(&self) -> watch::Receiver<RegistryState> {
        self.ctx.registry.subscribe()
    }

    /// Replace the known task list
    pub async fn refresh_list(&self) -> MonitorResult<Vec<Task>> {
        let tasks = self.ctx.refresh_list().await?;
        self.sync_subscription().await;
        Ok(tasks)
    }

    /// Load `id` as the focused task
    ///
    /// Fetches the task (and its tree, when the runner has one) and starts
    /// the subscription if it is Running. `NotFound` leaves the previous
    /// focus untouched.
    pub async fn focus(&self, id: &str) -> MonitorResult<Task> {
        let stamp = self.ctx.registry.stamp();
        let task = match self.ctx.service.get_task(id).await {
            Ok(task) => task,
            Err(e) => {
                warn!(task_id = %id, error = %e, "Task load failed");
                if e.is_user_visible() {
                    self.ctx.registry.set_focused_error(id, Some(e.to_string()));
                }
                return Err(e);
            }
        };

        let generation = self.ctx.registry.focus(task, stamp);

        if !self.ctx.registry.has_tree() {
            if let Err(e) = self.ctx.load_tree(generation, id).await {
                warn!(task_id = %id, error = %e, "Tree load failed");
            }
        }

        self.sync_subscription().await;
        self.focused_task(id)
    }

    /// Re-fetch the focused task
    pub async fn reload(&self) -> MonitorResult<Task> {
        let id = self
            .ctx
            .registry
            .focused_id()
            .ok_or_else(|| MonitorError::NotFound("no focused task".to_string()))?;
        self.focus(&id).await
    }

    /// Stop observing the focused task
    pub async fn unfocus(&self) {
        if let Some(subscription) = self.subscription.lock().await.take() {
            subscription.close();
        }
        self.ctx.registry.unfocus();
    }

    /// Ask the runner to cancel `id`
    ///
    /// Local status is left alone; the runner confirms through the push
    /// channel, a poll, or a list refresh.
    pub async fn cancel(&self, id: &str) -> MonitorResult<String> {
        match self.ctx.service.cancel_task(id).await {
            Ok(message) => {
                self.ctx.registry.set_focused_error(id, None);
                self.ctx.registry.mark_cancel_requested(id);
                Ok(message)
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "Cancel failed");
                if e.is_user_visible() {
                    self.ctx.registry.set_focused_error(id, Some(e.to_string()));
                }
                Err(e)
            }
        }
    }

    /// Start an analysis and refresh the list so the new task shows up
    pub async fn start_analysis(&self, request: &AnalyzeRequest) -> MonitorResult<AnalyzeResponse> {
        let response = self.ctx.service.start_analysis(request).await?;
        if let Err(e) = self.ctx.refresh_list().await {
            debug!(error = %e, "List refresh after start failed");
        }
        Ok(response)
    }

    /// Scan a directory without starting an analysis
    pub async fn scan_directory(&self, source_path: &str) -> MonitorResult<(FileStatusTree, ScanStats)> {
        let response = self.ctx.service.scan_directory(source_path).await?;
        Ok((FileStatusTree::from_dto(&response.root), response.stats))
    }

    pub async fn health(&self) -> MonitorResult<HealthResponse> {
        self.ctx.service.health().await
    }

    /// True while a live subscription exists
    pub async fn is_subscribed(&self) -> bool {
        self.subscription
            .lock()
            .await
            .as_ref()
            .is_some_and(Subscription::is_active)
    }

    /// Start or stop the subscription to match the focused task's status
    pub async fn sync_subscription(&self) {
        let focused = self.ctx.registry.read(|state| {
            state
                .focused
                .as_ref()
                .map(|f| (f.task.id.clone(), f.generation, f.task.status))
        });

        let mut slot = self.subscription.lock().await;
        match focused {
            Some((id, generation, TaskStatus::Running)) => {
                let current = slot
                    .as_ref()
                    .is_some_and(|s| s.generation() == generation && s.is_active());
                if !current {
                    *slot = Some(Subscription::start(self.ctx.clone(), id, generation));
                }
            }
            _ => {
                if let Some(subscription) = slot.take() {
                    subscription.close();
                }
            }
        }
    }

    /// Close the subscription and wait for its tasks
    pub async fn shutdown(&self) {
        let subscription = self.subscription.lock().await.take();
        if let Some(subscription) = subscription {
            subscription.shutdown().await;
        }
    }

    fn focused_task(&self, id: &str) -> MonitorResult<Task> {
        self.ctx
            .registry
            .read(|state| {
                state
                    .focused
                    .as_ref()
                    .filter(|f| f.task.id == id)
                    .map(|f| f.task.clone())
            })
            .ok_or_else(|| MonitorError::NotFound(format!("task {id}")))
    }
}
