//! Subscription: one focused Running task bound to its push channel reader
//! and its poller
//!
//! Both background tasks share one `CancellationToken`. Closing or dropping
//! the subscription cancels it; either task also cancels it when the task
//! reaches a terminal status.

use crate::services::event_channel::run_event_channel;
use crate::services::poller::run_poller;
use crate::sync::context::SyncContext;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;

pub struct Subscription {
    task_id: String,
    generation: u64,
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn start(ctx: Arc<SyncContext>, task_id: String, generation: u64) -> Self {
        let token = CancellationToken::new();
        let mut handles = Vec::with_capacity(2);

        handles.push(tokio::spawn(run_poller(
            ctx.clone(),
            task_id.clone(),
            generation,
            token.clone(),
        )));

        if ctx.config.channel_enabled && ctx.transport.is_some() {
            handles.push(tokio::spawn(run_event_channel(
                ctx,
                task_id.clone(),
                generation,
                token.clone(),
            )));
        }

        debug!(task_id = %task_id, generation, "Subscription started");
        Self {
            task_id,
            generation,
            token,
            handles,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// False once closed, dropped, or torn down by a terminal status
    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled()
    }

    pub fn close(&self) {
        if !self.token.is_cancelled() {
            debug!(task_id = %self.task_id, "Subscription closed");
            self.token.cancel();
        }
    }

    /// Close and wait for both background tasks to exit
    pub async fn shutdown(mut self) {
        self.close();
        for handle in std::mem::take(&mut self.handles) {
            let _ = handle.await;
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("task_id", &self.task_id)
            .field("generation", &self.generation)
            .field("active", &self.is_active())
            .finish()
    }
}
