//! Polling Fallback
//!
//! Re-fetches the focused task every `poll_interval` while it is Running,
//! whatever the state of the push channel. Responses are stamped when the
//! request is issued so they lose to any push that lands while in flight.

use crate::sync::context::SyncContext;
use crate::sync::reconcile::TaskPatch;
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub(crate) async fn run_poller(
    ctx: Arc<SyncContext>,
    task_id: String,
    generation: u64,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(ctx.config.poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The task was just loaded; the first poll is one period away.
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {}
        }

        poll_once(&ctx, &task_id, generation).await;

        if !ctx.is_live(generation) {
            debug!(task_id = %task_id, "Task left Running, stopping poller");
            token.cancel();
            break;
        }
    }

    debug!(task_id = %task_id, "Poller stopped");
}

pub(crate) async fn poll_once(ctx: &SyncContext, task_id: &str, generation: u64) {
    let stamp = ctx.registry.stamp();
    match ctx.service.get_task(task_id).await {
        Ok(task) => {
            let outcome =
                ctx.registry
                    .apply_in_generation(generation, task_id, &TaskPatch::from_task(&task), stamp);
            debug!(task_id = %task_id, ?outcome, %stamp, progress = task.progress, "Polled task");
        }
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Poll failed");
            if e.is_user_visible() {
                ctx.registry.set_focused_error(task_id, Some(e.to_string()));
            }
        }
    }

    if !ctx.registry.has_tree() {
        if let Err(e) = ctx.load_tree(generation, task_id).await {
            debug!(task_id = %task_id, error = %e, "Tree fetch failed");
        }
    }
}
