//! Event Channel
//!
//! Reads one task's push channel and feeds each event to the registry. The
//! channel publishes Connecting / Open / Closed on the focused task. It only
//! reconnects when `max_reconnects` allows it; polling covers the gap.

use crate::models::normalize_relative_path;
use crate::sync::context::SyncContext;
use crate::sync::reconcile::{Stamp, TaskPatch};
use crate::sync::registry::ChannelState;
use docwatch_common::api::{NodeStatus, TaskStatus};
use docwatch_common::events::{EventEnvelope, PushEvent};
use futures::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run the push channel for `task_id` until cancelled or out of attempts
pub(crate) async fn run_event_channel(
    ctx: Arc<SyncContext>,
    task_id: String,
    generation: u64,
    token: CancellationToken,
) {
    let Some(transport) = ctx.transport.clone() else {
        return;
    };
    let max_reconnects = ctx.config.max_reconnects;
    let mut reconnects = 0u32;

    'session: loop {
        ctx.registry.set_channel_state(generation, ChannelState::Connecting);

        let connected = tokio::select! {
            _ = token.cancelled() => break 'session,
            result = transport.connect(&task_id) => result,
        };

        match connected {
            Ok(mut frames) => {
                ctx.registry.set_channel_state(generation, ChannelState::Open);
                info!(task_id = %task_id, "Push channel open");

                loop {
                    let next = tokio::select! {
                        _ = token.cancelled() => break 'session,
                        frame = frames.next() => frame,
                    };

                    match next {
                        Some(Ok(text)) => {
                            // Stamped on receipt, before anything else can interleave
                            let stamp = ctx.registry.stamp();
                            handle_frame(&ctx, &task_id, generation, &text, stamp).await;
                            if !ctx.is_live(generation) {
                                debug!(task_id = %task_id, "Task no longer running, closing push channel");
                                token.cancel();
                                break 'session;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(task_id = %task_id, error = %e, "Push channel failed, falling back to polling");
                            break;
                        }
                        None => {
                            info!(task_id = %task_id, "Push channel closed by service");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Push channel connect failed, falling back to polling");
            }
        }

        ctx.registry.set_channel_state(generation, ChannelState::Closed);

        if reconnects >= max_reconnects || !ctx.is_live(generation) {
            break;
        }
        reconnects += 1;
        let delay = ctx.config.reconnect_delay * reconnects;
        debug!(task_id = %task_id, attempt = reconnects, ?delay, "Reconnecting push channel");
        tokio::select! {
            _ = token.cancelled() => break 'session,
            _ = tokio::time::sleep(delay) => {}
        }
    }

    ctx.registry.set_channel_state(generation, ChannelState::Closed);
    debug!(task_id = %task_id, "Push channel reader stopped");
}

async fn handle_frame(ctx: &SyncContext, task_id: &str, generation: u64, text: &str, stamp: Stamp) {
    let envelope = match EventEnvelope::parse(text) {
        Ok(envelope) => envelope,
        Err(e) => {
            warn!(task_id = %task_id, error = %e, "Skipping unreadable push frame");
            return;
        }
    };

    if let Some(event_task) = envelope.event.task_id() {
        if event_task != task_id {
            debug!(task_id = %task_id, event_task = %event_task, "Push event for another task ignored");
            return;
        }
    }

    dispatch(ctx, task_id, generation, envelope.event, stamp).await;
}

/// Apply one push event
pub(crate) async fn dispatch(
    ctx: &SyncContext,
    task_id: &str,
    generation: u64,
    event: PushEvent,
    stamp: Stamp,
) {
    let registry = &ctx.registry;

    match event {
        PushEvent::Progress(p) => {
            let patch = TaskPatch::progress(p.percentage, p.current_file);
            registry.apply_in_generation(generation, task_id, &patch, stamp);
        }
        PushEvent::Started(p) => {
            let patch = TaskPatch {
                status: Some(TaskStatus::Running),
                total_files: Some(p.total_files).filter(|n| *n > 0),
                ..Default::default()
            };
            registry.apply_in_generation(generation, task_id, &patch, stamp);
        }
        PushEvent::Complete(p) => {
            info!(task_id = %task_id, "Analysis complete");
            registry.apply_in_generation(generation, task_id, &TaskPatch::completed(p.stats), stamp);
            // Completion changes the list too (docs_path, completed_at)
            if let Err(e) = ctx.refresh_list().await {
                debug!(task_id = %task_id, error = %e, "List refresh after completion failed");
            }
        }
        PushEvent::Error(p) if registry.cancel_requested(task_id) => {
            info!(task_id = %task_id, message = %p.error, "Cancellation confirmed");
            registry.apply_in_generation(generation, task_id, &TaskPatch::cancelled(), stamp);
        }
        PushEvent::Error(p) => {
            warn!(task_id = %task_id, error = %p.error, "Analysis failed");
            registry.apply_in_generation(generation, task_id, &TaskPatch::failed(p.error), stamp);
        }
        PushEvent::FileComplete(p) => {
            let path = normalize_relative_path(&p.file_path);
            registry.propagate_in_generation(generation, task_id, &path, NodeStatus::Completed);
        }
        PushEvent::FileFailed(p) => {
            let path = normalize_relative_path(&p.file_path);
            debug!(task_id = %task_id, path = %path, error = ?p.error, "File failed");
            registry.propagate_in_generation(generation, task_id, &path, NodeStatus::Failed);
        }
        PushEvent::LevelComplete(p) => {
            debug!(
                task_id = %task_id,
                depth = p.depth,
                completed = p.completed,
                failed = p.failed,
                "Level complete"
            );
        }
        PushEvent::Connected(p) => {
            debug!(task_id = %task_id, message = ?p.message, "Push channel acknowledged");
        }
        PushEvent::Other { kind, .. } => {
            debug!(task_id = %task_id, event_type = %kind, "Unhandled push event");
        }
    }
}
