//! Task Registry
//!
//! Holds the known task list and the single focused task. The whole state
//! lives in one `watch` channel; every mutation goes through
//! `send_if_modified`, so observers only ever see complete snapshots and a
//! no-op merge does not wake them.

use crate::models::FileStatusTree;
use crate::sync::reconcile::{merge, ApplyOutcome, FieldClocks, LogicalClock, Stamp, TaskPatch};
use chrono::{DateTime, Utc};
use docwatch_common::api::{NodeStatus, Task, TaskStatus};
use std::collections::HashMap;
use tokio::sync::watch;
use tracing::{debug, info};

/// Push channel lifecycle for the focused task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelState {
    Connecting,
    Open,
    #[default]
    Closed,
}

impl std::fmt::Display for ChannelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ChannelState::Connecting => "connecting",
            ChannelState::Open => "open",
            ChannelState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// The task the operator is looking at
#[derive(Debug, Clone)]
pub struct FocusedTask {
    pub task: Task,
    /// Per-file status, once the runner has scanned the source tree
    pub tree: Option<FileStatusTree>,
    /// Last user-visible failure for this task (cleared by the next success)
    pub error: Option<String>,
    pub channel: ChannelState,
    /// Bumped on every focus change; subscription work is scoped to one value
    pub generation: u64,
    clocks: FieldClocks,
    /// File events received before the tree loaded (latest per path)
    deferred_files: HashMap<String, NodeStatus>,
    cancel_requested: bool,
}

impl FocusedTask {
    /// The runner accepted a cancel request for this task
    pub fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }
}

/// Complete observable state
#[derive(Debug, Clone, Default)]
pub struct RegistryState {
    pub tasks: Vec<Task>,
    /// Last list refresh failure (cleared by the next success)
    pub list_error: Option<String>,
    pub list_refreshed_at: Option<DateTime<Utc>>,
    pub focused: Option<FocusedTask>,
}

impl RegistryState {
    pub fn focused_id(&self) -> Option<&str> {
        self.focused.as_ref().map(|f| f.task.id.as_str())
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Authoritative local task state
#[derive(Debug)]
pub struct TaskRegistry {
    state: watch::Sender<RegistryState>,
    clock: LogicalClock,
    generations: std::sync::atomic::AtomicU64,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskRegistry {
    pub fn new() -> Self {
        let (state, _) = watch::channel(RegistryState::default());
        Self {
            state,
            clock: LogicalClock::default(),
            generations: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Take an ordering stamp
    ///
    /// Pulls call this before issuing the request; pushes on receipt.
    pub fn stamp(&self) -> Stamp {
        self.clock.tick()
    }

    pub fn subscribe(&self) -> watch::Receiver<RegistryState> {
        self.state.subscribe()
    }

    pub fn snapshot(&self) -> RegistryState {
        self.state.borrow().clone()
    }

    /// Read the current state without cloning it
    pub fn read<R>(&self, f: impl FnOnce(&RegistryState) -> R) -> R {
        f(&*self.state.borrow())
    }

    pub fn focused_id(&self) -> Option<String> {
        self.state.borrow().focused_id().map(str::to_string)
    }

    pub fn focused_status(&self) -> Option<TaskStatus> {
        self.state.borrow().focused.as_ref().map(|f| f.task.status)
    }

    pub fn focused_generation(&self) -> Option<u64> {
        self.state.borrow().focused.as_ref().map(|f| f.generation)
    }

    pub fn has_tree(&self) -> bool {
        self.state
            .borrow()
            .focused
            .as_ref()
            .is_some_and(|f| f.tree.is_some())
    }

    /// Replace the full task list
    ///
    /// If the focused task is in the list, its entry is merged into the
    /// focused state with `stamp` and the list shows the merged result.
    pub fn replace_tasks(&self, tasks: Vec<Task>, stamp: Stamp) {
        let count = tasks.len();
        self.state.send_modify(|state| {
            state.tasks = tasks;
            state.list_error = None;
            state.list_refreshed_at = Some(docwatch_common::time::now());

            if let Some(focused) = state.focused.as_mut() {
                if let Some(entry) = state.tasks.iter_mut().find(|t| t.id == focused.task.id) {
                    let patch = TaskPatch::from_task(entry);
                    let outcome = merge(&mut focused.task, &mut focused.clocks, &patch, stamp);
                    debug!(task_id = %focused.task.id, ?outcome, %stamp, "List entry merged into focused task");
                    *entry = focused.task.clone();
                }
            }
        });
        debug!(count, "Task list replaced");
    }

    pub fn set_list_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.state.send_modify(|state| state.list_error = Some(message));
    }

    /// Make `task` the focused task
    ///
    /// Focusing a different task starts a new generation with no tree and a
    /// closed channel. Re-focusing the same id merges instead, so a slow load
    /// cannot roll back newer state. Returns the focus generation.
    pub fn focus(&self, task: Task, stamp: Stamp) -> u64 {
        let mut generation = 0;
        self.state.send_modify(|state| {
            match state.focused.as_mut() {
                Some(focused) if focused.task.id == task.id => {
                    merge(&mut focused.task, &mut focused.clocks, &TaskPatch::from_task(&task), stamp);
                    focused.error = None;
                    generation = focused.generation;
                }
                _ => {
                    generation = self.next_generation();
                    info!(task_id = %task.id, status = %task.status, generation, "Task focused");
                    state.focused = Some(FocusedTask {
                        task,
                        tree: None,
                        error: None,
                        channel: ChannelState::Closed,
                        generation,
                        clocks: FieldClocks::at(stamp),
                        deferred_files: HashMap::new(),
                        cancel_requested: false,
                    });
                }
            }
            sync_list_entry(state);
        });
        generation
    }

    fn next_generation(&self) -> u64 {
        self.generations
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1
    }

    /// Drop the focused task (and its tree)
    pub fn unfocus(&self) -> Option<String> {
        let mut dropped = None;
        self.state.send_if_modified(|state| {
            dropped = state.focused.take().map(|f| f.task.id);
            dropped.is_some()
        });
        if let Some(id) = &dropped {
            info!(task_id = %id, "Task unfocused");
        }
        dropped
    }

    /// Merge a partial update into the focused task
    ///
    /// No-op ([`ApplyOutcome::NotFocused`]) unless `id` is focused.
    pub fn apply_partial_update(&self, id: &str, patch: &TaskPatch, stamp: Stamp) -> ApplyOutcome {
        self.apply(None, id, patch, stamp)
    }

    /// As [`apply_partial_update`](Self::apply_partial_update), but only
    /// within focus `generation`
    pub fn apply_in_generation(
        &self,
        generation: u64,
        id: &str,
        patch: &TaskPatch,
        stamp: Stamp,
    ) -> ApplyOutcome {
        self.apply(Some(generation), id, patch, stamp)
    }

    fn apply(&self, generation: Option<u64>, id: &str, patch: &TaskPatch, stamp: Stamp) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::NotFocused;
        self.state.send_if_modified(|state| {
            let Some(focused) = focused_in(state, generation, id) else {
                return false;
            };
            outcome = merge(&mut focused.task, &mut focused.clocks, patch, stamp);
            if outcome.changed() {
                sync_list_entry(state);
            }
            outcome.changed()
        });

        match outcome {
            ApplyOutcome::Stale => debug!(task_id = %id, %stamp, "Stale update dropped"),
            ApplyOutcome::NotFocused => debug!(task_id = %id, "Update for unfocused task ignored"),
            _ => {}
        }
        outcome
    }

    /// Install the focused task's file tree
    ///
    /// File events that arrived while the tree was loading are replayed on
    /// top of it. A tree already installed is kept: it has seen every file
    /// event since, which a later snapshot may not have.
    pub fn set_tree(&self, generation: u64, id: &str, mut tree: FileStatusTree) -> bool {
        let mut installed = false;
        self.state.send_if_modified(|state| {
            let Some(focused) = focused_in(state, Some(generation), id) else {
                return false;
            };
            if focused.tree.is_some() {
                return false;
            }
            for (path, status) in focused.deferred_files.drain() {
                if !tree.propagate(&path, status) {
                    debug!(task_id = %id, path = %path, "Deferred file status for unknown path dropped");
                }
            }
            focused.tree = Some(tree);
            installed = true;
            true
        });
        if !installed {
            debug!(task_id = %id, generation, "File tree not installed");
        }
        installed
    }

    /// Set one file's status in the focused task's tree
    ///
    /// False when `id` is not focused, no tree is loaded yet, or the path is
    /// unknown. Without a tree the status is held and applied by
    /// [`set_tree`](Self::set_tree).
    pub fn propagate(&self, id: &str, relative_path: &str, status: NodeStatus) -> bool {
        self.propagate_inner(None, id, relative_path, status)
    }

    pub fn propagate_in_generation(
        &self,
        generation: u64,
        id: &str,
        relative_path: &str,
        status: NodeStatus,
    ) -> bool {
        self.propagate_inner(Some(generation), id, relative_path, status)
    }

    fn propagate_inner(
        &self,
        generation: Option<u64>,
        id: &str,
        relative_path: &str,
        status: NodeStatus,
    ) -> bool {
        let mut found = false;
        let mut deferred = false;
        self.state.send_if_modified(|state| {
            let Some(focused) = focused_in(state, generation, id) else {
                return false;
            };
            let Some(tree) = focused.tree.as_mut() else {
                focused.deferred_files.insert(relative_path.to_string(), status);
                deferred = true;
                return false;
            };
            let changed = tree.get(relative_path).is_some_and(|n| n.status != status);
            found = tree.propagate(relative_path, status);
            found && changed
        });
        if deferred {
            debug!(task_id = %id, path = %relative_path, ?status, "File status held until the tree loads");
        } else if !found {
            debug!(task_id = %id, path = %relative_path, "File status for unknown path ignored");
        }
        found
    }

    pub fn set_channel_state(&self, generation: u64, channel: ChannelState) {
        self.state.send_if_modified(|state| match state.focused.as_mut() {
            Some(focused) if focused.generation == generation && focused.channel != channel => {
                focused.channel = channel;
                true
            }
            _ => false,
        });
    }

    /// Remember that the runner accepted a cancel for the focused task
    ///
    /// The runner reports a cancelled run as a failure event; this marks
    /// the next one as the cancellation.
    pub fn mark_cancel_requested(&self, id: &str) {
        self.state.send_if_modified(|state| match state.focused.as_mut() {
            Some(focused) if focused.task.id == id && !focused.cancel_requested => {
                focused.cancel_requested = true;
                true
            }
            _ => false,
        });
    }

    pub fn cancel_requested(&self, id: &str) -> bool {
        self.read(|state| {
            state
                .focused
                .as_ref()
                .is_some_and(|f| f.task.id == id && f.cancel_requested)
        })
    }

    /// Record (or clear) the focused task's user-visible message
    pub fn set_focused_error(&self, id: &str, message: Option<String>) {
        self.state.send_if_modified(|state| match state.focused.as_mut() {
            Some(focused) if focused.task.id == id && focused.error != message => {
                focused.error = message;
                true
            }
            _ => false,
        });
    }
}

fn focused_in<'a>(
    state: &'a mut RegistryState,
    generation: Option<u64>,
    id: &str,
) -> Option<&'a mut FocusedTask> {
    state
        .focused
        .as_mut()
        .filter(|f| f.task.id == id && generation.map_or(true, |g| g == f.generation))
}

fn sync_list_entry(state: &mut RegistryState) {
    if let Some(focused) = &state.focused {
        if let Some(entry) = state.tasks.iter_mut().find(|t| t.id == focused.task.id) {
            *entry = focused.task.clone();
        }
    }
}
