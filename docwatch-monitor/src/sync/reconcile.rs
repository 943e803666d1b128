//! Reconciliation policy
//!
//! Push messages and poll responses both arrive as a [`TaskPatch`] plus a
//! [`Stamp`] from the registry's [`LogicalClock`]. Pushes are stamped on
//! receipt; pulls are stamped when the request is issued, so a response that
//! was in flight while a push landed carries the older stamp.
//!
//! Merging is per field: each field remembers the stamp that last wrote it
//! and refuses older writers. On top of that, status only moves forward
//! through the lifecycle, terminal statuses are sticky, and the progress
//! counters never go backwards while the task is live.

use chrono::{DateTime, Utc};
use docwatch_common::api::{Task, TaskStatus};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordering signal attached to every update
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Stamp(u64);

impl Stamp {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for Stamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Monotonic stamp source
#[derive(Debug, Default)]
pub struct LogicalClock(AtomicU64);

impl LogicalClock {
    /// Next stamp; strictly greater than every stamp handed out before
    pub fn tick(&self) -> Stamp {
        Stamp(self.0.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Result of offering an update to the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// At least one field changed
    Applied,
    /// Accepted, but every accepted value was already current
    Unchanged,
    /// Nothing changed and at least one field lost to newer state (dropped silently)
    Stale,
    /// The patch names a task that is not focused (no-op)
    NotFocused,
}

impl ApplyOutcome {
    pub fn changed(self) -> bool {
        self == ApplyOutcome::Applied
    }
}

/// Partial task update; `None` leaves a field alone
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TaskPatch {
    pub status: Option<TaskStatus>,
    pub progress: Option<f64>,
    pub current_file: Option<String>,
    pub total_files: Option<u64>,
    pub processed_files: Option<u64>,
    pub failed_files: Option<u64>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub docs_path: Option<String>,
    pub stats: Option<Value>,
}

impl TaskPatch {
    /// Patch carrying every field of a fetched task summary
    pub fn from_task(task: &Task) -> Self {
        Self {
            status: Some(task.status),
            progress: Some(task.progress),
            current_file: task.current_file.clone(),
            total_files: Some(task.total_files),
            processed_files: Some(task.processed_files),
            failed_files: Some(task.failed_files),
            started_at: task.started_at,
            completed_at: task.completed_at,
            error: task.error.clone(),
            docs_path: task.docs_path.clone(),
            stats: task.stats.clone(),
        }
    }

    pub fn progress(percentage: f64, current_file: Option<String>) -> Self {
        Self {
            progress: Some(percentage),
            current_file: current_file.filter(|f| !f.is_empty()),
            ..Default::default()
        }
    }

    pub fn completed(stats: Value) -> Self {
        let count = |key: &str| stats.get(key).and_then(Value::as_u64);
        Self {
            status: Some(TaskStatus::Completed),
            progress: Some(100.0),
            total_files: count("total_files"),
            processed_files: count("processed_files"),
            failed_files: count("failed_count"),
            stats: Some(stats).filter(|s| !s.is_null()),
            ..Default::default()
        }
    }

    pub fn failed(error: String) -> Self {
        Self {
            status: Some(TaskStatus::Failed),
            error: Some(error),
            ..Default::default()
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: Some(TaskStatus::Cancelled),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == TaskPatch::default()
    }
}

/// Stamp of the last accepted write, per field
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldClocks {
    status: Stamp,
    progress: Stamp,
    current_file: Stamp,
    total_files: Stamp,
    processed_files: Stamp,
    failed_files: Stamp,
    started_at: Stamp,
    completed_at: Stamp,
    error: Stamp,
    docs_path: Stamp,
    stats: Stamp,
}

impl FieldClocks {
    /// Every field written at `stamp` (a freshly loaded task)
    pub fn at(stamp: Stamp) -> Self {
        Self {
            status: stamp,
            progress: stamp,
            current_file: stamp,
            total_files: stamp,
            processed_files: stamp,
            failed_files: stamp,
            started_at: stamp,
            completed_at: stamp,
            error: stamp,
            docs_path: stamp,
            stats: stamp,
        }
    }
}

#[derive(Default)]
struct Tally {
    stale: usize,
    changed: bool,
}

impl Tally {
    fn write<T: PartialEq>(&mut self, slot: &mut T, clock: &mut Stamp, value: T, stamp: Stamp) {
        if stamp < *clock {
            self.stale += 1;
            return;
        }
        *clock = stamp;
        if *slot != value {
            *slot = value;
            self.changed = true;
        }
    }

    fn reject(&mut self) {
        self.stale += 1;
    }
}

/// Merge `patch` into `task`
pub fn merge(task: &mut Task, clocks: &mut FieldClocks, patch: &TaskPatch, stamp: Stamp) -> ApplyOutcome {
    if patch.is_empty() {
        return ApplyOutcome::Unchanged;
    }

    // Once terminal, only a report of the same terminal status may enrich the task.
    if task.status.is_terminal() && patch.status != Some(task.status) {
        return ApplyOutcome::Stale;
    }

    let mut tally = Tally::default();

    if let Some(status) = patch.status {
        if status.rank() < task.status.rank() || (task.status.is_terminal() && status != task.status) {
            tally.reject();
        } else {
            tally.write(&mut task.status, &mut clocks.status, status, stamp);
        }
    }

    let live = !task.status.is_terminal();

    if let Some(progress) = patch.progress.filter(|p| p.is_finite()) {
        let progress = progress.clamp(0.0, 100.0);
        if live && progress < task.progress {
            tally.reject();
        } else {
            tally.write(&mut task.progress, &mut clocks.progress, progress, stamp);
        }
    }

    if let Some(file) = &patch.current_file {
        tally.write(&mut task.current_file, &mut clocks.current_file, Some(file.clone()), stamp);
    }

    // A total of 0 means "not known yet"; once known, the counters stay within it.
    if let Some(total) = patch.total_files {
        let counted = task.processed_files + task.failed_files;
        if (live && total < task.total_files) || (total != 0 && total < counted) {
            tally.reject();
        } else {
            tally.write(&mut task.total_files, &mut clocks.total_files, total, stamp);
        }
    }

    if let Some(processed) = patch.processed_files {
        if (live && processed < task.processed_files) || exceeds_total(task, processed + task.failed_files) {
            tally.reject();
        } else {
            tally.write(&mut task.processed_files, &mut clocks.processed_files, processed, stamp);
        }
    }

    if let Some(failed) = patch.failed_files {
        if (live && failed < task.failed_files) || exceeds_total(task, task.processed_files + failed) {
            tally.reject();
        } else {
            tally.write(&mut task.failed_files, &mut clocks.failed_files, failed, stamp);
        }
    }

    // created_at <= started_at <= completed_at
    if let Some(started_at) = patch.started_at {
        if started_at < task.created_at || task.completed_at.is_some_and(|done| started_at > done) {
            tally.reject();
        } else {
            tally.write(&mut task.started_at, &mut clocks.started_at, Some(started_at), stamp);
        }
    }

    if let Some(completed_at) = patch.completed_at {
        let floor = task.started_at.unwrap_or(task.created_at);
        if completed_at < floor {
            tally.reject();
        } else {
            tally.write(&mut task.completed_at, &mut clocks.completed_at, Some(completed_at), stamp);
        }
    }

    // `error` belongs to Failed, `docs_path` to Completed.
    if let Some(error) = &patch.error {
        if task.status == TaskStatus::Failed {
            tally.write(&mut task.error, &mut clocks.error, Some(error.clone()), stamp);
        }
    }

    if let Some(docs_path) = &patch.docs_path {
        if task.status == TaskStatus::Completed {
            tally.write(&mut task.docs_path, &mut clocks.docs_path, Some(docs_path.clone()), stamp);
        }
    }

    if let Some(stats) = &patch.stats {
        tally.write(&mut task.stats, &mut clocks.stats, Some(stats.clone()), stamp);
    }

    if tally.changed {
        ApplyOutcome::Applied
    } else if tally.stale > 0 {
        ApplyOutcome::Stale
    } else {
        ApplyOutcome::Unchanged
    }
}

fn exceeds_total(task: &Task, counted: u64) -> bool {
    task.total_files != 0 && counted > task.total_files
}
