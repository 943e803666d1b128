//! Plain-text rendering of monitor state for the `docwatch` binary

use docwatch_common::api::{NodeStatus, Task};
use docwatch_monitor::models::FileStatusTree;
use docwatch_monitor::sync::FocusedTask;

pub fn task_table(tasks: &[Task]) -> String {
    if tasks.is_empty() {
        return "No tasks".to_string();
    }
    let mut out = format!(
        "{:<38} {:<10} {:>7} {:>11}  {}\n",
        "TASK", "STATUS", "PROG", "FILES", "SOURCE"
    );
    for task in tasks {
        out.push_str(&format!(
            "{:<38} {:<10} {:>6.1}% {:>11}  {}\n",
            task.id,
            task.status,
            task.progress,
            counts(task),
            task.source_path
        ));
    }
    out.pop();
    out
}

fn counts(task: &Task) -> String {
    if task.failed_files > 0 {
        format!("{}/{} ({}!)", task.processed_files, task.total_files, task.failed_files)
    } else {
        format!("{}/{}", task.processed_files, task.total_files)
    }
}

pub fn task_detail(task: &Task) -> String {
    let mut lines = vec![
        format!("Task:     {}", task.id),
        format!("Status:   {}", task.status),
        format!("Source:   {}", task.source_path),
        format!("Progress: {:.1}%  files {}", task.progress, counts(task)),
        format!("Created:  {}", task.created_at.to_rfc3339()),
    ];
    if let Some(started) = task.started_at {
        lines.push(format!("Started:  {}", started.to_rfc3339()));
    }
    if let Some(completed) = task.completed_at {
        lines.push(format!("Finished: {}", completed.to_rfc3339()));
    }
    if let Some(docs) = &task.docs_path {
        lines.push(format!("Docs:     {docs}"));
    }
    if let Some(error) = &task.error {
        lines.push(format!("Error:    {error}"));
    }
    lines.join("\n")
}

/// One status line for the `watch` loop
pub fn focus_line(focused: &FocusedTask) -> String {
    let task = &focused.task;
    let mut line = format!(
        "[{}] {:>5.1}% files {} push={}",
        task.status,
        task.progress,
        counts(task),
        focused.channel
    );
    if let Some(tree) = &focused.tree {
        let summary = tree.summary();
        line.push_str(&format!(
            " tree ok={} failed={} pending={}",
            summary.completed + summary.skipped,
            summary.failed,
            summary.not_started + summary.in_progress
        ));
    }
    if let Some(file) = &task.current_file {
        line.push_str(&format!(" {file}"));
    }
    if let Some(error) = &focused.error {
        line.push_str(&format!(" ! {error}"));
    }
    line
}

fn marker(status: NodeStatus) -> &'static str {
    match status {
        NodeStatus::NotStarted => " ",
        NodeStatus::InProgress => "~",
        NodeStatus::Completed => "+",
        NodeStatus::Failed => "x",
        NodeStatus::Skipped => "-",
    }
}

pub fn tree(tree: &FileStatusTree) -> String {
    tree.iter_preorder()
        .into_iter()
        .map(|(level, node)| {
            let status = if node.is_dir() {
                tree.derived_status(&node.relative_path).unwrap_or(node.status)
            } else {
                node.status
            };
            let suffix = if node.is_dir() { "/" } else { "" };
            format!("[{}] {}{}{}", marker(status), "  ".repeat(level), node.name, suffix)
        })
        .collect::<Vec<_>>()
        .join("\n")
}
