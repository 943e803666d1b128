//! Synchronization engine integration tests
//!
//! Drive a `TaskMonitor` against the scripted job service and push channel
//! in `tests/helpers`. Time is paused, so poll intervals elapse instantly
//! whenever the runtime is idle.

mod helpers;

use docwatch_common::api::{NodeStatus, TaskStatus};
use docwatch_common::events::{
    CompletePayload, ErrorPayload, FileCompletePayload, FileFailedPayload, ProgressPayload,
    PushEvent,
};
use docwatch_monitor::{ChannelState, MonitorError, TaskMonitor};
use helpers::*;
use serde_json::json;
use std::time::Duration;

fn progress(task_id: &str, percentage: f64, file: &str) -> PushEvent {
    PushEvent::Progress(ProgressPayload {
        task_id: task_id.into(),
        current: 0,
        total: 0,
        percentage,
        current_file: Some(file.into()),
        status: None,
    })
}

async fn wait_unsubscribed(monitor: &TaskMonitor) {
    for _ in 0..50 {
        if !monitor.is_subscribed().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("subscription still active");
}

/// Push progress beats an older poll; complete is final; stray Running reports are ignored
#[tokio::test(start_paused = true)]
async fn tc_sync_001_push_and_poll_reconcile_to_completed() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    service.set_tree("t1", sample_tree());
    let feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();

    let loaded = monitor.focus("t1").await.unwrap();
    assert_eq!(loaded.status, TaskStatus::Running);
    assert_eq!(loaded.progress, 0.0);
    assert!(monitor.is_subscribed().await);

    // A poll is issued, then a push lands while it is in flight
    let held = service.hold_next_poll();
    held.started.await.unwrap();

    feed.send(progress("t1", 42.5, "a/b.py"));
    wait_for(&mut rx, |s| focused_progress(s) == 42.5).await;

    held.release.send(task("t1", TaskStatus::Running, 40.0)).unwrap();
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(focused_progress(&rx.borrow()), 42.5);

    // Everything the service says from now on is a stray Running report
    service.set_task(task("t1", TaskStatus::Running, 41.0));
    service.set_list(vec![task("t1", TaskStatus::Running, 41.0)]);

    feed.send(PushEvent::Complete(CompletePayload {
        task_id: "t1".into(),
        stats: json!({"total_files": 2, "processed_files": 2, "failed_count": 0}),
    }));
    wait_for(&mut rx, |s| focused_status(s) == Some(TaskStatus::Completed)).await;
    wait_unsubscribed(&monitor).await;

    let polls = service.get_calls();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.get_calls(), polls, "poller kept running after completion");

    let state = monitor.registry().snapshot();
    let focused = state.focused.unwrap();
    assert_eq!(focused.task.status, TaskStatus::Completed);
    assert_eq!(focused.task.progress, 100.0);
    assert_eq!(focused.task.processed_files, 2);
    assert!(service.list_calls() >= 1, "completion should refresh the list");
    assert_eq!(state.tasks[0].status, TaskStatus::Completed);
}

/// File events update only their node; bad frames and other tasks' events are skipped
#[tokio::test(start_paused = true)]
async fn tc_sync_002_file_events_propagate_to_tree() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    service.set_tree("t1", sample_tree());
    let feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();

    feed.send_raw("not json");
    feed.send(progress("t2", 99.0, "x.py"));
    feed.send(PushEvent::FileComplete(FileCompletePayload {
        task_id: "t1".into(),
        file_path: "a/missing.py".into(),
        doc_path: None,
    }));
    feed.send(PushEvent::FileComplete(FileCompletePayload {
        task_id: "t1".into(),
        file_path: "a\\b.py".into(),
        doc_path: Some("/docs/a/b.md".into()),
    }));
    feed.send(PushEvent::FileFailed(FileFailedPayload {
        task_id: "t1".into(),
        file_path: "a/c.py".into(),
        error: Some("timeout".into()),
    }));

    wait_for(&mut rx, |s| {
        s.focused
            .as_ref()
            .and_then(|f| f.tree.as_ref())
            .and_then(|t| t.get("a/c.py"))
            .is_some_and(|n| n.status == NodeStatus::Failed)
    })
    .await;

    let focused = monitor.registry().snapshot().focused.unwrap();
    let tree = focused.tree.unwrap();
    assert_eq!(tree.get("a/b.py").unwrap().status, NodeStatus::Completed);
    assert_eq!(tree.get("a/c.py").unwrap().status, NodeStatus::Failed);
    assert_eq!(tree.summary().files, 2);
    assert_eq!(focused.task.progress, 0.0);
    assert_eq!(focused.channel, ChannelState::Open);
    assert!(monitor.is_subscribed().await);
}

/// analysis_error marks the task Failed and ends the subscription
#[tokio::test(start_paused = true)]
async fn tc_sync_003_error_event_is_terminal() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 10.0));
    let feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();

    feed.send(PushEvent::Error(ErrorPayload {
        task_id: "t1".into(),
        error: "LLM quota exceeded".into(),
    }));
    wait_for(&mut rx, |s| focused_status(s) == Some(TaskStatus::Failed)).await;
    wait_unsubscribed(&monitor).await;

    // A later progress frame on a reused feed changes nothing
    feed.send(progress("t1", 50.0, "a/b.py"));
    tokio::time::sleep(Duration::from_secs(5)).await;

    let focused = monitor.registry().snapshot().focused.unwrap();
    assert_eq!(focused.task.status, TaskStatus::Failed);
    assert_eq!(focused.task.error.as_deref(), Some("LLM quota exceeded"));
    assert_eq!(focused.task.progress, 10.0);
    assert_eq!(focused.channel, ChannelState::Closed);
}

/// With no push channel, polling alone converges and a terminal poll ends the subscription
#[tokio::test(start_paused = true)]
async fn tc_sync_004_channel_unavailable_falls_back_to_polling() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 5.0));

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();

    wait_for(&mut rx, |s| {
        transport.connects() == 1
            && s.focused.as_ref().is_some_and(|f| f.channel == ChannelState::Closed)
    })
    .await;
    assert!(monitor.is_subscribed().await);

    service.set_task(task("t1", TaskStatus::Running, 60.0));
    wait_for(&mut rx, |s| focused_progress(s) == 60.0).await;

    service.set_task(task("t1", TaskStatus::Cancelled, 60.0));
    wait_for(&mut rx, |s| focused_status(s) == Some(TaskStatus::Cancelled)).await;
    wait_unsubscribed(&monitor).await;
    assert_eq!(transport.connects(), 1, "no reconnect by default");
}

/// A transport failure mid-stream closes the channel but polling keeps going
#[tokio::test(start_paused = true)]
async fn tc_sync_005_transport_failure_keeps_polling() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    let feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();

    feed.send(progress("t1", 20.0, "a/b.py"));
    wait_for(&mut rx, |s| focused_progress(s) == 20.0).await;

    feed.fail();
    wait_for(&mut rx, |s| {
        s.focused.as_ref().is_some_and(|f| f.channel == ChannelState::Closed)
    })
    .await;

    service.set_task(task("t1", TaskStatus::Running, 35.0));
    wait_for(&mut rx, |s| focused_progress(s) == 35.0).await;
    assert!(monitor.is_subscribed().await);
}

/// Bounded reconnection stops after `max_reconnects` extra attempts
#[tokio::test(start_paused = true)]
async fn tc_sync_006_bounded_reconnect() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    let first = transport.queue();
    let second = transport.queue();

    let mut config = test_config();
    config.max_reconnects = 1;
    config.poll_interval = Duration::from_secs(600);
    let monitor = monitor(&service, &transport, config);
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();

    first.fail();
    second.send(progress("t1", 30.0, "a/b.py"));
    wait_for(&mut rx, |s| focused_progress(s) == 30.0).await;
    assert_eq!(transport.connects(), 2);

    second.fail();
    wait_for(&mut rx, |s| {
        s.focused.as_ref().is_some_and(|f| f.channel == ChannelState::Closed)
    })
    .await;
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(transport.connects(), 2);
}

/// Unfocus tears the subscription down and later pushes are ignored
#[tokio::test(start_paused = true)]
async fn tc_sync_007_unfocus_tears_down_subscription() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    let feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    monitor.focus("t1").await.unwrap();
    assert!(monitor.is_subscribed().await);

    monitor.unfocus().await;
    assert!(!monitor.is_subscribed().await);
    assert!(monitor.registry().snapshot().focused.is_none());

    let polls = service.get_calls();
    feed.send(progress("t1", 80.0, "a/b.py"));
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.get_calls(), polls);
    assert!(monitor.registry().snapshot().focused.is_none());
}

/// Focusing another task replaces the subscription
#[tokio::test(start_paused = true)]
async fn tc_sync_008_refocus_replaces_subscription() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    service.set_task(task("t2", TaskStatus::Running, 0.0));
    let feed_t1 = transport.queue();
    let _feed_t2 = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    monitor.focus("t1").await.unwrap();
    monitor.focus("t2").await.unwrap();
    assert!(monitor.is_subscribed().await);

    feed_t1.send(progress("t1", 50.0, "a/b.py"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    let state = monitor.registry().snapshot();
    assert_eq!(state.focused_id(), Some("t2"));
    assert_eq!(focused_progress(&state), 0.0);
}

/// Pending tasks get no subscription until a reload sees them Running
#[tokio::test(start_paused = true)]
async fn tc_sync_009_pending_task_subscribes_once_running() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Pending, 0.0));
    let _feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    monitor.focus("t1").await.unwrap();
    assert!(!monitor.is_subscribed().await);
    assert_eq!(transport.connects(), 0);

    service.set_task(task("t1", TaskStatus::Running, 0.0));
    let reloaded = monitor.reload().await.unwrap();
    assert_eq!(reloaded.status, TaskStatus::Running);
    assert!(monitor.is_subscribed().await);
}

/// The tree is fetched on later polls when the runner had not scanned yet
#[tokio::test(start_paused = true)]
async fn tc_sync_010_tree_loaded_by_poll_when_late() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    let _feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();
    assert!(monitor.registry().snapshot().focused.unwrap().tree.is_none());
    assert!(monitor.registry().snapshot().focused.unwrap().error.is_none());

    service.set_tree("t1", sample_tree());
    wait_for(&mut rx, |s| s.focused.as_ref().is_some_and(|f| f.tree.is_some())).await;

    let tree_calls = service.tree_calls();
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert_eq!(service.tree_calls(), tree_calls, "tree fetched again once loaded");
}

/// Cancel leaves the local status alone; a rejection is shown on the task
#[tokio::test(start_paused = true)]
async fn tc_sync_011_cancel_is_not_optimistic() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    let _feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    monitor.focus("t1").await.unwrap();

    let message = monitor.cancel("t1").await.unwrap();
    assert_eq!(message, "Task t1 cancelled");
    assert_eq!(monitor.registry().focused_status(), Some(TaskStatus::Running));

    service.reject_cancel("Task cannot be cancelled");
    let err = monitor.cancel("t1").await.unwrap_err();
    assert!(matches!(err, MonitorError::Rejected(_)));
    assert_eq!(
        monitor.registry().snapshot().focused.unwrap().error.as_deref(),
        Some("Rejected: Task cannot be cancelled")
    );

    // The runner confirms through the list
    service.set_list(vec![task("t1", TaskStatus::Cancelled, 0.0)]);
    monitor.refresh_list().await.unwrap();
    assert_eq!(monitor.registry().focused_status(), Some(TaskStatus::Cancelled));
    assert!(!monitor.is_subscribed().await);
}

/// Unknown ids fail with NotFound and leave the focus untouched
#[tokio::test(start_paused = true)]
async fn tc_sync_012_focus_unknown_task() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Completed, 100.0));

    let monitor = monitor(&service, &transport, test_config());
    monitor.focus("t1").await.unwrap();

    let err = monitor.focus("nope").await.unwrap_err();
    assert!(matches!(err, MonitorError::NotFound(_)));
    assert_eq!(monitor.registry().focused_id().as_deref(), Some("t1"));
    assert!(!monitor.is_subscribed().await);
}

/// Starting an analysis refreshes the list; scan and health pass through
#[tokio::test(start_paused = true)]
async fn tc_sync_013_start_scan_health() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    let monitor = monitor(&service, &transport, test_config());

    let request = docwatch_common::api::AnalyzeRequest::new("/src/other");
    let response = monitor.start_analysis(&request).await.unwrap();
    assert_eq!(response.task_id, "new-task");
    let state = monitor.registry().snapshot();
    assert_eq!(state.task("new-task").unwrap().status, TaskStatus::Pending);

    let (tree, stats) = monitor.scan_directory("/src/project").await.unwrap();
    assert_eq!(stats.total_files, 2);
    assert_eq!(tree.summary().files, 2);
    assert!(tree.get("a/b.py").is_some());

    assert_eq!(monitor.health().await.unwrap().status, "healthy");
}

/// File events that land while the tree fetch is in flight survive the older snapshot
#[tokio::test(start_paused = true)]
async fn tc_sync_014_file_event_during_tree_fetch_is_kept() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 0.0));
    let feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();
    assert!(monitor.registry().snapshot().focused.unwrap().tree.is_none());
    wait_for(&mut rx, |s| s.focused.as_ref().is_some_and(|f| f.channel == ChannelState::Open)).await;

    // The poller's tree fetch is held while the runner finishes a file
    let held = service.hold_next_tree();
    held.started.await.unwrap();
    feed.send(PushEvent::FileComplete(FileCompletePayload {
        task_id: "t1".into(),
        file_path: "a/b.py".into(),
        doc_path: Some("/docs/a/b.md".into()),
    }));
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The snapshot predates the event
    held.release.send(sample_tree()).unwrap();
    wait_for(&mut rx, |s| s.focused.as_ref().is_some_and(|f| f.tree.is_some())).await;

    let b_status = |monitor: &TaskMonitor| {
        monitor
            .registry()
            .snapshot()
            .focused
            .and_then(|f| f.tree)
            .and_then(|t| t.get("a/b.py").map(|n| n.status))
    };
    assert_eq!(b_status(&monitor), Some(NodeStatus::Completed));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(b_status(&monitor), Some(NodeStatus::Completed));
    assert_eq!(monitor.registry().focused_status(), Some(TaskStatus::Running));
}

/// After an accepted cancel, the runner's failure event settles the task as Cancelled
#[tokio::test(start_paused = true)]
async fn tc_sync_015_failure_event_after_cancel_means_cancelled() {
    let service = FakeJobService::new();
    let transport = FakePushTransport::new();
    service.set_task(task("t1", TaskStatus::Running, 30.0));
    let feed = transport.queue();

    let monitor = monitor(&service, &transport, test_config());
    let mut rx = monitor.subscribe();
    monitor.focus("t1").await.unwrap();

    monitor.cancel("t1").await.unwrap();
    assert!(monitor.registry().snapshot().focused.unwrap().cancel_requested());

    feed.send(PushEvent::Error(ErrorPayload {
        task_id: "t1".into(),
        error: "任务已取消".into(),
    }));
    wait_for(&mut rx, |s| focused_status(s) == Some(TaskStatus::Cancelled)).await;
    wait_unsubscribed(&monitor).await;

    let focused = monitor.registry().snapshot().focused.unwrap();
    assert!(focused.task.error.is_none());
    assert_eq!(focused.task.progress, 30.0);

    // The list agrees with the runner
    service.set_list(vec![task("t1", TaskStatus::Cancelled, 30.0)]);
    monitor.refresh_list().await.unwrap();
    let state = monitor.registry().snapshot();
    assert_eq!(state.task("t1").unwrap().status, TaskStatus::Cancelled);
}
