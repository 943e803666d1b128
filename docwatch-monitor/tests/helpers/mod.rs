//! Test doubles for the job service and the push channel
//!
//! `FakeJobService` serves scripted tasks and trees and can hold one
//! `get_task` call open until the test releases it. `FakePushTransport`
//! hands out one queued frame stream per connect.

#![allow(dead_code)]

use async_trait::async_trait;
use docwatch_common::api::{
    AnalyzeRequest, AnalyzeResponse, FileNodeDto, HealthResponse, ScanResponse, ScanStats, Task,
    TaskStatus,
};
use docwatch_common::events::{EventEnvelope, PushEvent};
use docwatch_monitor::services::{FrameStream, JobService, PushTransport};
use docwatch_monitor::{MonitorConfig, MonitorError, MonitorResult, RegistryState, TaskMonitor};
use futures::StreamExt;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tokio_stream::wrappers::UnboundedReceiverStream;

pub fn task(id: &str, status: TaskStatus, progress: f64) -> Task {
    let mut task = Task::pending(id, "/src/project");
    task.status = status;
    task.progress = progress;
    task.total_files = 2;
    task
}

pub fn sample_tree() -> FileNodeDto {
    FileNodeDto::directory(
        "",
        vec![FileNodeDto::directory(
            "a",
            vec![FileNodeDto::file("a/b.py"), FileNodeDto::file("a/c.py")],
        )],
    )
}

/// A service call held open by the test until it sends the response
pub struct Held<T> {
    pub started: oneshot::Receiver<()>,
    pub release: oneshot::Sender<T>,
}

pub type HeldPoll = Held<Task>;

struct Hold<T> {
    started: oneshot::Sender<()>,
    release: oneshot::Receiver<T>,
}

impl<T> Hold<T> {
    fn pair() -> (Self, Held<T>) {
        let (started_tx, started_rx) = oneshot::channel();
        let (release_tx, release_rx) = oneshot::channel();
        (
            Hold {
                started: started_tx,
                release: release_rx,
            },
            Held {
                started: started_rx,
                release: release_tx,
            },
        )
    }

    async fn wait(self) -> MonitorResult<T> {
        let _ = self.started.send(());
        self.release
            .await
            .map_err(|_| MonitorError::Transport("held call dropped".into()))
    }
}

#[derive(Default)]
pub struct FakeJobService {
    tasks: Mutex<HashMap<String, Task>>,
    list: Mutex<Option<Vec<Task>>>,
    trees: Mutex<HashMap<String, FileNodeDto>>,
    hold: Mutex<Option<Hold<Task>>>,
    tree_hold: Mutex<Option<Hold<FileNodeDto>>>,
    cancel_error: Mutex<Option<String>>,
    get_calls: AtomicUsize,
    tree_calls: AtomicUsize,
    list_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
}

impl FakeJobService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_task(&self, task: Task) {
        self.tasks.lock().unwrap().insert(task.id.clone(), task);
    }

    /// What `GET /tasks` returns; defaults to every task set with `set_task`
    pub fn set_list(&self, tasks: Vec<Task>) {
        *self.list.lock().unwrap() = Some(tasks);
    }

    pub fn set_tree(&self, id: &str, root: FileNodeDto) {
        self.trees.lock().unwrap().insert(id.to_string(), root);
    }

    pub fn reject_cancel(&self, detail: &str) {
        *self.cancel_error.lock().unwrap() = Some(detail.to_string());
    }

    /// Hold the next `get_task` call until `release` is sent
    pub fn hold_next_poll(&self) -> HeldPoll {
        let (hold, held) = Hold::pair();
        *self.hold.lock().unwrap() = Some(hold);
        held
    }

    /// Hold the next `get_task_tree` call until `release` is sent
    pub fn hold_next_tree(&self) -> Held<FileNodeDto> {
        let (hold, held) = Hold::pair();
        *self.tree_hold.lock().unwrap() = Some(hold);
        held
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn tree_calls(&self) -> usize {
        self.tree_calls.load(Ordering::SeqCst)
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.cancel_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobService for FakeJobService {
    async fn list_tasks(&self) -> MonitorResult<Vec<Task>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(list) = self.list.lock().unwrap().clone() {
            return Ok(list);
        }
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }

    async fn get_task(&self, id: &str) -> MonitorResult<Task> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.hold.lock().unwrap().take();
        if let Some(hold) = hold {
            return hold.wait().await;
        }
        self.tasks
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound(format!("Task {id} not found")))
    }

    async fn cancel_task(&self, id: &str) -> MonitorResult<String> {
        self.cancel_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(detail) = self.cancel_error.lock().unwrap().clone() {
            return Err(MonitorError::Rejected(detail));
        }
        Ok(format!("Task {id} cancelled"))
    }

    async fn get_task_tree(&self, id: &str) -> MonitorResult<FileNodeDto> {
        self.tree_calls.fetch_add(1, Ordering::SeqCst);
        let hold = self.tree_hold.lock().unwrap().take();
        if let Some(hold) = hold {
            return hold.wait().await;
        }
        self.trees
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| MonitorError::NotFound("File tree not available".into()))
    }

    async fn scan_directory(&self, _source_path: &str) -> MonitorResult<ScanResponse> {
        Ok(ScanResponse {
            root: sample_tree(),
            stats: ScanStats {
                total_files: 2,
                total_dirs: 2,
                max_depth: 2,
            },
        })
    }

    async fn start_analysis(&self, request: &AnalyzeRequest) -> MonitorResult<AnalyzeResponse> {
        let created = Task::pending("new-task", request.source_path.clone());
        self.set_task(created);
        Ok(AnalyzeResponse {
            task_id: "new-task".into(),
            message: "Analysis started".into(),
        })
    }

    async fn health(&self) -> MonitorResult<HealthResponse> {
        Ok(HealthResponse {
            status: "healthy".into(),
            timestamp: None,
        })
    }
}

/// Sending half of one scripted push channel
#[derive(Clone)]
pub struct PushFeed(mpsc::UnboundedSender<MonitorResult<String>>);

impl PushFeed {
    pub fn send(&self, event: PushEvent) {
        let frame = EventEnvelope::new(event).to_json().unwrap();
        self.send_raw(&frame);
    }

    pub fn send_raw(&self, frame: &str) {
        let _ = self.0.send(Ok(frame.to_string()));
    }

    pub fn fail(&self) {
        let _ = self.0.send(Err(MonitorError::Transport("connection reset".into())));
    }
}

#[derive(Default)]
pub struct FakePushTransport {
    streams: Mutex<VecDeque<UnboundedReceiverStream<MonitorResult<String>>>>,
    connects: AtomicUsize,
}

impl FakePushTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a stream for the next connect
    pub fn queue(&self) -> PushFeed {
        let (tx, rx) = mpsc::unbounded_channel();
        self.streams
            .lock()
            .unwrap()
            .push_back(UnboundedReceiverStream::new(rx));
        PushFeed(tx)
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PushTransport for FakePushTransport {
    async fn connect(&self, _task_id: &str) -> MonitorResult<FrameStream> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        match self.streams.lock().unwrap().pop_front() {
            Some(stream) => Ok(stream.boxed()),
            None => Err(MonitorError::Transport("connection refused".into())),
        }
    }
}

pub fn test_config() -> MonitorConfig {
    MonitorConfig {
        base_url: "http://127.0.0.1:8000/api".into(),
        poll_interval: Duration::from_secs(3),
        channel_enabled: true,
        max_reconnects: 0,
        reconnect_delay: Duration::from_millis(500),
    }
}

pub fn monitor(
    service: &Arc<FakeJobService>,
    transport: &Arc<FakePushTransport>,
    config: MonitorConfig,
) -> TaskMonitor {
    let transport: Arc<dyn PushTransport> = transport.clone();
    TaskMonitor::new(service.clone(), Some(transport), config)
}

/// Wait (in virtual time) until `predicate` holds for the published state
pub async fn wait_for(
    rx: &mut watch::Receiver<RegistryState>,
    predicate: impl Fn(&RegistryState) -> bool,
) {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if predicate(&rx.borrow_and_update()) {
                return;
            }
            rx.changed().await.unwrap();
        }
    })
    .await
    .expect("state condition not reached");
}

pub fn focused_progress(state: &RegistryState) -> f64 {
    state.focused.as_ref().map_or(-1.0, |f| f.task.progress)
}

pub fn focused_status(state: &RegistryState) -> Option<TaskStatus> {
    state.focused.as_ref().map(|f| f.task.status)
}
