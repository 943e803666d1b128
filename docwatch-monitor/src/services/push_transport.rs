//! Push channel transport
//!
//! A transport yields the raw text frames of one task's push channel. The
//! stream ending (or yielding an error) means the channel is closed.

use crate::error::{MonitorError, MonitorResult};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

/// Text frames of one push channel
pub type FrameStream = BoxStream<'static, MonitorResult<String>>;

/// Opens push channels
#[async_trait]
pub trait PushTransport: Send + Sync {
    async fn connect(&self, task_id: &str) -> MonitorResult<FrameStream>;
}

/// WebSocket transport: `ws://<host>/api/ws/{task_id}`
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    ws_base: String,
}

impl WebSocketTransport {
    /// Derive the socket root from the REST root (`http` → `ws`, `https` → `wss`)
    pub fn from_base_url(base_url: &str) -> MonitorResult<Self> {
        let base = base_url.trim_end_matches('/');
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            return Err(MonitorError::Config(format!(
                "cannot derive push endpoint from {base_url:?}"
            )));
        };
        Ok(Self { ws_base })
    }

    pub fn url_for(&self, task_id: &str) -> String {
        format!("{}/ws/{}", self.ws_base, task_id)
    }
}

#[async_trait]
impl PushTransport for WebSocketTransport {
    async fn connect(&self, task_id: &str) -> MonitorResult<FrameStream> {
        let url = self.url_for(task_id);
        tracing::debug!(task_id = %task_id, url = %url, "Opening push channel");

        let (ws, _response) = connect_async(url.as_str()).await?;
        let (_sink, stream) = ws.split();

        // Only text frames carry events; a close frame ends the stream.
        let frames = stream
            .take_while(|msg| futures::future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => Some(Ok(text)),
                    Ok(_) => None,
                    Err(e) => Some(Err(MonitorError::from(e))),
                }
            });

        Ok(frames.boxed())
    }
}
