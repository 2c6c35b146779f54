//! Best-effort progress channel keyed by scan session.
//!
//! Progress is advisory: nothing in the pipeline reads it back, and a failed
//! publish is logged and dropped. Late subscribers miss earlier events.

use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::models::progress::ProgressEvent;

pub type ProgressStream = BoxStream<'static, ProgressEvent>;

#[async_trait]
pub trait ProgressChannel: Send + Sync {
    async fn publish(&self, session_id: &str, event: &ProgressEvent) -> Result<(), ProgressError>;

    /// Stream of events published after this call, ending after a terminal event.
    async fn subscribe(&self, session_id: &str) -> Result<ProgressStream, ProgressError>;
}

/// Publish without letting a failure reach the caller.
pub async fn publish_lossy(channel: &dyn ProgressChannel, session_id: &str, event: ProgressEvent) {
    if let Err(e) = channel.publish(session_id, &event).await {
        tracing::warn!(
            session_id,
            stage = %event.stage,
            error = %e,
            "Failed to publish progress update"
        );
    }
}

fn channel_name(session_id: &str) -> String {
    format!("scan_progress:{session_id}")
}

/// Ends the stream right after the first terminal event.
fn until_terminal(stream: impl futures::Stream<Item = ProgressEvent> + Send + 'static) -> ProgressStream {
    stream
        .scan(false, |finished, event| {
            let next = if *finished {
                None
            } else {
                *finished = event.is_terminal();
                Some(event)
            };
            futures::future::ready(next)
        })
        .boxed()
}

/// Redis pub/sub progress channel (`scan_progress:{session}`).
pub struct RedisProgressChannel {
    client: redis::Client,
    conn: ConnectionManager,
}

impl RedisProgressChannel {
    pub async fn connect(redis_url: &str) -> Result<Self, ProgressError> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        Ok(Self { client, conn })
    }
}

#[async_trait]
impl ProgressChannel for RedisProgressChannel {
    async fn publish(&self, session_id: &str, event: &ProgressEvent) -> Result<(), ProgressError> {
        let mut conn = self.conn.clone();
        let payload = serde_json::to_string(event)?;
        conn.publish::<_, _, ()>(channel_name(session_id), payload)
            .await?;
        Ok(())
    }

    async fn subscribe(&self, session_id: &str) -> Result<ProgressStream, ProgressError> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(channel_name(session_id)).await?;

        let events = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str::<ProgressEvent>(&payload).ok()
        });
        Ok(until_terminal(events))
    }
}

/// In-process progress channel over `tokio::sync::broadcast`, one sender per session.
pub struct BroadcastProgressChannel {
    capacity: usize,
    senders: Mutex<HashMap<String, broadcast::Sender<ProgressEvent>>>,
}

impl BroadcastProgressChannel {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            senders: Mutex::new(HashMap::new()),
        }
    }
}

impl Default for BroadcastProgressChannel {
    fn default() -> Self {
        Self::new(64)
    }
}

#[async_trait]
impl ProgressChannel for BroadcastProgressChannel {
    async fn publish(&self, session_id: &str, event: &ProgressEvent) -> Result<(), ProgressError> {
        let mut senders = self.senders.lock().map_err(|_| ProgressError::Poisoned)?;
        if let Some(tx) = senders.get(session_id) {
            // No receivers is fine: nobody is watching.
            let _ = tx.send(event.clone());
        }
        if event.is_terminal() {
            senders.remove(session_id);
        }
        Ok(())
    }

    async fn subscribe(&self, session_id: &str) -> Result<ProgressStream, ProgressError> {
        let rx = {
            let mut senders = self.senders.lock().map_err(|_| ProgressError::Poisoned)?;
            senders
                .entry(session_id.to_string())
                .or_insert_with(|| broadcast::channel(self.capacity).0)
                .subscribe()
        };

        let events = BroadcastStream::new(rx).filter_map(|result| async move {
            match result {
                Ok(event) => Some(event),
                Err(e) => {
                    tracing::warn!(error = ?e, "Progress subscriber lagged");
                    None
                }
            }
        });
        Ok(until_terminal(events))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Progress channel lock poisoned")]
    Poisoned,
}
