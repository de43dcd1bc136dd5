//! Per-channel fan-out of dispatched jobs to WebSocket connections.
//!
//! Each channel owns one `broadcast` sender; every connection on that
//! channel holds a receiver. A slow connection lags on its own receiver and
//! never holds up the dispatcher or its neighbours.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{broadcast, RwLock};
use tracing::debug;

use fairshare_queue::{JobPublisher, PublishError};

/// Buffered dispatches per channel before a lagging connection misses some.
const CHANNEL_CAPACITY: usize = 1024;

pub struct ChannelRouter {
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
    capacity: usize,
}

impl Default for ChannelRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelRouter {
    pub fn new() -> Self {
        Self::with_capacity(CHANNEL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: RwLock::new(HashMap::new()),
            capacity,
        }
    }

    /// Start receiving everything published to `channel`.
    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = self.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Forget `channel` once its last receiver has been dropped.
    pub async fn prune(&self, channel: &str) {
        let mut channels = self.channels.write().await;
        if channels
            .get(channel)
            .is_some_and(|tx| tx.receiver_count() == 0)
        {
            channels.remove(channel);
            debug!(channel, "channel has no subscribers, removed");
        }
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .await
            .get(channel)
            .map_or(0, broadcast::Sender::receiver_count)
    }
}

#[async_trait]
impl JobPublisher for ChannelRouter {
    async fn publish(&self, channel: &str, payload: String) -> Result<usize, PublishError> {
        let channels = self.channels.read().await;
        let Some(tx) = channels.get(channel) else {
            debug!(channel, "publish to channel without subscribers");
            return Ok(0);
        };
        // A send error only means every receiver is gone.
        Ok(tx.send(payload).unwrap_or(0))
    }
}
