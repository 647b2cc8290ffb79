//! In-process, topic-filtered publish/subscribe bus.
//!
//! Uses a [`tokio::sync::broadcast`] channel under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others. Subscribers filter by MQTT-style topic filters.
//!
//! The bus is a loopback: anything the bridge publishes is visible to every
//! in-process subscriber whose filters match, which is what tests and the
//! broker-less mode rely on.

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use hearth_types::{BusMessage, HearthError};
use tokio::sync::broadcast;
use tracing::warn;

use crate::adapter::BusAdapter;
use crate::topic::topic_matches;

/// Default channel capacity (number of buffered messages before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Shared in-memory bus. Clone it cheaply – all clones share the same
/// underlying broadcast channel.
#[derive(Clone, Debug)]
pub struct MemoryBus {
    sender: broadcast::Sender<BusMessage>,
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish synchronously.
    ///
    /// Returns the number of subscribers that were handed the message; `0`
    /// when nobody is listening, which is a normal condition for a
    /// fire-and-forget bus.
    pub fn send(&self, message: BusMessage) -> usize {
        self.sender.send(message).unwrap_or(0)
    }

    /// Subscribe to every message matching any of `filters`.
    pub fn subscribe_filtered(&self, filters: Vec<String>) -> MessageSubscriber {
        MessageSubscriber {
            filters,
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl BusAdapter for MemoryBus {
    async fn publish(&self, message: BusMessage) -> Result<(), HearthError> {
        self.send(message);
        Ok(())
    }

    async fn subscribe(
        &self,
        filters: Vec<String>,
    ) -> Result<BoxStream<'static, BusMessage>, HearthError> {
        Ok(self.subscribe_filtered(filters).into_stream())
    }
}

// ---------------------------------------------------------------------------
// Filtered subscriber
// ---------------------------------------------------------------------------

/// A subscriber that only delivers messages whose topic matches one of its
/// filters.
pub struct MessageSubscriber {
    filters: Vec<String>,
    receiver: broadcast::Receiver<BusMessage>,
}

impl MessageSubscriber {
    /// Wait for the next matching message.
    ///
    /// Returns `None` when the bus is closed and no further messages will
    /// arrive.
    pub async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(message) if self.accepts(&message.topic) => return Some(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(lagged_by = n, "bus subscriber lagged; messages dropped");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    pub fn accepts(&self, topic: &str) -> bool {
        self.filters.iter().any(|filter| topic_matches(filter, topic))
    }

    pub fn into_stream(self) -> BoxStream<'static, BusMessage> {
        stream::unfold(self, |mut subscriber| async move {
            subscriber.recv().await.map(|message| (message, subscriber))
        })
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filters(list: &[&str]) -> Vec<String> {
        list.iter().map(|f| f.to_string()).collect()
    }

    #[tokio::test]
    async fn publish_and_receive() {
        let bus = MemoryBus::default();
        let mut sub = bus.subscribe_filtered(filters(&["home/#"]));

        let message = BusMessage::new("home/lights/kitchen/state", "ON");
        assert_eq!(bus.send(message.clone()), 1);
        assert_eq!(sub.recv().await, Some(message));
    }

    #[tokio::test]
    async fn subscriber_filters_by_topic() {
        let bus = MemoryBus::default();
        let mut sub = bus.subscribe_filtered(filters(&["home/lights/+/state"]));

        bus.send(BusMessage::new("home/lights/kitchen/set", "ON"));
        let good = BusMessage::new("home/lights/garden/state", "OFF");
        bus.send(good.clone());

        assert_eq!(sub.recv().await, Some(good));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_message() {
        let bus = MemoryBus::default();
        let mut first = bus.subscribe_filtered(filters(&["#"]));
        let mut second = bus.subscribe_filtered(filters(&["#"]));

        let message = BusMessage::new("home/sensors/humidity", "50");
        bus.send(message.clone());

        assert_eq!(first.recv().await, Some(message.clone()));
        assert_eq!(second.recv().await, Some(message));
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_not_an_error() {
        let bus = MemoryBus::default();
        assert_eq!(bus.send(BusMessage::new("home/x", "1")), 0);
        assert!(bus.publish(BusMessage::new("home/x", "1")).await.is_ok());
    }

    #[tokio::test]
    async fn adapter_stream_yields_matching_messages() {
        let bus = MemoryBus::default();
        let mut stream = bus.subscribe(filters(&["home/sensors/+"])).await.unwrap();

        bus.publish(BusMessage::new("home/lights/a/state", "ON")).await.unwrap();
        bus.publish(BusMessage::new("home/sensors/light", "12")).await.unwrap();

        let next = stream.next().await.unwrap();
        assert_eq!(next.topic, "home/sensors/light");
    }

    #[tokio::test]
    async fn slow_subscriber_skips_lagged_messages() {
        let bus = MemoryBus::new(4);
        let mut sub = bus.subscribe_filtered(filters(&["#"]));
        for i in 0..16 {
            bus.send(BusMessage::new("home/sensors/light", i.to_string()));
        }
        // The oldest messages were dropped; the subscriber resumes with the
        // newest retained one instead of failing.
        let message = sub.recv().await.unwrap();
        assert_eq!(message.payload_text(), "12");
    }
}
