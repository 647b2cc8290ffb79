//! The bus adapter seam.
//!
//! The bridge never speaks MQTT directly. It hands [`BusMessage`]s to a
//! [`BusAdapter`] and consumes the adapter's inbound stream; the adapter
//! owns the transport.
//!
//! - [`MemoryBus`][crate::bus::MemoryBus] – in-process loopback, used in tests
//!   and when no broker is configured.
//! - [`MqttBus`][crate::mqtt::MqttBus] – an MQTT broker via `rumqttc`.

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use hearth_types::{BusMessage, HearthError};

/// Every pub/sub transport must implement this trait.
///
/// # Contract
///
/// * `publish` – fire-and-forget. It must not wait for delivery or an
///   acknowledgment; an `Err` only reports that the message could not be
///   handed to the transport.
///
/// * `subscribe` – returns a live stream of every message whose topic
///   matches one of `filters` (MQTT wildcard syntax).
#[async_trait]
pub trait BusAdapter: Send + Sync {
    async fn publish(&self, message: BusMessage) -> Result<(), HearthError>;

    async fn subscribe(
        &self,
        filters: Vec<String>,
    ) -> Result<BoxStream<'static, BusMessage>, HearthError>;
}
