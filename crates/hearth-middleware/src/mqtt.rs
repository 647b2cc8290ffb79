//! MQTT transport.
//!
//! [`MqttBus`] is the [`BusAdapter`] used against a real broker. It is split
//! in two halves by [`MqttBus::connect`]:
//!
//! * the **bus** – cheap to share; publishes with `try_publish` (QoS 0, not
//!   retained) so a dead broker can never block the caller, and hands out
//!   filtered inbound streams;
//! * the **driver** – owns the `rumqttc` event loop and must be spawned. It
//!   forwards incoming publishes to the bus, re-subscribes after every
//!   (re)connect, and backs off on connection errors.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use hearth_types::{BusMessage, HearthError};
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use crate::adapter::BusAdapter;
use crate::bus::MemoryBus;

pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Capacity of the request channel between the client and the event loop.
const REQUEST_CAPACITY: usize = 64;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Connection parameters for [`MqttBus::connect`].
#[derive(Debug, Clone)]
pub struct MqttSettings {
    /// `mqtt://host[:port]`
    pub url: String,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl MqttSettings {
    pub fn new(url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client_id: client_id.into(),
            keep_alive: Duration::from_secs(30),
        }
    }
}

/// Split a broker URL into host and port.
///
/// Accepts the `mqtt` and `tcp` schemes; the port defaults to 1883.
pub fn parse_broker_url(raw: &str) -> Result<(String, u16), HearthError> {
    let url = Url::parse(raw)
        .map_err(|e| HearthError::Config(format!("invalid MQTT url '{raw}': {e}")))?;
    if !matches!(url.scheme(), "mqtt" | "tcp") {
        return Err(HearthError::Config(format!(
            "unsupported MQTT url scheme '{}' (expected mqtt:// or tcp://)",
            url.scheme()
        )));
    }
    let host = url
        .host_str()
        .filter(|host| !host.is_empty())
        .ok_or_else(|| HearthError::Config(format!("MQTT url '{raw}' has no host")))?;
    Ok((host.to_string(), url.port().unwrap_or(DEFAULT_MQTT_PORT)))
}

/// Filters requested so far; replayed after every reconnect.
type FilterSet = Arc<Mutex<Vec<String>>>;

/// MQTT-backed [`BusAdapter`].
#[derive(Clone)]
pub struct MqttBus {
    client: AsyncClient,
    incoming: MemoryBus,
    filters: FilterSet,
}

impl MqttBus {
    /// Build the client and its event-loop driver.
    ///
    /// No network I/O happens until the returned [`MqttDriver`] is run.
    pub fn connect(settings: &MqttSettings) -> Result<(Self, MqttDriver), HearthError> {
        let (host, port) = parse_broker_url(&settings.url)?;
        let mut options = MqttOptions::new(settings.client_id.clone(), host, port);
        options.set_keep_alive(settings.keep_alive);
        options.set_clean_session(true);

        let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);
        let incoming = MemoryBus::default();
        let filters: FilterSet = Arc::default();

        let bus = Self {
            client: client.clone(),
            incoming: incoming.clone(),
            filters: Arc::clone(&filters),
        };
        let driver = MqttDriver {
            client,
            eventloop,
            incoming,
            filters,
            url: settings.url.clone(),
        };
        Ok((bus, driver))
    }
}

#[async_trait]
impl BusAdapter for MqttBus {
    async fn publish(&self, message: BusMessage) -> Result<(), HearthError> {
        self.client
            .try_publish(message.topic, QoS::AtMostOnce, false, message.payload)
            .map_err(|e| HearthError::Bus(format!("MQTT publish failed: {e}")))
    }

    async fn subscribe(
        &self,
        filters: Vec<String>,
    ) -> Result<BoxStream<'static, BusMessage>, HearthError> {
        // Register before subscribing so a ConnAck racing with this call
        // replays the new filters too.
        self.filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(filters.iter().cloned());
        for filter in &filters {
            self.client
                .try_subscribe(filter.clone(), QoS::AtMostOnce)
                .map_err(|e| HearthError::Bus(format!("MQTT subscribe to {filter} failed: {e}")))?;
        }
        Ok(self.incoming.subscribe_filtered(filters).into_stream())
    }
}

/// Owns the `rumqttc` event loop. Run it on its own task.
pub struct MqttDriver {
    client: AsyncClient,
    eventloop: EventLoop,
    incoming: MemoryBus,
    filters: FilterSet,
    url: String,
}

impl MqttDriver {
    /// Poll the connection until `cancel` fires.
    ///
    /// Connection errors are logged and retried after a short delay; the
    /// event loop reconnects on the next poll.
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    let _ = self.client.try_disconnect();
                    break;
                }
                event = self.eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        let message = BusMessage::new(publish.topic, publish.payload.to_vec());
                        self.incoming.send(message);
                    }
                    Ok(Event::Incoming(Packet::ConnAck(_))) => {
                        info!(url = %self.url, "connected to MQTT broker");
                        self.resubscribe();
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(url = %self.url, error = %e, "MQTT connection error; retrying");
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(RECONNECT_DELAY) => {}
                        }
                    }
                },
            }
        }
        debug!("MQTT driver stopped");
    }

    fn resubscribe(&self) {
        let filters = self
            .filters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for filter in filters {
            if let Err(e) = self.client.try_subscribe(filter.clone(), QoS::AtMostOnce) {
                warn!(filter = %filter, error = %e, "MQTT re-subscribe failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn broker_url_defaults_port() {
        assert_eq!(
            parse_broker_url("mqtt://localhost").unwrap(),
            ("localhost".to_string(), 1883)
        );
        assert_eq!(
            parse_broker_url("tcp://10.0.0.5:2883").unwrap(),
            ("10.0.0.5".to_string(), 2883)
        );
    }

    #[test]
    fn broker_url_rejects_other_schemes() {
        assert!(matches!(
            parse_broker_url("http://localhost:1883"),
            Err(HearthError::Config(_))
        ));
        assert!(matches!(parse_broker_url("not a url"), Err(HearthError::Config(_))));
    }

    #[tokio::test]
    async fn connect_builds_without_network_io() {
        let settings = MqttSettings::new("mqtt://127.0.0.1:1", "hearth-test");
        let (bus, _driver) = MqttBus::connect(&settings).unwrap();
        // Publishing only enqueues a request; it must not block or fail while
        // the driver is not running.
        assert!(
            bus.publish(BusMessage::new("home/lights/kitchen/set", "ON"))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn subscribe_records_filters_for_replay() {
        let settings = MqttSettings::new("mqtt://127.0.0.1:1", "hearth-test");
        let (bus, driver) = MqttBus::connect(&settings).unwrap();
        let _stream = bus
            .subscribe(vec!["home/lights/+/state".to_string()])
            .await
            .unwrap();
        let recorded = driver.filters.lock().unwrap().clone();
        assert_eq!(recorded, vec!["home/lights/+/state".to_string()]);
    }

    #[tokio::test]
    async fn driver_stops_on_cancel() {
        let settings = MqttSettings::new("mqtt://127.0.0.1:1", "hearth-test");
        let (_bus, driver) = MqttBus::connect(&settings).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), driver.run(cancel))
            .await
            .expect("driver must exit once cancelled");
    }
}
