//! Background tasks connecting the core to a [`BusAdapter`].
//!
//! - [`run_inbound`] feeds every message from the adapter's subscription
//!   stream into [`BridgeCore::ingest`].
//! - [`run_outbound`] drains the core's command queue into
//!   [`BusAdapter::publish`]. A failed publish is logged and dropped; the
//!   command is not retried and the state that triggered it stays applied.
//!
//! Both stop when their source ends or `cancel` fires.

use std::sync::Arc;

use futures_util::StreamExt;
use futures_util::stream::BoxStream;
use hearth_middleware::BusAdapter;
use hearth_types::{BusMessage, HearthError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::BridgeCore;

/// Subscribe `bus` to every inbound topic the core understands.
pub async fn subscribe_inbound(
    core: &BridgeCore,
    bus: &dyn BusAdapter,
) -> Result<BoxStream<'static, BusMessage>, HearthError> {
    let filters = core.translator().subscriptions();
    info!(filters = ?filters, "subscribing to hardware topics");
    bus.subscribe(filters).await
}

pub async fn run_inbound(
    core: Arc<BridgeCore>,
    mut messages: BoxStream<'static, BusMessage>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = messages.next() => match message {
                Some(message) => {
                    core.ingest(&message.topic, &message.payload);
                }
                None => {
                    warn!("inbound bus stream ended");
                    break;
                }
            },
        }
    }
    debug!("inbound pump stopped");
}

pub async fn run_outbound(
    mut commands: mpsc::UnboundedReceiver<BusMessage>,
    bus: Arc<dyn BusAdapter>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            command = commands.recv() => {
                let Some(command) = command else { break };
                let topic = command.topic.clone();
                match bus.publish(command).await {
                    Ok(()) => debug!(topic = %topic, "command published"),
                    Err(e) => warn!(topic = %topic, error = %e, "command publish failed; not retried"),
                }
            }
        }
    }
    debug!("outbound pump stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;
    use hearth_middleware::MemoryBus;
    use hearth_types::DeviceState;
    use serde_json::json;

    struct FailingBus;

    #[async_trait]
    impl BusAdapter for FailingBus {
        async fn publish(&self, _message: BusMessage) -> Result<(), HearthError> {
            Err(HearthError::Bus("broker unreachable".into()))
        }

        async fn subscribe(
            &self,
            _filters: Vec<String>,
        ) -> Result<BoxStream<'static, BusMessage>, HearthError> {
            Ok(futures_util::stream::empty().boxed())
        }
    }

    async fn eventually(mut check: impl FnMut() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn inbound_pump_applies_bus_messages() {
        let bus = MemoryBus::default();
        let (core, _commands) = BridgeCore::new(DeviceState::default(), "home", 16);
        let stream = subscribe_inbound(&core, &bus).await.unwrap();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_inbound(Arc::clone(&core), stream, cancel.clone()));

        bus.send(BusMessage::new("home/lights/garage/state", "ON"));
        bus.send(BusMessage::new("home/sensors/humidity", "58"));
        eventually(|| core.snapshot().sensors.humidity == 58.0).await;
        assert!(core.snapshot().lights["garage"]);

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn outbound_pump_publishes_commands() {
        let bus = MemoryBus::default();
        let mut watcher = bus.subscribe_filtered(vec!["home/+/+/set".to_string()]);
        let (core, commands) = BridgeCore::new(DeviceState::default(), "home", 16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_outbound(commands, Arc::new(bus), cancel.clone()));

        core.apply_write("appliances", "ac", &json!("ON")).unwrap();
        let published = tokio::time::timeout(Duration::from_secs(1), watcher.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(published.topic, "home/appliances/ac/set");
        assert_eq!(published.payload_text(), "ON");

        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn publish_failure_keeps_state_and_pump_alive() {
        let (core, commands) = BridgeCore::new(DeviceState::default(), "home", 16);
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_outbound(commands, Arc::new(FailingBus), cancel.clone()));

        core.apply_write("lights", "garden", &json!(true)).unwrap();
        core.apply_write("lights", "garden", &json!(false)).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!core.snapshot().lights["garden"]);
        assert!(!task.is_finished());
        cancel.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn writes_and_confirmations_do_not_loop() {
        // Commands go out on `/set`, reports come back on `/state`; the
        // inbound subscription never sees the bridge's own commands.
        let bus = Arc::new(MemoryBus::default());
        let (core, commands) = BridgeCore::new(DeviceState::default(), "home", 16);
        let stream = subscribe_inbound(&core, bus.as_ref()).await.unwrap();
        let mut commands_seen = bus.subscribe_filtered(vec!["home/#".to_string()]);
        let cancel = CancellationToken::new();
        let inbound = tokio::spawn(run_inbound(Arc::clone(&core), stream, cancel.clone()));
        let outbound = tokio::spawn(run_outbound(commands, bus.clone(), cancel.clone()));

        core.apply_write("security", "back", &json!(false)).unwrap();
        let first = commands_seen.recv().await.unwrap();
        assert_eq!(first.topic, "home/security/doors/back/set");

        bus.send(BusMessage::new("home/security/doors/back/state", "UNLOCKED"));
        let confirmation = commands_seen.recv().await.unwrap();
        assert_eq!(confirmation.topic, "home/security/doors/back/state");
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(
            tokio::time::timeout(Duration::from_millis(50), commands_seen.recv())
                .await
                .is_err(),
            "no further bus traffic expected"
        );
        assert!(!core.snapshot().security.doors["back"]);

        cancel.cancel();
        inbound.await.unwrap();
        outbound.await.unwrap();
    }
}
