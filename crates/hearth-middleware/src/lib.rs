//! `hearth-middleware` – wire plumbing between hardware and the bridge.
//!
//! Routes raw pub/sub traffic in and out of the bridge without owning any
//! state.
//!
//! # Modules
//!
//! - [`payload`] – structured payload decode with raw-string fallback, and
//!   the table-driven normalization of wire encodings into typed values.
//! - [`topic`] – [`TopicTranslator`]: inbound topic patterns → [`Update`]s,
//!   and writer updates → outbound command messages.
//! - [`adapter`] – the [`BusAdapter`] trait every transport implements.
//! - [`bus`] – [`MemoryBus`], an in-process broadcast bus.
//! - [`mqtt`] – [`MqttBus`], the MQTT transport built on `rumqttc`.
//!
//! [`Update`]: hearth_types::Update

pub mod adapter;
pub mod bus;
pub mod mqtt;
pub mod payload;
pub mod topic;

pub use adapter::BusAdapter;
pub use bus::{MemoryBus, MessageSubscriber};
pub use mqtt::{MqttBus, MqttDriver, MqttSettings};
pub use topic::{TopicTranslator, topic_matches};
