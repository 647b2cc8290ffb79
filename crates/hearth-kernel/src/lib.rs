//! `hearth-kernel` – State Core & Fan-out
//!
//! Owns the one authoritative copy of the home's device state and decides,
//! for every incoming change, what the rest of the system gets to see.
//!
//! # Modules
//!
//! - [`bridge`] – [`BridgeCore`][bridge::BridgeCore]: the single mutation
//!   gateway. Hardware reports and writer commands both pass through it;
//!   it enforces the frozen schema, applies the no-op policy, derives the
//!   aggregate motion flag and queues actuator commands.
//! - [`hub`] – [`ViewerHub`][hub::ViewerHub]: bounded per-viewer queues with
//!   eviction of viewers that fall behind.
//! - [`pump`] – the inbound and outbound tasks that connect the core to a
//!   [`BusAdapter`][hearth_middleware::BusAdapter].

pub mod bridge;
pub mod hub;
pub mod pump;

pub use bridge::{BridgeCore, WriteAck};
pub use hub::{DEFAULT_VIEWER_CAPACITY, ViewerHub, ViewerId, ViewerSubscription};
pub use pump::{run_inbound, run_outbound, subscribe_inbound};
