//! `hearth-cockpit` – Read/Write API & Viewer Channels
//!
//! Boots a lightweight HTTP + WebSocket server (default port `5000`) that:
//!
//! 1. **Answers** the read/write API: full-state and sensor reads, and
//!    writer updates addressed as `/api/devices/{category}/{device}`.
//!
//! 2. **Pushes** state to every connected viewer over a persistent
//!    WebSocket: a `deviceState` snapshot on connect, then `deviceUpdate`
//!    and `sensorUpdate` frames for every accepted change.
//!
//! 3. **Accepts** upstream `deviceCommand` frames from viewers and applies
//!    them exactly like `POST` writes; rejections come back as
//!    `commandError` on the same connection.
//!
//! # Usage
//!
//! ```rust,no_run
//! use hearth_cockpit::ApiServer;
//! use hearth_kernel::BridgeCore;
//! use hearth_types::DeviceState;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() {
//!     let (core, _commands) = BridgeCore::new(DeviceState::default(), "home", 256);
//!     ApiServer::new(core)
//!         .run(CancellationToken::new())
//!         .await
//!         .expect("API server failed");
//! }
//! ```

pub mod http;
pub mod routes;
pub mod server;
mod ws;

pub use server::{ApiServer, DEFAULT_PORT};
