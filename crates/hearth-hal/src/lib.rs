//! `hearth-hal` – Hardware stand-ins
//!
//! Lets the bridge run end-to-end on a desk with no sensor nodes attached.
//!
//! - [`sim`] – [`SensorSimulator`][sim::SensorSimulator]: a random-walk
//!   environment model that publishes sensor reports through the same
//!   decode → apply path real hardware uses.

pub mod sim;

pub use sim::SensorSimulator;
