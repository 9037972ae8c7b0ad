//! WebSocket bus, task-delivery wiring, and command surface for ArqonBus.
//!
//! This crate owns the one piece none of its dependencies can: a live
//! connection. [`state::GatewayState`] bundles every subsystem crate into
//! one shared handle; [`connection`] drives a single socket's
//! ACCEPT → AUTH → READY state machine against it; [`commands`] implements
//! the command surface; [`server`] boots the `axum` app and listener.

pub mod auth;
pub mod casil_gate;
pub mod commands;
pub mod connection;
pub mod error;
pub mod server;
pub mod state;
pub mod telemetry_fanout;

pub use error::{Error, Result};
pub use state::GatewayState;
