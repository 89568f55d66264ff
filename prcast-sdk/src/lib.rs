//! Shared types for prcast.
//!
//! `objects` holds the domain and wire types exchanged between the relay
//! server and its WebSocket clients. The `client` feature adds a typed
//! WebSocket client built on `tokio-tungstenite`.

pub mod objects;

#[cfg(feature = "client")]
pub mod client;
