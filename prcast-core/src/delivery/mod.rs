//! Real-time delivery to connected clients.
//!
//! [`ChannelRegistry`] maps usernames to the delivery channels of their open
//! connections; [`Notifier`] decides who gets what and pushes through it.
//! The WebSocket layer owns the receiving half of each channel.

pub mod channels;
pub mod notifier;

pub use channels::{
    ChannelRegistry, ConnectionId, DeliveryReceiver, DeliverySender, connection_channel,
};
pub use notifier::{Notifier, NotifyError};
