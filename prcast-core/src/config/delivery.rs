//! Real-time delivery configuration.

use crate::events::DEFAULT_CHANNEL_BUFFER;

/// Settings for per-connection delivery channels.
#[derive(Debug, Clone, Copy)]
pub struct DeliveryConfig {
    /// Messages buffered per connection before new pushes to it are dropped.
    pub channel_buffer: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            channel_buffer: DEFAULT_CHANNEL_BUFFER,
        }
    }
}
