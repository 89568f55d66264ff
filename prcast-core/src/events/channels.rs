//! Channel factories for the background processors.

use super::types::ResyncRequest;
use tokio::sync::mpsc;

/// Default buffer size for event channels.
///
/// Also the default per-connection delivery buffer.
pub const DEFAULT_CHANNEL_BUFFER: usize = 256;

/// Sender handle for ResyncRequest events.
pub type ResyncSender = mpsc::Sender<ResyncRequest>;
/// Receiver handle for ResyncRequest events.
pub type ResyncReceiver = mpsc::Receiver<ResyncRequest>;

/// Create a new ResyncRequest channel.
pub fn resync_channel() -> (ResyncSender, ResyncReceiver) {
    mpsc::channel(DEFAULT_CHANNEL_BUFFER)
}
