//! Username to connection multimap.
//!
//! One user may hold several connections (tabs, devices); a push to the
//! user reaches all of them. Each connection is registered under at most
//! one username at a time.

use compact_str::CompactString;
use prcast_sdk::objects::ServerMessage;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Identifies one client connection.
pub type ConnectionId = Uuid;
/// Sender half of a connection's delivery channel.
pub type DeliverySender = mpsc::Sender<ServerMessage>;
/// Receiver half, drained by the connection task.
pub type DeliveryReceiver = mpsc::Receiver<ServerMessage>;

/// Create a delivery channel for one connection.
pub fn connection_channel(buffer: usize) -> (DeliverySender, DeliveryReceiver) {
    mpsc::channel(buffer.max(1))
}

#[derive(Default)]
struct Groups {
    by_user: HashMap<CompactString, HashMap<ConnectionId, DeliverySender>>,
    owner: HashMap<ConnectionId, CompactString>,
}

impl Groups {
    fn detach(&mut self, connection: &ConnectionId) -> Option<CompactString> {
        let username = self.owner.remove(connection)?;
        if let Some(group) = self.by_user.get_mut(&username) {
            group.remove(connection);
            if group.is_empty() {
                self.by_user.remove(&username);
            }
        }
        Some(username)
    }
}

/// Shared registry of open delivery channels, grouped by username.
///
/// Cloning is cheap; all clones share the same groups.
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    groups: Arc<RwLock<Groups>>,
    closed: Arc<AtomicBool>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `connection` to `username`'s group, moving it out of any group it
    /// joined earlier.
    ///
    /// Returns `false` once the registry is closed.
    pub async fn register(
        &self,
        username: &str,
        connection: ConnectionId,
        sender: DeliverySender,
    ) -> bool {
        let mut groups = self.groups.write().await;
        if self.closed.load(Ordering::Acquire) {
            return false;
        }
        if let Some(previous) = groups.detach(&connection) {
            debug!(%connection, %previous, "Connection re-introduced");
        }
        let username = CompactString::from(username);
        groups
            .by_user
            .entry(username.clone())
            .or_default()
            .insert(connection, sender);
        groups.owner.insert(connection, username);
        true
    }

    /// Remove `connection`, returning the username it was registered under.
    pub async fn unregister(&self, connection: &ConnectionId) -> Option<CompactString> {
        self.groups.write().await.detach(connection)
    }

    /// Send `message` to every connection of `username`.
    ///
    /// Delivery is best effort: a full buffer drops the message for that
    /// connection and a closed channel is pruned. Returns how many
    /// connections accepted the message.
    pub async fn push(&self, username: &str, message: ServerMessage) -> usize {
        let mut delivered = 0;
        let mut dead = Vec::new();
        {
            let groups = self.groups.read().await;
            let Some(group) = groups.by_user.get(username) else {
                return 0;
            };
            for (connection, sender) in group {
                match sender.try_send(message.clone()) {
                    Ok(()) => delivered += 1,
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        warn!(%username, %connection, "Delivery buffer full, dropping message");
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => dead.push(*connection),
                }
            }
        }

        if !dead.is_empty() {
            let mut groups = self.groups.write().await;
            for connection in &dead {
                debug!(%username, %connection, "Pruning closed delivery channel");
                groups.detach(connection);
            }
        }
        delivered
    }

    /// Drop every channel and refuse new registrations. Idempotent.
    pub async fn close_all(&self) -> usize {
        let mut groups = self.groups.write().await;
        let already_closed = self.closed.swap(true, Ordering::AcqRel);
        let dropped = groups.owner.len();
        *groups = Groups::default();
        if !already_closed {
            info!(connections = dropped, "Closed all delivery channels");
        }
        dropped
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub async fn is_connected(&self, username: &str) -> bool {
        self.groups.read().await.by_user.contains_key(username)
    }

    pub async fn connection_count(&self) -> usize {
        self.groups.read().await.owner.len()
    }

    pub async fn user_count(&self) -> usize {
        self.groups.read().await.by_user.len()
    }
}
