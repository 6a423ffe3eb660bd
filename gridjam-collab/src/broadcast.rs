//! Fan-out broadcast to room members with backpressure.
//!
//! Uses tokio broadcast channels for O(1) send to all subscribers.
//! Each connection gets an independent receiver that buffers up to
//! `capacity` messages before lagging receivers start dropping.
//!
//! Messages are encoded once and shared as `Arc<Vec<u8>>` so fan-out
//! never re-serializes per subscriber. Unlike a peer-to-peer delta
//! feed, room broadcasts here include the sender: the originating
//! editor consumes its own `NoteUpdate`/`HistoryAppend` the same way
//! everyone else does, which keeps every client's log a byte-for-byte
//! replica of the server's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};

use crate::protocol::{ProtocolError, RoomMessage};

/// Statistics for monitoring broadcast health.
#[derive(Debug, Clone, Default)]
pub struct BroadcastStats {
    pub messages_sent: u64,
}

/// Atomic broadcast stats — lock-free on the hot path.
struct AtomicBroadcastStats {
    messages_sent: AtomicU64,
}

/// A broadcast channel for a single room (or the lobby).
///
/// Every connection subscribed to the same room shares one channel;
/// publishing fans the pre-encoded bytes out to all of them.
pub struct BroadcastGroup {
    /// Broadcast channel sender (cloned per-room)
    sender: broadcast::Sender<Arc<Vec<u8>>>,

    /// Channel capacity (messages buffered per receiver)
    capacity: usize,

    /// Lock-free stats (atomics)
    atomic_stats: AtomicBroadcastStats,
}

impl BroadcastGroup {
    /// Create a new broadcast group with the given buffer capacity.
    ///
    /// `capacity` determines how many messages can be buffered per
    /// receiver before slow consumers start dropping messages.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            capacity,
            atomic_stats: AtomicBroadcastStats {
                messages_sent: AtomicU64::new(0),
            },
        }
    }

    /// Encode a message once and fan it out to every subscriber.
    ///
    /// Returns the number of receivers that got the message. Stats are
    /// tracked via atomics — no lock acquired on the hot path.
    pub fn publish(&self, msg: &RoomMessage) -> Result<usize, ProtocolError> {
        let encoded = msg.encode()?;
        Ok(self.publish_raw(Arc::new(encoded)))
    }

    /// Fan out pre-encoded bytes directly (zero-copy fast path).
    pub fn publish_raw(&self, encoded: Arc<Vec<u8>>) -> usize {
        let count = self.sender.send(encoded).unwrap_or(0);
        self.atomic_stats.messages_sent.fetch_add(1, Ordering::Relaxed);
        count
    }

    /// Subscribe; the receiver sees only messages published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Vec<u8>>> {
        self.sender.subscribe()
    }

    /// Number of live receivers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Get broadcast statistics (lock-free snapshot).
    pub fn stats(&self) -> BroadcastStats {
        BroadcastStats {
            messages_sent: self.atomic_stats.messages_sent.load(Ordering::Relaxed),
        }
    }

    /// Get the channel capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Maps room names to broadcast groups, plus one lobby group.
///
/// The lobby carries room-list updates to every connection regardless
/// of which room it has joined. Room groups are created on first use
/// and stay resident for the process lifetime, matching the room
/// store's no-eviction policy.
pub struct RoomChannels {
    rooms: RwLock<HashMap<String, Arc<BroadcastGroup>>>,
    lobby: Arc<BroadcastGroup>,
    default_capacity: usize,
}

impl RoomChannels {
    pub fn new(default_capacity: usize) -> Self {
        Self {
            rooms: RwLock::new(HashMap::new()),
            lobby: Arc::new(BroadcastGroup::new(default_capacity)),
            default_capacity,
        }
    }

    /// The lobby group shared by every connection.
    pub fn lobby(&self) -> Arc<BroadcastGroup> {
        self.lobby.clone()
    }

    /// Get or create the broadcast group for a room.
    pub async fn get_or_create(&self, room: &str) -> Arc<BroadcastGroup> {
        // Fast path: read lock
        {
            let rooms = self.rooms.read().await;
            if let Some(group) = rooms.get(room) {
                return group.clone();
            }
        }

        // Slow path: write lock to create
        let mut rooms = self.rooms.write().await;
        // Double-check after acquiring write lock
        if let Some(group) = rooms.get(room) {
            return group.clone();
        }

        let group = Arc::new(BroadcastGroup::new(self.default_capacity));
        rooms.insert(room.to_string(), group.clone());
        group
    }

    /// Number of rooms with a channel.
    pub async fn room_count(&self) -> usize {
        self.rooms.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gridjam_core::CellValue;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_publish_fan_out_includes_sender() {
        let group = BroadcastGroup::new(16);

        let mut rx1 = group.subscribe();
        let mut rx2 = group.subscribe();
        let mut rx3 = group.subscribe();

        let msg = RoomMessage::note_update("jam", 3, 5, CellValue::single("Synth"));
        let count = group.publish(&msg).unwrap();
        assert_eq!(count, 3);

        let expected = msg.encode().unwrap();
        for rx in [&mut rx1, &mut rx2, &mut rx3] {
            let bytes = rx.recv().await.unwrap();
            assert_eq!(*bytes, expected);
        }
    }

    #[tokio::test]
    async fn test_publish_raw_zero_copy() {
        let group = BroadcastGroup::new(16);
        let mut rx = group.subscribe();

        let data = Arc::new(vec![10, 20, 30]);
        let count = group.publish_raw(data.clone());
        assert_eq!(count, 1);

        let received = rx.recv().await.unwrap();
        assert_eq!(*received, vec![10, 20, 30]);
    }

    #[tokio::test]
    async fn test_publish_with_no_subscribers() {
        let group = BroadcastGroup::new(16);
        let msg = RoomMessage::ping(Uuid::new_v4());
        assert_eq!(group.publish(&msg).unwrap(), 0);
    }

    #[tokio::test]
    async fn test_broadcast_stats() {
        let group = BroadcastGroup::new(16);
        let _rx = group.subscribe();

        let msg = RoomMessage::ping(Uuid::new_v4());
        group.publish(&msg).unwrap();
        group.publish(&msg).unwrap();

        assert_eq!(group.stats().messages_sent, 2);
        assert_eq!(group.receiver_count(), 1);
    }

    #[tokio::test]
    async fn test_channels_get_or_create_identity() {
        let channels = RoomChannels::new(16);

        let a1 = channels.get_or_create("Room 1").await;
        let a2 = channels.get_or_create("Room 1").await;
        assert!(Arc::ptr_eq(&a1, &a2));
        assert_eq!(channels.room_count().await, 1);
    }

    #[tokio::test]
    async fn test_room_isolation() {
        let channels = RoomChannels::new(16);

        let room_a = channels.get_or_create("a").await;
        let room_b = channels.get_or_create("b").await;
        let mut rx_b = room_b.subscribe();

        let msg = RoomMessage::note_update("a", 0, 0, CellValue::single("Synth"));
        room_a.publish(&msg).unwrap();

        // Nothing crossed over to room b
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_lobby_is_shared() {
        let channels = RoomChannels::new(16);
        let lobby1 = channels.lobby();
        let lobby2 = channels.lobby();
        assert!(Arc::ptr_eq(&lobby1, &lobby2));

        let mut rx = lobby1.subscribe();
        lobby2.publish(&RoomMessage::room_list(&[])).unwrap();
        assert!(rx.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_broadcast_capacity() {
        let group = BroadcastGroup::new(32);
        assert_eq!(group.capacity(), 32);
    }
}
