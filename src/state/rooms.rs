//! Room registry mapping a timer id to its broadcast group.
//!
//! Membership changes and emits commute: every emit serializes a snapshot
//! re-read from the store, so delivery order across members carries no state.

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

/// Deterministic transport-group key for a timer, used in logs only.
pub fn group_key(timer_id: Uuid) -> String {
    format!("timer/{timer_id}")
}

/// Concurrent map of timer id to the connections following it.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: DashMap<Uuid, DashMap<Uuid, mpsc::UnboundedSender<Message>>>,
}

impl RoomRegistry {
    /// Build an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe a connection to a timer's group.
    pub fn join(&self, timer_id: Uuid, conn_id: Uuid, tx: mpsc::UnboundedSender<Message>) {
        let room = self.rooms.entry(timer_id).or_default();
        room.insert(conn_id, tx);
        debug!(group = %group_key(timer_id), conn = %conn_id, "connection joined room");
    }

    /// Unsubscribe a connection from a timer's group. Removing the last
    /// member drops the room.
    pub fn leave(&self, timer_id: Uuid, conn_id: Uuid) {
        if let Some(room) = self.rooms.get(&timer_id) {
            room.remove(&conn_id);
        }
        self.rooms.remove_if(&timer_id, |_, room| room.is_empty());
        debug!(group = %group_key(timer_id), conn = %conn_id, "connection left room");
    }

    /// Send an already-serialized frame to every member of a timer's group.
    /// Members whose writer has gone away are dropped from the room.
    pub fn broadcast(&self, timer_id: Uuid, frame: &str) -> usize {
        let Some(room) = self.rooms.get(&timer_id) else {
            return 0;
        };

        let mut delivered = 0;
        let mut stale = Vec::new();
        for member in room.iter() {
            if member
                .value()
                .send(Message::Text(frame.to_owned().into()))
                .is_ok()
            {
                delivered += 1;
            } else {
                stale.push(*member.key());
            }
        }
        for conn_id in stale {
            room.remove(&conn_id);
        }
        delivered
    }

    /// Tear the whole room down (after a timer deletion).
    pub fn remove_room(&self, timer_id: Uuid) {
        self.rooms.remove(&timer_id);
        debug!(group = %group_key(timer_id), "room removed");
    }

    /// Number of connections currently following the timer.
    pub fn member_count(&self, timer_id: Uuid) -> usize {
        self.rooms
            .get(&timer_id)
            .map(|room| room.len())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_broadcast_leave() {
        let rooms = RoomRegistry::new();
        let timer_id = Uuid::new_v4();
        let (tx_a, mut rx_a) = mpsc::unbounded_channel();
        let (tx_b, mut rx_b) = mpsc::unbounded_channel();

        rooms.join(timer_id, Uuid::new_v4(), tx_a);
        let conn_b = Uuid::new_v4();
        rooms.join(timer_id, conn_b, tx_b);
        assert_eq!(rooms.member_count(timer_id), 2);

        assert_eq!(rooms.broadcast(timer_id, "{\"event\":\"x\"}"), 2);
        assert!(matches!(rx_a.try_recv(), Ok(Message::Text(_))));
        assert!(matches!(rx_b.try_recv(), Ok(Message::Text(_))));

        rooms.leave(timer_id, conn_b);
        assert_eq!(rooms.member_count(timer_id), 1);
        assert_eq!(rooms.broadcast(timer_id, "{}"), 1);
        assert!(rx_b.try_recv().is_err());
    }

    #[test]
    fn stale_members_are_evicted_on_broadcast() {
        let rooms = RoomRegistry::new();
        let timer_id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        rooms.join(timer_id, Uuid::new_v4(), tx);

        assert_eq!(rooms.broadcast(timer_id, "{}"), 0);
        assert_eq!(rooms.member_count(timer_id), 0);
    }

    #[test]
    fn broadcast_to_unknown_room_is_a_noop() {
        let rooms = RoomRegistry::new();
        assert_eq!(rooms.broadcast(Uuid::new_v4(), "{}"), 0);
    }

    #[test]
    fn remove_room_silences_everyone() {
        let rooms = RoomRegistry::new();
        let timer_id = Uuid::new_v4();
        let (tx, mut rx) = mpsc::unbounded_channel();
        rooms.join(timer_id, Uuid::new_v4(), tx);
        rooms.remove_room(timer_id);

        assert_eq!(rooms.broadcast(timer_id, "{}"), 0);
        assert!(rx.try_recv().is_err());
        assert_eq!(rooms.member_count(timer_id), 0);
    }
}
