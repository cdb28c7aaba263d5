//! Fan-out of timer mutations to every socket following the timer's room.
//!
//! After a command commits, the aggregate is re-read from the store and
//! projected against a fresh clock sample, so every follower receives the
//! same post-mutation truth rather than the mutating session's local view.

use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    dto::{
        timer::TimerSnapshot,
        ws::TimerOutboundMessage,
    },
    state::{SharedState, timer::TurnTimer},
};

/// Which accepted command a room broadcast reflects.
#[derive(Debug, Clone, Copy)]
pub enum TimerEventKind {
    Start,
    Stop,
    Next,
    Prev,
    ChangeColor,
    ChangeTurnOrder,
}

/// Re-read `timer_id` from storage and push the refreshed snapshot to its
/// room. Failures are logged, never surfaced: the mutation already committed
/// and the command was already acknowledged to its sender.
pub async fn broadcast_timer_state(state: &SharedState, timer_id: Uuid, kind: TimerEventKind) {
    let Some(store) = state.timer_store().await else {
        warn!(timer_id = %timer_id, "skipping room broadcast: storage unavailable");
        return;
    };

    let entity = match store.load(timer_id).await {
        Ok(Some(entity)) => entity,
        Ok(None) => {
            warn!(timer_id = %timer_id, "skipping room broadcast: timer vanished after commit");
            return;
        }
        Err(err) => {
            warn!(timer_id = %timer_id, error = %err, "skipping room broadcast: re-read failed");
            return;
        }
    };

    let timer = TurnTimer::from(entity);
    let snapshot = TimerSnapshot::from_timer(&timer, state.clock().now_ms());
    let message = match kind {
        TimerEventKind::Start => TimerOutboundMessage::TimerStart(snapshot),
        TimerEventKind::Stop => TimerOutboundMessage::TimerStop(snapshot),
        TimerEventKind::Next => TimerOutboundMessage::TimerNext(snapshot),
        TimerEventKind::Prev => TimerOutboundMessage::TimerPrev(snapshot),
        TimerEventKind::ChangeColor => TimerOutboundMessage::TimerChangeColor(snapshot),
        TimerEventKind::ChangeTurnOrder => TimerOutboundMessage::TimerChangePlayerTurnOrder(snapshot),
    };

    send_to_room(state, timer_id, &message);
}

/// Tell every follower the timer is gone, then dissolve the room.
pub fn broadcast_timer_deleted(state: &SharedState, timer_id: Uuid) {
    send_to_room(state, timer_id, &TimerOutboundMessage::TimerDelete { timer_id });
    state.rooms().remove_room(timer_id);
}

fn send_to_room(state: &SharedState, timer_id: Uuid, message: &TimerOutboundMessage) {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(timer_id = %timer_id, error = %err, "failed to serialize room event");
            return;
        }
    };
    let delivered = state.rooms().broadcast(timer_id, &payload);
    debug!(timer_id = %timer_id, delivered, "room event delivered");
}
