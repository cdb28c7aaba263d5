use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::dto::timer::{SeatOrderInput, TimerSnapshot};

#[derive(Debug, Deserialize, ToSchema)]
/// Messages accepted from timer WebSocket clients.
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TimerInboundMessage {
    /// First frame of every session; binds the socket to a user identity.
    Identify { user_id: Uuid },
    /// Subscribe the session to a timer's room.
    TimerFollow { timer_id: Uuid },
    /// Leave the currently followed room.
    TimerUnfollow,
    /// Start the current seat's clock on the followed timer.
    TimerStart,
    /// Stop the current seat's clock on the followed timer.
    TimerStop,
    /// Hand the turn to the next seat.
    TimerNext,
    /// Hand the turn back to the previous seat.
    TimerPrev,
    /// Recolor one seat of the followed timer.
    TimerChangeColor { seat_id: Uuid, color: String },
    /// Redefine the followed timer's seat rotation.
    TimerChangePlayerTurnOrder { order: Vec<SeatOrderInput> },
    /// Delete a timer (admin only); works without following it.
    TimerDelete { timer_id: Uuid },
    #[serde(other)]
    Unknown,
}

impl TimerInboundMessage {
    /// Parse a text frame, formatting the error for direct client feedback.
    pub fn from_json_str(payload: &str) -> Result<Self, String> {
        serde_json::from_str(payload).map_err(|err| format!("malformed message: {err}"))
    }

    pub fn identify_user_id(&self) -> Option<Uuid> {
        match self {
            Self::Identify { user_id } => Some(*user_id),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Messages pushed to timer WebSocket clients.
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum TimerOutboundMessage {
    /// A clock started; carries the refreshed aggregate.
    TimerStart(TimerSnapshot),
    /// A clock stopped.
    TimerStop(TimerSnapshot),
    /// The turn moved forward.
    TimerNext(TimerSnapshot),
    /// The turn moved back.
    TimerPrev(TimerSnapshot),
    /// A seat changed color.
    TimerChangeColor(TimerSnapshot),
    /// The rotation was redefined.
    TimerChangePlayerTurnOrder(TimerSnapshot),
    /// The timer no longer exists.
    TimerDelete { timer_id: Uuid },
    /// Positive acknowledgement of the sender's own command.
    Ack(CommandAck),
    /// Negative acknowledgement of the sender's own command.
    Error(ErrorPayload),
}

#[derive(Debug, Serialize, ToSchema)]
/// Acknowledgement for an accepted command, echoing its name.
pub struct CommandAck {
    pub command: String,
    /// Set on `timer_start` when the clock was already running.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_running: Option<bool>,
    /// Set on `timer_stop` when the clock was already stopped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub already_stopped: Option<bool>,
}

impl CommandAck {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            already_running: None,
            already_stopped: None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Error body mirrored on both the WebSocket and documented REST surface.
pub struct ErrorPayload {
    /// Always `false`.
    pub success: bool,
    pub message: String,
    /// Field-level details when validation failed; empty otherwise.
    pub errors: Vec<String>,
}

impl ErrorPayload {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inbound_frames_parse_by_event_tag() {
        let user = Uuid::new_v4();
        let msg =
            TimerInboundMessage::from_json_str(&format!(r#"{{"event":"identify","user_id":"{user}"}}"#))
                .unwrap();
        assert_eq!(msg.identify_user_id(), Some(user));

        let msg = TimerInboundMessage::from_json_str(r#"{"event":"timer_start"}"#).unwrap();
        assert!(matches!(msg, TimerInboundMessage::TimerStart));

        let msg = TimerInboundMessage::from_json_str(
            r#"{"event":"timer_change_color","seat_id":"6b55b7a2-9aa5-40fe-8bcb-6a3b8b0a2a51","color":"e6194b"}"#,
        )
        .unwrap();
        assert!(matches!(msg, TimerInboundMessage::TimerChangeColor { .. }));
    }

    #[test]
    fn unrecognized_events_map_to_unknown() {
        let msg = TimerInboundMessage::from_json_str(r#"{"event":"timer_explode"}"#).unwrap();
        assert!(matches!(msg, TimerInboundMessage::Unknown));
    }

    #[test]
    fn frames_without_an_event_tag_are_rejected() {
        assert!(TimerInboundMessage::from_json_str(r#"{"user_id":"nope"}"#).is_err());
        assert!(TimerInboundMessage::from_json_str("not json").is_err());
    }

    #[test]
    fn acks_omit_the_unset_idempotency_flags() {
        let mut ack = CommandAck::new("timer_start");
        ack.already_running = Some(false);
        let json = serde_json::to_string(&TimerOutboundMessage::Ack(ack)).unwrap();
        assert!(json.contains(r#""event":"ack""#));
        assert!(json.contains(r#""already_running":false"#));
        assert!(!json.contains("already_stopped"));
    }

    #[test]
    fn error_payloads_keep_the_legacy_shape() {
        let json =
            serde_json::to_string(&TimerOutboundMessage::Error(ErrorPayload::new("nope"))).unwrap();
        assert!(json.contains(r#""success":false"#));
        assert!(json.contains(r#""errors":[]"#));
    }

    #[test]
    fn deletion_notices_carry_only_the_timer_id() {
        let id = Uuid::new_v4();
        let json =
            serde_json::to_string(&TimerOutboundMessage::TimerDelete { timer_id: id }).unwrap();
        assert!(json.contains(r#""event":"timer_delete""#));
        assert!(json.contains(&id.to_string()));
    }
}
