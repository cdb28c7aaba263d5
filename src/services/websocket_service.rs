use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{CommandAck, ErrorPayload, TimerInboundMessage, TimerOutboundMessage},
    error::ServiceError,
    services::{
        room_events::{self, TimerEventKind},
        timer_service,
    },
    state::{SharedState, timer::AdvanceDirection},
};

const IDENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Internal error type for command handling on one socket.
///
/// Distinct from `ServiceError`: it also covers session-protocol mistakes
/// (wrong ordering of frames) and the writer channel going away.
#[derive(Debug, Error)]
enum SessionError {
    /// Writer channel closed; the connection should terminate immediately.
    #[error("connection closed")]
    ConnectionClosed,
    /// A follow arrived while the session already follows a timer.
    #[error("already following timer `{0}`; unfollow first")]
    AlreadyFollowing(Uuid),
    /// A timer command arrived while the session follows nothing.
    #[error("not following any timer")]
    NotFollowing,
    /// Error from persistence or timer orchestration.
    #[error("{0}")]
    Service(#[from] ServiceError),
}

/// Per-connection session state. Lives on the socket task only.
struct Session {
    conn_id: Uuid,
    user_id: Uuid,
    following: Option<Uuid>,
}

/// Handle the full lifecycle for an individual timer WebSocket connection.
pub async fn handle_socket(state: SharedState, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let initial_message = match tokio::time::timeout(IDENT_TIMEOUT, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!("websocket identification timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let inbound = match TimerInboundMessage::from_json_str(&initial_message) {
        Ok(message) => message,
        Err(err) => {
            warn!(error = %err, "failed to parse identification frame");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let Some(user_id) = inbound.identify_user_id() else {
        warn!("first message was not identification");
        let _ = outbound_tx.send(Message::Close(None));
        finalize(writer_task, outbound_tx).await;
        return;
    };

    let mut session = Session {
        conn_id: Uuid::new_v4(),
        user_id,
        following: None,
    };
    info!(conn_id = %session.conn_id, user_id = %user_id, "timer client identified");
    let _ = send_outbound(
        &outbound_tx,
        &TimerOutboundMessage::Ack(CommandAck::new("identify")),
    );

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => {
                let inbound = match TimerInboundMessage::from_json_str(&text) {
                    Ok(inbound) => inbound,
                    Err(err) => {
                        warn!(conn_id = %session.conn_id, error = %err, "failed to parse timer message");
                        let _ = send_outbound(
                            &outbound_tx,
                            &TimerOutboundMessage::Error(ErrorPayload::new(err)),
                        );
                        continue;
                    }
                };

                match handle_command(&state, &mut session, &outbound_tx, inbound).await {
                    Ok(()) => {}
                    Err(SessionError::ConnectionClosed) => {
                        info!(conn_id = %session.conn_id, "connection closed while replying, terminating");
                        break;
                    }
                    Err(err) => {
                        warn!(conn_id = %session.conn_id, error = %err, "timer command rejected");
                        if send_outbound(
                            &outbound_tx,
                            &TimerOutboundMessage::Error(ErrorPayload::new(err.to_string())),
                        )
                        .is_err()
                        {
                            break;
                        }
                    }
                }
            }
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(conn_id = %session.conn_id, "timer client closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) => {}
            Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(conn_id = %session.conn_id, error = %err, "websocket error");
                break;
            }
        }
    }

    if let Some(timer_id) = session.following.take() {
        state.rooms().leave(timer_id, session.conn_id);
    }
    info!(conn_id = %session.conn_id, "timer client disconnected");

    finalize(writer_task, outbound_tx).await;
}

/// Dispatch one parsed command frame. Commands are handled serially per
/// connection; there is never more than one mutation in flight per socket.
async fn handle_command(
    state: &SharedState,
    session: &mut Session,
    tx: &mpsc::UnboundedSender<Message>,
    inbound: TimerInboundMessage,
) -> Result<(), SessionError> {
    match inbound {
        TimerInboundMessage::Identify { .. } => {
            warn!(conn_id = %session.conn_id, "ignoring duplicate identification message");
            Ok(())
        }
        TimerInboundMessage::TimerFollow { timer_id } => {
            if let Some(current) = session.following {
                return Err(SessionError::AlreadyFollowing(current));
            }
            // Read-access check; the snapshot itself is fetched over REST.
            timer_service::get_timer(state, session.user_id, timer_id).await?;
            state.rooms().join(timer_id, session.conn_id, tx.clone());
            session.following = Some(timer_id);
            ack(tx, CommandAck::new("timer_follow"))
        }
        TimerInboundMessage::TimerUnfollow => {
            let timer_id = session.following.take().ok_or(SessionError::NotFollowing)?;
            state.rooms().leave(timer_id, session.conn_id);
            ack(tx, CommandAck::new("timer_unfollow"))
        }
        TimerInboundMessage::TimerStart => {
            let timer_id = followed(session)?;
            let outcome = timer_service::start_timer(state, session.user_id, timer_id).await?;
            room_events::broadcast_timer_state(state, timer_id, TimerEventKind::Start).await;
            let mut ack_message = CommandAck::new("timer_start");
            ack_message.already_running = Some(outcome.already_running);
            ack(tx, ack_message)
        }
        TimerInboundMessage::TimerStop => {
            let timer_id = followed(session)?;
            let outcome = timer_service::stop_timer(state, session.user_id, timer_id).await?;
            room_events::broadcast_timer_state(state, timer_id, TimerEventKind::Stop).await;
            let mut ack_message = CommandAck::new("timer_stop");
            ack_message.already_stopped = Some(outcome.already_stopped);
            ack(tx, ack_message)
        }
        TimerInboundMessage::TimerNext => {
            let timer_id = followed(session)?;
            timer_service::advance_timer(state, session.user_id, timer_id, AdvanceDirection::Next)
                .await?;
            room_events::broadcast_timer_state(state, timer_id, TimerEventKind::Next).await;
            ack(tx, CommandAck::new("timer_next"))
        }
        TimerInboundMessage::TimerPrev => {
            let timer_id = followed(session)?;
            timer_service::advance_timer(state, session.user_id, timer_id, AdvanceDirection::Prev)
                .await?;
            room_events::broadcast_timer_state(state, timer_id, TimerEventKind::Prev).await;
            ack(tx, CommandAck::new("timer_prev"))
        }
        TimerInboundMessage::TimerChangeColor { seat_id, color } => {
            let timer_id = followed(session)?;
            timer_service::change_seat_color(state, session.user_id, timer_id, seat_id, color)
                .await?;
            room_events::broadcast_timer_state(state, timer_id, TimerEventKind::ChangeColor).await;
            ack(tx, CommandAck::new("timer_change_color"))
        }
        TimerInboundMessage::TimerChangePlayerTurnOrder { order } => {
            let timer_id = followed(session)?;
            timer_service::reassign_turn_order(state, session.user_id, timer_id, order).await?;
            room_events::broadcast_timer_state(state, timer_id, TimerEventKind::ChangeTurnOrder)
                .await;
            ack(tx, CommandAck::new("timer_change_player_turn_order"))
        }
        TimerInboundMessage::TimerDelete { timer_id } => {
            timer_service::delete_timer(state, session.user_id, timer_id).await?;
            room_events::broadcast_timer_deleted(state, timer_id);
            if session.following == Some(timer_id) {
                // The actor is a follower and received the room notice.
                session.following = None;
            } else {
                // The room notice misses the actor, so send it a copy.
                send_outbound(tx, &TimerOutboundMessage::TimerDelete { timer_id })?;
            }
            ack(tx, CommandAck::new("timer_delete"))
        }
        TimerInboundMessage::Unknown => {
            Err(ServiceError::InvalidInput("unrecognized event".into()).into())
        }
    }
}

fn followed(session: &Session) -> Result<Uuid, SessionError> {
    session.following.ok_or(SessionError::NotFollowing)
}

fn ack(tx: &mpsc::UnboundedSender<Message>, ack: CommandAck) -> Result<(), SessionError> {
    send_outbound(tx, &TimerOutboundMessage::Ack(ack))
}

/// Serialize a payload and push it onto the provided WebSocket sender.
///
/// Serialization failure is logged and swallowed (permanent, no point
/// retrying); a closed writer channel is surfaced so the caller can
/// terminate the session.
fn send_outbound(
    tx: &mpsc::UnboundedSender<Message>,
    message: &TimerOutboundMessage,
) -> Result<(), SessionError> {
    let payload = match serde_json::to_string(message) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize outbound message `{message:?}`");
            return Ok(());
        }
    };

    tx.send(Message::Text(payload.into()))
        .map_err(|_| SessionError::ConnectionClosed)
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::TimerKind, timer_store::memory::MemoryTimerStore},
        dto::timer::{CreateTimerRequest, SeatInput},
        state::{AppState, clock::ManualClock},
    };

    async fn state_with_store() -> SharedState {
        let state = AppState::with_clock(AppConfig::default(), Arc::new(ManualClock::new(1_000_000)));
        state
            .install_timer_store(Arc::new(MemoryTimerStore::new(Duration::from_millis(200))))
            .await;
        state
    }

    async fn make_timer(state: &SharedState, creator: Uuid) -> Uuid {
        let request = CreateTimerRequest {
            kind: TimerKind::CountUp,
            initial_duration_ms: 0,
            reload_increment_ms: None,
            board_game_id: None,
            event_id: None,
            seats: vec![
                SeatInput {
                    user_id: Some(creator),
                    display_name: None,
                    color: None,
                },
                SeatInput {
                    user_id: None,
                    display_name: Some("guest".into()),
                    color: None,
                },
            ],
        };
        timer_service::create_timer(state, creator, request)
            .await
            .unwrap()
            .id
    }

    fn session_for(user_id: Uuid) -> Session {
        Session {
            conn_id: Uuid::new_v4(),
            user_id,
            following: None,
        }
    }

    /// Pull every buffered text frame off the writer channel as JSON.
    fn drain(rx: &mut mpsc::UnboundedReceiver<Message>) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        while let Ok(Message::Text(text)) = rx.try_recv() {
            frames.push(serde_json::from_str(&text).unwrap());
        }
        frames
    }

    #[tokio::test]
    async fn second_follow_is_rejected_and_keeps_the_first() {
        let state = state_with_store().await;
        let user = Uuid::new_v4();
        let first = make_timer(&state, user).await;
        let second = make_timer(&state, user).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = session_for(user);

        handle_command(
            &state,
            &mut session,
            &tx,
            TimerInboundMessage::TimerFollow { timer_id: first },
        )
        .await
        .unwrap();
        assert_eq!(session.following, Some(first));

        let err = handle_command(
            &state,
            &mut session,
            &tx,
            TimerInboundMessage::TimerFollow { timer_id: second },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SessionError::AlreadyFollowing(id) if id == first));
        // The existing follow is untouched and no second room was joined.
        assert_eq!(session.following, Some(first));
        assert_eq!(state.rooms().member_count(first), 1);
        assert_eq!(state.rooms().member_count(second), 0);

        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["event"], "ack");
        assert_eq!(frames[0]["data"]["command"], "timer_follow");
    }

    #[tokio::test]
    async fn commands_without_a_follow_are_rejected() {
        let state = state_with_store().await;
        let user = Uuid::new_v4();
        let timer_id = make_timer(&state, user).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = session_for(user);

        let err = handle_command(&state, &mut session, &tx, TimerInboundMessage::TimerUnfollow)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFollowing));

        let err = handle_command(&state, &mut session, &tx, TimerInboundMessage::TimerStart)
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::NotFollowing));

        // The rejected start never reached the timer.
        let snapshot = timer_service::get_timer(&state, user, timer_id).await.unwrap();
        assert!(!snapshot.running);
        assert!(drain(&mut rx).is_empty());
    }

    #[tokio::test]
    async fn leaving_the_room_does_not_stop_a_running_clock() {
        let state = state_with_store().await;
        let user = Uuid::new_v4();
        let timer_id = make_timer(&state, user).await;
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = session_for(user);

        handle_command(
            &state,
            &mut session,
            &tx,
            TimerInboundMessage::TimerFollow { timer_id },
        )
        .await
        .unwrap();
        handle_command(&state, &mut session, &tx, TimerInboundMessage::TimerStart)
            .await
            .unwrap();

        // Disconnect cleanup only removes the room membership.
        state.rooms().leave(timer_id, session.conn_id);
        assert_eq!(state.rooms().member_count(timer_id), 0);

        let snapshot = timer_service::get_timer(&state, user, timer_id).await.unwrap();
        assert!(snapshot.running);
    }

    #[tokio::test]
    async fn deleting_an_unfollowed_timer_notifies_the_actor_directly() {
        let state = state_with_store().await;
        let user = Uuid::new_v4();
        let followed = make_timer(&state, user).await;
        let doomed = make_timer(&state, user).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = session_for(user);

        handle_command(
            &state,
            &mut session,
            &tx,
            TimerInboundMessage::TimerFollow { timer_id: followed },
        )
        .await
        .unwrap();
        drain(&mut rx);

        handle_command(
            &state,
            &mut session,
            &tx,
            TimerInboundMessage::TimerDelete { timer_id: doomed },
        )
        .await
        .unwrap();

        // The followed room saw nothing; the actor got the notice and the ack.
        assert_eq!(session.following, Some(followed));
        let frames = drain(&mut rx);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0]["event"], "timer_delete");
        assert_eq!(frames[0]["data"]["timer_id"], doomed.to_string());
        assert_eq!(frames[1]["event"], "ack");
        assert_eq!(frames[1]["data"]["command"], "timer_delete");
    }

    #[tokio::test]
    async fn deleting_the_followed_timer_clears_the_follow() {
        let state = state_with_store().await;
        let user = Uuid::new_v4();
        let timer_id = make_timer(&state, user).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = session_for(user);

        handle_command(
            &state,
            &mut session,
            &tx,
            TimerInboundMessage::TimerFollow { timer_id },
        )
        .await
        .unwrap();
        drain(&mut rx);

        handle_command(
            &state,
            &mut session,
            &tx,
            TimerInboundMessage::TimerDelete { timer_id },
        )
        .await
        .unwrap();

        assert_eq!(session.following, None);
        assert_eq!(state.rooms().member_count(timer_id), 0);

        // Exactly one notice arrives, through the room broadcast.
        let frames = drain(&mut rx);
        let notices = frames.iter().filter(|f| f["event"] == "timer_delete").count();
        assert_eq!(notices, 1);
        assert_eq!(frames.last().unwrap()["event"], "ack");
    }
}
