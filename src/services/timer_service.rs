//! Orchestration of timer commands: identity checks, the locked
//! load-mutate-commit cycle against storage, and retry on lock contention.
//!
//! Every mutation runs against one clock sample taken inside the
//! transaction, so a seat handoff stops one clock and starts the next at the
//! same instant.

use std::time::{Duration, SystemTime};

use tokio::time::sleep;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dao::models::{SeatEntity, TimerEntity},
    dto::timer::{CreateTimerRequest, SeatOrderInput, TimerSnapshot},
    error::ServiceError,
    services::access::{self, AccessLevel},
    state::{
        SharedState,
        timer::{AdvanceDirection, AdvanceOutcome, StartOutcome, StopOutcome, TurnTimer},
    },
};

/// Pause between attempts when an update lock is contended.
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Bootstrap a fresh timer owned by `creator_id`.
pub async fn create_timer(
    state: &SharedState,
    creator_id: Uuid,
    request: CreateTimerRequest,
) -> Result<TimerSnapshot, ServiceError> {
    request
        .validate()
        .map_err(|err| ServiceError::InvalidInput(format!("validation failed: {err}")))?;

    let store = state.require_timer_store().await?;
    let now_ms = state.clock().now_ms();
    let now = SystemTime::UNIX_EPOCH + Duration::from_millis(now_ms);

    let mut used_colors: Vec<String> = request
        .seats
        .iter()
        .filter_map(|seat| seat.color.clone())
        .collect();
    let seats = request
        .seats
        .into_iter()
        .enumerate()
        .map(|(index, seat)| {
            let color = seat.color.unwrap_or_else(|| {
                let picked = state.config().first_unused_color(&used_colors);
                used_colors.push(picked.clone());
                picked
            });
            SeatEntity {
                id: Uuid::new_v4(),
                user_id: seat.user_id,
                display_name: seat.display_name,
                turn_order: index as u32,
                elapsed_ms: 0,
                running_since_ms: None,
                color,
            }
        })
        .collect();

    let entity = TimerEntity {
        id: Uuid::new_v4(),
        kind: request.kind,
        creator_id,
        initial_duration_ms: request.initial_duration_ms,
        reload_increment_ms: request.reload_increment_ms,
        current_seat: 0,
        board_game_id: request.board_game_id,
        event_id: request.event_id,
        created_at: now,
        updated_at: now,
        seats,
    };

    store.create(entity.clone()).await?;

    let timer = TurnTimer::from(entity);
    Ok(TimerSnapshot::from_timer(&timer, now_ms))
}

/// Read one timer, projected against the current instant.
pub async fn get_timer(
    state: &SharedState,
    user_id: Uuid,
    timer_id: Uuid,
) -> Result<TimerSnapshot, ServiceError> {
    let store = state.require_timer_store().await?;
    let Some(entity) = store.load(timer_id).await? else {
        return Err(ServiceError::NotFound(format!("timer `{timer_id}` not found")));
    };
    let timer = TurnTimer::from(entity);
    access::ensure(&timer, user_id, AccessLevel::Read)?;
    Ok(TimerSnapshot::from_timer(&timer, state.clock().now_ms()))
}

/// Start the current seat's clock.
pub async fn start_timer(
    state: &SharedState,
    user_id: Uuid,
    timer_id: Uuid,
) -> Result<StartOutcome, ServiceError> {
    with_timer_update(state, timer_id, user_id, AccessLevel::Write, |timer, now_ms| {
        Ok(timer.start(now_ms))
    })
    .await
}

/// Stop the current seat's clock.
pub async fn stop_timer(
    state: &SharedState,
    user_id: Uuid,
    timer_id: Uuid,
) -> Result<StopOutcome, ServiceError> {
    with_timer_update(state, timer_id, user_id, AccessLevel::Write, |timer, now_ms| {
        Ok(timer.stop(now_ms))
    })
    .await
}

/// Hand the turn to the adjacent seat in `direction`.
pub async fn advance_timer(
    state: &SharedState,
    user_id: Uuid,
    timer_id: Uuid,
    direction: AdvanceDirection,
) -> Result<AdvanceOutcome, ServiceError> {
    with_timer_update(state, timer_id, user_id, AccessLevel::Write, move |timer, now_ms| {
        Ok(timer.advance(direction, now_ms))
    })
    .await
}

/// Recolor one seat.
pub async fn change_seat_color(
    state: &SharedState,
    user_id: Uuid,
    timer_id: Uuid,
    seat_id: Uuid,
    color: String,
) -> Result<(), ServiceError> {
    crate::dto::validation::validate_color_code(&color)
        .map_err(|err| ServiceError::InvalidInput(err.to_string()))?;

    with_timer_update(state, timer_id, user_id, AccessLevel::Write, move |timer, _now_ms| {
        timer.set_seat_color(seat_id, color.clone())?;
        Ok(())
    })
    .await
}

/// Redefine the seat rotation.
pub async fn reassign_turn_order(
    state: &SharedState,
    user_id: Uuid,
    timer_id: Uuid,
    order: Vec<SeatOrderInput>,
) -> Result<(), ServiceError> {
    let order: Vec<(Uuid, u32)> = order
        .into_iter()
        .map(|row| (row.seat_id, row.turn_order))
        .collect();

    with_timer_update(state, timer_id, user_id, AccessLevel::Write, move |timer, now_ms| {
        timer.reassign_turn_order(&order, now_ms)?;
        Ok(())
    })
    .await
}

/// Delete a timer outright. Creator only.
pub async fn delete_timer(
    state: &SharedState,
    user_id: Uuid,
    timer_id: Uuid,
) -> Result<(), ServiceError> {
    let store = state.require_timer_store().await?;
    let mut attempt = 0;
    loop {
        match store.load_for_update(timer_id).await {
            Ok(Some(lease)) => {
                let timer = TurnTimer::from(lease.entity().clone());
                access::ensure(&timer, user_id, AccessLevel::Admin)?;
                lease.delete().await?;
                return Ok(());
            }
            Ok(None) => {
                return Err(ServiceError::NotFound(format!("timer `{timer_id}` not found")));
            }
            Err(err) if err.is_retryable() && attempt < state.config().lock_retry_limit() => {
                attempt += 1;
                sleep(RETRY_BACKOFF).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

/// Run `op` inside a locked load-mutate-commit cycle.
///
/// The lease is held for the whole cycle; dropping it on any error abandons
/// the mutation. Lock contention is retried a bounded number of times before
/// the failure reaches the caller.
async fn with_timer_update<T, F>(
    state: &SharedState,
    timer_id: Uuid,
    user_id: Uuid,
    level: AccessLevel,
    op: F,
) -> Result<T, ServiceError>
where
    F: Fn(&mut TurnTimer, u64) -> Result<T, ServiceError>,
{
    let store = state.require_timer_store().await?;
    let mut attempt = 0;

    loop {
        let lease = match store.load_for_update(timer_id).await {
            Ok(Some(lease)) => lease,
            Ok(None) => {
                return Err(ServiceError::NotFound(format!("timer `{timer_id}` not found")));
            }
            Err(err) if err.is_retryable() && attempt < state.config().lock_retry_limit() => {
                attempt += 1;
                sleep(RETRY_BACKOFF).await;
                continue;
            }
            Err(err) => return Err(err.into()),
        };

        let mut timer = TurnTimer::from(lease.entity().clone());
        access::ensure(&timer, user_id, level)?;

        let now_ms = state.clock().now_ms();
        let value = op(&mut timer, now_ms)?;

        timer.updated_at = SystemTime::UNIX_EPOCH + Duration::from_millis(now_ms);
        lease.commit(timer.into()).await?;
        return Ok(value);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{models::TimerKind, timer_store::memory::MemoryTimerStore},
        dto::timer::SeatInput,
        state::{AppState, clock::ManualClock},
    };

    struct Harness {
        state: SharedState,
        clock: Arc<ManualClock>,
        creator: Uuid,
        seated: Uuid,
    }

    async fn harness() -> Harness {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let state = AppState::with_clock(AppConfig::default(), clock.clone());
        state
            .install_timer_store(Arc::new(MemoryTimerStore::new(Duration::from_millis(200))))
            .await;
        Harness {
            state,
            clock,
            creator: Uuid::new_v4(),
            seated: Uuid::new_v4(),
        }
    }

    fn request(kind: TimerKind, seated: Uuid) -> CreateTimerRequest {
        CreateTimerRequest {
            kind,
            initial_duration_ms: if kind == TimerKind::CountUp { 0 } else { 60_000 },
            reload_increment_ms: (kind == TimerKind::Reload).then_some(2_000),
            board_game_id: None,
            event_id: None,
            seats: vec![
                SeatInput {
                    user_id: Some(seated),
                    display_name: None,
                    color: None,
                },
                SeatInput {
                    user_id: None,
                    display_name: Some("guest".into()),
                    color: Some("ffe119".into()),
                },
            ],
        }
    }

    #[tokio::test]
    async fn create_assigns_unused_palette_colors_and_turn_order() {
        let h = harness().await;
        let snapshot = create_timer(&h.state, h.creator, request(TimerKind::CountUp, h.seated))
            .await
            .unwrap();

        assert_eq!(snapshot.creator_id, h.creator);
        assert_eq!(snapshot.seats.len(), 2);
        assert_eq!(snapshot.seats[0].turn_order, 0);
        // The omitted color comes from the palette, skipping the explicit one.
        assert_eq!(snapshot.seats[0].color, "e6194b");
        assert_eq!(snapshot.seats[1].color, "ffe119");
        assert!(!snapshot.running);
    }

    #[tokio::test]
    async fn count_up_handoff_moves_the_running_clock() {
        let h = harness().await;
        let created = create_timer(&h.state, h.creator, request(TimerKind::CountUp, h.seated))
            .await
            .unwrap();

        let outcome = start_timer(&h.state, h.seated, created.id).await.unwrap();
        assert!(!outcome.already_running);

        h.clock.advance(1_000);
        let outcome = advance_timer(&h.state, h.seated, created.id, AdvanceDirection::Next)
            .await
            .unwrap();
        assert!(outcome.was_running);

        let snapshot = get_timer(&h.state, h.creator, created.id).await.unwrap();
        assert_eq!(snapshot.seats[0].elapsed_ms, 1_000);
        assert!(!snapshot.seats[0].running);
        assert!(snapshot.seats[1].running);
        assert_eq!(snapshot.current_seat_id, snapshot.seats[1].id);
    }

    #[tokio::test]
    async fn reload_handoff_credits_the_outgoing_seat() {
        let h = harness().await;
        let created = create_timer(&h.state, h.creator, request(TimerKind::Reload, h.seated))
            .await
            .unwrap();

        start_timer(&h.state, h.seated, created.id).await.unwrap();
        h.clock.advance(500);
        advance_timer(&h.state, h.seated, created.id, AdvanceDirection::Next)
            .await
            .unwrap();

        let snapshot = get_timer(&h.state, h.creator, created.id).await.unwrap();
        // 500ms spent, 2000ms credited back, against a 60s allowance.
        assert_eq!(snapshot.seats[0].elapsed_ms, -1_500);
        assert_eq!(snapshot.seats[0].remaining_ms, Some(61_500));
    }

    #[tokio::test]
    async fn repeated_start_reports_already_running_without_resetting() {
        let h = harness().await;
        let created = create_timer(&h.state, h.creator, request(TimerKind::CountUp, h.seated))
            .await
            .unwrap();

        start_timer(&h.state, h.seated, created.id).await.unwrap();
        h.clock.advance(700);
        let outcome = start_timer(&h.state, h.seated, created.id).await.unwrap();
        assert!(outcome.already_running);

        h.clock.advance(300);
        let snapshot = get_timer(&h.state, h.creator, created.id).await.unwrap();
        // The running span still counts from the first start.
        assert_eq!(snapshot.seats[0].elapsed_ms, 1_000);
    }

    #[tokio::test]
    async fn strangers_are_rejected_and_leave_the_timer_untouched() {
        let h = harness().await;
        let created = create_timer(&h.state, h.creator, request(TimerKind::CountUp, h.seated))
            .await
            .unwrap();
        let stranger = Uuid::new_v4();

        let err = start_timer(&h.state, stranger, created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));
        let err = get_timer(&h.state, stranger, created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        let snapshot = get_timer(&h.state, h.creator, created.id).await.unwrap();
        assert!(!snapshot.running);
    }

    #[tokio::test]
    async fn only_the_creator_deletes() {
        let h = harness().await;
        let created = create_timer(&h.state, h.creator, request(TimerKind::CountDown, h.seated))
            .await
            .unwrap();

        let err = delete_timer(&h.state, h.seated, created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::Forbidden(_)));

        delete_timer(&h.state, h.creator, created.id).await.unwrap();
        let err = get_timer(&h.state, h.creator, created.id).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn unknown_timers_surface_not_found() {
        let h = harness().await;
        let err = start_timer(&h.state, h.creator, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn concurrent_starts_let_exactly_one_through() {
        let h = harness().await;
        let created = create_timer(&h.state, h.creator, request(TimerKind::CountUp, h.seated))
            .await
            .unwrap();

        let (a, b) = tokio::join!(
            start_timer(&h.state, h.seated, created.id),
            start_timer(&h.state, h.creator, created.id),
        );
        let (a, b) = (a.unwrap(), b.unwrap());
        assert_ne!(a.already_running, b.already_running);

        let snapshot = get_timer(&h.state, h.creator, created.id).await.unwrap();
        assert_eq!(snapshot.seats.iter().filter(|s| s.running).count(), 1);
    }

    #[tokio::test]
    async fn reassign_and_recolor_flow_through_the_locked_cycle() {
        let h = harness().await;
        let created = create_timer(&h.state, h.creator, request(TimerKind::CountUp, h.seated))
            .await
            .unwrap();
        let (first, second) = (created.seats[0].id, created.seats[1].id);

        reassign_turn_order(
            &h.state,
            h.creator,
            created.id,
            vec![
                SeatOrderInput { seat_id: second, turn_order: 0 },
                SeatOrderInput { seat_id: first, turn_order: 1 },
            ],
        )
        .await
        .unwrap();

        change_seat_color(&h.state, h.seated, created.id, first, "46f0f0".into())
            .await
            .unwrap();

        let err = change_seat_color(&h.state, h.seated, created.id, first, "#bad".into())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));

        let snapshot = get_timer(&h.state, h.creator, created.id).await.unwrap();
        assert_eq!(snapshot.current_seat_id, second);
        assert_eq!(snapshot.seats[0].id, second);
        assert_eq!(snapshot.seats[1].color, "46f0f0");
    }
}
