//! The chess-clock state machine.
//!
//! Pure logic over an in-memory aggregate: a turn pointer, one clock per
//! seat, and elapsed-time bookkeeping. At most one seat runs at any instant;
//! a plain `start` only ever targets the current seat, and `advance` moves a
//! running clock along with the turn. Callers execute each operation inside
//! one store transaction with a single `now` sample.
//!
//! Reload convention: when a `RELOAD` timer advances, the increment is
//! subtracted from the just-active seat's `elapsed_ms`, restoring allowance.
//! Elapsed (and therefore remaining) values may go negative; clamping is a
//! presentation concern.

use indexmap::IndexMap;
use thiserror::Error;
use uuid::Uuid;

use crate::dao::models::{SeatEntity, TimerEntity, TimerKind};

/// One participant slot with its own clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seat {
    /// Registered user occupying the seat, if any.
    pub user_id: Option<Uuid>,
    /// Free-text name for unregistered participants.
    pub display_name: Option<String>,
    /// Position in the rotation (0..N-1).
    pub turn_order: u32,
    /// Milliseconds accumulated as of the last stop.
    pub elapsed_ms: i64,
    /// Epoch milliseconds of the running start, `Some` iff running.
    pub running_since_ms: Option<u64>,
    /// Display color (hex code).
    pub color: String,
}

impl Seat {
    /// Whether this seat's clock is running.
    pub fn is_running(&self) -> bool {
        self.running_since_ms.is_some()
    }

    /// Elapsed milliseconds including the in-flight running span.
    pub fn live_elapsed_ms(&self, now_ms: u64) -> i64 {
        match self.running_since_ms {
            Some(since) => self.elapsed_ms + now_ms.saturating_sub(since) as i64,
            None => self.elapsed_ms,
        }
    }
}

/// Runtime representation of a timer aggregate, seats keyed by id in turn
/// order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnTimer {
    /// Stable identifier of the timer.
    pub id: Uuid,
    /// Clock variant, immutable after creation.
    pub kind: TimerKind,
    /// Identity holding administrative rights.
    pub creator_id: Uuid,
    /// Milliseconds each seat starts from (0 for `COUNT_UP`).
    pub initial_duration_ms: u64,
    /// Allowance credited back per finished turn (`Some` iff `RELOAD`).
    pub reload_increment_ms: Option<u64>,
    /// Index of the seat whose clock is eligible to run.
    pub current_seat: usize,
    /// Optional board game link.
    pub board_game_id: Option<Uuid>,
    /// Optional event link.
    pub event_id: Option<Uuid>,
    /// Creation timestamp.
    pub created_at: std::time::SystemTime,
    /// Last committed mutation timestamp.
    pub updated_at: std::time::SystemTime,
    /// Seats in turn order.
    pub seats: IndexMap<Uuid, Seat>,
}

/// Direction of a turn advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceDirection {
    /// Move the turn to the following seat.
    Next,
    /// Move the turn back to the preceding seat.
    Prev,
}

/// Result of a `start` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    /// The current seat's clock was already running; nothing changed.
    pub already_running: bool,
}

/// Result of a `stop` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopOutcome {
    /// The current seat's clock was already stopped; nothing changed.
    pub already_stopped: bool,
}

/// Result of an `advance` operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    /// Whether the outgoing seat's clock was running (and the new current
    /// seat's clock is therefore running now).
    pub was_running: bool,
    /// Seat whose turn just ended.
    pub previous_seat: Uuid,
    /// Seat whose turn it now is.
    pub current_seat: Uuid,
}

/// Rejections raised by state-machine operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimerOpError {
    /// Referenced seat does not belong to this timer.
    #[error("seat `{0}` does not belong to this timer")]
    UnknownSeat(Uuid),
    /// A reassignment did not name every seat exactly once with contiguous
    /// positions.
    #[error("turn order must list every seat exactly once with contiguous positions 0..{seat_count}")]
    NonContiguousOrder {
        /// Number of seats the ordering must cover.
        seat_count: usize,
    },
}

impl TurnTimer {
    /// Id of the seat whose turn it currently is.
    pub fn current_seat_id(&self) -> Uuid {
        // Invariant: current_seat is always a valid index.
        *self
            .seats
            .get_index(self.current_seat)
            .map(|(id, _)| id)
            .expect("current_seat index within seat list")
    }

    /// The seat currently running, if any.
    pub fn running_seat(&self) -> Option<(Uuid, &Seat)> {
        self.seats
            .iter()
            .find(|(_, seat)| seat.is_running())
            .map(|(id, seat)| (*id, seat))
    }

    /// Whether `user_id` occupies one of the seats.
    pub fn has_seat_for(&self, user_id: Uuid) -> bool {
        self.seats
            .values()
            .any(|seat| seat.user_id == Some(user_id))
    }

    /// Start the current seat's clock.
    pub fn start(&mut self, now_ms: u64) -> StartOutcome {
        let index = self.current_seat;
        let seat = self
            .seats
            .get_index_mut(index)
            .map(|(_, seat)| seat)
            .expect("current_seat index within seat list");
        if seat.is_running() {
            return StartOutcome {
                already_running: true,
            };
        }
        seat.running_since_ms = Some(now_ms);
        StartOutcome {
            already_running: false,
        }
    }

    /// Stop the current seat's clock, crediting the elapsed span.
    pub fn stop(&mut self, now_ms: u64) -> StopOutcome {
        let index = self.current_seat;
        let seat = self
            .seats
            .get_index_mut(index)
            .map(|(_, seat)| seat)
            .expect("current_seat index within seat list");
        let Some(since) = seat.running_since_ms.take() else {
            return StopOutcome {
                already_stopped: true,
            };
        };
        seat.elapsed_ms += now_ms.saturating_sub(since) as i64;
        StopOutcome {
            already_stopped: false,
        }
    }

    /// Move the turn one seat in `direction`, keeping a running clock
    /// attached to the turn: the outgoing seat is stopped (and credited the
    /// reload increment on `RELOAD` timers, running or not), and the incoming
    /// seat starts iff the outgoing one was running.
    pub fn advance(&mut self, direction: AdvanceDirection, now_ms: u64) -> AdvanceOutcome {
        let previous_index = self.current_seat;
        let previous_seat = self.current_seat_id();

        let was_running = !self.stop(now_ms).already_stopped;

        if self.kind == TimerKind::Reload {
            let increment = self.reload_increment_ms.unwrap_or(0) as i64;
            if let Some((_, seat)) = self.seats.get_index_mut(previous_index) {
                seat.elapsed_ms -= increment;
            }
        }

        let seat_count = self.seats.len();
        self.current_seat = match direction {
            AdvanceDirection::Next => (previous_index + 1) % seat_count,
            AdvanceDirection::Prev => (previous_index + seat_count - 1) % seat_count,
        };

        if was_running {
            self.start(now_ms);
        }

        AdvanceOutcome {
            was_running,
            previous_seat,
            current_seat: self.current_seat_id(),
        }
    }

    /// Redefine the seat rotation. The running clock (if any) is stopped
    /// first since "current" becomes ambiguous, then the new contiguous
    /// ordering is applied and the turn resets to position 0.
    pub fn reassign_turn_order(
        &mut self,
        new_order: &[(Uuid, u32)],
        now_ms: u64,
    ) -> Result<(), TimerOpError> {
        let seat_count = self.seats.len();
        if new_order.len() != seat_count {
            return Err(TimerOpError::NonContiguousOrder { seat_count });
        }

        let mut positions = vec![false; seat_count];
        for (seat_id, order) in new_order {
            if !self.seats.contains_key(seat_id) {
                return Err(TimerOpError::UnknownSeat(*seat_id));
            }
            let position = *order as usize;
            if position >= seat_count || positions[position] {
                return Err(TimerOpError::NonContiguousOrder { seat_count });
            }
            positions[position] = true;
        }

        self.stop(now_ms);

        for (seat_id, order) in new_order {
            if let Some(seat) = self.seats.get_mut(seat_id) {
                seat.turn_order = *order;
            }
        }
        self.seats
            .sort_by(|_, a, _, b| a.turn_order.cmp(&b.turn_order));
        self.current_seat = 0;

        Ok(())
    }

    /// Set a seat's display color. No timing effect.
    pub fn set_seat_color(&mut self, seat_id: Uuid, color: String) -> Result<(), TimerOpError> {
        let seat = self
            .seats
            .get_mut(&seat_id)
            .ok_or(TimerOpError::UnknownSeat(seat_id))?;
        seat.color = color;
        Ok(())
    }

    #[cfg(test)]
    fn running_count(&self) -> usize {
        self.seats.values().filter(|seat| seat.is_running()).count()
    }
}

impl From<TimerEntity> for TurnTimer {
    fn from(value: TimerEntity) -> Self {
        let mut rows = value.seats;
        rows.sort_by_key(|seat| seat.turn_order);
        let seats = rows
            .into_iter()
            .map(|row| {
                (
                    row.id,
                    Seat {
                        user_id: row.user_id,
                        display_name: row.display_name,
                        turn_order: row.turn_order,
                        elapsed_ms: row.elapsed_ms,
                        running_since_ms: row.running_since_ms,
                        color: row.color,
                    },
                )
            })
            .collect();

        Self {
            id: value.id,
            kind: value.kind,
            creator_id: value.creator_id,
            initial_duration_ms: value.initial_duration_ms,
            reload_increment_ms: value.reload_increment_ms,
            current_seat: value.current_seat,
            board_game_id: value.board_game_id,
            event_id: value.event_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
            seats,
        }
    }
}

impl From<TurnTimer> for TimerEntity {
    fn from(value: TurnTimer) -> Self {
        Self {
            id: value.id,
            kind: value.kind,
            creator_id: value.creator_id,
            initial_duration_ms: value.initial_duration_ms,
            reload_increment_ms: value.reload_increment_ms,
            current_seat: value.current_seat,
            board_game_id: value.board_game_id,
            event_id: value.event_id,
            created_at: value.created_at,
            updated_at: value.updated_at,
            seats: value
                .seats
                .into_iter()
                .map(|(id, seat)| SeatEntity {
                    id,
                    user_id: seat.user_id,
                    display_name: seat.display_name,
                    turn_order: seat.turn_order,
                    elapsed_ms: seat.elapsed_ms,
                    running_since_ms: seat.running_since_ms,
                    color: seat.color,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use super::*;

    fn timer(kind: TimerKind, seat_count: usize) -> TurnTimer {
        let now = SystemTime::now();
        let mut seats = IndexMap::new();
        for order in 0..seat_count {
            seats.insert(
                Uuid::new_v4(),
                Seat {
                    user_id: None,
                    display_name: Some(format!("seat {order}")),
                    turn_order: order as u32,
                    elapsed_ms: 0,
                    running_since_ms: None,
                    color: "3cb44b".into(),
                },
            );
        }
        TurnTimer {
            id: Uuid::new_v4(),
            kind,
            creator_id: Uuid::new_v4(),
            initial_duration_ms: if kind == TimerKind::CountUp { 0 } else { 60_000 },
            reload_increment_ms: (kind == TimerKind::Reload).then_some(2_000),
            current_seat: 0,
            board_game_id: None,
            event_id: None,
            created_at: now,
            updated_at: now,
            seats,
        }
    }

    fn seat_id(timer: &TurnTimer, index: usize) -> Uuid {
        *timer.seats.get_index(index).unwrap().0
    }

    #[test]
    fn start_is_idempotent_and_reports_already_running() {
        let mut t = timer(TimerKind::CountUp, 3);
        assert!(!t.start(1_000).already_running);
        let before = t.clone();
        let outcome = t.start(5_000);
        assert!(outcome.already_running);
        // Second start leaves elapsed and running_since untouched.
        assert_eq!(t.seats, before.seats);
    }

    #[test]
    fn stop_credits_exact_elapsed_span() {
        let mut t = timer(TimerKind::CountUp, 3);
        t.start(1_000);
        assert!(!t.stop(2_500).already_stopped);
        let seat = t.seats.get_index(0).unwrap().1;
        assert_eq!(seat.elapsed_ms, 1_500);
        assert_eq!(seat.running_since_ms, None);
        assert!(t.stop(9_000).already_stopped);
        assert_eq!(t.seats.get_index(0).unwrap().1.elapsed_ms, 1_500);
    }

    #[test]
    fn at_most_one_seat_runs_through_any_sequence() {
        let mut t = timer(TimerKind::CountDown, 4);
        assert_eq!(t.running_count(), 0);
        t.start(100);
        assert_eq!(t.running_count(), 1);
        t.advance(AdvanceDirection::Next, 200);
        assert_eq!(t.running_count(), 1);
        t.advance(AdvanceDirection::Prev, 300);
        assert_eq!(t.running_count(), 1);
        t.stop(400);
        assert_eq!(t.running_count(), 0);
        t.advance(AdvanceDirection::Next, 500);
        assert_eq!(t.running_count(), 0);
        t.start(600);
        t.start(700);
        assert_eq!(t.running_count(), 1);
    }

    #[test]
    fn full_rotation_returns_to_the_original_seat() {
        let mut t = timer(TimerKind::CountUp, 3);
        let origin = t.current_seat;
        for _ in 0..3 {
            t.advance(AdvanceDirection::Next, 1_000);
        }
        assert_eq!(t.current_seat, origin);

        t.advance(AdvanceDirection::Next, 2_000);
        t.advance(AdvanceDirection::Prev, 3_000);
        assert_eq!(t.current_seat, origin);
    }

    #[test]
    fn prev_wraps_below_zero() {
        let mut t = timer(TimerKind::CountUp, 3);
        let outcome = t.advance(AdvanceDirection::Prev, 1_000);
        assert_eq!(t.current_seat, 2);
        assert_eq!(outcome.current_seat, seat_id(&t, 2));
    }

    #[test]
    fn running_clock_follows_the_turn() {
        let mut t = timer(TimerKind::CountUp, 3);
        t.start(1_000);
        let outcome = t.advance(AdvanceDirection::Next, 2_000);
        assert!(outcome.was_running);

        let seat0 = t.seats.get_index(0).unwrap().1;
        assert_eq!(seat0.elapsed_ms, 1_000);
        assert!(!seat0.is_running());

        let seat1 = t.seats.get_index(1).unwrap().1;
        assert_eq!(seat1.running_since_ms, Some(2_000));
        assert_eq!(t.current_seat, 1);
    }

    #[test]
    fn paused_advance_leaves_every_clock_stopped() {
        let mut t = timer(TimerKind::CountUp, 3);
        let outcome = t.advance(AdvanceDirection::Next, 2_000);
        assert!(!outcome.was_running);
        assert_eq!(t.running_count(), 0);
        assert_eq!(t.current_seat, 1);
    }

    #[test]
    fn reload_credit_applies_to_the_outgoing_seat_even_when_stopped() {
        let mut t = timer(TimerKind::Reload, 3);
        {
            let seat = t.seats.get_index_mut(0).unwrap().1;
            seat.elapsed_ms = 500;
        }
        t.advance(AdvanceDirection::Next, 1_000);
        // Credit restores allowance: elapsed goes negative past the credit.
        assert_eq!(t.seats.get_index(0).unwrap().1.elapsed_ms, -1_500);
        assert_eq!(t.running_count(), 0);
    }

    #[test]
    fn reload_credit_stacks_with_the_running_span() {
        let mut t = timer(TimerKind::Reload, 2);
        t.start(0);
        t.advance(AdvanceDirection::Next, 500);
        // 500ms used, 2000ms credited back.
        assert_eq!(t.seats.get_index(0).unwrap().1.elapsed_ms, -1_500);
        assert!(t.seats.get_index(1).unwrap().1.is_running());
    }

    #[test]
    fn count_up_turn_handoff_scenario() {
        let mut t = timer(TimerKind::CountUp, 3);
        t.start(10_000);
        t.advance(AdvanceDirection::Next, 11_000);

        let seat0 = t.seats.get_index(0).unwrap().1;
        assert_eq!(seat0.elapsed_ms, 1_000);
        assert!(!seat0.is_running());
        let seat1 = t.seats.get_index(1).unwrap().1;
        assert_eq!(seat1.elapsed_ms, 0);
        assert!(seat1.is_running());
        assert_eq!(t.current_seat, 1);
    }

    #[test]
    fn reassign_stops_the_clock_and_resets_the_turn() {
        let mut t = timer(TimerKind::CountUp, 3);
        let (a, b, c) = (seat_id(&t, 0), seat_id(&t, 1), seat_id(&t, 2));
        t.start(1_000);

        t.reassign_turn_order(&[(c, 0), (a, 1), (b, 2)], 3_000)
            .unwrap();

        assert_eq!(t.running_count(), 0);
        assert_eq!(t.current_seat, 0);
        assert_eq!(t.current_seat_id(), c);
        // Seat a was running and got credited before the reorder.
        assert_eq!(t.seats.get(&a).unwrap().elapsed_ms, 2_000);
        assert_eq!(t.seats.get(&b).unwrap().turn_order, 2);
    }

    #[test]
    fn reassign_rejects_gaps_duplicates_and_strangers() {
        let mut t = timer(TimerKind::CountUp, 3);
        let (a, b, c) = (seat_id(&t, 0), seat_id(&t, 1), seat_id(&t, 2));

        let err = t
            .reassign_turn_order(&[(a, 0), (b, 1), (c, 3)], 0)
            .unwrap_err();
        assert_eq!(err, TimerOpError::NonContiguousOrder { seat_count: 3 });

        let err = t
            .reassign_turn_order(&[(a, 0), (b, 0), (c, 1)], 0)
            .unwrap_err();
        assert_eq!(err, TimerOpError::NonContiguousOrder { seat_count: 3 });

        let stranger = Uuid::new_v4();
        let err = t
            .reassign_turn_order(&[(a, 0), (b, 1), (stranger, 2)], 0)
            .unwrap_err();
        assert_eq!(err, TimerOpError::UnknownSeat(stranger));

        let err = t.reassign_turn_order(&[(a, 0), (b, 1)], 0).unwrap_err();
        assert_eq!(err, TimerOpError::NonContiguousOrder { seat_count: 3 });
    }

    #[test]
    fn set_color_touches_nothing_else() {
        let mut t = timer(TimerKind::CountUp, 2);
        let target = seat_id(&t, 1);
        t.start(1_000);
        t.set_seat_color(target, "ffee00".into()).unwrap();
        assert_eq!(t.seats.get(&target).unwrap().color, "ffee00");
        assert_eq!(t.running_count(), 1);

        let err = t.set_seat_color(Uuid::new_v4(), "ffee00".into()).unwrap_err();
        assert!(matches!(err, TimerOpError::UnknownSeat(_)));
    }

    #[test]
    fn entity_conversion_roundtrips_in_turn_order() {
        let t = timer(TimerKind::Reload, 3);
        let entity: TimerEntity = t.clone().into();
        let back: TurnTimer = entity.into();
        assert_eq!(back, t);
    }

    #[test]
    fn live_elapsed_includes_the_running_span() {
        let mut t = timer(TimerKind::CountUp, 2);
        t.start(1_000);
        let seat = t.seats.get_index(0).unwrap().1;
        assert_eq!(seat.live_elapsed_ms(4_200), 3_200);
        assert_eq!(t.seats.get_index(1).unwrap().1.live_elapsed_ms(4_200), 0);
    }
}
