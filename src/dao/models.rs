use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use utoipa::ToSchema;
use uuid::Uuid;

/// Clock variant, fixed at creation time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TimerKind {
    /// Per-seat clocks count up from zero.
    CountUp,
    /// Per-seat clocks count down from the initial duration.
    CountDown,
    /// Count-down variant that credits a fixed increment back to a seat each
    /// time its turn ends.
    Reload,
}

/// One participant slot of a timer, ordered by `turn_order`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeatEntity {
    /// Stable identifier for the seat.
    pub id: Uuid,
    /// Registered user occupying the seat, if any. Mutually exclusive with
    /// `display_name`; never both absent.
    pub user_id: Option<Uuid>,
    /// Free-text participant name for seats without a registered user.
    pub display_name: Option<String>,
    /// Position in the turn rotation (0..N-1, contiguous, unique per timer).
    pub turn_order: u32,
    /// Accumulated milliseconds this seat's clock has run, as of the last stop.
    /// May be negative on `RELOAD` timers once credits exceed usage.
    pub elapsed_ms: i64,
    /// Unix-epoch milliseconds at which this seat's clock started running.
    /// `Some` iff the clock is currently running.
    pub running_since_ms: Option<u64>,
    /// Display color (6 or 8 hex digits). No timing meaning.
    pub color: String,
}

/// Aggregate timer entity persisted by the storage layer: the timer header
/// plus its seat rows, always read and written together.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TimerEntity {
    /// Primary key of the timer.
    pub id: Uuid,
    /// Clock variant (immutable after creation).
    pub kind: TimerKind,
    /// Identity that created the timer and holds administrative rights.
    pub creator_id: Uuid,
    /// Milliseconds each seat's clock starts from (0 for `COUNT_UP`).
    pub initial_duration_ms: u64,
    /// Milliseconds credited back to a seat when its turn ends.
    /// `Some` iff `kind == Reload`.
    pub reload_increment_ms: Option<u64>,
    /// Index into the `turn_order`-sorted seat list of the seat whose clock is
    /// eligible to run.
    pub current_seat: usize,
    /// Optional link to a board game, used only for display/derivation.
    pub board_game_id: Option<Uuid>,
    /// Optional link to an event, used only for access derivation.
    pub event_id: Option<Uuid>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the aggregate was committed.
    pub updated_at: SystemTime,
    /// Seat rows belonging to this timer.
    pub seats: Vec<SeatEntity>,
}

impl SeatEntity {
    /// Whether this seat's clock is currently running.
    pub fn is_running(&self) -> bool {
        self.running_since_ms.is_some()
    }
}

impl TimerEntity {
    /// Number of seats in the rotation.
    pub fn seat_count(&self) -> usize {
        self.seats.len()
    }
}
