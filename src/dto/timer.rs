use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::{
    dao::models::TimerKind,
    dto::{format_system_time, validation::validate_color_code},
    state::timer::{Seat, TurnTimer},
};

/// Payload used to bootstrap a brand-new turn timer.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateTimerRequest {
    pub kind: TimerKind,
    /// Per-seat starting allowance in milliseconds. Must be 0 for `COUNT_UP`.
    #[serde(default)]
    pub initial_duration_ms: u64,
    /// Allowance credited back on each turn handoff. Required for `RELOAD`,
    /// rejected otherwise.
    #[serde(default)]
    pub reload_increment_ms: Option<u64>,
    #[serde(default)]
    pub board_game_id: Option<Uuid>,
    #[serde(default)]
    pub event_id: Option<Uuid>,
    pub seats: Vec<SeatInput>,
}

impl Validate for CreateTimerRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if self.seats.is_empty() {
            let mut err = ValidationError::new("seats_empty");
            err.message = Some("A timer needs at least one seat".into());
            errors.add("seats", err);
        }
        for seat in &self.seats {
            if let Err(seat_errors) = seat.validate() {
                errors.merge_self("seats", Err(seat_errors));
            }
        }

        match self.kind {
            TimerKind::CountUp => {
                if self.initial_duration_ms != 0 {
                    let mut err = ValidationError::new("duration_forbidden");
                    err.message =
                        Some("COUNT_UP timers must not set an initial duration".into());
                    errors.add("initial_duration_ms", err);
                }
            }
            TimerKind::CountDown | TimerKind::Reload => {
                if self.initial_duration_ms == 0 {
                    let mut err = ValidationError::new("duration_required");
                    err.message = Some("This timer kind needs a non-zero initial duration".into());
                    errors.add("initial_duration_ms", err);
                }
            }
        }

        match (self.kind, self.reload_increment_ms) {
            (TimerKind::Reload, None) => {
                let mut err = ValidationError::new("increment_required");
                err.message = Some("RELOAD timers need a reload increment".into());
                errors.add("reload_increment_ms", err);
            }
            (TimerKind::CountUp | TimerKind::CountDown, Some(_)) => {
                let mut err = ValidationError::new("increment_forbidden");
                err.message =
                    Some("Only RELOAD timers may set a reload increment".into());
                errors.add("reload_increment_ms", err);
            }
            _ => {}
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Incoming seat definition for the timer bootstrap.
#[derive(Debug, Deserialize, ToSchema)]
pub struct SeatInput {
    /// Registered user occupying the seat.
    #[serde(default)]
    pub user_id: Option<Uuid>,
    /// Free-text name for unregistered participants.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Optional hex color. If omitted, the backend picks the first unused
    /// color from the configured palette.
    #[serde(default)]
    pub color: Option<String>,
}

impl Validate for SeatInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match (&self.user_id, &self.display_name) {
            (None, None) => {
                let mut err = ValidationError::new("seat_identity_missing");
                err.message = Some("A seat needs a user_id or a display_name".into());
                errors.add("user_id", err);
            }
            (Some(_), Some(_)) => {
                let mut err = ValidationError::new("seat_identity_ambiguous");
                err.message =
                    Some("A seat takes either a user_id or a display_name, not both".into());
                errors.add("display_name", err);
            }
            _ => {}
        }

        if let Some(ref color) = self.color {
            if let Err(e) = validate_color_code(color) {
                errors.add("color", e);
            }
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// One row of a turn-order reassignment.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct SeatOrderInput {
    pub seat_id: Uuid,
    pub turn_order: u32,
}

/// Full projection of a timer as exposed to REST and WebSocket clients.
#[derive(Debug, Serialize, ToSchema)]
pub struct TimerSnapshot {
    pub id: Uuid,
    pub kind: TimerKind,
    pub creator_id: Uuid,
    pub initial_duration_ms: u64,
    pub reload_increment_ms: Option<u64>,
    pub board_game_id: Option<Uuid>,
    pub event_id: Option<Uuid>,
    pub created_at: String,
    pub updated_at: String,
    /// Seat whose turn it currently is.
    pub current_seat_id: Uuid,
    /// Whether any seat's clock is running right now.
    pub running: bool,
    pub seats: Vec<SeatSnapshot>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Public projection of a seat, with clocks resolved against a single
/// observation instant.
pub struct SeatSnapshot {
    pub id: Uuid,
    pub user_id: Option<Uuid>,
    pub display_name: Option<String>,
    pub turn_order: u32,
    pub color: String,
    /// Elapsed milliseconds including any in-flight running span. May be
    /// negative on `RELOAD` timers.
    pub elapsed_ms: i64,
    /// Milliseconds left on the allowance; absent for `COUNT_UP`. May be
    /// negative once a seat overruns.
    pub remaining_ms: Option<i64>,
    pub running: bool,
}

impl TimerSnapshot {
    /// Project `timer` as observed at `now_ms`, resolving every running span
    /// against that one instant.
    pub fn from_timer(timer: &TurnTimer, now_ms: u64) -> Self {
        let seats = timer
            .seats
            .iter()
            .map(|(id, seat)| SeatSnapshot::from_seat(*id, seat, timer, now_ms))
            .collect();

        Self {
            id: timer.id,
            kind: timer.kind,
            creator_id: timer.creator_id,
            initial_duration_ms: timer.initial_duration_ms,
            reload_increment_ms: timer.reload_increment_ms,
            board_game_id: timer.board_game_id,
            event_id: timer.event_id,
            created_at: format_system_time(timer.created_at),
            updated_at: format_system_time(timer.updated_at),
            current_seat_id: timer.current_seat_id(),
            running: timer.running_seat().is_some(),
            seats,
        }
    }
}

impl SeatSnapshot {
    fn from_seat(id: Uuid, seat: &Seat, timer: &TurnTimer, now_ms: u64) -> Self {
        let elapsed_ms = seat.live_elapsed_ms(now_ms);
        let remaining_ms = match timer.kind {
            TimerKind::CountUp => None,
            TimerKind::CountDown | TimerKind::Reload => {
                Some(timer.initial_duration_ms as i64 - elapsed_ms)
            }
        };

        Self {
            id,
            user_id: seat.user_id,
            display_name: seat.display_name.clone(),
            turn_order: seat.turn_order,
            color: seat.color.clone(),
            elapsed_ms,
            remaining_ms,
            running: seat.is_running(),
        }
    }
}
