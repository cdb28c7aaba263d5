//! Maps a caller identity to what it may do with a given timer.
//!
//! The rules are ownership-based: the creator administers the timer, seated
//! users may read it and drive its clocks, everyone else is turned away.
//! Authentication itself happens upstream; this layer only sees the already
//! resolved user id.

use axum::{extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

use crate::{
    error::{AppError, ServiceError},
    state::timer::TurnTimer,
};

/// Header carrying the authenticated caller's user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// What a command needs to be allowed to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessLevel {
    /// View the timer and follow its room.
    Read,
    /// Drive the clocks: start, stop, advance, recolor, reorder.
    Write,
    /// Destructive operations, creator only.
    Admin,
}

/// Whether `user_id` holds `level` on `timer`.
pub fn check(timer: &TurnTimer, user_id: Uuid, level: AccessLevel) -> bool {
    match level {
        AccessLevel::Admin => timer.creator_id == user_id,
        AccessLevel::Read | AccessLevel::Write => {
            timer.creator_id == user_id || timer.has_seat_for(user_id)
        }
    }
}

/// Like [`check`], but failing closed into a [`ServiceError::Forbidden`].
pub fn ensure(timer: &TurnTimer, user_id: Uuid, level: AccessLevel) -> Result<(), ServiceError> {
    if check(timer, user_id, level) {
        Ok(())
    } else {
        Err(ServiceError::Forbidden(format!(
            "user `{user_id}` may not {} timer `{}`",
            match level {
                AccessLevel::Read => "view",
                AccessLevel::Write => "operate",
                AccessLevel::Admin => "administer",
            },
            timer.id
        )))
    }
}

/// Authenticated caller identity, resolved from the `x-user-id` header set by
/// the fronting auth layer.
#[derive(Debug, Clone, Copy)]
pub struct Identity {
    pub user_id: Uuid,
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(|| AppError::Unauthorized(format!("missing `{USER_ID_HEADER}` header")))?;
        let raw = raw
            .to_str()
            .map_err(|_| AppError::Unauthorized(format!("invalid `{USER_ID_HEADER}` header")))?;
        let user_id = Uuid::parse_str(raw).map_err(|_| {
            AppError::Unauthorized(format!("`{USER_ID_HEADER}` header is not a UUID"))
        })?;
        Ok(Identity { user_id })
    }
}
