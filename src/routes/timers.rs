use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::timer::{CreateTimerRequest, TimerSnapshot},
    error::AppError,
    services::{access::Identity, timer_service},
    state::SharedState,
};

/// Routes handling timer bootstrap and inspection.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/timers", post(create_timer))
        .route("/timers/{id}", get(get_timer))
}

/// Create a fresh timer owned by the calling user and persist it.
#[utoipa::path(
    post,
    path = "/timers",
    tag = "timers",
    request_body = CreateTimerRequest,
    responses(
        (status = 200, description = "Timer created", body = TimerSnapshot),
        (status = 400, description = "Invalid timer definition"),
        (status = 401, description = "Missing or invalid caller identity")
    )
)]
pub async fn create_timer(
    State(state): State<SharedState>,
    identity: Identity,
    Valid(Json(payload)): Valid<Json<CreateTimerRequest>>,
) -> Result<Json<TimerSnapshot>, AppError> {
    let snapshot = timer_service::create_timer(&state, identity.user_id, payload).await?;
    Ok(Json(snapshot))
}

/// Fetch one timer, with every clock resolved against the current instant.
#[utoipa::path(
    get,
    path = "/timers/{id}",
    tag = "timers",
    params(("id" = Uuid, Path, description = "Identifier of the timer to fetch")),
    responses(
        (status = 200, description = "Timer snapshot", body = TimerSnapshot),
        (status = 403, description = "Caller is neither creator nor seated"),
        (status = 404, description = "No such timer")
    )
)]
pub async fn get_timer(
    State(state): State<SharedState>,
    identity: Identity,
    Path(id): Path<Uuid>,
) -> Result<Json<TimerSnapshot>, AppError> {
    let snapshot = timer_service::get_timer(&state, identity.user_id, id).await?;
    Ok(Json(snapshot))
}
