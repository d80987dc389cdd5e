use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post},
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateSessionRequest, LeaveResponse, SessionResponse, UpdateSessionRequest},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppJson},
    state::AppState,
};

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/sessions", post(create_session).get(list_sessions))
        .route(
            "/sessions/:id",
            get(get_session).put(update_session).delete(delete_session),
        )
        .route("/sessions/:id/join", post(join_session))
        .route("/sessions/:id/leave", delete(leave_session))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_session(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionResponse>), AppError> {
    let session = services::create_session(&state, user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(session)))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_sessions(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<SessionResponse>>, AppError> {
    Ok(Json(services::list_sessions(&state, user.id).await?))
}

#[instrument(skip(state, _user))]
pub async fn get_session(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(services::get_session(&state, id).await?))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateSessionRequest>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(services::update_session(&state, id, user.id, payload).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_session(&state, id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn join_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionResponse>, AppError> {
    Ok(Json(services::join_session(&state, id, user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn leave_session(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<LeaveResponse>, AppError> {
    Ok(Json(services::leave_session(&state, id, user.id).await?))
}
