use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use tracing::instrument;
use uuid::Uuid;

use super::{
    dto::{CreateTaskRequest, TaskResponse, UpdateTaskRequest},
    services,
};
use crate::{
    auth::extractors::AuthUser,
    error::{AppError, AppJson},
    state::AppState,
};

pub fn task_routes() -> Router<AppState> {
    Router::new()
        .route("/tasks", get(list_tasks).post(create_task))
        .route(
            "/tasks/:id",
            get(get_task).put(update_task).delete(delete_task),
        )
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn list_tasks(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<TaskResponse>>, AppError> {
    Ok(Json(services::list_tasks(&state, user.id).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskResponse>, AppError> {
    Ok(Json(services::get_task(&state, id, user.id).await?))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn create_task(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<CreateTaskRequest>,
) -> Result<(StatusCode, Json<TaskResponse>), AppError> {
    let task = services::create_task(&state, user.id, payload).await?;
    Ok((StatusCode::CREATED, Json(task)))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
    AppJson(payload): AppJson<UpdateTaskRequest>,
) -> Result<Json<TaskResponse>, AppError> {
    Ok(Json(services::update_task(&state, id, user.id, payload).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn delete_task(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    services::delete_task(&state, id, user.id).await?;
    Ok(StatusCode::NO_CONTENT)
}
