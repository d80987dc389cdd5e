use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::instrument;

use super::{
    dto::{
        AuthResponse, LoginRequest, PublicUser, RegisterRequest, RegisterResponse,
        UpdateProfileRequest, VerifyEmailRequest, VerifyEmailResponse,
    },
    extractors::AuthUser,
    services,
};
use crate::{
    error::{AppError, AppJson},
    state::AppState,
};

const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;

pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/verify-email", post(verify_email))
        .route("/auth/login", post(login))
}

pub fn profile_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/profile", get(get_profile).put(update_profile))
        .route(
            "/auth/profile/upload-image",
            post(upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 64 * 1024)),
        )
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    AppJson(payload): AppJson<RegisterRequest>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let res = services::register(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(res)))
}

#[instrument(skip(state, payload))]
pub async fn verify_email(
    State(state): State<AppState>,
    AppJson(payload): AppJson<VerifyEmailRequest>,
) -> Result<Json<VerifyEmailResponse>, AppError> {
    Ok(Json(services::verify_email(&state, payload).await?))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    AppJson(payload): AppJson<LoginRequest>,
) -> Result<Json<AuthResponse>, AppError> {
    Ok(Json(services::login(&state, payload).await?))
}

#[instrument(skip(state, user), fields(user_id = %user.id))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(services::profile(&state, user.id).await?))
}

#[instrument(skip(state, user, payload), fields(user_id = %user.id))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(payload): AppJson<UpdateProfileRequest>,
) -> Result<Json<PublicUser>, AppError> {
    Ok(Json(services::update_profile(&state, user.id, payload).await?))
}

const IMAGE_TOO_LARGE: &str = "Image exceeds 5 MiB";

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(IMAGE_TOO_LARGE.into())
    } else {
        AppError::Validation(e.body_text())
    }
}

/// Multipart upload; the image is read from the `file` field.
#[instrument(skip(state, user, mp), fields(user_id = %user.id))]
pub async fn upload_image(
    State(state): State<AppState>,
    user: AuthUser,
    mut mp: Multipart,
) -> Result<Json<PublicUser>, AppError> {
    while let Some(field) = mp
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }
        let content_type = field
            .content_type()
            .map(str::to_string)
            .unwrap_or_else(|| "application/octet-stream".into());
        let data = field.bytes().await.map_err(multipart_error)?;
        if data.len() > MAX_IMAGE_BYTES {
            return Err(AppError::PayloadTooLarge(IMAGE_TOO_LARGE.into()));
        }
        let updated =
            services::upload_profile_image(&state, user.id, data, &content_type).await?;
        return Ok(Json(updated));
    }
    Err(AppError::Validation("No file provided".into()))
}
