use bytes::Bytes;
use lazy_static::lazy_static;
use rand::Rng;
use regex::Regex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{
    claims::PendingRegistration,
    dto::{
        AuthResponse, LoginRequest, PublicUser, RegisterRequest, RegisterResponse,
        UpdateProfileRequest, VerifyEmailRequest, VerifyEmailResponse,
    },
    jwt::JwtKeys,
    password::{hash_password, verify_password, MIN_PASSWORD_LEN},
    repo_types::{EmailTaken, NewUser, User},
};
use crate::{error::AppError, state::AppState, storage::ext_from_mime};

const EMAIL_TAKEN: &str = "A user with this email already exists";
const BAD_CREDENTIALS: &str = "Invalid email or password";
const BAD_VERIFICATION: &str = "Invalid or expired verification code";

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Uniform 6-digit code in 100000..=999999.
pub(crate) fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

fn non_blank(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

async fn load_user(state: &AppState, id: Uuid) -> Result<User, AppError> {
    state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))
}

/// Phase one of signup. Nothing is written to the database; the pending
/// account travels inside the returned token.
pub async fn register(
    state: &AppState,
    req: RegisterRequest,
) -> Result<RegisterResponse, AppError> {
    let email = req.email.trim().to_string();
    if !is_valid_email(&email) {
        return Err(AppError::Validation("Invalid email".into()));
    }
    if req.password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    if state.users.find_by_email(&email).await?.is_some() {
        warn!(%email, "registration for existing email");
        return Err(AppError::Conflict(EMAIL_TAKEN.into()));
    }

    let code = generate_code();
    let password_hash = hash_password(req.password).await?;
    let first_name = non_blank(req.first_name);
    let last_name = non_blank(req.last_name);

    let keys = JwtKeys::from_config(&state.config.jwt);
    let temp_token = keys.sign_pending(
        PendingRegistration {
            email: email.clone(),
            password_hash,
            first_name: first_name.clone(),
            last_name,
        },
        &code,
    )?;

    if let Err(e) = state
        .mailer
        .send_verification_code(&email, &code, first_name.as_deref())
        .await
    {
        error!(error = ?e, %email, "verification email failed");
        return Err(AppError::Server(
            "Failed to send verification email".into(),
        ));
    }

    info!(%email, "verification code sent");
    Ok(RegisterResponse {
        message: "Verification code sent. Check your email.".into(),
        temp_token,
    })
}

/// Phase two of signup: exchanges the temporary token and code for an account.
pub async fn verify_email(
    state: &AppState,
    req: VerifyEmailRequest,
) -> Result<VerifyEmailResponse, AppError> {
    let keys = JwtKeys::from_config(&state.config.jwt);
    let pending = keys
        .verify_pending(&req.temp_token, &req.code)
        .map_err(|e| {
            warn!(error = %e, "verification rejected");
            AppError::Unauthorized(BAD_VERIFICATION.into())
        })?;

    if state.users.find_by_email(&pending.email).await?.is_some() {
        return Err(AppError::Conflict(EMAIL_TAKEN.into()));
    }

    let user = state
        .users
        .create(NewUser {
            email: pending.email,
            password_hash: pending.password_hash,
            first_name: pending.first_name,
            last_name: pending.last_name,
        })
        .await
        .map_err(|e| {
            if e.is::<EmailTaken>() {
                AppError::Conflict(EMAIL_TAKEN.into())
            } else {
                AppError::Internal(e)
            }
        })?;

    let access_token = keys.sign_access(user.id, &user.email)?;
    info!(user_id = %user.id, email = %user.email, "account verified");

    Ok(VerifyEmailResponse {
        message: "Account created".into(),
        access_token,
        user: user.into(),
    })
}

/// Unknown email and wrong password are reported identically.
pub async fn login(state: &AppState, req: LoginRequest) -> Result<AuthResponse, AppError> {
    let email = req.email.trim();

    let Some(user) = state.users.find_by_email(email).await? else {
        warn!(%email, "login unknown email");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    };

    if !verify_password(req.password, user.password_hash.clone()).await? {
        warn!(user_id = %user.id, "login invalid password");
        return Err(AppError::Unauthorized(BAD_CREDENTIALS.into()));
    }

    let keys = JwtKeys::from_config(&state.config.jwt);
    let access_token = keys.sign_access(user.id, &user.email)?;
    info!(user_id = %user.id, "user logged in");

    Ok(AuthResponse {
        access_token,
        user: user.into(),
    })
}

pub async fn profile(state: &AppState, user_id: Uuid) -> Result<PublicUser, AppError> {
    Ok(load_user(state, user_id).await?.into())
}

pub async fn update_profile(
    state: &AppState,
    user_id: Uuid,
    req: UpdateProfileRequest,
) -> Result<PublicUser, AppError> {
    let user = state
        .users
        .update_names(user_id, req.first_name, req.last_name)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    Ok(user.into())
}

/// Stores a new profile picture and drops the previous one best-effort.
pub async fn upload_profile_image(
    state: &AppState,
    user_id: Uuid,
    body: Bytes,
    content_type: &str,
) -> Result<PublicUser, AppError> {
    let ext = ext_from_mime(content_type)
        .ok_or_else(|| AppError::Validation("Only image files are allowed".into()))?;
    if body.is_empty() {
        return Err(AppError::Validation("No file provided".into()));
    }

    let user = load_user(state, user_id).await?;

    let key = format!("profiles/{}/{}.{}", user_id, Uuid::new_v4(), ext);
    if let Err(e) = state.storage.put_object(&key, body, content_type).await {
        error!(error = ?e, %key, "profile image upload failed");
        return Err(AppError::Server("Failed to upload image".into()));
    }

    if let Some(old_key) = user
        .image
        .as_deref()
        .and_then(|url| state.storage.key_from_url(url))
    {
        if let Err(e) = state.storage.delete_object(&old_key).await {
            warn!(error = %e, key = %old_key, "failed to delete previous profile image");
        }
    }

    let url = state.storage.public_url(&key);
    let user = state
        .users
        .set_image(user_id, &url)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".into()))?;
    info!(%user_id, %key, "profile image updated");
    Ok(user.into())
}
