use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String, // Argon2 hash, never exposed
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub image: Option<String>, // public URL of the profile picture
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

/// Raised by [`super::repo::UserStore::create`] when the email is already taken.
#[derive(Debug, thiserror::Error)]
#[error("email already registered")]
pub struct EmailTaken;
