use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

pub const DEFAULT_TITLE: &str = "Study Session";
pub const DEFAULT_DURATION_MINUTES: i32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "session_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Planned,
    Active,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Status a new session starts in.
    pub fn initial(start_time: Option<OffsetDateTime>) -> Self {
        if start_time.is_some() {
            SessionStatus::Planned
        } else {
            SessionStatus::Active
        }
    }

    /// `planned → active → completed`, with `cancelled` reachable from
    /// `planned` or `active`. Staying put is always allowed.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        self == next
            || matches!(
                (self, next),
                (Planned, Active) | (Active, Completed) | (Planned, Cancelled) | (Active, Cancelled)
            )
    }

    pub fn is_closed(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: SessionStatus,
    pub is_group: bool,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
    pub duration_minutes: i32,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, FromRow)]
pub struct SessionMember {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: Uuid,
    pub joined_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct NewSession {
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: SessionStatus,
    pub is_group: bool,
    pub start_time: Option<OffsetDateTime>,
    pub duration_minutes: i32,
}

/// Columns to overwrite; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<SessionStatus>,
    pub start_time: Option<OffsetDateTime>,
    pub end_time: Option<OffsetDateTime>,
}
