use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::{Session, SessionMember, SessionStatus};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateSessionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub is_group: Option<bool>,
    pub duration_minutes: Option<i32>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub invited_user_ids: Vec<Uuid>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSessionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<SessionStatus>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberResponse {
    pub user_id: Uuid,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
}

impl From<SessionMember> for MemberResponse {
    fn from(m: SessionMember) -> Self {
        Self {
            user_id: m.user_id,
            joined_at: m.joined_at,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub status: SessionStatus,
    pub is_group: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub start_time: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub end_time: Option<OffsetDateTime>,
    pub duration_minutes: i32,
    pub members: Vec<MemberResponse>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl SessionResponse {
    pub fn new(s: Session, members: Vec<SessionMember>) -> Self {
        Self {
            id: s.id,
            user_id: s.user_id,
            title: s.title,
            description: s.description,
            status: s.status,
            is_group: s.is_group,
            start_time: s.start_time,
            end_time: s.end_time,
            duration_minutes: s.duration_minutes,
            members: members.into_iter().map(Into::into).collect(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LeaveResponse {
    pub success: bool,
}
