use time::OffsetDateTime;
use tracing::info;
use uuid::Uuid;

use super::{
    dto::{CreateSessionRequest, LeaveResponse, SessionResponse, UpdateSessionRequest},
    repo_types::{
        NewSession, Session, SessionPatch, SessionStatus, DEFAULT_DURATION_MINUTES, DEFAULT_TITLE,
    },
};
use crate::{error::AppError, state::AppState};

const MAX_DURATION_MINUTES: i32 = 24 * 60;

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Session with ID {id} not found"))
}

async fn load(state: &AppState, id: Uuid) -> Result<Session, AppError> {
    state.sessions.find(id).await?.ok_or_else(|| not_found(id))
}

async fn with_members(state: &AppState, session: Session) -> Result<SessionResponse, AppError> {
    let members = state.sessions.members(session.id).await?;
    Ok(SessionResponse::new(session, members))
}

fn require_owner(session: &Session, user_id: Uuid) -> Result<(), AppError> {
    if session.user_id != user_id {
        return Err(AppError::Forbidden(
            "Only the session owner can modify it".into(),
        ));
    }
    Ok(())
}

/// Creator first, then invitees in request order with duplicates and the
/// creator's own id removed.
pub(crate) fn roster(owner: Uuid, invited: &[Uuid]) -> Vec<Uuid> {
    let mut ids = vec![owner];
    for id in invited {
        if !ids.contains(id) {
            ids.push(*id);
        }
    }
    ids
}

pub async fn create_session(
    state: &AppState,
    owner: Uuid,
    req: CreateSessionRequest,
) -> Result<SessionResponse, AppError> {
    let duration = req.duration_minutes.unwrap_or(DEFAULT_DURATION_MINUTES);
    if !(1..=MAX_DURATION_MINUTES).contains(&duration) {
        return Err(AppError::Validation(format!(
            "durationMinutes must be between 1 and {MAX_DURATION_MINUTES}"
        )));
    }

    let members = roster(owner, &req.invited_user_ids);
    for invitee in &members[1..] {
        if state.users.find_by_id(*invitee).await?.is_none() {
            return Err(AppError::Validation(format!("Unknown invited user {invitee}")));
        }
    }

    let title = req
        .title
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| DEFAULT_TITLE.to_string());

    let new = NewSession {
        user_id: owner,
        title,
        description: req.description,
        status: SessionStatus::initial(req.start_time),
        is_group: req.is_group.unwrap_or(false),
        start_time: req.start_time,
        duration_minutes: duration,
    };

    let session = state.sessions.create(new, &members).await?;
    info!(session_id = %session.id, %owner, members = members.len(), status = ?session.status, "session created");
    with_members(state, session).await
}

pub async fn list_sessions(state: &AppState, user_id: Uuid) -> Result<Vec<SessionResponse>, AppError> {
    let sessions = state.sessions.list_for_user(user_id).await?;
    let mut out = Vec::with_capacity(sessions.len());
    for s in sessions {
        out.push(with_members(state, s).await?);
    }
    Ok(out)
}

/// Visible to any authenticated user so that invitees can find and join it.
pub async fn get_session(state: &AppState, id: Uuid) -> Result<SessionResponse, AppError> {
    let session = load(state, id).await?;
    with_members(state, session).await
}

/// Owner-only. Applies a status transition and stamps start/end times
/// when a session becomes active or closes.
pub async fn update_session(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
    req: UpdateSessionRequest,
) -> Result<SessionResponse, AppError> {
    let session = load(state, id).await?;
    require_owner(&session, user_id)?;

    let mut patch = SessionPatch {
        title: req.title,
        description: req.description,
        status: None,
        start_time: None,
        end_time: req.end_time,
    };

    if let Some(title) = &patch.title {
        if title.trim().is_empty() {
            return Err(AppError::Validation("title must not be empty".into()));
        }
    }

    if let Some(next) = req.status {
        if !session.status.can_transition_to(next) {
            return Err(AppError::Validation(format!(
                "Cannot move session from {:?} to {:?}",
                session.status, next
            )
            .to_lowercase()));
        }
        if next != session.status {
            let now = OffsetDateTime::now_utc();
            if next == SessionStatus::Active && session.start_time.is_none() {
                patch.start_time = Some(now);
            }
            if next.is_closed() && patch.end_time.is_none() && session.end_time.is_none() {
                patch.end_time = Some(now);
            }
        }
        patch.status = Some(next);
    }

    if let (Some(start), Some(end)) = (patch.start_time.or(session.start_time), req.end_time) {
        if end < start {
            return Err(AppError::Validation(
                "endTime must not be before startTime".into(),
            ));
        }
    }

    let updated = state
        .sessions
        .update(id, patch)
        .await?
        .ok_or_else(|| not_found(id))?;
    info!(session_id = %id, status = ?updated.status, "session updated");
    with_members(state, updated).await
}

/// Idempotent: joining twice leaves a single membership row.
pub async fn join_session(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<SessionResponse, AppError> {
    let session = load(state, id).await?;
    if session.status.is_closed() {
        return Err(AppError::Conflict("Session is no longer open".into()));
    }
    if state.sessions.add_member(id, user_id).await? {
        info!(session_id = %id, %user_id, "joined session");
    }
    with_members(state, session).await
}

/// Leaving a session one never joined is a no-op.
pub async fn leave_session(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
) -> Result<LeaveResponse, AppError> {
    if state.sessions.remove_member(id, user_id).await? {
        info!(session_id = %id, %user_id, "left session");
    }
    Ok(LeaveResponse { success: true })
}

pub async fn delete_session(state: &AppState, id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    let session = load(state, id).await?;
    require_owner(&session, user_id)?;
    if !state.sessions.delete(id).await? {
        return Err(not_found(id));
    }
    info!(session_id = %id, "session deleted");
    Ok(())
}
