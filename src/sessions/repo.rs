use anyhow::Context;
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use super::repo_types::{NewSession, Session, SessionMember, SessionPatch};

const SESSION_COLUMNS: &str = "id, user_id, title, description, status, is_group, \
     start_time, end_time, duration_minutes, created_at, updated_at";

#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Inserts the session and one membership row per id, atomically.
    async fn create(&self, new: NewSession, member_ids: &[Uuid]) -> anyhow::Result<Session>;
    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Session>>;
    /// Owner first, then by join time.
    async fn members(&self, session_id: Uuid) -> anyhow::Result<Vec<SessionMember>>;
    /// Sessions the user owns or belongs to, newest first.
    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Session>>;
    async fn update(&self, id: Uuid, patch: SessionPatch) -> anyhow::Result<Option<Session>>;
    async fn delete(&self, id: Uuid) -> anyhow::Result<bool>;
    /// Returns `false` when the membership already existed.
    async fn add_member(&self, session_id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
    /// Returns `false` when there was nothing to remove.
    async fn remove_member(&self, session_id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgSessionStore {
    db: PgPool,
}

impl PgSessionStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

async fn insert_member_tx(
    tx: &mut Transaction<'_, Postgres>,
    session_id: Uuid,
    user_id: Uuid,
) -> anyhow::Result<()> {
    sqlx::query(
        r#"
        INSERT INTO session_members (id, session_id, user_id)
        VALUES ($1, $2, $3)
        ON CONFLICT (session_id, user_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(session_id)
    .bind(user_id)
    .execute(&mut **tx)
    .await
    .context("insert session member")?;
    Ok(())
}

#[async_trait]
impl SessionStore for PgSessionStore {
    async fn create(&self, new: NewSession, member_ids: &[Uuid]) -> anyhow::Result<Session> {
        let mut tx = self.db.begin().await.context("begin tx")?;

        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            INSERT INTO sessions (id, user_id, title, description, status, is_group,
                                  start_time, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(new.user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.status)
        .bind(new.is_group)
        .bind(new.start_time)
        .bind(new.duration_minutes)
        .fetch_one(&mut *tx)
        .await
        .context("insert session")?;

        for user_id in member_ids {
            insert_member_tx(&mut tx, session.id, *user_id).await?;
        }

        tx.commit().await.context("commit tx")?;
        Ok(session)
    }

    async fn find(&self, id: Uuid) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            "SELECT {SESSION_COLUMNS} FROM sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.db)
        .await
        .context("find session")?;
        Ok(session)
    }

    async fn members(&self, session_id: Uuid) -> anyhow::Result<Vec<SessionMember>> {
        let rows = sqlx::query_as::<_, SessionMember>(
            r#"
            SELECT m.id, m.session_id, m.user_id, m.joined_at
              FROM session_members m
              JOIN sessions s ON s.id = m.session_id
             WHERE m.session_id = $1
             ORDER BY (m.user_id = s.user_id) DESC, m.joined_at ASC, m.id ASC
            "#,
        )
        .bind(session_id)
        .fetch_all(&self.db)
        .await
        .context("list session members")?;
        Ok(rows)
    }

    async fn list_for_user(&self, user_id: Uuid) -> anyhow::Result<Vec<Session>> {
        let rows = sqlx::query_as::<_, Session>(&format!(
            r#"
            SELECT {SESSION_COLUMNS}
              FROM sessions s
             WHERE s.user_id = $1
                OR EXISTS (SELECT 1 FROM session_members m
                            WHERE m.session_id = s.id AND m.user_id = $1)
             ORDER BY s.created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list sessions for user")?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, patch: SessionPatch) -> anyhow::Result<Option<Session>> {
        let session = sqlx::query_as::<_, Session>(&format!(
            r#"
            UPDATE sessions
               SET title       = COALESCE($2, title),
                   description = COALESCE($3, description),
                   status      = COALESCE($4, status),
                   start_time  = COALESCE($5, start_time),
                   end_time    = COALESCE($6, end_time),
                   updated_at  = now()
             WHERE id = $1
            RETURNING {SESSION_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.status)
        .bind(patch.start_time)
        .bind(patch.end_time)
        .fetch_optional(&self.db)
        .await
        .context("update session")?;
        Ok(session)
    }

    async fn delete(&self, id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM sessions WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await
            .context("delete session")?;
        Ok(res.rows_affected() > 0)
    }

    async fn add_member(&self, session_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            INSERT INTO session_members (id, session_id, user_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (session_id, user_id) DO NOTHING
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(session_id)
        .bind(user_id)
        .execute(&self.db)
        .await
        .context("add session member")?;
        Ok(res.rows_affected() > 0)
    }

    async fn remove_member(&self, session_id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM session_members WHERE session_id = $1 AND user_id = $2")
            .bind(session_id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("remove session member")?;
        Ok(res.rows_affected() > 0)
    }
}
