use anyhow::Context;
use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use super::repo_types::{NewTask, Task, TaskPatch};

const TASK_COLUMNS: &str = "id, user_id, title, description, is_completed, time, \
     duration_minutes, created_at, updated_at";

/// Every lookup is scoped by owner: another user's task behaves as missing.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn list(&self, user_id: Uuid) -> anyhow::Result<Vec<Task>>;
    async fn find(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Task>>;
    async fn create(&self, user_id: Uuid, new: NewTask) -> anyhow::Result<Task>;
    async fn update(&self, id: Uuid, user_id: Uuid, patch: TaskPatch)
        -> anyhow::Result<Option<Task>>;
    async fn delete(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool>;
}

#[derive(Clone)]
pub struct PgTaskStore {
    db: PgPool,
}

impl PgTaskStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskStore for PgTaskStore {
    async fn list(&self, user_id: Uuid) -> anyhow::Result<Vec<Task>> {
        let rows = sqlx::query_as::<_, Task>(&format!(
            r#"
            SELECT {TASK_COLUMNS}
              FROM tasks
             WHERE user_id = $1
             ORDER BY created_at DESC
            "#
        ))
        .bind(user_id)
        .fetch_all(&self.db)
        .await
        .context("list tasks")?;
        Ok(rows)
    }

    async fn find(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            "SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1 AND user_id = $2"
        ))
        .bind(id)
        .bind(user_id)
        .fetch_optional(&self.db)
        .await
        .context("find task")?;
        Ok(task)
    }

    async fn create(&self, user_id: Uuid, new: NewTask) -> anyhow::Result<Task> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            INSERT INTO tasks (id, user_id, title, description, is_completed, time, duration_minutes)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(&new.title)
        .bind(&new.description)
        .bind(new.is_completed)
        .bind(new.time)
        .bind(new.duration_minutes)
        .fetch_one(&self.db)
        .await
        .context("insert task")?;
        Ok(task)
    }

    async fn update(
        &self,
        id: Uuid,
        user_id: Uuid,
        patch: TaskPatch,
    ) -> anyhow::Result<Option<Task>> {
        let task = sqlx::query_as::<_, Task>(&format!(
            r#"
            UPDATE tasks
               SET title            = COALESCE($3, title),
                   description      = COALESCE($4, description),
                   is_completed     = COALESCE($5, is_completed),
                   time             = COALESCE($6, time),
                   duration_minutes = COALESCE($7, duration_minutes),
                   updated_at       = now()
             WHERE id = $1 AND user_id = $2
            RETURNING {TASK_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(user_id)
        .bind(patch.title)
        .bind(patch.description)
        .bind(patch.is_completed)
        .bind(patch.time)
        .bind(patch.duration_minutes)
        .fetch_optional(&self.db)
        .await
        .context("update task")?;
        Ok(task)
    }

    async fn delete(&self, id: Uuid, user_id: Uuid) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM tasks WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(user_id)
            .execute(&self.db)
            .await
            .context("delete task")?;
        Ok(res.rows_affected() > 0)
    }
}
