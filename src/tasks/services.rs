use tracing::info;
use uuid::Uuid;

use super::{
    dto::{CreateTaskRequest, TaskResponse, UpdateTaskRequest},
    repo_types::{NewTask, TaskPatch},
};
use crate::{error::AppError, state::AppState};

fn not_found(id: Uuid) -> AppError {
    AppError::NotFound(format!("Task with ID {id} not found"))
}

fn clean_title(title: &str) -> Result<String, AppError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(AppError::Validation("title must not be empty".into()));
    }
    Ok(title.to_string())
}

fn check_duration(duration: Option<i32>) -> Result<(), AppError> {
    match duration {
        Some(d) if d <= 0 => Err(AppError::Validation(
            "durationMinutes must be positive".into(),
        )),
        _ => Ok(()),
    }
}

pub async fn list_tasks(state: &AppState, user_id: Uuid) -> Result<Vec<TaskResponse>, AppError> {
    let tasks = state.tasks.list(user_id).await?;
    Ok(tasks.into_iter().map(Into::into).collect())
}

pub async fn get_task(state: &AppState, id: Uuid, user_id: Uuid) -> Result<TaskResponse, AppError> {
    let task = state
        .tasks
        .find(id, user_id)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(task.into())
}

pub async fn create_task(
    state: &AppState,
    user_id: Uuid,
    req: CreateTaskRequest,
) -> Result<TaskResponse, AppError> {
    check_duration(req.duration_minutes)?;
    let new = NewTask {
        title: clean_title(&req.title)?,
        description: req.description,
        is_completed: req.is_completed.unwrap_or(false),
        time: req.time,
        duration_minutes: req.duration_minutes,
    };
    let task = state.tasks.create(user_id, new).await?;
    info!(task_id = %task.id, %user_id, "task created");
    Ok(task.into())
}

pub async fn update_task(
    state: &AppState,
    id: Uuid,
    user_id: Uuid,
    req: UpdateTaskRequest,
) -> Result<TaskResponse, AppError> {
    check_duration(req.duration_minutes)?;
    let patch = TaskPatch {
        title: req.title.as_deref().map(clean_title).transpose()?,
        description: req.description,
        is_completed: req.is_completed,
        time: req.time,
        duration_minutes: req.duration_minutes,
    };
    let task = state
        .tasks
        .update(id, user_id, patch)
        .await?
        .ok_or_else(|| not_found(id))?;
    Ok(task.into())
}

pub async fn delete_task(state: &AppState, id: Uuid, user_id: Uuid) -> Result<(), AppError> {
    if !state.tasks.delete(id, user_id).await? {
        return Err(not_found(id));
    }
    info!(task_id = %id, %user_id, "task deleted");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn titled(title: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: title.into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn create_then_list_newest_first() {
        let state = AppState::fake();
        let owner = Uuid::new_v4();
        create_task(&state, owner, titled("first")).await.unwrap();
        let second = create_task(&state, owner, titled("  second  ")).await.unwrap();
        assert_eq!(second.title, "second");
        assert!(!second.is_completed);
        assert_eq!(second.user_id, owner);

        let listed = list_tasks(&state, owner).await.unwrap();
        let titles: Vec<_> = listed.iter().map(|t| t.title.as_str()).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[tokio::test]
    async fn blank_title_is_rejected() {
        let state = AppState::fake();
        let owner = Uuid::new_v4();
        let err = create_task(&state, owner, titled("   ")).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));

        let task = create_task(&state, owner, titled("ok")).await.unwrap();
        let err = update_task(
            &state,
            task.id,
            owner,
            UpdateTaskRequest { title: Some("".into()), ..Default::default() },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let state = AppState::fake();
        let owner = Uuid::new_v4();
        let task = create_task(
            &state,
            owner,
            CreateTaskRequest {
                title: "Essay".into(),
                description: Some("draft".into()),
                duration_minutes: Some(45),
                ..Default::default()
            },
        )
        .await
        .unwrap();

        let done = update_task(
            &state,
            task.id,
            owner,
            UpdateTaskRequest { is_completed: Some(true), ..Default::default() },
        )
        .await
        .unwrap();
        assert!(done.is_completed);
        assert_eq!(done.title, "Essay");
        assert_eq!(done.description.as_deref(), Some("draft"));
        assert_eq!(done.duration_minutes, Some(45));
    }

    #[tokio::test]
    async fn foreign_tasks_look_missing() {
        let state = AppState::fake();
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let task = create_task(&state, owner, titled("mine")).await.unwrap();

        let err = get_task(&state, task.id, stranger).await.unwrap_err();
        assert_eq!(err.to_string(), format!("Task with ID {} not found", task.id));
        assert!(matches!(
            update_task(&state, task.id, stranger, UpdateTaskRequest::default()).await,
            Err(AppError::NotFound(_))
        ));
        assert!(matches!(
            delete_task(&state, task.id, stranger).await,
            Err(AppError::NotFound(_))
        ));
        assert!(list_tasks(&state, stranger).await.unwrap().is_empty());

        delete_task(&state, task.id, owner).await.unwrap();
        assert!(matches!(get_task(&state, task.id, owner).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn non_positive_duration_is_rejected() {
        let state = AppState::fake();
        let err = create_task(
            &state,
            Uuid::new_v4(),
            CreateTaskRequest {
                title: "x".into(),
                duration_minutes: Some(-5),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
