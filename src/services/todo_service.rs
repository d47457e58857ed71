use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::ServiceError;
use crate::database::TodoRepository;
use crate::models::{NewTodo, Todo, TodoListParams, TodoPage, TodoStatus};

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateTodoInput {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// RFC 3339
    pub due_at: Option<String>,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateTodoInput {
    pub title: Option<String>,
    pub description: Option<String>,
    pub due_at: Option<String>,
}

/// Business rules for to-do items on top of a [`TodoRepository`].
#[derive(Clone)]
pub struct TodoService {
    repo: Arc<dyn TodoRepository>,
}

impl TodoService {
    pub fn new(repo: Arc<dyn TodoRepository>) -> Self {
        Self { repo }
    }

    pub async fn create(&self, user_id: &str, input: CreateTodoInput) -> Result<Todo, ServiceError> {
        if input.title.is_empty() {
            return Err(ServiceError::InvalidInput("title is required".to_string()));
        }
        let due_at = parse_due_at(input.due_at.as_deref())?;

        let todo = self
            .repo
            .create(NewTodo {
                user_id: user_id.to_string(),
                title: input.title,
                description: input.description,
                status: TodoStatus::Pending,
                due_at,
            })
            .await?;

        tracing::debug!(todo_id = %todo.id, "created todo");
        Ok(todo)
    }

    pub async fn get(&self, user_id: &str, todo_id: &str) -> Result<Todo, ServiceError> {
        Ok(self.repo.get_by_id(user_id, todo_id).await?)
    }

    pub async fn update(&self, user_id: &str, todo_id: &str, input: UpdateTodoInput) -> Result<Todo, ServiceError> {
        let mut todo = self.repo.get_by_id(user_id, todo_id).await?;

        if let Some(title) = input.title {
            if title.is_empty() {
                return Err(ServiceError::InvalidInput("title cannot be empty".to_string()));
            }
            todo.title = title;
        }
        if let Some(description) = input.description {
            todo.description = description;
        }
        if input.due_at.is_some() {
            todo.due_at = parse_due_at(input.due_at.as_deref())?;
        }

        Ok(self.repo.update(&todo).await?)
    }

    pub async fn delete(&self, user_id: &str, todo_id: &str) -> Result<(), ServiceError> {
        Ok(self.repo.delete(user_id, todo_id).await?)
    }

    /// Either direction is allowed; setting the current status again is a no-op write.
    pub async fn update_status(&self, user_id: &str, todo_id: &str, status: &str) -> Result<Todo, ServiceError> {
        let status: TodoStatus = status
            .parse()
            .map_err(|_| ServiceError::InvalidInput(format!("invalid status {status:?}")))?;

        let mut todo = self.repo.get_by_id(user_id, todo_id).await?;
        todo.status = status;

        Ok(self.repo.update(&todo).await?)
    }

    pub async fn list(&self, params: &TodoListParams) -> Result<TodoPage, ServiceError> {
        Ok(self.repo.list(params).await?)
    }

    /// Store liveness for the health endpoint.
    pub async fn ping(&self) -> Result<(), ServiceError> {
        Ok(self.repo.ping().await?)
    }
}

fn parse_due_at(raw: Option<&str>) -> Result<Option<DateTime<Utc>>, ServiceError> {
    raw.map(|s| {
        DateTime::parse_from_rfc3339(s)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|_| ServiceError::InvalidInput("invalid due_at format, expected RFC3339".to_string()))
    })
    .transpose()
}
