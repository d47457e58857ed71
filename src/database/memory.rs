//! Process-local stores with the same scoping, ordering and cursor rules as
//! the Postgres repositories. Used by the test suite and for running the
//! server without a database.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::pagination::{empty_page, fetch_limit, finish_page, parse_cursor};
use super::todo_repository::TodoRepository;
use super::user_repository::UserRepository;
use super::DatabaseError;
use crate::models::{NewTodo, Todo, TodoListParams, TodoPage, User};

#[derive(Default)]
pub struct InMemoryTodoRepository {
    todos: RwLock<HashMap<Uuid, Todo>>,
    frozen_at: Option<DateTime<Utc>>,
}

impl InMemoryTodoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every write is stamped with `at` instead of the wall clock.
    pub fn with_fixed_clock(at: DateTime<Utc>) -> Self {
        Self {
            frozen_at: Some(at),
            ..Self::default()
        }
    }

    fn now(&self) -> DateTime<Utc> {
        self.frozen_at.unwrap_or_else(Utc::now)
    }

    pub async fn len(&self) -> usize {
        self.todos.read().await.len()
    }
}

fn owned_by<'a>(todos: &'a HashMap<Uuid, Todo>, user_id: &str, todo_id: &str) -> Option<&'a Todo> {
    let id = Uuid::parse_str(todo_id).ok()?;
    todos.get(&id).filter(|todo| todo.user_id == user_id)
}

#[async_trait]
impl TodoRepository for InMemoryTodoRepository {
    async fn create(&self, todo: NewTodo) -> Result<Todo, DatabaseError> {
        let now = self.now();
        let todo = Todo {
            id: Uuid::new_v4(),
            user_id: todo.user_id,
            title: todo.title,
            description: todo.description,
            status: todo.status,
            due_at: todo.due_at,
            created_at: now,
            updated_at: now,
        };

        self.todos.write().await.insert(todo.id, todo.clone());
        Ok(todo)
    }

    async fn get_by_id(&self, user_id: &str, todo_id: &str) -> Result<Todo, DatabaseError> {
        let todos = self.todos.read().await;
        owned_by(&todos, user_id, todo_id).cloned().ok_or(DatabaseError::NotFound)
    }

    async fn update(&self, todo: &Todo) -> Result<Todo, DatabaseError> {
        let mut todos = self.todos.write().await;
        let stored = todos
            .get_mut(&todo.id)
            .filter(|stored| stored.user_id == todo.user_id)
            .ok_or(DatabaseError::NotFound)?;

        stored.title = todo.title.clone();
        stored.description = todo.description.clone();
        stored.status = todo.status;
        stored.due_at = todo.due_at;
        stored.updated_at = self.now();
        Ok(stored.clone())
    }

    async fn delete(&self, user_id: &str, todo_id: &str) -> Result<(), DatabaseError> {
        let mut todos = self.todos.write().await;
        let id = owned_by(&todos, user_id, todo_id).map(|todo| todo.id).ok_or(DatabaseError::NotFound)?;
        todos.remove(&id);
        Ok(())
    }

    async fn list(&self, params: &TodoListParams) -> Result<TodoPage, DatabaseError> {
        let todos = self.todos.read().await;

        let boundary = match &params.cursor {
            None => None,
            Some(cursor) => {
                let anchor = parse_cursor(cursor)
                    .and_then(|id| todos.get(&id))
                    .filter(|todo| todo.user_id == params.user_id);
                match anchor {
                    Some(todo) => Some((todo.created_at, todo.id)),
                    None => return Ok(empty_page()),
                }
            }
        };

        let mut rows: Vec<Todo> = todos
            .values()
            .filter(|todo| todo.user_id == params.user_id)
            .filter(|todo| params.status.map_or(true, |status| todo.status == status))
            .filter(|todo| boundary.map_or(true, |key| (todo.created_at, todo.id) < key))
            .cloned()
            .collect();

        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.truncate(fetch_limit(params.limit));

        Ok(finish_page(rows, params.limit))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryUserRepository {
    users: RwLock<HashMap<String, User>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user for `subject`, returning the stored row.
    pub async fn insert(&self, subject: &str, email: &str) -> User {
        let now = Utc::now();
        let user = User {
            id: Uuid::new_v4(),
            subject: subject.to_string(),
            email: email.to_string(),
            nickname: String::new(),
            profile_image_url: String::new(),
            created_at: now,
            updated_at: now,
        };

        self.users.write().await.insert(subject.to_string(), user.clone());
        user
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn find_by_subject(&self, subject: &str) -> Result<User, DatabaseError> {
        self.users.read().await.get(subject).cloned().ok_or(DatabaseError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TodoStatus;

    fn new_todo(user_id: &str, title: &str) -> NewTodo {
        NewTodo {
            user_id: user_id.to_string(),
            title: title.to_string(),
            description: String::new(),
            status: TodoStatus::Pending,
            due_at: None,
        }
    }

    fn params(user_id: &str, cursor: Option<String>, limit: usize) -> TodoListParams {
        TodoListParams {
            user_id: user_id.to_string(),
            status: None,
            cursor,
            limit,
        }
    }

    #[tokio::test]
    async fn pages_walk_every_row_once() {
        let repo = InMemoryTodoRepository::new();
        for i in 0..7 {
            repo.create(new_todo("u1", &format!("t{i}"))).await.unwrap();
        }

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = repo.list(&params("u1", cursor, 3)).await.unwrap();
            assert!(page.todos.len() <= 3);
            seen.extend(page.todos.iter().map(|t| t.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), 7);
    }

    #[tokio::test]
    async fn equal_timestamps_page_by_id() {
        let repo = InMemoryTodoRepository::with_fixed_clock(Utc::now());
        let mut expected = Vec::new();
        for i in 0..5 {
            expected.push(repo.create(new_todo("u1", &format!("t{i}"))).await.unwrap().id);
        }
        expected.sort_by(|a, b| b.cmp(a));

        let mut seen = Vec::new();
        let mut cursor = None;
        loop {
            let page = repo.list(&params("u1", cursor, 2)).await.unwrap();
            assert!(page.todos.len() <= 2);
            assert!(page.todos.iter().all(|t| t.created_at == page.todos[0].created_at));
            seen.extend(page.todos.iter().map(|t| t.id));
            match page.next_cursor {
                Some(next) => cursor = Some(next),
                None => break,
            }
        }

        assert_eq!(seen, expected);
    }

    #[tokio::test]
    async fn foreign_and_unknown_cursors_yield_empty_pages() {
        let repo = InMemoryTodoRepository::new();
        let mine = repo.create(new_todo("u1", "mine")).await.unwrap();
        let theirs = repo.create(new_todo("u2", "theirs")).await.unwrap();

        let page = repo.list(&params("u1", Some(theirs.id.to_string()), 20)).await.unwrap();
        assert!(page.todos.is_empty());

        let page = repo.list(&params("u1", Some(Uuid::new_v4().to_string()), 20)).await.unwrap();
        assert!(page.todos.is_empty());

        let page = repo.list(&params("u1", Some("nope".into()), 20)).await.unwrap();
        assert!(page.todos.is_empty());

        let page = repo.list(&params("u1", None, 20)).await.unwrap();
        assert_eq!(page.todos, vec![mine]);
    }

    #[tokio::test]
    async fn rows_are_owner_scoped() {
        let repo = InMemoryTodoRepository::new();
        let todo = repo.create(new_todo("u1", "secret")).await.unwrap();
        let id = todo.id.to_string();

        assert!(matches!(repo.get_by_id("u2", &id).await, Err(DatabaseError::NotFound)));
        assert!(matches!(repo.delete("u2", &id).await, Err(DatabaseError::NotFound)));

        let mut hijack = todo.clone();
        hijack.user_id = "u2".to_string();
        assert!(matches!(repo.update(&hijack).await, Err(DatabaseError::NotFound)));

        assert_eq!(repo.get_by_id("u1", &id).await.unwrap().title, "secret");
        repo.delete("u1", &id).await.unwrap();
        assert_eq!(repo.len().await, 0);
    }
}
