use async_trait::async_trait;
use sqlx::{postgres::PgRow, PgPool, Postgres, QueryBuilder, Row};
use uuid::Uuid;

use super::pagination::{empty_page, fetch_limit, finish_page, parse_cursor};
use super::DatabaseError;
use crate::models::{NewTodo, Todo, TodoListParams, TodoPage};

/// Storage for to-do items. Every operation is scoped to the owning user;
/// a row owned by someone else is indistinguishable from a missing one.
#[async_trait]
pub trait TodoRepository: Send + Sync {
    async fn create(&self, todo: NewTodo) -> Result<Todo, DatabaseError>;

    async fn get_by_id(&self, user_id: &str, todo_id: &str) -> Result<Todo, DatabaseError>;

    /// Persist title, description, status and due time of an existing row.
    async fn update(&self, todo: &Todo) -> Result<Todo, DatabaseError>;

    async fn delete(&self, user_id: &str, todo_id: &str) -> Result<(), DatabaseError>;

    async fn list(&self, params: &TodoListParams) -> Result<TodoPage, DatabaseError>;

    /// Cheap liveness probe of the backing store.
    async fn ping(&self) -> Result<(), DatabaseError>;
}

const TODO_COLUMNS: &str =
    "id, user_id::text AS user_id, title, description, status, due_at, created_at, updated_at";

pub struct PgTodoRepository {
    pool: PgPool,
}

impl PgTodoRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TodoRepository for PgTodoRepository {
    async fn create(&self, todo: NewTodo) -> Result<Todo, DatabaseError> {
        let owner = owner_id(&todo.user_id)
            .ok_or_else(|| DatabaseError::Query(format!("user id {:?} is not a uuid", todo.user_id)))?;

        let sql = format!(
            "INSERT INTO todos (user_id, title, description, status, due_at) \
             VALUES ($1, $2, $3, $4, $5) RETURNING {TODO_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(owner)
            .bind(&todo.title)
            .bind(&todo.description)
            .bind(todo.status.as_str())
            .bind(todo.due_at)
            .fetch_one(&self.pool)
            .await?;

        todo_from_row(&row)
    }

    async fn get_by_id(&self, user_id: &str, todo_id: &str) -> Result<Todo, DatabaseError> {
        let (Some(owner), Ok(id)) = (owner_id(user_id), Uuid::parse_str(todo_id)) else {
            return Err(DatabaseError::NotFound);
        };

        let sql = format!("SELECT {TODO_COLUMNS} FROM todos WHERE id = $1 AND user_id = $2");
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DatabaseError::NotFound)?;

        todo_from_row(&row)
    }

    async fn update(&self, todo: &Todo) -> Result<Todo, DatabaseError> {
        let owner = owner_id(&todo.user_id).ok_or(DatabaseError::NotFound)?;

        let sql = format!(
            "UPDATE todos SET title = $1, description = $2, status = $3, due_at = $4, updated_at = now() \
             WHERE id = $5 AND user_id = $6 RETURNING {TODO_COLUMNS}"
        );
        let row = sqlx::query(&sql)
            .bind(&todo.title)
            .bind(&todo.description)
            .bind(todo.status.as_str())
            .bind(todo.due_at)
            .bind(todo.id)
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(DatabaseError::NotFound)?;

        todo_from_row(&row)
    }

    async fn delete(&self, user_id: &str, todo_id: &str) -> Result<(), DatabaseError> {
        let (Some(owner), Ok(id)) = (owner_id(user_id), Uuid::parse_str(todo_id)) else {
            return Err(DatabaseError::NotFound);
        };

        let result = sqlx::query("DELETE FROM todos WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DatabaseError::NotFound);
        }
        Ok(())
    }

    async fn list(&self, params: &TodoListParams) -> Result<TodoPage, DatabaseError> {
        let Some(owner) = owner_id(&params.user_id) else {
            return Ok(empty_page());
        };

        let Some(mut query) = list_query(owner, params) else {
            return Ok(empty_page());
        };

        let rows = query.build().fetch_all(&self.pool).await?;
        let todos = rows.iter().map(todo_from_row).collect::<Result<Vec<_>, _>>()?;

        Ok(finish_page(todos, params.limit))
    }

    async fn ping(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Builds the page query, or `None` when the cursor cannot name a row.
fn list_query(owner: Uuid, params: &TodoListParams) -> Option<QueryBuilder<'static, Postgres>> {
    let mut query = QueryBuilder::new(format!("SELECT {TODO_COLUMNS} FROM todos WHERE user_id = "));
    query.push_bind(owner);

    if let Some(status) = params.status {
        query.push(" AND status = ").push_bind(status.as_str());
    }

    if let Some(cursor) = &params.cursor {
        let cursor_id = parse_cursor(cursor)?;
        // Row comparison keeps the order total when timestamps collide. The
        // sub-query is owner-scoped so a foreign cursor matches nothing.
        query
            .push(" AND (created_at, id) < (SELECT created_at, id FROM todos WHERE id = ")
            .push_bind(cursor_id)
            .push(" AND user_id = ")
            .push_bind(owner)
            .push(")");
    }

    query
        .push(" ORDER BY created_at DESC, id DESC LIMIT ")
        .push_bind(fetch_limit(params.limit) as i64);

    Some(query)
}

fn owner_id(user_id: &str) -> Option<Uuid> {
    Uuid::parse_str(user_id).ok()
}

fn todo_from_row(row: &PgRow) -> Result<Todo, DatabaseError> {
    let status: String = row.try_get("status")?;

    Ok(Todo {
        id: row.try_get("id")?,
        user_id: row.try_get("user_id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        status: status.parse().map_err(DatabaseError::Query)?,
        due_at: row.try_get("due_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}
