pub mod manager;
pub mod memory;
pub mod pagination;
pub mod todo_repository;
pub mod user_repository;

use thiserror::Error;

pub use manager::DatabaseManager;
pub use memory::{InMemoryTodoRepository, InMemoryUserRepository};
pub use todo_repository::{PgTodoRepository, TodoRepository};
pub use user_repository::{PgUserRepository, UserRepository, UserStoreResolver};

/// Errors from the storage layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Not found")]
    NotFound,

    #[error("Query error: {0}")]
    Query(String),

    #[error(transparent)]
    Sqlx(sqlx::Error),
}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DatabaseError::NotFound,
            other => DatabaseError::Sqlx(other),
        }
    }
}
