pub mod todo_service;

use thiserror::Error;

use crate::database::DatabaseError;

pub use todo_service::{CreateTodoInput, TodoService, UpdateTodoInput};

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("not found")]
    NotFound,

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Database(DatabaseError),
}

impl From<DatabaseError> for ServiceError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound => ServiceError::NotFound,
            other => ServiceError::Database(other),
        }
    }
}
