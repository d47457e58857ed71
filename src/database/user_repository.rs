use std::sync::Arc;

use async_trait::async_trait;
use sqlx::PgPool;

use super::DatabaseError;
use crate::middleware::auth::{ResolveError, UserResolver};
use crate::models::User;

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_by_subject(&self, subject: &str) -> Result<User, DatabaseError>;
}

pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn find_by_subject(&self, subject: &str) -> Result<User, DatabaseError> {
        sqlx::query_as::<_, User>(
            "SELECT id, subject, email, nickname, profile_image_url, created_at, updated_at \
             FROM users WHERE subject = $1",
        )
        .bind(subject)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(DatabaseError::NotFound)
    }
}

/// Lets the auth gate resolve token subjects against any user store.
pub struct UserStoreResolver {
    users: Arc<dyn UserRepository>,
}

impl UserStoreResolver {
    pub fn new(users: Arc<dyn UserRepository>) -> Self {
        Self { users }
    }
}

#[async_trait]
impl UserResolver for UserStoreResolver {
    async fn resolve_user_id(&self, subject: &str) -> Result<String, ResolveError> {
        match self.users.find_by_subject(subject).await {
            Ok(user) => Ok(user.id.to_string()),
            Err(DatabaseError::NotFound) => Err(ResolveError::NotFound),
            Err(err) => Err(ResolveError::Internal(err.into())),
        }
    }
}
