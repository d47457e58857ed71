use axum::{
    extract::{Path, State},
    http::StatusCode,
};

use crate::app::AppState;
use crate::error::ApiResult;
use crate::middleware::AuthUser;

/// DELETE /api/v1/todos/:id
pub async fn todo_delete(State(state): State<AppState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<StatusCode> {
    state.todos.delete(&user.user_id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
