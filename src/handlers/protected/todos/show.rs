use axum::{
    extract::{Path, State},
    Json,
};

use crate::app::AppState;
use crate::error::ApiResult;
use crate::middleware::AuthUser;
use crate::models::Todo;

/// GET /api/v1/todos/:id
pub async fn todo_show(State(state): State<AppState>, user: AuthUser, Path(id): Path<String>) -> ApiResult<Json<Todo>> {
    Ok(Json(state.todos.get(&user.user_id, &id).await?))
}
