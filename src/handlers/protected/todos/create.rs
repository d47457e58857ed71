use axum::{extract::State, http::StatusCode, Json};

use crate::app::AppState;
use crate::error::ApiResult;
use crate::handlers::JsonBody;
use crate::middleware::AuthUser;
use crate::models::Todo;
use crate::services::CreateTodoInput;

/// POST /api/v1/todos - create a pending item
pub async fn todo_create(
    State(state): State<AppState>,
    user: AuthUser,
    JsonBody(input): JsonBody<CreateTodoInput>,
) -> ApiResult<(StatusCode, Json<Todo>)> {
    let todo = state.todos.create(&user.user_id, input).await?;
    Ok((StatusCode::CREATED, Json(todo)))
}
