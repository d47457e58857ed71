use axum::{
    extract::{Path, State},
    Json,
};

use crate::app::AppState;
use crate::error::ApiResult;
use crate::handlers::JsonBody;
use crate::middleware::AuthUser;
use crate::models::Todo;
use crate::services::UpdateTodoInput;

/// PUT /api/v1/todos/:id - partial update of title, description and due time
pub async fn todo_update(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(input): JsonBody<UpdateTodoInput>,
) -> ApiResult<Json<Todo>> {
    Ok(Json(state.todos.update(&user.user_id, &id, input).await?))
}
