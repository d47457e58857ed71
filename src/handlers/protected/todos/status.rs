use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiResult;
use crate::handlers::JsonBody;
use crate::middleware::AuthUser;
use crate::models::Todo;

#[derive(Debug, Deserialize)]
pub struct StatusBody {
    #[serde(default)]
    pub status: String,
}

/// PATCH /api/v1/todos/:id/status
pub async fn todo_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
    JsonBody(body): JsonBody<StatusBody>,
) -> ApiResult<Json<Todo>> {
    Ok(Json(state.todos.update_status(&user.user_id, &id, &body.status).await?))
}
