use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::app::AppState;
use crate::database::pagination::clamp_limit;
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthUser;
use crate::models::{TodoListParams, TodoPage, TodoStatus};

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub cursor: Option<String>,
    pub limit: Option<String>,
}

/// GET /api/v1/todos - newest first, cursor paginated
pub async fn todo_list(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListQuery>,
) -> ApiResult<Json<TodoPage>> {
    let status = match query.status.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(raw.parse::<TodoStatus>().map_err(|_| ApiError::invalid_status())?),
        None => None,
    };

    let params = TodoListParams {
        user_id: user.user_id,
        status,
        cursor: query.cursor.filter(|c| !c.is_empty()),
        limit: clamp_limit(query.limit.as_deref()),
    };

    Ok(Json(state.todos.list(&params).await?))
}
