use std::any::Any;
use std::sync::Arc;

use axum::{
    middleware,
    response::{IntoResponse, Response},
    routing::{get, patch},
    Router,
};
use tower_http::{catch_panic::CatchPanicLayer, cors::CorsLayer, trace::TraceLayer};

use crate::error::ApiError;
use crate::handlers::{protected::todos, public::health};
use crate::middleware::{auth_middleware, Authenticator};
use crate::services::TodoService;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub todos: TodoService,
}

impl AppState {
    pub fn new(todos: TodoService) -> Self {
        Self { todos }
    }
}

/// Full application router. The auth gate wraps every route, including the
/// fallback, and decides per request whether the path is public.
pub fn router(state: AppState, auth: Arc<Authenticator>) -> Router {
    Router::new()
        // Public
        .route("/health", get(health::health))
        // Protected API
        .merge(todo_routes())
        .fallback(not_found)
        .with_state(state)
        // Global middleware
        .layer(middleware::from_fn_with_state(auth, auth_middleware))
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn todo_routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/todos", get(todos::todo_list).post(todos::todo_create))
        .route(
            "/api/v1/todos/:id",
            get(todos::todo_show).put(todos::todo_update).delete(todos::todo_delete),
        )
        .route("/api/v1/todos/:id/status", patch(todos::todo_status))
}

async fn not_found() -> ApiError {
    ApiError::not_found("route not found")
}

fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = err
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| err.downcast_ref::<&str>().copied())
        .unwrap_or("unknown panic");
    tracing::error!(panic = detail, "handler panicked");

    ApiError::internal().into_response()
}
