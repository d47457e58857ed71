//! Cursor pagination for owner-scoped lists.
//!
//! Rows are ordered newest first by `(created_at, id)`. A cursor is the id
//! of the last row a client received; the next page holds rows strictly
//! older than that row in the same ordering. Each query over-fetches one
//! row to learn whether another page exists.

use uuid::Uuid;

use crate::models::{Todo, TodoPage};

pub const DEFAULT_LIMIT: usize = 20;
pub const MAX_LIMIT: usize = 100;

/// Page size from the raw `limit` query value. Anything missing,
/// non-numeric or outside `1..=MAX_LIMIT` falls back to the default.
pub fn clamp_limit(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.trim().parse::<usize>().ok())
        .filter(|n| (1..=MAX_LIMIT).contains(n))
        .unwrap_or(DEFAULT_LIMIT)
}

/// Rows to request from the store for a page of `limit`.
pub fn fetch_limit(limit: usize) -> usize {
    limit + 1
}

/// Cursors are opaque to clients. One that does not decode names no row,
/// which callers turn into an empty page.
pub fn parse_cursor(cursor: &str) -> Option<Uuid> {
    Uuid::parse_str(cursor).ok()
}

/// Turn an over-fetched, already ordered batch into a page.
pub fn finish_page(mut rows: Vec<Todo>, limit: usize) -> TodoPage {
    let next_cursor = if rows.len() > limit {
        rows.truncate(limit);
        rows.last().map(|todo| todo.id.to_string())
    } else {
        None
    };

    TodoPage {
        todos: rows,
        next_cursor,
    }
}

pub fn empty_page() -> TodoPage {
    TodoPage {
        todos: Vec::new(),
        next_cursor: None,
    }
}
