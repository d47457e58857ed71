pub mod todo;
pub mod user;

pub use todo::{NewTodo, Todo, TodoListParams, TodoPage, TodoStatus};
pub use user::User;
