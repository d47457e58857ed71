// /api/v1/todos - to-do items of the authenticated user
mod create;
mod delete;
mod list;
mod show;
mod status;
mod update;

pub use create::todo_create;
pub use delete::todo_delete;
pub use list::todo_list;
pub use show::todo_show;
pub use status::todo_status;
pub use update::todo_update;
