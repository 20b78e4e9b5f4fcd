//! Task store implementations
//
// Store contract shared by every backend
pub mod store;
//
// PostgreSQL `tasks` table
pub mod task;
//
// Process-local store
pub mod memory;

pub use memory::InMemoryTaskStore;
pub use store::TaskStore;
pub use task::{TaskRepository, TASK_NOTIFY_CHANNEL};
