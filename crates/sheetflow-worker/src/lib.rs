//! SheetFlow worker runtime
//!
//! [`TaskQueue`] is both the enqueue/status client used by the HTTP layer and
//! the owner of the background worker pool. Handlers plug in through
//! [`TaskHandlerContext`].

pub mod context;
pub mod queue;

pub use context::TaskHandlerContext;
pub use queue::{TaskQueue, TaskQueueConfig};
