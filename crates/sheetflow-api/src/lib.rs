//! SheetFlow API Library
//!
//! HTTP handlers, application setup, outbound notification and the spreadsheet
//! task handler the worker pool dispatches to.

mod api_doc;
mod handlers;
mod task_dispatch;
mod task_handlers;
mod utils;

pub mod error;
pub mod services;
pub mod setup;
pub mod state;

pub use error::{ErrorResponse, HttpAppError};
pub use services::email::{ConfirmationMessage, DeliveryError, Notifier};
pub use sheetflow_worker::{TaskQueue, TaskQueueConfig};
pub use state::AppState;
pub use task_handlers::{SpreadsheetTaskHandler, TaskHandler};
