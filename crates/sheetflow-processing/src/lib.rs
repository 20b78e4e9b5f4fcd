//! SheetFlow Processing Library
//!
//! Upload validation and spreadsheet row counting.

pub mod spreadsheet;
pub mod validator;

pub use spreadsheet::{SpreadsheetError, SpreadsheetFormat};
pub use validator::{normalize_mime_type, SpreadsheetValidator, ValidationError};
