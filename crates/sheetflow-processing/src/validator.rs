use std::path::Path;

use crate::spreadsheet::SpreadsheetFormat;

/// MIME type assumed when the client declares none.
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Upload validation errors. `Display` is the exact client-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Uploaded file is empty.")]
    EmptyFile,

    #[error("File too large: {size} bytes exceeds the {max} byte limit.")]
    FileTooLarge { size: usize, max: usize },

    #[error("Invalid file type. Detected: {content_type}. Only CSV and Excel files (.csv, .xls, .xlsx, .ods, .tsv) are allowed.")]
    InvalidContentType { content_type: String },

    /// `extension` carries its leading dot, or is empty when the filename has none.
    #[error("Invalid file extension: {extension}. Only .ods, .tsv, .csv, .xls, and .xlsx are allowed.")]
    InvalidExtension { extension: String },

    #[error("File extension '{extension}' does not match the actual file type '{content_type}'.")]
    ExtensionMismatch {
        extension: String,
        content_type: String,
    },

    #[error("Invalid filename: {0}")]
    InvalidFilename(String),
}

/// Spreadsheet upload validator
///
/// Checks run in a fixed order and stop at the first failure: declared
/// content type, then extension, then the pairing of the two. The declared
/// content type is trusted; bytes are not sniffed.
#[derive(Debug, Clone)]
pub struct SpreadsheetValidator {
    max_file_size: usize,
}

impl SpreadsheetValidator {
    pub fn new(max_file_size: usize) -> Self {
        Self { max_file_size }
    }

    /// Validate file size
    pub fn validate_size(&self, size: usize) -> Result<(), ValidationError> {
        if size == 0 {
            return Err(ValidationError::EmptyFile);
        }

        if size > self.max_file_size {
            return Err(ValidationError::FileTooLarge {
                size,
                max: self.max_file_size,
            });
        }

        Ok(())
    }

    /// Validate declared content type and filename, returning the accepted format.
    pub fn validate(
        &self,
        content_type: Option<&str>,
        filename: &str,
    ) -> Result<SpreadsheetFormat, ValidationError> {
        let mime = content_type
            .map(normalize_mime_type)
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_string());

        let declared = SpreadsheetFormat::from_mime_type(&mime).ok_or_else(|| {
            ValidationError::InvalidContentType {
                content_type: mime.clone(),
            }
        })?;

        let extension = extension_of(filename);
        let by_extension = SpreadsheetFormat::from_extension(&extension).ok_or_else(|| {
            ValidationError::InvalidExtension {
                extension: extension.clone(),
            }
        })?;

        if declared != by_extension {
            tracing::debug!(
                filename = %filename,
                extension = %extension,
                content_type = %mime,
                "Extension does not match declared content type"
            );
            return Err(ValidationError::ExtensionMismatch {
                extension,
                content_type: mime,
            });
        }

        Ok(declared)
    }

    /// Size check followed by type checks.
    pub fn validate_all(
        &self,
        content_type: Option<&str>,
        filename: &str,
        size: usize,
    ) -> Result<SpreadsheetFormat, ValidationError> {
        self.validate_size(size)?;
        self.validate(content_type, filename)
    }
}

/// Strip MIME parameters and lower-case: `Text/CSV; charset=utf-8` -> `text/csv`.
pub fn normalize_mime_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or(content_type)
        .trim()
        .to_lowercase()
}

/// Lower-cased extension with its leading dot, or an empty string.
fn extension_of(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_lowercase()))
        .unwrap_or_default()
}
