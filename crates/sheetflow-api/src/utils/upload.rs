//! Multipart form extraction for the upload endpoint

use axum::extract::multipart::MultipartError;
use axum::extract::Multipart;
use axum::http::StatusCode;
use bytes::Bytes;
use sheetflow_core::AppError;
use validator::Validate;

pub const FILE_FIELD: &str = "file";
pub const EMAIL_FIELD: &str = "email";

/// Text fields of the upload form.
#[derive(Debug, Validate)]
pub struct UploadForm {
    #[validate(email(message = "value is not a valid email address"))]
    pub email: String,
}

/// The file part of the upload form.
#[derive(Debug)]
pub struct UploadedFile {
    pub filename: String,
    pub content_type: Option<String>,
    pub data: Bytes,
}

fn multipart_error(err: MultipartError) -> AppError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!("Request body too large: {}", err.body_text()))
    } else {
        AppError::UnprocessableEntity(format!("Failed to read multipart: {}", err.body_text()))
    }
}

fn missing_field(name: &str) -> AppError {
    AppError::UnprocessableEntity(format!("Missing required form field: {}", name))
}

/// Read the `email` and `file` fields.
///
/// The email is checked before the file is looked at, so a bad address is
/// reported as 422 even when the file is also missing or invalid. Unknown
/// fields are ignored; a repeated `file` field is rejected.
pub async fn extract_upload_form(
    mut multipart: Multipart,
) -> Result<(UploadForm, UploadedFile), AppError> {
    let mut email: Option<String> = None;
    let mut file: Option<UploadedFile> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let field_name = field.name().map(|s| s.to_string()).unwrap_or_default();

        match field_name.as_str() {
            EMAIL_FIELD => {
                email = Some(field.text().await.map_err(multipart_error)?.trim().to_string());
            }
            FILE_FIELD => {
                if file.is_some() {
                    return Err(AppError::UnprocessableEntity(
                        "Multiple file fields are not allowed; send exactly one field named 'file'"
                            .to_string(),
                    ));
                }
                let filename = field
                    .file_name()
                    .map(|s| s.to_string())
                    .filter(|s| !s.is_empty());
                let content_type = field.content_type().map(|s| s.to_string());
                let data = field.bytes().await.map_err(multipart_error)?;

                // A part without a filename is a plain text field, not an upload
                if let Some(filename) = filename {
                    file = Some(UploadedFile {
                        filename,
                        content_type,
                        data,
                    });
                }
            }
            other => {
                tracing::debug!(field = %other, "Ignoring unknown form field");
            }
        }
    }

    let form = UploadForm {
        email: email.ok_or_else(|| missing_field(EMAIL_FIELD))?,
    };
    form.validate()?;

    let file = file.ok_or_else(|| missing_field(FILE_FIELD))?;

    Ok((form, file))
}
