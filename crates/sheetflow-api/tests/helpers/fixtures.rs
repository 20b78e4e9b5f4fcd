//! Upload bodies used across integration tests.

use axum_test::multipart::{MultipartForm, Part};

pub const CSV_MIME: &str = "text/csv";
pub const TSV_MIME: &str = "text/tab-separated-values";
pub const XLSX_MIME: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

/// Header plus three data rows.
pub fn sample_csv() -> Vec<u8> {
    b"name,qty,price\nwidget,3,2.50\ngadget,1,10.00\ngizmo,7,0.99\n".to_vec()
}

/// Header plus two data rows.
pub fn sample_tsv() -> Vec<u8> {
    b"name\tqty\nwidget\t3\ngadget\t1\n".to_vec()
}

/// Workbook with a header plus three data rows.
pub fn sample_xlsx() -> Vec<u8> {
    let mut workbook = rust_xlsxwriter::Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.write_string(0, 0, "name").unwrap();
    sheet.write_string(0, 1, "qty").unwrap();
    for (row, (name, qty)) in [("widget", 3.0), ("gadget", 1.0), ("gizmo", 7.0)]
        .into_iter()
        .enumerate()
    {
        let row = row as u32 + 1;
        sheet.write_string(row, 0, name).unwrap();
        sheet.write_number(row, 1, qty).unwrap();
    }
    workbook.save_to_buffer().unwrap()
}

pub fn upload_form(email: &str, filename: &str, mime: &str, data: Vec<u8>) -> MultipartForm {
    MultipartForm::new()
        .add_text("email", email.to_string())
        .add_part("file", Part::bytes(data).file_name(filename).mime_type(mime))
}

/// Form carrying only the email field.
pub fn email_only_form(email: &str) -> MultipartForm {
    MultipartForm::new().add_text("email", email.to_string())
}

/// Form carrying only the file field.
pub fn file_only_form(filename: &str, mime: &str, data: Vec<u8>) -> MultipartForm {
    MultipartForm::new().add_part("file", Part::bytes(data).file_name(filename).mime_type(mime))
}
