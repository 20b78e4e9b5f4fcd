//! Spreadsheet formats and row counting.
//!
//! Every format counts the same way: non-empty data rows of the first sheet,
//! excluding the header row.

use calamine::{Data, Ods, Reader, Sheets, Xls, Xlsx};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::path::Path;

/// Accepted spreadsheet formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpreadsheetFormat {
    Csv,
    Tsv,
    Xls,
    Xlsx,
    Ods,
}

#[derive(Debug, thiserror::Error)]
pub enum SpreadsheetError {
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Failed to parse delimited file: {0}")]
    Csv(#[from] csv::Error),

    #[error("Failed to parse workbook: {0}")]
    Workbook(#[from] calamine::Error),

    #[error("Workbook contains no sheets")]
    EmptyWorkbook,
}

impl SpreadsheetFormat {
    pub const ALL: [SpreadsheetFormat; 5] = [
        SpreadsheetFormat::Csv,
        SpreadsheetFormat::Tsv,
        SpreadsheetFormat::Xls,
        SpreadsheetFormat::Xlsx,
        SpreadsheetFormat::Ods,
    ];

    /// Look up a format by extension, with or without the leading dot. Case-insensitive.
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_lowercase().as_str() {
            "csv" => Some(SpreadsheetFormat::Csv),
            "tsv" => Some(SpreadsheetFormat::Tsv),
            "xls" => Some(SpreadsheetFormat::Xls),
            "xlsx" => Some(SpreadsheetFormat::Xlsx),
            "ods" => Some(SpreadsheetFormat::Ods),
            _ => None,
        }
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SpreadsheetError> {
        let path = path.as_ref();
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| SpreadsheetError::UnsupportedFormat(path.display().to_string()))
    }

    /// Look up a format by an already normalized MIME type.
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.mime_type() == mime)
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            SpreadsheetFormat::Csv => "text/csv",
            SpreadsheetFormat::Tsv => "text/tab-separated-values",
            SpreadsheetFormat::Xls => "application/vnd.ms-excel",
            SpreadsheetFormat::Xlsx => {
                "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"
            }
            SpreadsheetFormat::Ods => "application/vnd.oasis.opendocument.spreadsheet",
        }
    }

    /// Extension including the leading dot.
    pub fn extension(&self) -> &'static str {
        match self {
            SpreadsheetFormat::Csv => ".csv",
            SpreadsheetFormat::Tsv => ".tsv",
            SpreadsheetFormat::Xls => ".xls",
            SpreadsheetFormat::Xlsx => ".xlsx",
            SpreadsheetFormat::Ods => ".ods",
        }
    }

    /// Count data rows in `data`. Blocking; run off the async executor.
    pub fn count_rows(&self, data: &[u8]) -> Result<u64, SpreadsheetError> {
        match self {
            SpreadsheetFormat::Csv => count_delimited(data, b','),
            SpreadsheetFormat::Tsv => count_delimited(data, b'\t'),
            SpreadsheetFormat::Xls | SpreadsheetFormat::Xlsx | SpreadsheetFormat::Ods => {
                self.count_workbook_rows(data)
            }
        }
    }

    fn count_workbook_rows(&self, data: &[u8]) -> Result<u64, SpreadsheetError> {
        let cursor = Cursor::new(data);
        let mut workbook: Sheets<Cursor<&[u8]>> = match self {
            SpreadsheetFormat::Xls => Sheets::Xls(Xls::new(cursor).map_err(calamine::Error::from)?),
            SpreadsheetFormat::Xlsx => {
                Sheets::Xlsx(Xlsx::new(cursor).map_err(calamine::Error::from)?)
            }
            SpreadsheetFormat::Ods => Sheets::Ods(Ods::new(cursor).map_err(calamine::Error::from)?),
            other => return Err(SpreadsheetError::UnsupportedFormat(other.to_string())),
        };

        let first_sheet = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or(SpreadsheetError::EmptyWorkbook)?;
        let range = workbook.worksheet_range(&first_sheet)?;

        let non_empty = range
            .rows()
            .filter(|row| row.iter().any(|cell| !is_blank(cell)))
            .count() as u64;

        tracing::debug!(
            format = %self,
            sheet = %first_sheet,
            rows = non_empty,
            "Counted workbook rows"
        );

        Ok(non_empty.saturating_sub(1))
    }
}

impl fmt::Display for SpreadsheetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SpreadsheetFormat::Csv => "csv",
            SpreadsheetFormat::Tsv => "tsv",
            SpreadsheetFormat::Xls => "xls",
            SpreadsheetFormat::Xlsx => "xlsx",
            SpreadsheetFormat::Ods => "ods",
        };
        write!(f, "{}", name)
    }
}

fn count_delimited(data: &[u8], delimiter: u8) -> Result<u64, SpreadsheetError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(data);

    let mut count = 0u64;
    for record in reader.byte_records() {
        let record = record?;
        if record.iter().any(|field| !field.is_empty()) {
            count += 1;
        }
    }
    Ok(count)
}

fn is_blank(cell: &Data) -> bool {
    match cell {
        Data::Empty => true,
        Data::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_extension() {
        assert_eq!(SpreadsheetFormat::from_extension(".CSV"), Some(SpreadsheetFormat::Csv));
        assert_eq!(SpreadsheetFormat::from_extension("xlsx"), Some(SpreadsheetFormat::Xlsx));
        assert_eq!(SpreadsheetFormat::from_extension(".pdf"), None);
    }

    #[test]
    fn test_from_path_rejects_unknown() {
        assert_eq!(
            SpreadsheetFormat::from_path("abc_report.ods").unwrap(),
            SpreadsheetFormat::Ods
        );
        assert!(matches!(
            SpreadsheetFormat::from_path("abc_report.txt"),
            Err(SpreadsheetError::UnsupportedFormat(_))
        ));
        assert!(matches!(
            SpreadsheetFormat::from_path("no_extension"),
            Err(SpreadsheetError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn test_mime_lookup_matches_extension() {
        for format in SpreadsheetFormat::ALL {
            assert_eq!(SpreadsheetFormat::from_mime_type(format.mime_type()), Some(format));
            assert_eq!(SpreadsheetFormat::from_extension(format.extension()), Some(format));
        }
    }

    #[test]
    fn test_csv_counts_data_rows_excluding_header() {
        let data = b"name,qty\nwidget,3\ngadget,5\ngizmo,7\n";
        assert_eq!(SpreadsheetFormat::Csv.count_rows(data).unwrap(), 3);
    }

    #[test]
    fn test_csv_without_trailing_newline_and_blank_lines() {
        let data = b"name,qty\nwidget,3\n\ngadget,5\ngizmo,7";
        assert_eq!(SpreadsheetFormat::Csv.count_rows(data).unwrap(), 3);
    }

    #[test]
    fn test_csv_quoted_newlines_are_one_record() {
        let data = b"name,notes\nwidget,\"line one\nline two\"\n";
        assert_eq!(SpreadsheetFormat::Csv.count_rows(data).unwrap(), 1);
    }

    #[test]
    fn test_header_only_is_zero() {
        assert_eq!(SpreadsheetFormat::Csv.count_rows(b"name,qty\n").unwrap(), 0);
    }

    #[test]
    fn test_tsv_uses_tab_delimiter() {
        let data = b"name\tqty\nwidget\t3\ngadget\t5\ngizmo\t7\n";
        assert_eq!(SpreadsheetFormat::Tsv.count_rows(data).unwrap(), 3);
    }

    #[test]
    fn test_ragged_rows_are_counted() {
        let data = b"a,b,c\n1,2\n3,4,5,6\n";
        assert_eq!(SpreadsheetFormat::Csv.count_rows(data).unwrap(), 2);
    }

    #[test]
    fn test_garbage_workbook_is_an_error() {
        let data = b"definitely not a zip archive";
        assert!(matches!(
            SpreadsheetFormat::Xlsx.count_rows(data),
            Err(SpreadsheetError::Workbook(_))
        ));
        assert!(SpreadsheetFormat::Ods.count_rows(data).is_err());
        assert!(SpreadsheetFormat::Xls.count_rows(data).is_err());
    }

    /// Header plus one row per entry; `None` leaves that row blank.
    fn xlsx_fixture(rows: &[Option<(&str, f64)>]) -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.write_string(0, 0, "name").unwrap();
        sheet.write_string(0, 1, "qty").unwrap();
        for (i, row) in rows.iter().enumerate() {
            if let Some((name, qty)) = row {
                let r = i as u32 + 1;
                sheet.write_string(r, 0, *name).unwrap();
                sheet.write_number(r, 1, *qty).unwrap();
            }
        }
        workbook.save_to_buffer().unwrap()
    }

    #[test]
    fn test_xlsx_counts_data_rows_excluding_header() {
        let data = xlsx_fixture(&[
            Some(("widget", 3.0)),
            Some(("gadget", 5.0)),
            Some(("gizmo", 7.0)),
        ]);
        assert_eq!(SpreadsheetFormat::Xlsx.count_rows(&data).unwrap(), 3);
    }

    #[test]
    fn test_xlsx_matches_csv_for_same_table() {
        let csv = b"name,qty\nwidget,3\n\ngadget,5\ngizmo,7\n";
        let xlsx = xlsx_fixture(&[
            Some(("widget", 3.0)),
            None,
            Some(("gadget", 5.0)),
            Some(("gizmo", 7.0)),
        ]);
        assert_eq!(
            SpreadsheetFormat::Xlsx.count_rows(&xlsx).unwrap(),
            SpreadsheetFormat::Csv.count_rows(csv).unwrap()
        );
    }

    #[test]
    fn test_xlsx_header_only_is_zero() {
        let data = xlsx_fixture(&[]);
        assert_eq!(SpreadsheetFormat::Xlsx.count_rows(&data).unwrap(), 0);
    }
}
