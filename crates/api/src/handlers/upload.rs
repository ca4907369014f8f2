//! Reading an uploaded ISBN CSV file from a multipart request.

use axum::body::Bytes;
use axum::extract::Multipart;
use bookmeta_core::isbn::{parse_isbn_csv, CsvIsbnImport};
use serde::Serialize;

use crate::error::{AppError, AppResult};

/// Multipart field holding the CSV file.
pub const CSV_FILE_FIELD: &str = "csv_file";

/// What was read from the uploaded file, echoed back to the client.
#[derive(Debug, Clone, Serialize)]
pub struct CsvFileInfo {
    pub filename: Option<String>,
    pub total_found: usize,
    pub detected_columns: Vec<String>,
    pub isbn_column: Option<String>,
}

/// Read the `csv_file` field and extract its ISBNs.
///
/// Other fields are ignored. A request without the field is a bad request.
pub async fn read_isbn_csv(mut multipart: Multipart) -> AppResult<(CsvIsbnImport, CsvFileInfo)> {
    let mut upload: Option<(Option<String>, Bytes)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(CSV_FILE_FIELD) {
            continue;
        }
        let filename = field.file_name().map(str::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload = Some((filename, data));
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("No CSV file uploaded".to_string()))?;
    let import = parse_isbn_csv(&data)?;

    tracing::info!(
        filename = filename.as_deref().unwrap_or("<unnamed>"),
        total_found = import.total_found,
        isbn_column = import.isbn_column.as_deref().unwrap_or("<scanned>"),
        "Parsed ISBN CSV upload",
    );

    let info = CsvFileInfo {
        filename,
        total_found: import.total_found,
        detected_columns: import.detected_columns.clone(),
        isbn_column: import.isbn_column.clone(),
    };
    Ok((import, info))
}
