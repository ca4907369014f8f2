//! ISBN validation and extraction of ISBN lists from uploaded CSV files.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::chunking::dedupe_preserving_order;
use crate::error::CoreError;

/// Loose ISBN shape: 10 to 17 digits, hyphens or check-digit `X`.
static ISBN_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9Xx\-]{10,17}$").expect("valid ISBN regex"));

/// Header names that identify an ISBN column exactly.
static ISBN_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(isbn|isbn13|isbn10|book_isbn|bookisbn)$").expect("valid header regex")
});

/// Maximum number of identifiers accepted by a synchronous request.
pub const MAX_SYNC_BATCH: usize = 50;

/// Trim surrounding whitespace from a raw identifier.
pub fn normalize(raw: &str) -> String {
    raw.trim().to_string()
}

/// Whether `value` has the shape of an ISBN.
pub fn looks_like_isbn(value: &str) -> bool {
    ISBN_SHAPE.is_match(value.trim())
}

/// Trim identifiers and drop the empty ones, keeping order.
pub fn clean_identifiers<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|s| normalize(s.as_ref()))
        .filter(|s| !s.is_empty())
        .collect()
}

/// Reject identifier lists that are empty or larger than `max`.
pub fn validate_batch(isbns: &[String], max: usize) -> Result<(), CoreError> {
    if isbns.is_empty() {
        return Err(CoreError::Validation(
            "At least one valid ISBN is required".to_string(),
        ));
    }
    if isbns.len() > max {
        return Err(CoreError::Validation(format!(
            "Maximum {max} ISBNs allowed per request, got {}",
            isbns.len()
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// CSV import
// ---------------------------------------------------------------------------

/// ISBNs extracted from an uploaded CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CsvIsbnImport {
    /// Unique ISBNs in file order.
    pub isbns: Vec<String>,
    pub total_found: usize,
    pub detected_columns: Vec<String>,
    /// Header of the column the ISBNs were read from, if one was detected.
    pub isbn_column: Option<String>,
}

/// Extract ISBNs from CSV bytes.
///
/// The ISBN column is picked by exact header name first, then by any header
/// containing `isbn`. Without such a column every row is scanned for the
/// first ISBN-shaped value.
pub fn parse_isbn_csv(bytes: &[u8]) -> Result<CsvIsbnImport, CoreError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| CoreError::Validation(format!("CSV file is not valid UTF-8: {e}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut rows = parse_csv_rows(text).into_iter();
    let headers: Vec<String> = rows
        .next()
        .unwrap_or_default()
        .into_iter()
        .map(|h| h.trim().to_string())
        .collect();

    let column = headers
        .iter()
        .position(|h| ISBN_HEADER.is_match(h))
        .or_else(|| {
            headers
                .iter()
                .position(|h| h.to_lowercase().contains("isbn"))
        });

    let mut found = Vec::new();
    for row in rows {
        let candidate = match column {
            Some(idx) => row.get(idx).map(String::as_str),
            None => row.iter().map(String::as_str).find(|v| looks_like_isbn(v)),
        };
        if let Some(value) = candidate {
            let value = normalize(value);
            if looks_like_isbn(&value) {
                found.push(value);
            }
        }
    }

    let isbns = dedupe_preserving_order(&found);
    Ok(CsvIsbnImport {
        total_found: isbns.len(),
        isbns,
        isbn_column: column.map(|idx| headers[idx].clone()),
        detected_columns: headers,
    })
}

/// Split CSV text into rows of fields.
///
/// Handles quoted fields, doubled quotes, embedded newlines and CRLF line
/// endings. Blank lines are skipped.
pub fn parse_csv_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut row = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' => in_quotes = true,
            ',' => row.push(std::mem::take(&mut field)),
            '\r' => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                push_row(&mut rows, std::mem::take(&mut row));
            }
            _ => field.push(c),
        }
    }

    if !field.is_empty() || !row.is_empty() {
        row.push(field);
        push_row(&mut rows, row);
    }
    rows
}

fn push_row(rows: &mut Vec<Vec<String>>, row: Vec<String>) {
    let blank = row.iter().all(|f| f.trim().is_empty());
    if !blank {
        rows.push(row);
    }
}
