//! Persisted book records.
//!
//! [`BookStore`] is the append-only keyed store the pipeline deduplicates
//! against. [`CsvBookStore`] keeps every record as one row of a single CSV
//! file whose header is fixed by the first record written.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bookmeta_core::isbn::parse_csv_rows;
use indexmap::IndexMap;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// One book record: column name to value, in column order.
pub type BookRecord = IndexMap<String, String>;

/// Column looked up by [`BookStore::exists`].
pub const ISBN_COLUMN: &str = "isbn";

/// Position of the ISBN column in files written with the default field
/// order (`title,author,publisher,pages,edition_year,isbn,description`).
const FALLBACK_ISBN_INDEX: usize = 5;

/// Errors from the persisted store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("CSV store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record has no fields to save")]
    EmptyRecord,
}

/// Result of [`BookStore::append_if_absent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Appended,
    /// A record for the ISBN already existed; nothing was written.
    Duplicate,
}

/// Append-only store of book records keyed by ISBN.
///
/// Reads reflect every write that completed before them.
#[async_trait]
pub trait BookStore: Send + Sync {
    async fn exists(&self, isbn: &str) -> Result<bool, StoreError>;

    async fn append(&self, record: &BookRecord) -> Result<(), StoreError>;

    /// Check for `isbn` and append `record` as one atomic step.
    async fn append_if_absent(
        &self,
        isbn: &str,
        record: &BookRecord,
    ) -> Result<AppendOutcome, StoreError>;
}

// ---------------------------------------------------------------------------
// CsvBookStore
// ---------------------------------------------------------------------------

/// [`BookStore`] backed by one CSV file.
///
/// Every operation runs under one async mutex, so concurrent jobs never
/// interleave a duplicate check with another job's append.
pub struct CsvBookStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl CsvBookStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Raw file contents, or `None` when nothing has been saved yet.
    pub async fn read_all(&self) -> Result<Option<Vec<u8>>, StoreError> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// File text, empty when the file does not exist.
    async fn read_text(&self) -> Result<String, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => Ok(text),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn contains(&self, isbn: &str) -> Result<bool, StoreError> {
        let text = self.read_text().await?;
        let mut rows = parse_csv_rows(&text).into_iter();
        let Some(header) = rows.next() else {
            return Ok(false);
        };
        let column = header
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(ISBN_COLUMN))
            .unwrap_or(FALLBACK_ISBN_INDEX);

        let wanted = isbn.trim();
        Ok(rows.any(|row| row.get(column).is_some_and(|v| v.trim() == wanted)))
    }

    async fn write_record(&self, record: &BookRecord) -> Result<(), StoreError> {
        if record.is_empty() {
            return Err(StoreError::EmptyRecord);
        }

        let existing = self.read_text().await?;
        let mut out = String::new();

        let header: Vec<String> = match parse_csv_rows(&existing).into_iter().next() {
            Some(header) => {
                if !existing.ends_with('\n') {
                    out.push('\n');
                }
                header
            }
            None => {
                let header: Vec<String> = record.keys().cloned().collect();
                push_row(&mut out, header.iter().map(String::as_str));
                header
            }
        };

        let row = header
            .iter()
            .map(|column| record.get(column).map_or("", String::as_str));
        push_row(&mut out, row);

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(out.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl BookStore for CsvBookStore {
    async fn exists(&self, isbn: &str) -> Result<bool, StoreError> {
        let _guard = self.lock.lock().await;
        self.contains(isbn).await
    }

    async fn append(&self, record: &BookRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock().await;
        self.write_record(record).await
    }

    async fn append_if_absent(
        &self,
        isbn: &str,
        record: &BookRecord,
    ) -> Result<AppendOutcome, StoreError> {
        let _guard = self.lock.lock().await;
        if self.contains(isbn).await? {
            tracing::debug!(isbn, "Book already in store");
            return Ok(AppendOutcome::Duplicate);
        }
        self.write_record(record).await?;
        tracing::debug!(isbn, path = %self.path.display(), "Book saved to store");
        Ok(AppendOutcome::Appended)
    }
}

/// Append one CSV line to `out`.
fn push_row<'a>(out: &mut String, fields: impl Iterator<Item = &'a str>) {
    let line: Vec<String> = fields.map(escape_field).collect();
    out.push_str(&line.join(","));
    out.push('\n');
}

/// Quote a field when it contains a delimiter, quote or line break.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn record(pairs: &[(&str, &str)]) -> BookRecord {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn fields_are_quoted_when_needed() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a, b"), "\"a, b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(escape_field("two\nlines"), "\"two\nlines\"");
    }

    #[tokio::test]
    async fn first_record_writes_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvBookStore::new(dir.path().join("books.csv"));

        store
            .append(&record(&[("title", "Il nome, della rosa"), ("isbn", "978")]))
            .await
            .unwrap();

        let text = String::from_utf8(store.read_all().await.unwrap().unwrap()).unwrap();
        assert_eq!(text, "title,isbn\n\"Il nome, della rosa\",978\n");
    }

    #[tokio::test]
    async fn later_records_follow_the_existing_header() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvBookStore::new(dir.path().join("books.csv"));

        store
            .append(&record(&[("title", "A"), ("isbn", "1")]))
            .await
            .unwrap();
        store
            .append(&record(&[("isbn", "2"), ("extra", "x"), ("title", "B")]))
            .await
            .unwrap();
        store.append(&record(&[("isbn", "3")])).await.unwrap();

        let text = String::from_utf8(store.read_all().await.unwrap().unwrap()).unwrap();
        assert_eq!(text, "title,isbn\nA,1\nB,2\n,3\n");
    }

    #[tokio::test]
    async fn append_if_absent_detects_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvBookStore::new(dir.path().join("books.csv"));
        let rec = record(&[("title", "A"), ("isbn", "9788804668237")]);

        assert!(!store.exists("9788804668237").await.unwrap());
        assert_eq!(
            store.append_if_absent("9788804668237", &rec).await.unwrap(),
            AppendOutcome::Appended
        );
        assert!(store.exists("9788804668237").await.unwrap());
        assert_eq!(
            store.append_if_absent("9788804668237", &rec).await.unwrap(),
            AppendOutcome::Duplicate
        );
    }

    #[tokio::test]
    async fn exists_falls_back_to_sixth_column() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("books.csv");
        tokio::fs::write(&path, "a,b,c,d,e,code,g\n1,2,3,4,5,978X,7\n")
            .await
            .unwrap();
        let store = CsvBookStore::new(&path);

        assert!(store.exists("978X").await.unwrap());
        assert!(!store.exists("7").await.unwrap());
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvBookStore::new(dir.path().join("absent.csv"));
        assert!(store.read_all().await.unwrap().is_none());
        assert!(!store.exists("978").await.unwrap());
    }

    #[tokio::test]
    async fn empty_record_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvBookStore::new(dir.path().join("books.csv"));
        assert_matches!(
            store.append(&BookRecord::new()).await,
            Err(StoreError::EmptyRecord)
        );
    }
}
