//! Streaming decoder for a single GTFS table.
//!
//! A [`TableDecoder`] reads one CSV stream record by record. Rows come out as
//! [`TableRow`] handles whose value buffers are borrowed from a per-decoder
//! [`RowPool`]; dropping a row (or calling [`TableRow::release`]) hands the
//! buffer back so the next row reuses its allocations.

use std::fmt;
use std::io::Read;
use std::sync::{Arc, Mutex};

use compact_str::CompactString;
use csv::{ReaderBuilder, StringRecord, Trim};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::feed::{FeedAccessor, FeedError};

const UTF8_BOM: char = '\u{feff}';
const EMPTY_TABLE_MESSAGE: &str = "table is empty";

/// Upper bound on idle buffers kept by a pool. Callers holding more rows than
/// this at once simply allocate.
const ROW_POOL_LIMIT: usize = 64;

/// Byte stream handed out by a [`FeedAccessor`].
pub type TableStream = Box<dyn Read + Send>;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TableError {
    #[error("{table}: malformed header: {message}")]
    MalformedHeader { table: String, message: String },
    #[error("{table}: line {line}: malformed row: {message}")]
    MalformedRow {
        table: String,
        line: u64,
        message: String,
    },
    #[error("{table}: cannot open table: {message}")]
    Unreadable { table: String, message: String },
}

impl TableError {
    pub fn table(&self) -> &str {
        match self {
            TableError::MalformedHeader { table, .. }
            | TableError::MalformedRow { table, .. }
            | TableError::Unreadable { table, .. } => table,
        }
    }

    /// True when the stream held no bytes at all, not even a header.
    pub fn is_empty_table(&self) -> bool {
        matches!(self, TableError::MalformedHeader { message, .. } if message == EMPTY_TABLE_MESSAGE)
    }

    /// Physical line of the failing record, if the error belongs to a row.
    pub fn line(&self) -> Option<u64> {
        match self {
            TableError::MalformedRow { line, .. } => Some(*line),
            TableError::MalformedHeader { .. } => Some(1),
            TableError::Unreadable { .. } => None,
        }
    }
}

/// Column names of a table plus a name lookup index.
#[derive(Debug, Clone)]
pub struct TableHeader {
    names: Vec<CompactString>,
    index: FxHashMap<CompactString, usize>,
}

impl TableHeader {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let names: Vec<CompactString> = names
            .into_iter()
            .map(|name| CompactString::from(name.as_ref().trim()))
            .collect();
        let mut index = FxHashMap::default();
        for (position, name) in names.iter().enumerate() {
            if !name.is_empty() {
                // Duplicated columns resolve to their first occurrence.
                index.entry(name.clone()).or_insert(position);
            }
        }
        Self { names, index }
    }

    pub fn names(&self) -> &[CompactString] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }
}

/// Free list of row value buffers.
#[derive(Debug, Default)]
pub struct RowPool {
    free: Mutex<Vec<Vec<String>>>,
}

impl RowPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn acquire(&self) -> Vec<String> {
        self.free
            .lock()
            .ok()
            .and_then(|mut free| free.pop())
            .unwrap_or_default()
    }

    pub fn release(&self, mut values: Vec<String>) {
        for value in values.iter_mut() {
            value.clear();
        }
        if let Ok(mut free) = self.free.lock() {
            if free.len() < ROW_POOL_LIMIT {
                free.push(values);
            }
        }
    }

    pub fn idle(&self) -> usize {
        self.free.lock().map(|free| free.len()).unwrap_or(0)
    }
}

/// One decoded record. Owns a pooled buffer until dropped.
pub struct TableRow {
    header: Arc<TableHeader>,
    values: Vec<String>,
    line: u64,
    raw_field_count: usize,
    pool: Arc<RowPool>,
}

impl TableRow {
    /// Value of `column`, or `None` when the table has no such column.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.header
            .position(column)
            .and_then(|position| self.values.get(position))
            .map(String::as_str)
    }

    /// Trimmed value of `column`, or `None` when absent or blank.
    pub fn non_empty(&self, column: &str) -> Option<&str> {
        self.get(column)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }

    pub fn field(&self, position: usize) -> Option<&str> {
        self.values.get(position).map(String::as_str)
    }

    /// 1-based physical line; the header is line 1.
    pub fn line_number(&self) -> u64 {
        self.line
    }

    /// Number of fields actually present in the record.
    pub fn raw_field_count(&self) -> usize {
        self.raw_field_count
    }

    pub fn has_expected_length(&self) -> bool {
        self.raw_field_count == self.header.len()
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    /// `(column, value)` pairs in header order. Fields past the header are skipped.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.header
            .names()
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    /// All fields present, including ones without a header column.
    pub fn values(&self) -> &[String] {
        &self.values
    }

    pub fn is_blank(&self) -> bool {
        self.values.iter().all(|value| value.trim().is_empty())
    }

    /// Returns the buffer to the pool. Equivalent to dropping the row.
    pub fn release(self) {}
}

impl Drop for TableRow {
    fn drop(&mut self) {
        self.pool.release(std::mem::take(&mut self.values));
    }
}

impl fmt::Debug for TableRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableRow")
            .field("line", &self.line)
            .field("raw_field_count", &self.raw_field_count)
            .field("values", &self.values)
            .finish()
    }
}

pub struct TableDecoder<R: Read> {
    name: String,
    reader: csv::Reader<R>,
    header: Arc<TableHeader>,
    record: StringRecord,
    pool: Arc<RowPool>,
    line: u64,
    exhausted: bool,
}

impl<R: Read> TableDecoder<R> {
    pub fn open(stream: R, name: impl Into<String>) -> Result<Self, TableError> {
        let name = name.into();
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(Trim::None)
            .from_reader(stream);

        let mut record = StringRecord::new();
        match reader.read_record(&mut record) {
            Ok(true) => {}
            Ok(false) => {
                return Err(TableError::MalformedHeader {
                    table: name,
                    message: EMPTY_TABLE_MESSAGE.to_string(),
                })
            }
            Err(err) => {
                return Err(TableError::MalformedHeader {
                    table: name,
                    message: err.to_string(),
                })
            }
        }

        let header = TableHeader::new(record.iter().enumerate().map(|(index, field)| {
            if index == 0 {
                field.trim_start_matches(UTF8_BOM)
            } else {
                field
            }
        }));
        if header.names().iter().all(|column| column.is_empty()) {
            return Err(TableError::MalformedHeader {
                table: name,
                message: "header has no column names".to_string(),
            });
        }

        Ok(Self {
            name,
            reader,
            header: Arc::new(header),
            record,
            pool: Arc::new(RowPool::new()),
            line: 1,
            exhausted: false,
        })
    }

    pub fn table_name(&self) -> &str {
        &self.name
    }

    pub fn header(&self) -> &TableHeader {
        &self.header
    }

    pub fn headers(&self) -> &[CompactString] {
        self.header.names()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.header.contains(name)
    }

    /// Records consumed so far, including ones that failed to decode.
    pub fn rows_read(&self) -> u64 {
        self.line - 1
    }

    pub fn pool(&self) -> &Arc<RowPool> {
        &self.pool
    }

    /// Decodes the next record. `Ok(None)` means the stream is exhausted.
    ///
    /// A row error only covers that record; calling again continues with the
    /// following one. After an I/O failure the decoder reports exhaustion.
    pub fn next_row(&mut self) -> Result<Option<TableRow>, TableError> {
        if self.exhausted {
            return Ok(None);
        }
        match self.reader.read_record(&mut self.record) {
            Ok(false) => {
                self.exhausted = true;
                Ok(None)
            }
            Ok(true) => {
                self.line += 1;
                Ok(Some(self.fill_row()))
            }
            Err(err) => {
                self.line += 1;
                if matches!(err.kind(), csv::ErrorKind::Io(_)) {
                    self.exhausted = true;
                }
                Err(TableError::MalformedRow {
                    table: self.name.clone(),
                    line: self.line,
                    message: err.to_string(),
                })
            }
        }
    }

    fn fill_row(&mut self) -> TableRow {
        let header_len = self.header.len();
        let raw_field_count = self.record.len();
        let mut values = self.pool.acquire();

        if raw_field_count == header_len && values.len() == header_len {
            for (slot, field) in values.iter_mut().zip(self.record.iter()) {
                slot.push_str(field);
            }
        } else {
            let width = header_len.max(raw_field_count);
            values.resize_with(width, String::new);
            for (slot, field) in values.iter_mut().zip(self.record.iter()) {
                slot.push_str(field);
            }
        }

        TableRow {
            header: Arc::clone(&self.header),
            values,
            line: self.line,
            raw_field_count,
            pool: Arc::clone(&self.pool),
        }
    }

    /// Visits every row until the stream ends or a row fails to decode.
    /// Returns the number of rows visited.
    pub fn for_each_row<F>(&mut self, mut visit: F) -> Result<u64, TableError>
    where
        F: FnMut(&TableRow),
    {
        let mut visited = 0;
        while let Some(row) = self.next_row()? {
            visit(&row);
            visited += 1;
        }
        Ok(visited)
    }
}

/// Opens `name` from `feed` and decodes its header.
///
/// `Ok(None)` means the feed has no such table.
pub fn open_decoder(
    feed: &dyn FeedAccessor,
    name: &str,
) -> Result<Option<TableDecoder<TableStream>>, TableError> {
    let stream = match feed.open_table(name) {
        Ok(stream) => stream,
        Err(FeedError::NotFound(_)) => return Ok(None),
        Err(err) => {
            return Err(TableError::Unreadable {
                table: name.to_string(),
                message: err.to_string(),
            })
        }
    };
    TableDecoder::open(stream, name).map(Some)
}

/// Like [`open_decoder`], but treats unreadable tables as absent.
pub fn readable_table(feed: &dyn FeedAccessor, name: &str) -> Option<TableDecoder<TableStream>> {
    match open_decoder(feed, name) {
        Ok(decoder) => decoder,
        Err(err) => {
            debug!(table = name, error = %err, "treating unreadable table as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoder(data: &str) -> TableDecoder<&[u8]> {
        TableDecoder::open(data.as_bytes(), "test.txt").expect("decoder")
    }

    #[test]
    fn decodes_rows_with_line_numbers() {
        let mut decoder = decoder("stop_id,stop_name\nS1,First\nS2,Second\n");
        assert_eq!(decoder.headers().len(), 2);

        let first = decoder.next_row().unwrap().unwrap();
        assert_eq!(first.line_number(), 2);
        assert_eq!(first.get("stop_id"), Some("S1"));
        assert_eq!(first.get("stop_name"), Some("First"));
        assert_eq!(first.get("missing"), None);
        drop(first);

        let second = decoder.next_row().unwrap().unwrap();
        assert_eq!(second.line_number(), 3);
        assert_eq!(second.get("stop_id"), Some("S2"));
        drop(second);

        assert!(decoder.next_row().unwrap().is_none());
        assert!(decoder.next_row().unwrap().is_none());
        assert_eq!(decoder.rows_read(), 2);
    }

    #[test]
    fn strips_byte_order_mark_from_first_column() {
        let mut decoder = decoder("\u{feff}agency_id,agency_name\nA1,Metro\n");
        assert_eq!(decoder.headers()[0].as_str(), "agency_id");
        let row = decoder.next_row().unwrap().unwrap();
        assert_eq!(row.get("agency_id"), Some("A1"));
    }

    #[test]
    fn rejects_empty_stream_and_blank_header() {
        let empty = TableDecoder::open(&b""[..], "empty.txt").err().expect("empty stream");
        assert!(matches!(empty, TableError::MalformedHeader { .. }));
        assert!(empty.is_empty_table());

        let blank = TableDecoder::open(&b",,\nA,B,C\n"[..], "blank.txt").err().expect("blank header");
        assert!(matches!(blank, TableError::MalformedHeader { .. }));
        assert!(!blank.is_empty_table());
    }

    #[test]
    fn short_rows_fill_missing_fields_with_empty_strings() {
        let mut decoder = decoder("a,b,c\n1\n1,2,3,4\n");

        let short = decoder.next_row().unwrap().unwrap();
        assert_eq!(short.raw_field_count(), 1);
        assert!(!short.has_expected_length());
        assert_eq!(short.get("a"), Some("1"));
        assert_eq!(short.get("b"), Some(""));
        assert_eq!(short.get("c"), Some(""));
        drop(short);

        let long = decoder.next_row().unwrap().unwrap();
        assert_eq!(long.raw_field_count(), 4);
        assert_eq!(long.get("c"), Some("3"));
        assert_eq!(long.field(3), Some("4"));
        assert_eq!(long.iter().count(), 3);
    }

    #[test]
    fn invalid_utf8_row_is_reported_and_decoding_continues() {
        let mut data = b"a,b\n1,2\n".to_vec();
        data.extend_from_slice(b"\xff\xfe,3\n");
        data.extend_from_slice(b"4,5\n");
        let mut decoder = TableDecoder::open(&data[..], "bad.txt").unwrap();

        assert_eq!(decoder.next_row().unwrap().unwrap().line_number(), 2);
        let err = decoder.next_row().unwrap_err();
        assert_eq!(err.line(), Some(3));
        assert!(matches!(err, TableError::MalformedRow { .. }));

        let after = decoder.next_row().unwrap().unwrap();
        assert_eq!(after.line_number(), 4);
        assert_eq!(after.get("a"), Some("4"));
    }

    #[test]
    fn released_rows_return_buffers_to_the_pool() {
        let mut decoder = decoder("a,b\n1,2\n3,4\n");
        let pool = Arc::clone(decoder.pool());
        assert_eq!(pool.idle(), 0);

        let row = decoder.next_row().unwrap().unwrap();
        row.release();
        assert_eq!(pool.idle(), 1);

        let row = decoder.next_row().unwrap().unwrap();
        assert_eq!(pool.idle(), 0);
        assert_eq!(row.get("a"), Some("3"));
        assert_eq!(row.get("b"), Some("4"));
    }

    #[test]
    fn for_each_row_counts_visited_rows() {
        let mut decoder = decoder("id\n1\n2\n3\n");
        let mut ids = Vec::new();
        let visited = decoder
            .for_each_row(|row| ids.push(row.get("id").unwrap_or_default().to_string()))
            .unwrap();
        assert_eq!(visited, 3);
        assert_eq!(ids, vec!["1", "2", "3"]);
    }

    #[test]
    fn header_names_are_trimmed_and_duplicates_resolve_to_first() {
        let header = TableHeader::new([" id ", "name", "id"]);
        assert_eq!(header.names()[0].as_str(), "id");
        assert_eq!(header.position("id"), Some(0));
        assert_eq!(header.len(), 3);
    }
}
