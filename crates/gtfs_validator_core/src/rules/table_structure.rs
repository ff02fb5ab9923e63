use rustc_hash::FxHashMap;

use crate::feed::{GTFS_FILE_NAMES, LOCATIONS_GEOJSON_FILE};
use crate::notice::NoticeCode;
use crate::table::{open_decoder, TableError, TableStream};
use crate::{
    FeedAccessor, NoticeStore, TableDecoder, ValidationConfig, ValidationNotice, Validator,
};

const CSV_PARSING_FAILED: NoticeCode = NoticeCode::error("csv_parsing_failed");
const INVALID_ROW_LENGTH: NoticeCode = NoticeCode::error("invalid_row_length");
const EMPTY_FILE: NoticeCode = NoticeCode::error("empty_file");
const EMPTY_COLUMN_NAME: NoticeCode = NoticeCode::error("empty_column_name");
const DUPLICATED_COLUMN: NoticeCode = NoticeCode::error("duplicated_column");
const UNKNOWN_FILE: NoticeCode = NoticeCode::info("unknown_file");

/// Checks every table's header and record shape.
#[derive(Debug, Default)]
pub struct TableStructureValidator;

impl Validator for TableStructureValidator {
    fn name(&self) -> &'static str {
        "table_structure"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        let Ok(tables) = feed.list_tables() else {
            return;
        };

        for table in &tables {
            if !GTFS_FILE_NAMES.contains(&table.as_str()) {
                notices.add(
                    ValidationNotice::new(UNKNOWN_FILE, format!("unknown file {table}"))
                        .with_file(table.as_str()),
                );
                continue;
            }
            if table == LOCATIONS_GEOJSON_FILE {
                continue;
            }

            match open_decoder(feed, table) {
                Ok(Some(decoder)) => check_table(decoder, notices),
                Ok(None) => {}
                Err(err) if err.is_empty_table() => {
                    notices.add(empty_file_notice(table));
                }
                Err(err) => notices.add(parsing_failed_notice(&err)),
            }
        }
    }
}

fn check_table(mut decoder: TableDecoder<TableStream>, notices: &NoticeStore) {
    let table = decoder.table_name().to_string();
    let header_count = decoder.headers().len();

    let mut first_index: FxHashMap<&str, usize> = FxHashMap::default();
    for (index, column) in decoder.headers().iter().enumerate() {
        if column.is_empty() {
            notices.add(
                ValidationNotice::new(EMPTY_COLUMN_NAME, "column name is empty")
                    .with_file(table.as_str())
                    .with_context_field("index", index),
            );
            continue;
        }
        if let Some(first) = first_index.get(column.as_str()) {
            notices.add(
                ValidationNotice::new(DUPLICATED_COLUMN, format!("column {column} appears twice"))
                    .with_file(table.as_str())
                    .with_context_field("fieldName", column.as_str())
                    .with_context_field("firstIndex", *first)
                    .with_context_field("secondIndex", index),
            );
        } else {
            first_index.insert(column.as_str(), index);
        }
    }

    let mut rows = 0_u64;
    loop {
        match decoder.next_row() {
            Ok(Some(row)) => {
                rows += 1;
                if !row.has_expected_length() && !row.is_blank() {
                    notices.add(
                        ValidationNotice::new(
                            INVALID_ROW_LENGTH,
                            format!(
                                "row has {} fields, header has {header_count}",
                                row.raw_field_count()
                            ),
                        )
                        .with_row(table.as_str(), row.line_number())
                        .with_context_field("rowLength", row.raw_field_count())
                        .with_context_field("headerCount", header_count),
                    );
                }
            }
            Ok(None) => break,
            Err(err) => {
                notices.add(parsing_failed_notice(&err));
                break;
            }
        }
    }

    if rows == 0 {
        notices.add(empty_file_notice(&table));
    }
}

fn empty_file_notice(table: &str) -> ValidationNotice {
    ValidationNotice::new(EMPTY_FILE, format!("{table} has no data rows")).with_file(table)
}

fn parsing_failed_notice(err: &TableError) -> ValidationNotice {
    let mut notice =
        ValidationNotice::new(CSV_PARSING_FAILED, err.to_string()).with_file(err.table());
    if let Some(line) = err.line() {
        notice.insert_context_field("csvRowNumber", line);
    }
    notice
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run;
    use crate::MemoryFeed;

    #[test]
    fn reports_header_problems() {
        let feed = MemoryFeed::new()
            .with_table("stops.txt", "stop_id,,stop_name,stop_id\nS1,x,Main,S1\n");
        let notices = run(&TableStructureValidator, &feed);

        assert_eq!(notices.count("empty_column_name"), 1);
        assert_eq!(notices.count("duplicated_column"), 1);
        assert_eq!(notices.total_count(), 2);
    }

    #[test]
    fn reports_row_length_and_stops_at_bad_rows() {
        let mut contents = b"route_id,route_type\nR1,3\nR2\n".to_vec();
        contents.extend_from_slice(b"R\xff,3\nR4,3,extra\n");
        let feed = MemoryFeed::new().with_table("routes.txt", contents);

        let notices = run(&TableStructureValidator, &feed);

        assert_eq!(notices.count("invalid_row_length"), 1);
        assert_eq!(notices.count("csv_parsing_failed"), 1);
        let failure = notices
            .snapshot()
            .into_iter()
            .find(|notice| notice.code() == "csv_parsing_failed")
            .unwrap();
        assert_eq!(failure.row_number(), Some(4));
    }

    #[test]
    fn reports_empty_and_unknown_files() {
        let feed = MemoryFeed::new()
            .with_table("agency.txt", "")
            .with_table("trips.txt", "route_id,service_id,trip_id\n")
            .with_table("notes.txt", "whatever\n");

        let notices = run(&TableStructureValidator, &feed);

        assert_eq!(notices.count("empty_file"), 2);
        assert_eq!(notices.count("unknown_file"), 1);
        assert_eq!(notices.severity_of("unknown_file"), Some(crate::NoticeSeverity::Info));
    }
}
