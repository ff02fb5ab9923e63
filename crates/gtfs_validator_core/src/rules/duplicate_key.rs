use rustc_hash::FxHashMap;

use crate::feed::{
    AGENCY_FILE, ATTRIBUTIONS_FILE, CALENDAR_DATES_FILE, CALENDAR_FILE, FARE_ATTRIBUTES_FILE,
    LEVELS_FILE, PATHWAYS_FILE, ROUTES_FILE, SHAPES_FILE, STOPS_FILE, STOP_TIMES_FILE,
    TRIPS_FILE,
};
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const DUPLICATE_KEY: NoticeCode = NoticeCode::error("duplicate_key");

/// Primary key columns per table.
const PRIMARY_KEYS: &[(&str, &[&str])] = &[
    (AGENCY_FILE, &["agency_id"]),
    (STOPS_FILE, &["stop_id"]),
    (ROUTES_FILE, &["route_id"]),
    (TRIPS_FILE, &["trip_id"]),
    (STOP_TIMES_FILE, &["trip_id", "stop_sequence"]),
    (CALENDAR_FILE, &["service_id"]),
    (CALENDAR_DATES_FILE, &["service_id", "date"]),
    (FARE_ATTRIBUTES_FILE, &["fare_id"]),
    (SHAPES_FILE, &["shape_id", "shape_pt_sequence"]),
    (LEVELS_FILE, &["level_id"]),
    (PATHWAYS_FILE, &["pathway_id"]),
    (ATTRIBUTIONS_FILE, &["attribution_id"]),
];

const KEY_SEPARATOR: char = '\u{1f}';

#[derive(Debug, Default)]
pub struct DuplicateKeyValidator;

impl Validator for DuplicateKeyValidator {
    fn name(&self) -> &'static str {
        "duplicate_key"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        for (table, columns) in PRIMARY_KEYS {
            check_table(feed, table, columns, notices);
        }
    }
}

fn check_table(feed: &dyn FeedAccessor, table: &str, columns: &[&str], notices: &NoticeStore) {
    let mut seen: FxHashMap<String, u64> = FxHashMap::default();
    let mut key = String::new();
    scan_table(feed, table, |row| {
        key.clear();
        for (index, column) in columns.iter().enumerate() {
            let Some(value) = row.non_empty(column) else {
                // Incomplete keys are not compared.
                return;
            };
            if index > 0 {
                key.push(KEY_SEPARATOR);
            }
            key.push_str(value);
        }

        if let Some(previous) = seen.get(key.as_str()) {
            let mut notice = ValidationNotice::new(DUPLICATE_KEY, "duplicate primary key value")
                .with_row(table, row.line_number())
                .with_context_field("oldCsvRowNumber", *previous);
            for (index, column) in columns.iter().enumerate() {
                let position = index + 1;
                notice.insert_context_field(format!("fieldName{position}"), *column);
                notice.insert_context_field(
                    format!("fieldValue{position}"),
                    row.non_empty(column).unwrap_or(""),
                );
            }
            notices.add(notice);
        } else {
            seen.insert(key.clone(), row.line_number());
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run;
    use crate::MemoryFeed;
    use serde_json::json;

    #[test]
    fn reports_single_column_duplicates() {
        let feed = MemoryFeed::new().with_table(STOPS_FILE, "stop_id\nS1\nS2\n S1\n\n");

        let notices = run(&DuplicateKeyValidator, &feed);

        assert_eq!(notices.count("duplicate_key"), 1);
        let snapshot = notices.snapshot();
        let notice = &snapshot[0];
        assert_eq!(notice.row_number(), Some(4));
        assert_eq!(notice.context_field("oldCsvRowNumber"), Some(&json!(2)));
        assert_eq!(notice.context_field("fieldValue1"), Some(&json!("S1")));
    }

    #[test]
    fn compound_keys_compare_every_column() {
        let feed = MemoryFeed::new().with_table(
            STOP_TIMES_FILE,
            "trip_id,stop_id,stop_sequence\n\
             T1,S1,1\n\
             T1,S2,2\n\
             T2,S1,1\n\
             T1,S3,2\n",
        );

        let notices = run(&DuplicateKeyValidator, &feed);

        assert_eq!(notices.count("duplicate_key"), 1);
        let snapshot = notices.snapshot();
        let notice = &snapshot[0];
        assert_eq!(notice.context_field("fieldName2"), Some(&json!("stop_sequence")));
        assert_eq!(notice.context_field("fieldValue2"), Some(&json!("2")));
    }
}
