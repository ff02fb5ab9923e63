use gtfs_sieve_model::{GtfsColor, GtfsDate, GtfsTime, RouteType};
use tracing::debug;
use url::Url;

use crate::feed::{GTFS_FILE_NAMES, LOCATIONS_GEOJSON_FILE};
use crate::notice::NoticeCode;
use crate::table::{readable_table, TableHeader};
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const INVALID_DATE: NoticeCode = NoticeCode::error("invalid_date");
const INVALID_TIME: NoticeCode = NoticeCode::error("invalid_time");
const INVALID_COLOR: NoticeCode = NoticeCode::error("invalid_color");
const INVALID_INTEGER: NoticeCode = NoticeCode::error("invalid_integer");
const INVALID_FLOAT: NoticeCode = NoticeCode::error("invalid_float");
const INVALID_URL: NoticeCode = NoticeCode::error("invalid_url");
const LEADING_OR_TRAILING_WHITESPACES: NoticeCode =
    NoticeCode::warning("leading_or_trailing_whitespaces");
const UNEXPECTED_ENUM_VALUE: NoticeCode = NoticeCode::warning("unexpected_enum_value");

const INTEGER_FIELDS: &[&str] = &[
    "route_sort_order",
    "direction_id",
    "location_type",
    "wheelchair_boarding",
    "wheelchair_accessible",
    "bikes_allowed",
    "stop_sequence",
    "pickup_type",
    "drop_off_type",
    "continuous_pickup",
    "continuous_drop_off",
    "timepoint",
    "exception_type",
    "payment_method",
    "transfers",
    "transfer_duration",
    "transfer_type",
    "min_transfer_time",
    "headway_secs",
    "exact_times",
    "shape_pt_sequence",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
    "pathway_mode",
    "is_bidirectional",
    "traversal_time",
    "stair_count",
];

const FLOAT_FIELDS: &[&str] = &[
    "stop_lat",
    "stop_lon",
    "shape_pt_lat",
    "shape_pt_lon",
    "shape_dist_traveled",
    "price",
    "length",
    "max_slope",
    "min_width",
    "level_index",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Text,
    Date,
    Time,
    Color,
    Integer,
    RouteType,
    Float,
    Url,
}

impl FieldKind {
    fn of(column: &str) -> Self {
        if column == "date" || column.ends_with("_date") {
            FieldKind::Date
        } else if column.ends_with("_time") {
            FieldKind::Time
        } else if column.ends_with("_color") {
            FieldKind::Color
        } else if column.ends_with("_url") {
            FieldKind::Url
        } else if column == "route_type" {
            FieldKind::RouteType
        } else if INTEGER_FIELDS.contains(&column) {
            FieldKind::Integer
        } else if FLOAT_FIELDS.contains(&column) {
            FieldKind::Float
        } else {
            FieldKind::Text
        }
    }

    /// Notice code for a malformed `value`, or `None` when it is acceptable.
    fn violation(&self, value: &str) -> Option<NoticeCode> {
        let (accepted, code) = match self {
            FieldKind::Text => return None,
            FieldKind::Date => (GtfsDate::parse(value).is_ok(), INVALID_DATE),
            FieldKind::Time => (GtfsTime::parse(value).is_ok(), INVALID_TIME),
            FieldKind::Color => (GtfsColor::parse(value).is_ok(), INVALID_COLOR),
            FieldKind::Integer => (value.parse::<i64>().is_ok(), INVALID_INTEGER),
            FieldKind::RouteType => {
                return match value.parse::<RouteType>() {
                    Ok(route_type) if route_type.is_known() => None,
                    Ok(_) => Some(UNEXPECTED_ENUM_VALUE),
                    Err(_) => Some(INVALID_INTEGER),
                };
            }
            FieldKind::Float => (
                value.parse::<f64>().map(f64::is_finite).unwrap_or(false),
                INVALID_FLOAT,
            ),
            FieldKind::Url => (
                Url::parse(value)
                    .map(|url| matches!(url.scheme(), "http" | "https"))
                    .unwrap_or(false),
                INVALID_URL,
            ),
        };
        (!accepted).then_some(code)
    }
}

/// Checks typed GTFS fields in every known table.
#[derive(Debug, Default)]
pub struct FieldFormatValidator;

impl Validator for FieldFormatValidator {
    fn name(&self) -> &'static str {
        "field_format"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        let Ok(tables) = feed.list_tables() else {
            return;
        };

        for table in tables
            .iter()
            .filter(|table| GTFS_FILE_NAMES.contains(&table.as_str()))
            .filter(|table| table.as_str() != LOCATIONS_GEOJSON_FILE)
        {
            let Some(mut decoder) = readable_table(feed, table) else {
                continue;
            };
            let kinds = column_kinds(decoder.header());
            let scanned = decoder.for_each_row(|row| {
                for ((column, value), kind) in row.iter().zip(kinds.iter()) {
                    if value.is_empty() {
                        continue;
                    }
                    let trimmed = value.trim();
                    if trimmed.len() != value.len() {
                        notices.add(
                            ValidationNotice::new(
                                LEADING_OR_TRAILING_WHITESPACES,
                                format!("{column} has surrounding whitespace"),
                            )
                            .with_location(table.as_str(), column, row.line_number())
                            .with_context_field("fieldValue", value),
                        );
                    }
                    if trimmed.is_empty() {
                        continue;
                    }
                    if let Some(code) = kind.violation(trimmed) {
                        notices.add(
                            ValidationNotice::new(code, format!("invalid value for {column}"))
                                .with_location(table.as_str(), column, row.line_number())
                                .with_context_field("fieldValue", value),
                        );
                    }
                }
            });
            if let Err(err) = scanned {
                debug!(table = table.as_str(), error = %err, "stopped reading table");
            }
        }
    }
}

fn column_kinds(header: &TableHeader) -> Vec<FieldKind> {
    header
        .names()
        .iter()
        .map(|column| FieldKind::of(column.as_str()))
        .collect()
}
