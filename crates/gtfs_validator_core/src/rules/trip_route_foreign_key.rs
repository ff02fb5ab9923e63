use rustc_hash::FxHashSet;

use crate::feed::{ROUTES_FILE, TRIPS_FILE};
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const FOREIGN_KEY_VIOLATION: NoticeCode = NoticeCode::error("foreign_key_violation");

/// Every `trips.route_id` must name a route.
#[derive(Debug, Default)]
pub struct TripRouteForeignKeyValidator;

impl Validator for TripRouteForeignKeyValidator {
    fn name(&self) -> &'static str {
        "trip_route_foreign_key"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        let mut route_ids = FxHashSet::default();
        let has_routes = scan_table(feed, ROUTES_FILE, |row| {
            if let Some(route_id) = row.non_empty("route_id") {
                route_ids.insert(route_id.to_string());
            }
        });
        if !has_routes {
            return;
        }

        scan_table(feed, TRIPS_FILE, |row| {
            let Some(route_id) = row.non_empty("route_id") else {
                return;
            };
            if route_ids.contains(route_id) {
                return;
            }
            notices.add(
                ValidationNotice::new(
                    FOREIGN_KEY_VIOLATION,
                    format!("route_id {route_id} does not exist in {ROUTES_FILE}"),
                )
                .with_row(TRIPS_FILE, row.line_number())
                .with_context_field("childFilename", TRIPS_FILE)
                .with_context_field("childFieldName", "route_id")
                .with_context_field("parentFilename", ROUTES_FILE)
                .with_context_field("parentFieldName", "route_id")
                .with_context_field("fieldValue", route_id),
            );
        });
    }
}
