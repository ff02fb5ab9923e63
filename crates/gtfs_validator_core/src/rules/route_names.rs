use crate::feed::ROUTES_FILE;
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const ROUTE_BOTH_SHORT_AND_LONG_NAME_MISSING: NoticeCode =
    NoticeCode::error("route_both_short_and_long_name_missing");
const SAME_NAME_AND_DESCRIPTION_FOR_ROUTE: NoticeCode =
    NoticeCode::warning("same_name_and_description_for_route");

#[derive(Debug, Default)]
pub struct RouteNamesValidator;

impl Validator for RouteNamesValidator {
    fn name(&self) -> &'static str {
        "route_names"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        scan_table(feed, ROUTES_FILE, |row| {
            let route_id = row.get("route_id").unwrap_or("").trim();
            let short_name = row.non_empty("route_short_name");
            let long_name = row.non_empty("route_long_name");

            if short_name.is_none() && long_name.is_none() {
                notices.add(
                    ValidationNotice::new(
                        ROUTE_BOTH_SHORT_AND_LONG_NAME_MISSING,
                        "route_short_name and route_long_name are both missing",
                    )
                    .with_row(ROUTES_FILE, row.line_number())
                    .with_context_field("routeId", route_id),
                );
                return;
            }

            let Some(desc) = row.non_empty("route_desc") else {
                return;
            };
            for (field, name) in [
                ("route_short_name", short_name),
                ("route_long_name", long_name),
            ] {
                if name.is_some_and(|name| name.eq_ignore_ascii_case(desc)) {
                    notices.add(
                        ValidationNotice::new(
                            SAME_NAME_AND_DESCRIPTION_FOR_ROUTE,
                            format!("route_desc repeats {field}"),
                        )
                        .with_location(ROUTES_FILE, field, row.line_number())
                        .with_context_field("routeId", route_id)
                        .with_context_field("routeDesc", desc),
                    );
                    return;
                }
            }
        });
    }
}
