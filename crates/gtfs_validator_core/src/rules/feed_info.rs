use chrono::Duration;
use gtfs_sieve_model::GtfsDate;

use crate::feed::FEED_INFO_FILE;
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const MISSING_FEED_INFO_DATE: NoticeCode = NoticeCode::warning("missing_feed_info_date");
const FEED_EXPIRATION_DATE_7_DAYS: NoticeCode = NoticeCode::warning("feed_expiration_date7_days");
const FEED_EXPIRATION_DATE_30_DAYS: NoticeCode =
    NoticeCode::warning("feed_expiration_date30_days");

/// Feed validity dates: both or neither, and not about to lapse.
#[derive(Debug, Default)]
pub struct FeedInfoValidator;

impl Validator for FeedInfoValidator {
    fn name(&self) -> &'static str {
        "feed_info"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, config: &ValidationConfig) {
        let today = config.current_date();
        let threshold_7_days = today + Duration::days(7);
        let threshold_30_days = today + Duration::days(30);

        scan_table(feed, FEED_INFO_FILE, |row| {
            let line = row.line_number();
            let start = row.non_empty("feed_start_date");
            let end = row.non_empty("feed_end_date");
            match (start.is_some(), end.is_some()) {
                (true, false) => notices.add(missing_date_notice("feed_end_date", line)),
                (false, true) => notices.add(missing_date_notice("feed_start_date", line)),
                _ => {}
            }

            let Some(end_date) = end
                .and_then(|value| GtfsDate::parse(value).ok())
                .and_then(|date| date.to_naive())
            else {
                return;
            };
            let code = if end_date <= threshold_7_days {
                FEED_EXPIRATION_DATE_7_DAYS
            } else if end_date <= threshold_30_days {
                FEED_EXPIRATION_DATE_30_DAYS
            } else {
                return;
            };
            notices.add(
                ValidationNotice::new(code, "feed_end_date is close to the validation date")
                    .with_location(FEED_INFO_FILE, "feed_end_date", line)
                    .with_context_field("currentDate", today.format("%Y%m%d").to_string())
                    .with_context_field("feedEndDate", end_date.format("%Y%m%d").to_string()),
            );
        });
    }
}

fn missing_date_notice(field: &str, line: u64) -> ValidationNotice {
    ValidationNotice::new(MISSING_FEED_INFO_DATE, format!("missing {field}"))
        .with_location(FEED_INFO_FILE, field, line)
}
