use crate::feed::AGENCY_FILE;
use crate::notice::NoticeCode;
use crate::rules::{has_value, scan_table};
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const MISSING_AGENCY_ID: NoticeCode = NoticeCode::error("missing_agency_id");
const INCONSISTENT_AGENCY_TIMEZONE: NoticeCode = NoticeCode::error("inconsistent_agency_timezone");

#[derive(Debug, Default)]
pub struct AgencyConsistencyValidator;

struct AgencyRow {
    line: u64,
    has_id: bool,
    timezone: String,
}

impl Validator for AgencyConsistencyValidator {
    fn name(&self) -> &'static str {
        "agency_consistency"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        let mut agencies = Vec::new();
        scan_table(feed, AGENCY_FILE, |row| {
            agencies.push(AgencyRow {
                line: row.line_number(),
                has_id: has_value(row.get("agency_id")),
                timezone: row.get("agency_timezone").unwrap_or("").trim().to_string(),
            });
        });
        if agencies.len() < 2 {
            return;
        }

        for agency in agencies.iter().filter(|agency| !agency.has_id) {
            notices.add(
                ValidationNotice::new(
                    MISSING_AGENCY_ID,
                    "agency_id is required when multiple agencies exist",
                )
                .with_location(AGENCY_FILE, "agency_id", agency.line),
            );
        }

        let expected = agencies[0].timezone.as_str();
        for agency in agencies.iter().skip(1) {
            if agency.timezone != expected {
                notices.add(
                    ValidationNotice::new(
                        INCONSISTENT_AGENCY_TIMEZONE,
                        "agencies have inconsistent timezones",
                    )
                    .with_location(AGENCY_FILE, "agency_timezone", agency.line)
                    .with_context_field("expected", expected)
                    .with_context_field("actual", agency.timezone.as_str()),
                );
            }
        }
    }
}
