use crate::feed::STOPS_FILE;
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const MISSING_WHEELCHAIR_BOARDING_INFO: NoticeCode =
    NoticeCode::info("missing_wheelchair_boarding_info");

/// Stops and stations should say whether wheelchair boarding is possible.
/// Child stops inherit the value from their parent station.
#[derive(Debug, Default)]
pub struct WheelchairBoardingValidator;

impl Validator for WheelchairBoardingValidator {
    fn name(&self) -> &'static str {
        "wheelchair_boarding"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        scan_table(feed, STOPS_FILE, |row| {
            let location_type = row.non_empty("location_type").unwrap_or("0");
            if !matches!(location_type, "0" | "1") {
                return;
            }
            if row.non_empty("wheelchair_boarding").is_some()
                || row.non_empty("parent_station").is_some()
            {
                return;
            }
            notices.add(
                ValidationNotice::new(
                    MISSING_WHEELCHAIR_BOARDING_INFO,
                    "wheelchair_boarding is not set",
                )
                .with_location(STOPS_FILE, "wheelchair_boarding", row.line_number())
                .with_context_field("stopId", row.get("stop_id").unwrap_or("")),
            );
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run;
    use crate::MemoryFeed;

    #[test]
    fn reports_stops_without_accessibility_info() {
        let feed = MemoryFeed::new().with_table(
            STOPS_FILE,
            "stop_id,location_type,parent_station,wheelchair_boarding\n\
             S1,,,\n\
             S2,0,,1\n\
             ST,1,,\n\
             S3,0,ST,\n\
             E1,2,ST,\n",
        );

        let notices = run(&WheelchairBoardingValidator, &feed);

        assert_eq!(notices.count("missing_wheelchair_boarding_info"), 2);
        let rows: Vec<_> = notices
            .snapshot()
            .iter()
            .filter_map(|notice| notice.row_number())
            .collect();
        assert_eq!(rows, vec![2, 4]);
    }
}
