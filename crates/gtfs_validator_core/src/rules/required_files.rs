use tracing::debug;

use crate::feed::{
    CALENDAR_DATES_FILE, CALENDAR_FILE, LOCATIONS_GEOJSON_FILE, RECOMMENDED_FILES, REQUIRED_FILES,
    STOPS_FILE,
};
use crate::notice::NoticeCode;
use crate::table::open_decoder;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const MISSING_REQUIRED_FILE: NoticeCode = NoticeCode::error("missing_required_file");
const MISSING_RECOMMENDED_FILE: NoticeCode = NoticeCode::warning("missing_recommended_file");

#[derive(Debug, Default)]
pub struct RequiredFilesValidator;

impl Validator for RequiredFilesValidator {
    fn name(&self) -> &'static str {
        "required_files"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        for file in REQUIRED_FILES {
            if !is_readable(feed, file) {
                notices.add(missing_file_notice(MISSING_REQUIRED_FILE, file));
            }
        }

        // Flex feeds may describe stops only through locations.geojson.
        if !is_readable(feed, STOPS_FILE) && !feed.has_table(LOCATIONS_GEOJSON_FILE) {
            notices.add(missing_file_notice(MISSING_REQUIRED_FILE, STOPS_FILE));
        }

        if !is_readable(feed, CALENDAR_FILE) && !is_readable(feed, CALENDAR_DATES_FILE) {
            notices.add(missing_file_notice(MISSING_REQUIRED_FILE, CALENDAR_FILE));
        }

        for file in RECOMMENDED_FILES {
            if !is_readable(feed, file) {
                notices.add(missing_file_notice(MISSING_RECOMMENDED_FILE, file));
            }
        }
    }
}

/// A table with an unparseable header counts as missing.
fn is_readable(feed: &dyn FeedAccessor, file: &str) -> bool {
    match open_decoder(feed, file) {
        Ok(decoder) => decoder.is_some(),
        Err(err) => {
            debug!(table = file, error = %err, "required table unreadable");
            false
        }
    }
}

fn missing_file_notice(code: NoticeCode, file: &str) -> ValidationNotice {
    ValidationNotice::new(code, format!("missing {file}")).with_file(file)
}
