use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate};
use gtfs_sieve_model::GtfsDate;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::feed::{CALENDAR_DATES_FILE, CALENDAR_FILE};
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::table::TableRow;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const EXPIRED_CALENDAR: NoticeCode = NoticeCode::warning("expired_calendar");
const FEED_SERVICE_WINDOW_TOO_SHORT: NoticeCode = NoticeCode::info("feed_service_window_too_short");

const MIN_SERVICE_WINDOW_DAYS: i64 = 7;
const WEEKDAY_COLUMNS: [&str; 7] = [
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
    "sunday",
];

/// Whole-feed service date analysis over calendar.txt and calendar_dates.txt.
#[derive(Debug, Default)]
pub struct ServiceDateRangeValidator;

#[derive(Debug, Clone, Copy)]
struct CalendarSpan {
    start: NaiveDate,
    end: NaiveDate,
    weekdays: [bool; 7],
}

impl CalendarSpan {
    fn runs_on(&self, date: NaiveDate) -> bool {
        self.weekdays[date.weekday().num_days_from_monday() as usize]
    }
}

#[derive(Debug, Default)]
struct Service {
    calendar: Option<CalendarSpan>,
    added: BTreeSet<NaiveDate>,
    removed: FxHashSet<NaiveDate>,
    calendar_line: Option<u64>,
    first_exception_line: Option<u64>,
}

impl Service {
    fn is_active(&self, span: &CalendarSpan, date: NaiveDate) -> bool {
        span.runs_on(date) && !self.removed.contains(&date)
    }

    /// Nearest active calendar day from `from`, stepping forward or back.
    ///
    /// Every day skipped is either a weekday the service does not run or a
    /// removed date, so a hit comes within `7 * (removed + 1)` steps.
    fn walk(&self, span: &CalendarSpan, from: NaiveDate, forward: bool) -> Option<NaiveDate> {
        if !span.weekdays.contains(&true) {
            return None;
        }
        let mut date = from;
        for _ in 0..7 * (self.removed.len() + 1) {
            if date < span.start || date > span.end {
                return None;
            }
            if self.is_active(span, date) {
                return Some(date);
            }
            date = if forward {
                date.succ_opt()?
            } else {
                date.pred_opt()?
            };
        }
        None
    }

    fn first_active(&self) -> Option<NaiveDate> {
        let from_calendar = self
            .calendar
            .and_then(|span| self.walk(&span, span.start, true));
        [from_calendar, self.added.first().copied()]
            .into_iter()
            .flatten()
            .min()
    }

    fn last_active(&self) -> Option<NaiveDate> {
        let from_calendar = self
            .calendar
            .and_then(|span| self.walk(&span, span.end, false));
        [from_calendar, self.added.last().copied()]
            .into_iter()
            .flatten()
            .max()
    }

    fn line(&self) -> u64 {
        self.calendar_line.or(self.first_exception_line).unwrap_or(0)
    }

    fn file(&self) -> &'static str {
        if self.calendar_line.is_some() {
            CALENDAR_FILE
        } else {
            CALENDAR_DATES_FILE
        }
    }
}

impl Validator for ServiceDateRangeValidator {
    fn name(&self) -> &'static str {
        "service_date_range"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, config: &ValidationConfig) {
        let services = load_services(feed);
        if services.is_empty() {
            return;
        }
        let today = config.current_date();

        let mut ordered: Vec<(&String, &Service)> = services.iter().collect();
        ordered.sort_by(|a, b| a.0.cmp(b.0));

        let mut window: Option<(NaiveDate, NaiveDate)> = None;
        for (service_id, service) in ordered {
            let (Some(first), Some(last)) = (service.first_active(), service.last_active()) else {
                continue;
            };
            window = Some(match window {
                None => (first, last),
                Some((start, end)) => (start.min(first), end.max(last)),
            });

            if last < today {
                notices.add(
                    ValidationNotice::new(EXPIRED_CALENDAR, "service has no dates in the future")
                        .with_row(service.file(), service.line())
                        .with_context_field("serviceId", service_id.as_str())
                        .with_context_field("lastServiceDate", format_date(last)),
                );
            }
        }

        if let Some((start, end)) = window {
            let days = (end - start).num_days() + 1;
            if days < MIN_SERVICE_WINDOW_DAYS {
                notices.add(
                    ValidationNotice::new(
                        FEED_SERVICE_WINDOW_TOO_SHORT,
                        format!("feed covers only {days} day(s) of service"),
                    )
                    .with_context_field("firstServiceDate", format_date(start))
                    .with_context_field("lastServiceDate", format_date(end))
                    .with_context_field("days", days),
                );
            }
        }
    }
}

fn load_services(feed: &dyn FeedAccessor) -> FxHashMap<String, Service> {
    let mut services: FxHashMap<String, Service> = FxHashMap::default();

    scan_table(feed, CALENDAR_FILE, |row| {
        let Some(service_id) = row.non_empty("service_id") else {
            return;
        };
        let (Some(start), Some(end)) = (parse_date(row, "start_date"), parse_date(row, "end_date"))
        else {
            return;
        };
        let mut weekdays = [false; 7];
        for (slot, column) in weekdays.iter_mut().zip(WEEKDAY_COLUMNS) {
            *slot = row.non_empty(column) == Some("1");
        }
        let service = services.entry(service_id.to_string()).or_default();
        if service.calendar.is_none() {
            service.calendar = Some(CalendarSpan {
                start,
                end,
                weekdays,
            });
            service.calendar_line = Some(row.line_number());
        }
    });

    scan_table(feed, CALENDAR_DATES_FILE, |row| {
        let Some(service_id) = row.non_empty("service_id") else {
            return;
        };
        let Some(date) = parse_date(row, "date") else {
            return;
        };
        let service = services.entry(service_id.to_string()).or_default();
        service.first_exception_line.get_or_insert(row.line_number());
        match row.non_empty("exception_type") {
            Some("1") => {
                service.added.insert(date);
            }
            Some("2") => {
                service.removed.insert(date);
            }
            _ => {}
        }
    });

    services
}

fn parse_date(row: &TableRow, column: &str) -> Option<NaiveDate> {
    row.non_empty(column)
        .and_then(|value| GtfsDate::parse(value).ok())
        .and_then(|date| date.to_naive())
}

fn format_date(date: NaiveDate) -> String {
    GtfsDate::from(date).to_string()
}
