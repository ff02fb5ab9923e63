use std::collections::BTreeMap;

use chrono::NaiveDate;
use gtfs_sieve_core::feed::{
    AGENCY_FILE, CALENDAR_DATES_FILE, CALENDAR_FILE, FEED_INFO_FILE, ROUTES_FILE, SHAPES_FILE,
    STOPS_FILE, TRIPS_FILE,
};
use gtfs_sieve_core::{readable_table, FeedAccessor, FeedError, TableRow};
use gtfs_sieve_model::GtfsDate;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

const REPORT_DATE_FORMAT: &str = "%Y-%m-%d";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportCounts {
    pub agencies: usize,
    pub routes: usize,
    pub trips: usize,
    pub stops: usize,
    pub shapes: usize,
    pub blocks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportAgency {
    pub name: String,
    pub url: String,
    pub phone: String,
    pub email: String,
}

impl ReportAgency {
    fn from_row(row: &TableRow) -> Self {
        let text = |column: &str| row.get(column).unwrap_or("").trim().to_string();
        Self {
            name: text("agency_name"),
            url: text("agency_url"),
            phone: text("agency_phone"),
            email: text("agency_email"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFeedInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_end_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_service_window_start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_service_window_end: Option<String>,
}

impl ReportFeedInfo {
    fn from_row(row: &TableRow) -> Self {
        let text = |column: &str| row.non_empty(column).map(str::to_string);
        let date = |column: &str| {
            row.non_empty(column)
                .map(|value| parse_date(value).map(format_date).unwrap_or_else(|| value.to_string()))
        };
        Self {
            publisher_name: text("feed_publisher_name"),
            publisher_url: text("feed_publisher_url"),
            feed_email: text("feed_contact_email"),
            feed_language: text("feed_lang"),
            feed_start_date: date("feed_start_date"),
            feed_end_date: date("feed_end_date"),
            ..Self::default()
        }
    }
}

/// Descriptive numbers about a feed, gathered in one pass over its tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedStatistics {
    pub files: Vec<String>,
    pub table_rows: BTreeMap<String, u64>,
    pub counts: ReportCounts,
    pub agencies: Vec<ReportAgency>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feed_info: Option<ReportFeedInfo>,
}

#[derive(Default)]
struct Collector {
    agencies: Vec<ReportAgency>,
    route_ids: FxHashSet<String>,
    trip_ids: FxHashSet<String>,
    block_ids: FxHashSet<String>,
    stop_ids: FxHashSet<String>,
    shape_ids: FxHashSet<String>,
    feed_info: Option<ReportFeedInfo>,
    service_window: Option<(NaiveDate, NaiveDate)>,
}

impl Collector {
    fn visit(&mut self, table: &str, row: &TableRow) {
        match table {
            AGENCY_FILE => self.agencies.push(ReportAgency::from_row(row)),
            ROUTES_FILE => remember(&mut self.route_ids, row.non_empty("route_id")),
            TRIPS_FILE => {
                remember(&mut self.trip_ids, row.non_empty("trip_id"));
                remember(&mut self.block_ids, row.non_empty("block_id"));
            }
            STOPS_FILE => remember(&mut self.stop_ids, row.non_empty("stop_id")),
            SHAPES_FILE => remember(&mut self.shape_ids, row.non_empty("shape_id")),
            FEED_INFO_FILE => {
                if self.feed_info.is_none() {
                    self.feed_info = Some(ReportFeedInfo::from_row(row));
                }
            }
            CALENDAR_FILE => {
                for column in ["start_date", "end_date"] {
                    if let Some(date) = row.non_empty(column).and_then(parse_date) {
                        self.widen_window(date);
                    }
                }
            }
            CALENDAR_DATES_FILE => {
                if row.non_empty("exception_type") == Some("1") {
                    if let Some(date) = row.non_empty("date").and_then(parse_date) {
                        self.widen_window(date);
                    }
                }
            }
            _ => {}
        }
    }

    fn widen_window(&mut self, date: NaiveDate) {
        self.service_window = Some(match self.service_window {
            None => (date, date),
            Some((start, end)) => (start.min(date), end.max(date)),
        });
    }
}

fn remember(set: &mut FxHashSet<String>, value: Option<&str>) {
    if let Some(value) = value {
        if !set.contains(value) {
            set.insert(value.to_string());
        }
    }
}

impl FeedStatistics {
    pub fn collect(feed: &dyn FeedAccessor) -> Result<Self, FeedError> {
        let mut files = feed.list_tables()?;
        files.sort();

        let mut collector = Collector::default();
        let mut table_rows = BTreeMap::new();
        for table in &files {
            let Some(mut decoder) = readable_table(feed, table) else {
                continue;
            };
            let mut rows = 0u64;
            let result = decoder.for_each_row(|row| {
                rows += 1;
                collector.visit(table, row);
            });
            if let Err(err) = result {
                debug!(table = %table, error = %err, "statistics stopped at malformed row");
            }
            table_rows.insert(table.clone(), rows);
        }

        let mut feed_info = collector.feed_info;
        if let Some((start, end)) = collector.service_window {
            let info = feed_info.get_or_insert_with(ReportFeedInfo::default);
            info.feed_service_window_start = Some(format_date(start));
            info.feed_service_window_end = Some(format_date(end));
        }

        Ok(Self {
            files,
            table_rows,
            counts: ReportCounts {
                agencies: collector.agencies.len(),
                routes: collector.route_ids.len(),
                trips: collector.trip_ids.len(),
                stops: collector.stop_ids.len(),
                shapes: collector.shape_ids.len(),
                blocks: collector.block_ids.len(),
            },
            agencies: collector.agencies,
            feed_info,
        })
    }

    pub fn rows(&self, table: &str) -> u64 {
        self.table_rows.get(table).copied().unwrap_or(0)
    }
}

fn parse_date(value: &str) -> Option<NaiveDate> {
    GtfsDate::parse(value).ok().and_then(|date| date.to_naive())
}

fn format_date(date: NaiveDate) -> String {
    date.format(REPORT_DATE_FORMAT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use gtfs_sieve_core::MemoryFeed;

    #[test]
    fn collects_counts_and_service_window() {
        let feed = MemoryFeed::new()
            .with_table(
                AGENCY_FILE,
                "agency_name,agency_url,agency_timezone,agency_phone\n\
                 Metro,https://metro.example.com,Europe/Paris,0102030405\n",
            )
            .with_table(
                TRIPS_FILE,
                "route_id,service_id,trip_id,block_id,shape_id\n\
                 R1,WK,T1,B1,SH1\n\
                 R1,WK,T2,B1,SH1\n\
                 R2,WE,T3,,\n",
            )
            .with_table(
                CALENDAR_FILE,
                "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
                 WK,1,1,1,1,1,0,0,20240101,20241231\n",
            )
            .with_table(
                CALENDAR_DATES_FILE,
                "service_id,date,exception_type\nWE,20250105,1\nWK,20231231,2\n",
            )
            .with_table(
                FEED_INFO_FILE,
                "feed_publisher_name,feed_publisher_url,feed_lang,feed_end_date\n\
                 Metro,https://metro.example.com,fr,20250131\n",
            );

        let stats = FeedStatistics::collect(&feed).unwrap();

        assert_eq!(
            stats.files,
            vec![
                "agency.txt",
                "calendar.txt",
                "calendar_dates.txt",
                "feed_info.txt",
                "trips.txt"
            ]
        );
        assert_eq!(stats.rows(TRIPS_FILE), 3);
        assert_eq!(stats.rows(STOPS_FILE), 0);
        assert_eq!(stats.counts.trips, 3);
        assert_eq!(stats.counts.blocks, 1);
        assert_eq!(stats.counts.agencies, 1);
        assert_eq!(stats.agencies[0].phone, "0102030405");

        let info = stats.feed_info.unwrap();
        assert_eq!(info.publisher_name.as_deref(), Some("Metro"));
        assert_eq!(info.feed_language.as_deref(), Some("fr"));
        assert_eq!(info.feed_end_date.as_deref(), Some("2025-01-31"));
        assert_eq!(info.feed_service_window_start.as_deref(), Some("2024-01-01"));
        assert_eq!(info.feed_service_window_end.as_deref(), Some("2025-01-05"));
    }

    #[test]
    fn empty_feed_has_no_feed_info() {
        let stats = FeedStatistics::collect(&MemoryFeed::new()).unwrap();
        assert!(stats.files.is_empty());
        assert_eq!(stats.counts, ReportCounts::default());
        assert!(stats.feed_info.is_none());
    }
}
