use gtfs_sieve_model::GtfsTime;
use rustc_hash::FxHashMap;

use crate::feed::STOP_TIMES_FILE;
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const STOP_TIME_WITH_ARRIVAL_BEFORE_PREVIOUS_DEPARTURE_TIME: NoticeCode =
    NoticeCode::error("stop_time_with_arrival_before_previous_departure_time");

#[derive(Debug, Default)]
pub struct StopTimeSequenceValidator;

#[derive(Debug, Clone, Copy)]
struct StopTimeEntry {
    sequence: u32,
    line: u64,
    arrival: Option<GtfsTime>,
    departure: Option<GtfsTime>,
}

impl Validator for StopTimeSequenceValidator {
    fn name(&self) -> &'static str {
        "stop_time_sequence"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        let mut trips: FxHashMap<String, Vec<StopTimeEntry>> = FxHashMap::default();
        scan_table(feed, STOP_TIMES_FILE, |row| {
            let Some(trip_id) = row.non_empty("trip_id") else {
                return;
            };
            let Some(sequence) = row
                .non_empty("stop_sequence")
                .and_then(|value| value.parse::<u32>().ok())
            else {
                return;
            };
            let entry = StopTimeEntry {
                sequence,
                line: row.line_number(),
                arrival: parse_time(row.non_empty("arrival_time")),
                departure: parse_time(row.non_empty("departure_time")),
            };
            match trips.get_mut(trip_id) {
                Some(entries) => entries.push(entry),
                None => {
                    trips.insert(trip_id.to_string(), vec![entry]);
                }
            }
        });

        let mut trips: Vec<(String, Vec<StopTimeEntry>)> = trips.into_iter().collect();
        trips.sort_by(|a, b| a.0.cmp(&b.0));
        for (trip_id, mut entries) in trips {
            entries.sort_by_key(|entry| entry.sequence);

            let mut previous: Option<(StopTimeEntry, GtfsTime)> = None;
            for entry in entries {
                if let (Some((prev_entry, prev_departure)), Some(arrival)) = (previous, entry.arrival) {
                    if arrival < prev_departure {
                        notices.add(
                            ValidationNotice::new(
                                STOP_TIME_WITH_ARRIVAL_BEFORE_PREVIOUS_DEPARTURE_TIME,
                                "arrival_time is before the previous stop's departure_time",
                            )
                            .with_location(STOP_TIMES_FILE, "arrival_time", entry.line)
                            .with_context_field("prevCsvRowNumber", prev_entry.line)
                            .with_context_field("tripId", trip_id.as_str())
                            .with_context_field("arrivalTime", arrival.to_string())
                            .with_context_field("departureTime", prev_departure.to_string()),
                        );
                    }
                }
                if let Some(departure) = entry.departure.or(entry.arrival) {
                    previous = Some((entry, departure));
                }
            }
        }
    }
}

fn parse_time(value: Option<&str>) -> Option<GtfsTime> {
    value.and_then(|value| GtfsTime::parse(value).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run;
    use crate::MemoryFeed;

    #[test]
    fn flags_time_travel_within_a_trip() {
        let feed = MemoryFeed::new().with_table(
            STOP_TIMES_FILE,
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:01:00,S1,1\n\
             T1,08:00:30,08:02:00,S2,2\n\
             T2,09:00:00,09:00:00,S1,1\n\
             T2,09:05:00,09:05:00,S2,2\n",
        );

        let notices = run(&StopTimeSequenceValidator, &feed);

        assert_eq!(
            notices.count("stop_time_with_arrival_before_previous_departure_time"),
            1
        );
        assert_eq!(notices.snapshot()[0].row_number(), Some(3));
    }

    #[test]
    fn orders_by_stop_sequence_and_skips_blank_times() {
        let feed = MemoryFeed::new().with_table(
            STOP_TIMES_FILE,
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:20:00,08:20:00,S3,30\n\
             T1,08:00:00,08:00:00,S1,10\n\
             T1,,,S2,20\n",
        );

        assert!(run(&StopTimeSequenceValidator, &feed).is_empty());
    }
}
