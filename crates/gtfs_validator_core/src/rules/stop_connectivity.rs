use rustc_hash::{FxHashMap, FxHashSet};

use crate::feed::{ROUTES_FILE, STOPS_FILE, STOP_TIMES_FILE, TRIPS_FILE};
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const UNUSED_STOP: NoticeCode = NoticeCode::info("unused_stop");
const ISOLATED_ROUTE_NETWORK: NoticeCode = NoticeCode::info("isolated_route_network");

/// Stop usage and route connectivity through shared stops.
///
/// A stop counts as used when a stop time references it or, for stations,
/// when one of its children is used. Two routes are connected when they
/// serve the same stop or stops of the same station.
#[derive(Debug, Default)]
pub struct StopConnectivityValidator;

#[derive(Debug)]
struct StopEntry {
    stop_id: String,
    line: u64,
    location_type: u8,
    parent_station: Option<String>,
}

impl Validator for StopConnectivityValidator {
    fn name(&self) -> &'static str {
        "stop_connectivity"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        let mut stops = Vec::new();
        let has_stops = scan_table(feed, STOPS_FILE, |row| {
            let Some(stop_id) = row.non_empty("stop_id") else {
                return;
            };
            stops.push(StopEntry {
                stop_id: stop_id.to_string(),
                line: row.line_number(),
                location_type: row
                    .non_empty("location_type")
                    .and_then(|value| value.parse().ok())
                    .unwrap_or(0),
                parent_station: row.non_empty("parent_station").map(str::to_string),
            });
        });
        if !has_stops {
            return;
        }
        let parents: FxHashMap<&str, &str> = stops
            .iter()
            .filter_map(|stop| Some((stop.stop_id.as_str(), stop.parent_station.as_deref()?)))
            .collect();

        let mut trip_routes: FxHashMap<String, String> = FxHashMap::default();
        scan_table(feed, TRIPS_FILE, |row| {
            if let (Some(trip_id), Some(route_id)) = (row.non_empty("trip_id"), row.non_empty("route_id")) {
                trip_routes.insert(trip_id.to_string(), route_id.to_string());
            }
        });

        let mut used: FxHashSet<String> = FxHashSet::default();
        let mut routes_by_hub: FxHashMap<String, FxHashSet<String>> = FxHashMap::default();
        scan_table(feed, STOP_TIMES_FILE, |row| {
            let Some(stop_id) = row.non_empty("stop_id") else {
                return;
            };
            used.insert(stop_id.to_string());
            let hub = parents.get(stop_id).copied().unwrap_or(stop_id);
            if hub != stop_id {
                used.insert(hub.to_string());
            }
            let route = row
                .non_empty("trip_id")
                .and_then(|trip_id| trip_routes.get(trip_id));
            if let Some(route_id) = route {
                routes_by_hub
                    .entry(hub.to_string())
                    .or_default()
                    .insert(route_id.clone());
            }
        });

        for stop in &stops {
            if stop.location_type > 1 || used.contains(&stop.stop_id) {
                continue;
            }
            notices.add(
                ValidationNotice::new(UNUSED_STOP, "stop is not referenced by any stop time")
                    .with_row(STOPS_FILE, stop.line)
                    .with_context_field("stopId", stop.stop_id.as_str()),
            );
        }

        report_isolated_routes(feed, &routes_by_hub, notices);
    }
}

fn report_isolated_routes(
    feed: &dyn FeedAccessor,
    routes_by_hub: &FxHashMap<String, FxHashSet<String>>,
    notices: &NoticeStore,
) {
    let mut components = RouteComponents::default();
    for routes in routes_by_hub.values() {
        let mut routes = routes.iter();
        let Some(first) = routes.next() else {
            continue;
        };
        let first = components.index_of(first);
        for route in routes {
            let other = components.index_of(route);
            components.union(first, other);
        }
    }
    if components.len() < 2 {
        return;
    }

    let mut route_lines: FxHashMap<String, u64> = FxHashMap::default();
    scan_table(feed, ROUTES_FILE, |row| {
        if let Some(route_id) = row.non_empty("route_id") {
            route_lines.entry(route_id.to_string()).or_insert(row.line_number());
        }
    });

    let mut isolated = components.singletons();
    isolated.sort();
    for route_id in isolated {
        let mut notice = ValidationNotice::new(
            ISOLATED_ROUTE_NETWORK,
            format!("route {route_id} shares no stop with any other route"),
        )
        .with_context_field("routeId", route_id);
        match route_lines.get(route_id) {
            Some(&line) => notice.set_location(ROUTES_FILE, "route_id", line),
            None => notice = notice.with_file(ROUTES_FILE),
        }
        notices.add(notice);
    }
}

/// Union-find over route ids.
#[derive(Debug, Default)]
struct RouteComponents {
    ids: Vec<String>,
    index: FxHashMap<String, usize>,
    parent: Vec<usize>,
    size: Vec<usize>,
}

impl RouteComponents {
    fn len(&self) -> usize {
        self.ids.len()
    }

    fn index_of(&mut self, route_id: &str) -> usize {
        if let Some(&index) = self.index.get(route_id) {
            return index;
        }
        let index = self.ids.len();
        self.ids.push(route_id.to_string());
        self.index.insert(route_id.to_string(), index);
        self.parent.push(index);
        self.size.push(1);
        index
    }

    fn find(&mut self, mut index: usize) -> usize {
        while self.parent[index] != index {
            self.parent[index] = self.parent[self.parent[index]];
            index = self.parent[index];
        }
        index
    }

    fn union(&mut self, a: usize, b: usize) {
        let (mut a, mut b) = (self.find(a), self.find(b));
        if a == b {
            return;
        }
        if self.size[a] < self.size[b] {
            std::mem::swap(&mut a, &mut b);
        }
        self.parent[b] = a;
        self.size[a] += self.size[b];
    }

    fn singletons(&mut self) -> Vec<&str> {
        let lonely: Vec<usize> = (0..self.ids.len())
            .filter(|&index| {
                let root = self.find(index);
                self.size[root] == 1
            })
            .collect();
        lonely.into_iter().map(|index| self.ids[index].as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::test_support::run;
    use crate::MemoryFeed;

    fn feed(stop_times: &str) -> MemoryFeed {
        MemoryFeed::new()
            .with_table(
                STOPS_FILE,
                "stop_id,stop_name,location_type,parent_station\n\
                 ST,Central,1,\n\
                 P1,Central 1,0,ST\n\
                 P2,Central 2,0,ST\n\
                 A,Alpha,0,\n\
                 B,Beta,0,\n\
                 Z,Zeta,0,\n\
                 E1,Entrance,2,ST\n",
            )
            .with_table(
                ROUTES_FILE,
                "route_id,route_short_name,route_type\nR1,1,3\nR2,2,3\nR3,3,3\n",
            )
            .with_table(
                TRIPS_FILE,
                "route_id,service_id,trip_id\nR1,WK,T1\nR2,WK,T2\nR3,WK,T3\n",
            )
            .with_table(STOP_TIMES_FILE, stop_times)
    }

    #[test]
    fn station_is_used_through_its_platforms() {
        let notices = run(
            &StopConnectivityValidator,
            &feed(
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                 T1,08:00:00,08:00:00,A,1\n\
                 T1,08:05:00,08:05:00,P1,2\n\
                 T2,08:00:00,08:00:00,P2,1\n\
                 T2,08:05:00,08:05:00,B,2\n\
                 T3,08:00:00,08:00:00,A,1\n",
            ),
        );

        assert_eq!(notices.count("unused_stop"), 1);
        assert_eq!(
            notices.snapshot()[0].context_field("stopId"),
            Some(&serde_json::Value::from("Z"))
        );
        assert_eq!(notices.count("isolated_route_network"), 0);
    }

    #[test]
    fn reports_route_without_shared_stops() {
        let notices = run(
            &StopConnectivityValidator,
            &feed(
                "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
                 T1,08:00:00,08:00:00,A,1\n\
                 T1,08:05:00,08:05:00,P1,2\n\
                 T2,08:00:00,08:00:00,P2,1\n\
                 T3,08:00:00,08:00:00,B,1\n\
                 T3,08:05:00,08:05:00,Z,2\n",
            ),
        );

        assert_eq!(notices.count("isolated_route_network"), 1);
        let isolated: Vec<_> = notices
            .snapshot()
            .into_iter()
            .filter(|notice| notice.code() == "isolated_route_network")
            .collect();
        assert_eq!(isolated[0].row_number(), Some(4));
        assert_eq!(notices.count("unused_stop"), 0);
    }
}
