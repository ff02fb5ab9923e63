use rstar::primitives::GeomWithData;
use rstar::RTree;

use crate::feed::STOPS_FILE;
use crate::notice::NoticeCode;
use crate::rules::scan_table;
use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice, Validator};

const STOPS_TOO_CLOSE: NoticeCode = NoticeCode::warning("stops_too_close");

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;
const MIN_STOP_DISTANCE_METERS: f64 = 2.0;
// Slack for the flat projection; candidates are confirmed with haversine.
const SEARCH_RADIUS_FACTOR: f64 = 1.5;

/// Boarding stops that sit on top of each other, usually a copy-paste
/// mistake in stops.txt. Platforms sharing a parent station are exempt.
#[derive(Debug, Default)]
pub struct StopClusteringValidator;

#[derive(Debug)]
struct StopPoint {
    stop_id: String,
    parent_station: Option<String>,
    line: u64,
    lat: f64,
    lon: f64,
}

impl Validator for StopClusteringValidator {
    fn name(&self) -> &'static str {
        "stop_clustering"
    }

    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, _config: &ValidationConfig) {
        let stops = load_stops(feed);
        if stops.len() < 2 {
            return;
        }

        let reference_lat =
            (stops.iter().map(|stop| stop.lat).sum::<f64>() / stops.len() as f64).to_radians();
        let project = |stop: &StopPoint| -> [f64; 2] {
            [
                stop.lon.to_radians() * reference_lat.cos() * EARTH_RADIUS_METERS,
                stop.lat.to_radians() * EARTH_RADIUS_METERS,
            ]
        };

        let tree = RTree::bulk_load(
            stops
                .iter()
                .enumerate()
                .map(|(index, stop)| GeomWithData::new(project(stop), index))
                .collect(),
        );
        let search_radius = MIN_STOP_DISTANCE_METERS * SEARCH_RADIUS_FACTOR;
        let max_distance_squared = search_radius * search_radius;

        for (index, stop) in stops.iter().enumerate() {
            let mut neighbours: Vec<usize> = tree
                .locate_within_distance(project(stop), max_distance_squared)
                .map(|candidate| candidate.data)
                .filter(|&other| other > index)
                .collect();
            neighbours.sort_unstable();

            for other in neighbours {
                let other = &stops[other];
                if stop.parent_station.is_some() && stop.parent_station == other.parent_station {
                    continue;
                }
                let distance = haversine_meters(stop.lat, stop.lon, other.lat, other.lon);
                if distance >= MIN_STOP_DISTANCE_METERS {
                    continue;
                }
                notices.add(
                    ValidationNotice::new(
                        STOPS_TOO_CLOSE,
                        format!(
                            "stops {} and {} are {:.2} m apart",
                            stop.stop_id, other.stop_id, distance
                        ),
                    )
                    .with_row(STOPS_FILE, other.line)
                    .with_context_field("stopId1", stop.stop_id.as_str())
                    .with_context_field("csvRowNumber1", stop.line)
                    .with_context_field("stopId2", other.stop_id.as_str())
                    .with_context_field("distanceMeters", distance),
                );
            }
        }
    }
}

fn load_stops(feed: &dyn FeedAccessor) -> Vec<StopPoint> {
    let mut stops = Vec::new();
    scan_table(feed, STOPS_FILE, |row| {
        if !matches!(row.non_empty("location_type").unwrap_or("0"), "0") {
            return;
        }
        let coordinate = |column: &str| row.non_empty(column).and_then(|v| v.parse::<f64>().ok());
        let (Some(lat), Some(lon)) = (coordinate("stop_lat"), coordinate("stop_lon")) else {
            return;
        };
        if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
            return;
        }
        stops.push(StopPoint {
            stop_id: row.get("stop_id").unwrap_or("").trim().to_string(),
            parent_station: row.non_empty("parent_station").map(str::to_string),
            line: row.line_number(),
            lat,
            lon,
        });
    });
    stops
}

fn haversine_meters(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}
