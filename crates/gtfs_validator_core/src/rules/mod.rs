//! Shipped validator catalog.

use tracing::debug;

use crate::registry::{CostClass, ValidatorCategory, ValidatorRegistry};
use crate::table::{readable_table, TableRow};
use crate::FeedAccessor;

pub mod agency_consistency;
pub mod duplicate_key;
pub mod fare_attributes;
pub mod feed_info;
pub mod field_format;
pub mod required_files;
pub mod route_names;
pub mod service_date_range;
pub mod stop_clustering;
pub mod stop_connectivity;
pub mod stop_time_sequence;
pub mod table_structure;
pub mod trip_route_foreign_key;
pub mod wheelchair_boarding;

pub use agency_consistency::AgencyConsistencyValidator;
pub use duplicate_key::DuplicateKeyValidator;
pub use fare_attributes::FareAttributesValidator;
pub use feed_info::FeedInfoValidator;
pub use field_format::FieldFormatValidator;
pub use required_files::RequiredFilesValidator;
pub use route_names::RouteNamesValidator;
pub use service_date_range::ServiceDateRangeValidator;
pub use stop_clustering::StopClusteringValidator;
pub use stop_connectivity::StopConnectivityValidator;
pub use stop_time_sequence::StopTimeSequenceValidator;
pub use table_structure::TableStructureValidator;
pub use trip_route_foreign_key::TripRouteForeignKeyValidator;
pub use wheelchair_boarding::WheelchairBoardingValidator;

pub fn default_registry() -> ValidatorRegistry {
    use CostClass::{Cheap, Expensive};
    use ValidatorCategory::*;

    ValidatorRegistry::builder()
        .register(Core, Cheap, RequiredFilesValidator)
        .register(Core, Cheap, TableStructureValidator)
        .register(Core, Cheap, FieldFormatValidator)
        .register(Entity, Cheap, AgencyConsistencyValidator)
        .register(Entity, Cheap, RouteNamesValidator)
        .register(Entity, Cheap, DuplicateKeyValidator)
        .register(Relationship, Cheap, TripRouteForeignKeyValidator)
        .register(Business, Cheap, StopTimeSequenceValidator)
        .register(Accessibility, Cheap, WheelchairBoardingValidator)
        .register(Fare, Cheap, FareAttributesValidator)
        .register(Meta, Cheap, FeedInfoValidator)
        .register(Business, Expensive, ServiceDateRangeValidator)
        .register(Business, Expensive, StopClusteringValidator)
        .register(Relationship, Expensive, StopConnectivityValidator)
        .build()
}

/// Visits every decodable row of `table`. Returns `false` when the table is
/// absent or its header is unreadable.
///
/// Reading stops at the first malformed row; the structure rule reports it.
pub(crate) fn scan_table<F>(feed: &dyn FeedAccessor, table: &str, visit: F) -> bool
where
    F: FnMut(&TableRow),
{
    let Some(mut decoder) = readable_table(feed, table) else {
        return false;
    };
    if let Err(err) = decoder.for_each_row(visit) {
        debug!(table, error = %err, "stopped reading table");
    }
    true
}

pub(crate) fn has_value(value: Option<&str>) -> bool {
    value.map(|val| !val.trim().is_empty()).unwrap_or(false)
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::ValidationMode;

    #[test]
    fn catalog_names_are_unique() {
        let registry = default_registry();
        let mut names: Vec<_> = registry.entries().iter().map(|entry| entry.name()).collect();
        let count = names.len();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), count);
        assert_eq!(count, 14);
    }

    #[test]
    fn performance_mode_skips_expensive_rules() {
        let plan = default_registry().resolve(ValidationMode::Performance);
        let names = plan.unit_names();
        assert!(names.contains(&"field_format"));
        assert!(names.contains(&"trip_route_foreign_key"));
        assert!(!names.contains(&"stop_clustering"));
        assert!(!names.contains(&"stop_connectivity"));
        assert!(!names.contains(&"fare_attributes"));
    }
}
