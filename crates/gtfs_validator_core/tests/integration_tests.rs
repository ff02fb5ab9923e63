use std::sync::Arc;

use chrono::NaiveDate;
use gtfs_sieve_core::rules::{
    AgencyConsistencyValidator, FieldFormatValidator, StopClusteringValidator,
};
use gtfs_sieve_core::{
    CancellationToken, CostClass, FeedAccessor, MemoryFeed, NoticeCode, NoticeSeverity,
    NoticeStore, RunState, ValidationConfig, ValidationEngine, ValidationMode, ValidationNotice,
    Validator, ValidatorCategory, ValidatorRegistry,
};

const REPEATED: NoticeCode = NoticeCode::warning("repeated_notice");

struct Repeat(usize);

impl Validator for Repeat {
    fn name(&self) -> &'static str {
        "repeat"
    }

    fn validate(&self, _: &dyn FeedAccessor, notices: &NoticeStore, _: &ValidationConfig) {
        for index in 0..self.0 {
            notices.add(
                ValidationNotice::new(REPEATED, "repeated").with_context_field("index", index),
            );
        }
    }
}

struct Panics;

impl Validator for Panics {
    fn name(&self) -> &'static str {
        "always_panics"
    }

    fn validate(&self, _: &dyn FeedAccessor, _: &NoticeStore, _: &ValidationConfig) {
        panic!("rule blew up");
    }
}

fn sample_feed() -> MemoryFeed {
    MemoryFeed::new()
        .with_label("sample")
        .with_table(
            "agency.txt",
            "agency_id,agency_name,agency_url,agency_timezone\n\
             M,Metro,https://metro.example.com,Europe/Paris\n\
             B,Buses,https://buses.example.com,Europe/Berlin\n",
        )
        .with_table(
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon\n\
             S1,First,48.000000,2.000000\n\
             S2,Second,48.000004,2.000000\n\
             S3,Third,48.010000,2.000000\n\
             S4,Unused,48.020000,2.000000\n",
        )
        .with_table(
            "routes.txt",
            "route_id,agency_id,route_short_name,route_long_name,route_type,route_color\n\
             R1,M,1,,3,FF0000\n\
             R2,B,,,3,NOTACOLOR\n",
        )
        .with_table(
            "trips.txt",
            "route_id,service_id,trip_id\nR1,WK,T1\nR2,WK,T2\nR9,WK,T3\n",
        )
        .with_table(
            "stop_times.txt",
            "trip_id,arrival_time,departure_time,stop_id,stop_sequence\n\
             T1,08:00:00,08:00:00,S1,1\n\
             T1,07:59:00,08:02:00,S2,2\n\
             T2,09:00:00,09:00:00,S3,1\n",
        )
        .with_table(
            "calendar.txt",
            "service_id,monday,tuesday,wednesday,thursday,friday,saturday,sunday,start_date,end_date\n\
             WK,1,1,1,1,1,0,0,20240101,20240331\n",
        )
}

fn config(mode: ValidationMode, workers: i64) -> ValidationConfig {
    ValidationConfig::builder()
        .mode(mode)
        .parallel_workers(workers)
        .current_date(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap())
        .build()
}

#[test]
fn counts_are_deterministic_across_runs() {
    let engine = ValidationEngine::with_default_rules();
    let feed = sample_feed();
    let config = config(ValidationMode::Comprehensive, 4);

    let first = engine
        .run(&feed, &config, &CancellationToken::new())
        .unwrap();
    let second = engine
        .run(&feed, &config, &CancellationToken::new())
        .unwrap();

    assert_eq!(first.state, RunState::Completed);
    assert_eq!(first.notices.count_by_code(), second.notices.count_by_code());
    assert_eq!(first.notices.count("foreign_key_violation"), 1);
    assert_eq!(first.notices.count("invalid_color"), 1);
    assert_eq!(first.notices.count("inconsistent_agency_timezone"), 1);
    assert_eq!(
        first
            .notices
            .count("stop_time_with_arrival_before_previous_departure_time"),
        1
    );
    assert_eq!(first.notices.count("stops_too_close"), 1);
    assert_eq!(first.notices.count("expired_calendar"), 1);
    assert_eq!(first.notices.count("unused_stop"), 1);
    assert_eq!(first.notices.count("validator_error"), 0);
}

#[test]
fn sanitized_worker_count_does_not_change_notices() {
    let engine = ValidationEngine::with_default_rules();
    let feed = sample_feed();

    let single = engine
        .run(
            &feed,
            &config(ValidationMode::Default, -5),
            &CancellationToken::new(),
        )
        .unwrap();
    let many = engine
        .run(
            &feed,
            &config(ValidationMode::Default, 8),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(single.notices.count_by_code(), many.notices.count_by_code());
    assert_eq!(single.units_run, many.units_run);
}

#[test]
fn one_faulty_rule_yields_one_validator_error() {
    let registry = ValidatorRegistry::builder()
        .register(ValidatorCategory::Core, CostClass::Cheap, Repeat(3))
        .register(ValidatorCategory::Core, CostClass::Cheap, Panics)
        .register(ValidatorCategory::Entity, CostClass::Cheap, AgencyConsistencyValidator)
        .build();
    let engine = ValidationEngine::new(registry);

    let outcome = engine
        .run(
            &sample_feed(),
            &config(ValidationMode::Default, 2),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(outcome.state, RunState::Completed);
    assert_eq!(outcome.notices.count("validator_error"), 1);
    assert_eq!(outcome.notices.count("repeated_notice"), 3);
    assert_eq!(outcome.notices.count("inconsistent_agency_timezone"), 1);
    assert_eq!(outcome.failed_units, vec!["always_panics"]);

    let snapshot = outcome.notices.snapshot();
    let error = snapshot
        .iter()
        .find(|notice| notice.code() == "validator_error")
        .unwrap();
    assert_eq!(error.severity(), NoticeSeverity::Error);
    assert_eq!(
        error.context_field("validator"),
        Some(&serde_json::Value::from("always_panics"))
    );
}

#[test]
fn cancelled_before_start_produces_no_notices() {
    let engine = ValidationEngine::with_default_rules();
    let token = CancellationToken::new();
    token.cancel();

    let outcome = engine
        .run(&sample_feed(), &config(ValidationMode::Comprehensive, 4), &token)
        .unwrap();

    assert_eq!(outcome.state, RunState::Cancelled);
    assert_eq!(engine.state(), RunState::Cancelled);
    assert!(outcome.notices.is_empty());
    assert_eq!(outcome.units_run, 0);
    assert_eq!(outcome.units_skipped, outcome.units_total);
}

#[test]
fn agencies_without_ids_are_reported_per_row() {
    let feed = MemoryFeed::new().with_table(
        "agency.txt",
        "agency_name,agency_url,agency_timezone\n\
         Metro,https://metro.example.com,Europe/Paris\n\
         Buses,https://buses.example.com,Europe/Paris\n",
    );
    let registry = ValidatorRegistry::builder()
        .register(ValidatorCategory::Entity, CostClass::Cheap, AgencyConsistencyValidator)
        .build();

    let outcome = ValidationEngine::new(registry)
        .run(
            &feed,
            &config(ValidationMode::Default, 1),
            &CancellationToken::new(),
        )
        .unwrap();

    assert_eq!(outcome.notices.total_count(), 2);
    let rows: Vec<_> = outcome
        .notices
        .snapshot()
        .iter()
        .map(|notice| {
            assert_eq!(notice.code(), "missing_agency_id");
            assert_eq!(notice.severity(), NoticeSeverity::Error);
            notice.row_number()
        })
        .collect();
    assert_eq!(rows, vec![Some(2), Some(3)]);
}

#[test]
fn performance_mode_skips_geospatial_checks() {
    let registry = Arc::new(
        ValidatorRegistry::builder()
            .register(ValidatorCategory::Core, CostClass::Cheap, FieldFormatValidator)
            .register(ValidatorCategory::Business, CostClass::Expensive, StopClusteringValidator)
            .build(),
    );
    let feed = MemoryFeed::new()
        .with_table(
            "stops.txt",
            "stop_id,stop_name,stop_lat,stop_lon\n\
             S1,First,48.000000,2.000000\n\
             S2,Second,48.000004,2.000000\n",
        )
        .with_table(
            "routes.txt",
            "route_id,route_short_name,route_type,route_color\nR1,1,3,NOTACOLOR\n",
        );
    let engine = ValidationEngine::new(Arc::clone(&registry));

    let fast = engine
        .run(
            &feed,
            &config(ValidationMode::Performance, 2),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(fast.notices.codes(), vec!["invalid_color".to_string()]);

    let thorough = engine
        .run(
            &feed,
            &config(ValidationMode::Comprehensive, 2),
            &CancellationToken::new(),
        )
        .unwrap();
    assert_eq!(thorough.notices.count("invalid_color"), 1);
    assert_eq!(thorough.notices.count("stops_too_close"), 1);
}

#[test]
fn capped_codes_keep_exact_totals() {
    let registry = ValidatorRegistry::builder()
        .register(ValidatorCategory::Core, CostClass::Cheap, Repeat(250))
        .build();
    let config = ValidationConfig::builder()
        .max_notices_per_type(20)
        .parallel_workers(1)
        .build();

    let outcome = ValidationEngine::new(registry)
        .run(&MemoryFeed::new(), &config, &CancellationToken::new())
        .unwrap();

    assert_eq!(outcome.notices.count("repeated_notice"), 250);
    assert_eq!(outcome.notices.snapshot().len(), 20);
}

#[test]
fn directory_and_zip_feeds_agree() {
    use std::io::Write;

    let feed = sample_feed();
    let root = std::env::temp_dir().join(format!("gtfs-sieve-it-{}", std::process::id()));
    std::fs::create_dir_all(&root).unwrap();
    let mut zip_bytes = Vec::new();
    {
        let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut zip_bytes));
        for table in feed.list_tables().unwrap() {
            let mut contents = Vec::new();
            std::io::Read::read_to_end(&mut feed.open_table(&table).unwrap(), &mut contents)
                .unwrap();
            std::fs::write(root.join(&table), &contents).unwrap();
            writer
                .start_file(table.as_str(), zip::write::FileOptions::default())
                .unwrap();
            writer.write_all(&contents).unwrap();
        }
        writer.finish().unwrap();
    }
    let zip_path = std::env::temp_dir().join(format!("gtfs-sieve-it-{}.zip", std::process::id()));
    std::fs::write(&zip_path, &zip_bytes).unwrap();

    let engine = ValidationEngine::with_default_rules();
    let config = config(ValidationMode::Comprehensive, 4);
    let directory = gtfs_sieve_core::DirectoryFeed::open(&root).unwrap();
    let archive = gtfs_sieve_core::ZipFeed::open(&zip_path).unwrap();

    let from_directory = engine
        .run(&directory, &config, &CancellationToken::new())
        .unwrap();
    let from_archive = engine
        .run(&archive, &config, &CancellationToken::new())
        .unwrap();
    let _ = std::fs::remove_dir_all(&root);
    let _ = std::fs::remove_file(&zip_path);

    assert_eq!(
        from_directory.notices.count_by_code(),
        from_archive.notices.count_by_code()
    );
    assert_eq!(from_archive.notices.count("stops_too_close"), 1);
}
