#![no_main]
use arbitrary::Arbitrary;
use gtfs_sieve_core::{
    CancellationToken, MemoryFeed, TableDecoder, ValidationConfig, ValidationEngine,
    ValidationMode,
};
use libfuzzer_sys::fuzz_target;

const TABLES: [&str; 6] = [
    "agency.txt",
    "stops.txt",
    "routes.txt",
    "trips.txt",
    "stop_times.txt",
    "calendar.txt",
];

#[derive(Debug, Arbitrary)]
struct FuzzData<'a> {
    table: u8,
    contents: &'a [u8],
    run_rules: bool,
}

fuzz_target!(|data: FuzzData<'_>| {
    let name = TABLES[data.table as usize % TABLES.len()];

    if let Ok(mut decoder) = TableDecoder::open(data.contents, name) {
        let mut last_line = 1;
        while let Ok(Some(row)) = decoder.next_row() {
            assert!(row.line_number() > last_line);
            assert!(row.values().len() >= decoder.header().len());
            last_line = row.line_number();
        }
    }

    if data.run_rules {
        let feed = MemoryFeed::new().with_table(name, data.contents);
        let config = ValidationConfig::builder()
            .mode(ValidationMode::Comprehensive)
            .parallel_workers(1)
            .build();
        let outcome = ValidationEngine::with_default_rules()
            .run(&feed, &config, &CancellationToken::new())
            .expect("memory feeds always enumerate");
        assert_eq!(outcome.notices.count("validator_error"), 0);
    }
});
