use std::sync::Arc;

use tracing::{debug, info};

use gtfs_sieve_core::{
    CancellationToken, FeedAccessor, RunState, ValidationConfig, ValidationEngine,
    ValidatorRegistry,
};

use crate::{
    FeedStatistics, ReportError, ReportSummaryContext, ValidationReport, DEFAULT_SAMPLE_CAP,
    VALIDATOR_VERSION,
};

/// Runs `registry` over `feed` and compiles the report, statistics included.
///
/// Only fatal feed errors surface as `Err`; a cancelled or timed-out run
/// still yields a report whose summary records the state. Statistics need a
/// full pass over the feed and are only gathered for completed runs.
pub fn validate_feed(
    feed: &dyn FeedAccessor,
    config: &ValidationConfig,
    cancel: &CancellationToken,
    registry: Arc<ValidatorRegistry>,
) -> Result<ValidationReport, ReportError> {
    let engine = ValidationEngine::new(registry);
    let outcome = engine.run(feed, config, cancel)?;

    let mut context = ReportSummaryContext::new()
        .with_validator_version(VALIDATOR_VERSION)
        .with_gtfs_input(feed.source_label())
        .validated_now()
        .with_config(config)
        .with_outcome(&outcome);
    if outcome.state == RunState::Completed {
        context = context.with_statistics(FeedStatistics::collect(feed)?);
    } else {
        debug!(state = %outcome.state, "skipping feed statistics");
    }
    let summary = context.build_summary(&outcome.notices);
    let report =
        ValidationReport::from_store_with_summary(&outcome.notices, summary, DEFAULT_SAMPLE_CAP);

    info!(
        state = %outcome.state,
        errors = report.error_count(),
        warnings = report.warning_count(),
        infos = report.info_count(),
        "report compiled"
    );
    Ok(report)
}
