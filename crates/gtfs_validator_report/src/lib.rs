//! Validation reports for gtfs-sieve.
//!
//! A [`ValidationReport`] is compiled once per run from the engine's
//! [`NoticeStore`]: one [`NoticeGroup`] per observed code with the exact
//! total and a small sample, plus a [`ReportSummary`] carrying severity
//! counts, run metadata and [`FeedStatistics`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};

use gtfs_sieve_core::{
    EngineError, FeedError, NoticeSeverity, NoticeStore, RunState, ValidationConfig,
    ValidationMode, ValidationNotice, ValidationOutcome,
};

mod stats;
mod validate;

pub use stats::{FeedStatistics, ReportAgency, ReportCounts, ReportFeedInfo};
pub use validate::validate_feed;

/// Samples kept per notice group unless the caller asks otherwise.
pub const DEFAULT_SAMPLE_CAP: usize = 5;

pub const VALIDATOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to serialize report")]
    Serialize(#[source] serde_json::Error),
    #[error("failed to parse report")]
    Deserialize(#[source] serde_json::Error),
    #[error("failed to write report to {}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonFormat {
    #[default]
    Pretty,
    Compact,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeCounts {
    pub errors: u64,
    pub warnings: u64,
    pub infos: u64,
    pub total: u64,
}

impl NoticeCounts {
    fn add(&mut self, severity: NoticeSeverity, count: u64) {
        match severity {
            NoticeSeverity::Error => self.errors += count,
            NoticeSeverity::Warning => self.warnings += count,
            NoticeSeverity::Info => self.infos += count,
        }
        self.total += count;
    }

    fn from_groups(groups: &[NoticeGroup]) -> Self {
        let mut counts = Self::default();
        for group in groups {
            counts.add(group.severity, group.total_notices);
        }
        counts
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportSummary {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validator_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_for_validation: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country_code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gtfs_input: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<ValidationMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threads: Option<usize>,
    #[serde(default)]
    pub elapsed_millis: u64,
    #[serde(default)]
    pub notice_counts: NoticeCounts,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed_validators: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<FeedStatistics>,
}

impl ReportSummary {
    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_millis as f64 / 1000.0
    }
}

/// Collects the run metadata that goes into a [`ReportSummary`].
#[derive(Debug, Clone, Default)]
pub struct ReportSummaryContext {
    summary: ReportSummary,
}

impl ReportSummaryContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_validator_version(mut self, version: impl Into<String>) -> Self {
        self.summary.validator_version = Some(version.into());
        self
    }

    pub fn with_gtfs_input(mut self, input: impl Into<String>) -> Self {
        self.summary.gtfs_input = Some(input.into());
        self
    }

    pub fn with_validated_at(mut self, validated_at: impl Into<String>) -> Self {
        self.summary.validated_at = Some(validated_at.into());
        self
    }

    /// Stamps the summary with the current local time.
    pub fn validated_now(self) -> Self {
        let now = Local::now().to_rfc3339_opts(SecondsFormat::Secs, true);
        self.with_validated_at(now)
    }

    pub fn with_config(mut self, config: &ValidationConfig) -> Self {
        self.summary.country_code = Some(config.country_code().to_string());
        self.summary.date_for_validation =
            Some(config.current_date().format("%Y-%m-%d").to_string());
        self.summary.mode = Some(config.mode());
        self.summary.threads = Some(config.parallel_workers());
        self
    }

    pub fn with_outcome(mut self, outcome: &ValidationOutcome) -> Self {
        self.summary.mode = Some(outcome.mode);
        self.summary.state = Some(outcome.state);
        self.summary.failed_validators = outcome
            .failed_units
            .iter()
            .map(|name| name.to_string())
            .collect();
        self.with_elapsed(outcome.elapsed)
    }

    pub fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.summary.elapsed_millis = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_statistics(mut self, statistics: FeedStatistics) -> Self {
        self.summary.statistics = Some(statistics);
        self
    }

    /// Summary with severity counts taken from `store`.
    pub fn build_summary(self, store: &NoticeStore) -> ReportSummary {
        let mut summary = self.summary;
        let mut counts = NoticeCounts::default();
        for (severity, count) in store.counts_by_severity() {
            counts.add(severity, count);
        }
        summary.notice_counts = counts;
        summary
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoticeGroup {
    pub code: String,
    pub severity: NoticeSeverity,
    pub total_notices: u64,
    #[serde(default)]
    pub sample_notices: Vec<ValidationNotice>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub summary: ReportSummary,
    #[serde(default)]
    pub notices: Vec<NoticeGroup>,
}

impl ValidationReport {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Report with a minimal summary and the default sample size.
    pub fn compile(
        store: &NoticeStore,
        statistics: Option<FeedStatistics>,
        elapsed: Duration,
        suite_version: &str,
    ) -> Self {
        let mut context = ReportSummaryContext::new()
            .with_validator_version(suite_version)
            .with_elapsed(elapsed);
        if let Some(statistics) = statistics {
            context = context.with_statistics(statistics);
        }
        Self::from_store_with_summary(store, context.build_summary(store), DEFAULT_SAMPLE_CAP)
    }

    /// Groups are ordered by severity, errors first, then by code. Each
    /// group keeps at most `sample_cap` of the notices the store retained.
    pub fn from_store_with_summary(
        store: &NoticeStore,
        mut summary: ReportSummary,
        sample_cap: usize,
    ) -> Self {
        let retention = store.max_notices_per_type();
        let sample_cap = if retention > 0 {
            sample_cap.min(retention)
        } else {
            sample_cap
        };

        let notices: Vec<NoticeGroup> = store
            .code_snapshots()
            .into_iter()
            .map(|snapshot| NoticeGroup {
                code: snapshot.code,
                severity: snapshot.severity,
                total_notices: snapshot.total,
                sample_notices: snapshot.retained.into_iter().take(sample_cap).collect(),
            })
            .collect();
        summary.notice_counts = NoticeCounts::from_groups(&notices);

        Self { summary, notices }
    }

    pub fn group(&self, code: &str) -> Option<&NoticeGroup> {
        self.notices.iter().find(|group| group.code == code)
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn has_warnings(&self) -> bool {
        self.warning_count() > 0
    }

    pub fn error_count(&self) -> u64 {
        self.summary.notice_counts.errors
    }

    pub fn warning_count(&self) -> u64 {
        self.summary.notice_counts.warnings
    }

    pub fn info_count(&self) -> u64 {
        self.summary.notice_counts.infos
    }

    pub fn total_notices(&self) -> u64 {
        self.summary.notice_counts.total
    }

    pub fn to_json(&self, format: JsonFormat) -> Result<String, ReportError> {
        match format {
            JsonFormat::Pretty => serde_json::to_string_pretty(self),
            JsonFormat::Compact => serde_json::to_string(self),
        }
        .map_err(ReportError::Serialize)
    }

    pub fn to_json_pretty(&self) -> Result<String, ReportError> {
        self.to_json(JsonFormat::Pretty)
    }

    pub fn to_json_compact(&self) -> Result<String, ReportError> {
        self.to_json(JsonFormat::Compact)
    }

    pub fn from_json(json: &str) -> Result<Self, ReportError> {
        serde_json::from_str(json).map_err(ReportError::Deserialize)
    }

    pub fn write_json<P: AsRef<Path>>(&self, path: P) -> Result<(), ReportError> {
        self.write_json_with_format(path, JsonFormat::Pretty)
    }

    pub fn write_json_with_format<P: AsRef<Path>>(
        &self,
        path: P,
        format: JsonFormat,
    ) -> Result<(), ReportError> {
        let json = self.to_json(format)?;
        fs::write(path.as_ref(), json).map_err(|source| ReportError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        })
    }
}
