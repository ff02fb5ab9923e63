use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use tracing::warn;

use crate::notice_store::MAX_NOTICES_PER_TYPE_LIMIT;
use crate::{ProgressHandler, ValidationMode};

pub const UNKNOWN_COUNTRY_CODE: &str = "ZZ";

/// Settings for one validation run.
///
/// Every setter sanitizes its input instead of rejecting it.
#[derive(Clone)]
pub struct ValidationConfig {
    country_code: String,
    current_date: NaiveDate,
    max_memory_bytes: u64,
    parallel_workers: usize,
    max_notices_per_type: Option<usize>,
    mode: ValidationMode,
    timeout: Option<Duration>,
    progress_handler: Option<Arc<dyn ProgressHandler>>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            country_code: UNKNOWN_COUNTRY_CODE.to_string(),
            current_date: chrono::Local::now().date_naive(),
            max_memory_bytes: 0,
            parallel_workers: default_parallel_workers(),
            max_notices_per_type: None,
            mode: ValidationMode::Default,
            timeout: None,
            progress_handler: None,
        }
    }
}

fn default_parallel_workers() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
}

impl ValidationConfig {
    pub fn builder() -> ValidationConfigBuilder {
        ValidationConfigBuilder::default()
    }

    /// Upper-case ISO 3166 alpha-2 code, `ZZ` when unknown.
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    pub fn current_date(&self) -> NaiveDate {
        self.current_date
    }

    /// Advisory memory budget in bytes; 0 means no limit.
    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_bytes
    }

    pub fn parallel_workers(&self) -> usize {
        self.parallel_workers
    }

    /// Explicit per-code cap, overriding the mode profile when set.
    pub fn max_notices_per_type(&self) -> Option<usize> {
        self.max_notices_per_type
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn progress_handler(&self) -> Option<&Arc<dyn ProgressHandler>> {
        self.progress_handler.as_ref()
    }

    /// Cap to apply given the mode profile's default.
    pub fn effective_notice_cap(&self, profile_cap: usize) -> usize {
        self.max_notices_per_type.unwrap_or(profile_cap)
    }
}

impl fmt::Debug for ValidationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValidationConfig")
            .field("country_code", &self.country_code)
            .field("current_date", &self.current_date)
            .field("max_memory_bytes", &self.max_memory_bytes)
            .field("parallel_workers", &self.parallel_workers)
            .field("max_notices_per_type", &self.max_notices_per_type)
            .field("mode", &self.mode)
            .field("timeout", &self.timeout)
            .field("progress_handler", &self.progress_handler.is_some())
            .finish()
    }
}

#[derive(Default)]
pub struct ValidationConfigBuilder {
    config: ValidationConfig,
}

impl ValidationConfigBuilder {
    pub fn country_code(mut self, code: &str) -> Self {
        self.config.country_code = sanitize_country_code(code);
        self
    }

    pub fn current_date(mut self, date: NaiveDate) -> Self {
        self.config.current_date = date;
        self
    }

    pub fn max_memory_bytes(mut self, bytes: i64) -> Self {
        if bytes < 0 {
            warn!(bytes, "negative memory limit treated as unlimited");
        }
        self.config.max_memory_bytes = bytes.max(0) as u64;
        self
    }

    pub fn parallel_workers(mut self, workers: i64) -> Self {
        if workers < 1 {
            warn!(workers, "parallel workers clamped to 1");
        }
        self.config.parallel_workers = workers.max(1) as usize;
        self
    }

    /// 0 keeps every notice; negative values fall back to the mode profile.
    pub fn max_notices_per_type(mut self, cap: i64) -> Self {
        self.config.max_notices_per_type = if cap < 0 {
            None
        } else if cap as u64 > MAX_NOTICES_PER_TYPE_LIMIT as u64 {
            warn!(cap, limit = MAX_NOTICES_PER_TYPE_LIMIT, "notice cap clamped");
            Some(MAX_NOTICES_PER_TYPE_LIMIT)
        } else {
            Some(cap as usize)
        };
        self
    }

    pub fn mode(mut self, mode: ValidationMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// A zero duration disables the timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    pub fn progress_handler<H>(mut self, handler: H) -> Self
    where
        H: ProgressHandler + 'static,
    {
        self.config.progress_handler = Some(Arc::new(handler));
        self
    }

    pub fn build(self) -> ValidationConfig {
        self.config
    }
}

fn sanitize_country_code(code: &str) -> String {
    let trimmed = code.trim();
    if trimmed.len() == 2 && trimmed.chars().all(|ch| ch.is_ascii_alphabetic()) {
        trimmed.to_ascii_uppercase()
    } else {
        if !trimmed.is_empty() {
            warn!(code = trimmed, "unrecognized country code, using {UNKNOWN_COUNTRY_CODE}");
        }
        UNKNOWN_COUNTRY_CODE.to_string()
    }
}
