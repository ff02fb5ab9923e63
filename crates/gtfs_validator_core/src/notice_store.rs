//! Concurrent notice sink shared by every validator of a run.
//!
//! Counts are exact per code. Only the first `max_notices_per_type` notices
//! of each code are kept as samples; the rest are counted and dropped.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use rustc_hash::FxBuildHasher;

use crate::notice::{NoticeSeverity, ValidationNotice};

/// Hard ceiling on retained notices per code.
pub const MAX_NOTICES_PER_TYPE_LIMIT: usize = 10_000;

#[derive(Debug)]
struct CodeBucket {
    severity: NoticeSeverity,
    total: AtomicU64,
    retained: Mutex<Vec<ValidationNotice>>,
}

impl CodeBucket {
    fn new(severity: NoticeSeverity) -> Self {
        Self {
            severity,
            total: AtomicU64::new(0),
            retained: Mutex::new(Vec::new()),
        }
    }
}

/// Retained notices and exact count for one code.
#[derive(Debug, Clone, PartialEq)]
pub struct CodeSnapshot {
    pub code: String,
    pub severity: NoticeSeverity,
    pub total: u64,
    pub retained: Vec<ValidationNotice>,
}

#[derive(Debug)]
pub struct NoticeStore {
    buckets: DashMap<String, CodeBucket, FxBuildHasher>,
    max_notices_per_type: usize,
}

impl Default for NoticeStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl NoticeStore {
    /// `max_notices_per_type == 0` keeps every notice.
    pub fn new(max_notices_per_type: usize) -> Self {
        Self {
            buckets: DashMap::with_hasher(FxBuildHasher),
            max_notices_per_type,
        }
    }

    pub fn max_notices_per_type(&self) -> usize {
        self.max_notices_per_type
    }

    pub fn add(&self, notice: ValidationNotice) {
        if let Some(bucket) = self.buckets.get(notice.code()) {
            self.record(&bucket, notice);
            return;
        }
        let bucket = self
            .buckets
            .entry(notice.code().to_string())
            .or_insert_with(|| CodeBucket::new(notice.severity()))
            .downgrade();
        self.record(&bucket, notice);
    }

    pub fn extend<I: IntoIterator<Item = ValidationNotice>>(&self, notices: I) {
        for notice in notices {
            self.add(notice);
        }
    }

    fn record(&self, bucket: &CodeBucket, notice: ValidationNotice) {
        bucket.total.fetch_add(1, Ordering::Relaxed);
        let Ok(mut retained) = bucket.retained.lock() else {
            return;
        };
        if self.max_notices_per_type == 0 || retained.len() < self.max_notices_per_type {
            retained.push(notice);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn total_count(&self) -> u64 {
        self.buckets
            .iter()
            .map(|bucket| bucket.total.load(Ordering::Relaxed))
            .sum()
    }

    pub fn count(&self, code: &str) -> u64 {
        self.buckets
            .get(code)
            .map(|bucket| bucket.total.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    /// Exact totals per code, including notices past the cap.
    pub fn count_by_code(&self) -> BTreeMap<String, u64> {
        self.buckets
            .iter()
            .map(|bucket| (bucket.key().clone(), bucket.total.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn counts_by_severity(&self) -> BTreeMap<NoticeSeverity, u64> {
        let mut counts = BTreeMap::new();
        for bucket in self.buckets.iter() {
            *counts.entry(bucket.severity).or_insert(0) += bucket.total.load(Ordering::Relaxed);
        }
        counts
    }

    pub fn severity_of(&self, code: &str) -> Option<NoticeSeverity> {
        self.buckets.get(code).map(|bucket| bucket.severity)
    }

    /// Observed codes, sorted.
    pub fn codes(&self) -> Vec<String> {
        let mut codes: Vec<String> = self.buckets.iter().map(|bucket| bucket.key().clone()).collect();
        codes.sort();
        codes
    }

    /// Retained notices in `code_snapshots` order, arrival order within a code.
    pub fn snapshot(&self) -> Vec<ValidationNotice> {
        self.code_snapshots()
            .into_iter()
            .flat_map(|snapshot| snapshot.retained)
            .collect()
    }

    /// One entry per observed code, ordered by severity then code.
    pub fn code_snapshots(&self) -> Vec<CodeSnapshot> {
        let mut snapshots: Vec<CodeSnapshot> = self
            .buckets
            .iter()
            .map(|bucket| CodeSnapshot {
                code: bucket.key().clone(),
                severity: bucket.severity,
                total: bucket.total.load(Ordering::Relaxed),
                retained: bucket
                    .retained
                    .lock()
                    .map(|retained| retained.clone())
                    .unwrap_or_default(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.severity.cmp(&b.severity).then_with(|| a.code.cmp(&b.code)));
        snapshots
    }
}
