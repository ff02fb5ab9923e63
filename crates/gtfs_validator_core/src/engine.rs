//! Runs the validators a mode selects against one feed.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::progress::{ProgressDispatcher, ProgressEvent};
use crate::registry::{RegisteredValidator, ValidationMode, ValidatorRegistry};
use crate::validator::run_isolated;
use crate::{FeedAccessor, FeedError, NoticeStore, ValidationConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
    Completed,
    Cancelled,
    TimedOut,
    Failed,
}

impl RunState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => RunState::Running,
            2 => RunState::Completed,
            3 => RunState::Cancelled,
            4 => RunState::TimedOut,
            5 => RunState::Failed,
            _ => RunState::Idle,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            RunState::Idle => 0,
            RunState::Running => 1,
            RunState::Completed => 2,
            RunState::Cancelled => 3,
            RunState::TimedOut => 4,
            RunState::Failed => 5,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunState::Idle | RunState::Running)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Completed => "completed",
            RunState::Cancelled => "cancelled",
            RunState::TimedOut => "timed_out",
            RunState::Failed => "failed",
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shared flag asking a run to stop dispatching validators.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("failed to start worker pool: {0}")]
    WorkerPool(String),
}

#[derive(Debug)]
pub struct ValidationOutcome {
    pub state: RunState,
    pub mode: ValidationMode,
    pub notices: NoticeStore,
    pub elapsed: Duration,
    pub units_total: usize,
    pub units_run: usize,
    pub units_skipped: usize,
    /// Validators that panicked, in completion order.
    pub failed_units: Vec<&'static str>,
}

// Ordered so that `fetch_max` lets cancellation win over a timeout.
const STOP_NONE: u8 = 0;
const STOP_TIMED_OUT: u8 = 1;
const STOP_CANCELLED: u8 = 2;

struct Dispatch<'a> {
    feed: &'a dyn FeedAccessor,
    config: &'a ValidationConfig,
    cancel: &'a CancellationToken,
    deadline: Option<Instant>,
    notices: &'a NoticeStore,
    progress: &'a ProgressDispatcher,
    total: usize,
    stop: AtomicU8,
    started: AtomicUsize,
    completed: AtomicUsize,
    failed: Mutex<Vec<&'static str>>,
}

impl Dispatch<'_> {
    fn stop_reason(&self) -> u8 {
        if self.cancel.is_cancelled() {
            self.stop.fetch_max(STOP_CANCELLED, Ordering::SeqCst);
        } else if self
            .deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
        {
            self.stop.fetch_max(STOP_TIMED_OUT, Ordering::SeqCst);
        }
        self.stop.load(Ordering::SeqCst)
    }

    fn run_unit(&self, unit: &RegisteredValidator) {
        if self.stop_reason() != STOP_NONE {
            debug!(validator = unit.name(), "validator skipped");
            return;
        }
        self.started.fetch_add(1, Ordering::SeqCst);
        debug!(validator = unit.name(), "validator started");

        let succeeded = run_isolated(unit.validator.as_ref(), self.feed, self.notices, self.config);
        if !succeeded {
            if let Ok(mut failed) = self.failed.lock() {
                failed.push(unit.name());
            }
        }

        let completed = self.completed.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(validator = unit.name(), completed, total = self.total, "validator finished");
        self.progress.offer(ProgressEvent {
            validator: unit.name(),
            completed,
            total: self.total,
        });
    }
}

pub struct ValidationEngine {
    registry: Arc<ValidatorRegistry>,
    state: AtomicU8,
}

impl ValidationEngine {
    pub fn new(registry: impl Into<Arc<ValidatorRegistry>>) -> Self {
        Self {
            registry: registry.into(),
            state: AtomicU8::new(RunState::Idle.as_u8()),
        }
    }

    /// Engine over the shipped rule catalog.
    pub fn with_default_rules() -> Self {
        Self::new(crate::rules::default_registry())
    }

    pub fn registry(&self) -> &ValidatorRegistry {
        &self.registry
    }

    /// State of the current or most recent run.
    pub fn state(&self) -> RunState {
        RunState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: RunState) {
        self.state.store(state.as_u8(), Ordering::SeqCst);
    }

    pub fn run(
        &self,
        feed: &dyn FeedAccessor,
        config: &ValidationConfig,
        cancel: &CancellationToken,
    ) -> Result<ValidationOutcome, EngineError> {
        let started_at = Instant::now();
        self.set_state(RunState::Running);

        let plan = self.registry.resolve(config.mode());
        let notices = NoticeStore::new(config.effective_notice_cap(plan.max_notices_per_type));

        let tables = match feed.list_tables() {
            Ok(tables) => tables,
            Err(err) => {
                self.set_state(RunState::Failed);
                return Err(err.into());
            }
        };
        info!(
            source = %feed.source_label(),
            mode = %plan.mode,
            tables = tables.len(),
            validators = plan.units.len(),
            workers = config.parallel_workers(),
            "validation started"
        );

        let progress = ProgressDispatcher::start(config.progress_handler().cloned());
        let dispatch = Dispatch {
            feed,
            config,
            cancel,
            deadline: config.timeout().map(|timeout| started_at + timeout),
            notices: &notices,
            progress: &progress,
            total: plan.units.len(),
            stop: AtomicU8::new(STOP_NONE),
            started: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            failed: Mutex::new(Vec::new()),
        };
        dispatch.stop_reason();

        if let Err(err) = dispatch_units(&dispatch, &plan.units, config.parallel_workers()) {
            self.set_state(RunState::Failed);
            return Err(err);
        }

        let state = match dispatch.stop.load(Ordering::SeqCst) {
            STOP_CANCELLED => RunState::Cancelled,
            STOP_TIMED_OUT => RunState::TimedOut,
            _ => RunState::Completed,
        };
        let units_run = dispatch.started.load(Ordering::SeqCst);
        let failed_units = dispatch.failed.into_inner().unwrap_or_default();
        progress.finish();
        self.set_state(state);

        let elapsed = started_at.elapsed();
        if !failed_units.is_empty() {
            warn!(failed = ?failed_units, "validators failed");
        }
        info!(
            state = %state,
            notices = notices.total_count(),
            units_run,
            elapsed_ms = elapsed.as_millis() as u64,
            "validation finished"
        );

        Ok(ValidationOutcome {
            state,
            mode: plan.mode,
            notices,
            elapsed,
            units_total: plan.units.len(),
            units_run,
            units_skipped: plan.units.len() - units_run,
            failed_units,
        })
    }
}

#[cfg(feature = "parallel")]
fn dispatch_units(
    dispatch: &Dispatch<'_>,
    units: &[RegisteredValidator],
    workers: usize,
) -> Result<(), EngineError> {
    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(workers.max(1))
        .thread_name(|index| format!("gtfs-validator-{index}"))
        .build()
        .map_err(|err| EngineError::WorkerPool(err.to_string()))?;

    // FIFO keeps dispatch in registration order when workers are scarce.
    pool.scope_fifo(|scope| {
        for unit in units {
            scope.spawn_fifo(move |_| dispatch.run_unit(unit));
        }
    });
    Ok(())
}

#[cfg(not(feature = "parallel"))]
fn dispatch_units(
    dispatch: &Dispatch<'_>,
    units: &[RegisteredValidator],
    _workers: usize,
) -> Result<(), EngineError> {
    for unit in units {
        dispatch.run_unit(unit);
    }
    Ok(())
}
