use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::{bounded, Sender, TrySendError};
use tracing::{debug, warn};

/// Events queued ahead of a slow handler. Newer events are dropped once full.
const PROGRESS_QUEUE_DEPTH: usize = 64;

/// Emitted after each validator finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub validator: &'static str,
    pub completed: usize,
    pub total: usize,
}

impl ProgressEvent {
    /// Share of validators finished, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}

/// Receives progress events on a dedicated thread, never on a worker.
pub trait ProgressHandler: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);
}

impl<F> ProgressHandler for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_progress(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// Non-blocking bridge from workers to a [`ProgressHandler`].
pub(crate) struct ProgressDispatcher {
    sender: Option<Sender<ProgressEvent>>,
    worker: Option<JoinHandle<()>>,
}

impl ProgressDispatcher {
    pub(crate) fn start(handler: Option<Arc<dyn ProgressHandler>>) -> Self {
        let Some(handler) = handler else {
            return Self {
                sender: None,
                worker: None,
            };
        };
        let (sender, receiver) = bounded::<ProgressEvent>(PROGRESS_QUEUE_DEPTH);
        let spawned = std::thread::Builder::new()
            .name("gtfs-progress".to_string())
            .spawn(move || {
                for event in receiver {
                    let delivered =
                        catch_unwind(AssertUnwindSafe(|| handler.on_progress(&event)));
                    if delivered.is_err() {
                        warn!(validator = event.validator, "progress handler panicked");
                    }
                }
            });
        match spawned {
            Ok(worker) => Self {
                sender: Some(sender),
                worker: Some(worker),
            },
            Err(err) => {
                warn!(error = %err, "progress reporting disabled");
                Self {
                    sender: None,
                    worker: None,
                }
            }
        }
    }

    /// Queues `event`, dropping it if the handler is behind.
    pub(crate) fn offer(&self, event: ProgressEvent) {
        let Some(sender) = &self.sender else {
            return;
        };
        match sender.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => {
                debug!(validator = event.validator, "progress event dropped");
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }

    /// Drains queued events and stops the dispatcher thread.
    pub(crate) fn finish(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.sender.take();
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

impl Drop for ProgressDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
