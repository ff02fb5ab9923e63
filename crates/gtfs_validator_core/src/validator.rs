use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::warn;

use crate::{FeedAccessor, NoticeStore, ValidationConfig, ValidationNotice};

/// One independent check over a feed.
///
/// Validators hold no per-run state. Everything a run needs arrives through
/// the arguments, so one instance can serve concurrent runs.
pub trait Validator: Send + Sync {
    fn name(&self) -> &'static str;
    fn validate(&self, feed: &dyn FeedAccessor, notices: &NoticeStore, config: &ValidationConfig);
}

/// Runs `validator`, turning a panic into a single `validator_error` notice.
///
/// Returns `false` when the validator panicked.
pub fn run_isolated(
    validator: &dyn Validator,
    feed: &dyn FeedAccessor,
    notices: &NoticeStore,
    config: &ValidationConfig,
) -> bool {
    let result = catch_unwind(AssertUnwindSafe(|| {
        validator.validate(feed, notices, config)
    }));

    match result {
        Ok(()) => true,
        Err(panic) => {
            let message = panic_payload_message(&*panic);
            warn!(validator = validator.name(), %message, "validator panicked");
            notices.add(ValidationNotice::validator_error(validator.name(), message));
            false
        }
    }
}

pub(crate) fn panic_payload_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}
