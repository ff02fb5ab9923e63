//! Streaming validation core for GTFS feeds.
//!
//! Feeds are read through a [`FeedAccessor`], one table at a time, by
//! independent [`Validator`]s that the [`ValidationEngine`] schedules on a
//! bounded worker pool. Findings land in a shared [`NoticeStore`].

pub mod config;
pub mod engine;
pub mod feed;
pub mod notice;
pub mod notice_store;
pub mod progress;
pub mod registry;
pub mod rules;
pub mod table;
pub mod validator;

pub use config::{ValidationConfig, ValidationConfigBuilder, UNKNOWN_COUNTRY_CODE};
pub use engine::{CancellationToken, EngineError, RunState, ValidationEngine, ValidationOutcome};
pub use feed::{open_feed, DirectoryFeed, FeedAccessor, FeedError, FeedSource, MemoryFeed, ZipFeed};
pub use notice::{NoticeCode, NoticeSeverity, ValidationNotice, VALIDATOR_ERROR};
pub use notice_store::{CodeSnapshot, NoticeStore, MAX_NOTICES_PER_TYPE_LIMIT};
pub use progress::{ProgressEvent, ProgressHandler};
pub use registry::{
    CostClass, ModeProfile, ParseModeError, RegisteredValidator, ResolvedPlan, ValidationMode,
    ValidatorCategory, ValidatorRegistry, ValidatorRegistryBuilder,
};
pub use table::{
    open_decoder, readable_table, RowPool, TableDecoder, TableError, TableHeader, TableRow,
    TableStream,
};
pub use validator::{run_isolated, Validator};

pub use gtfs_sieve_model as model;
