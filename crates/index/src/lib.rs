//! Incremental indexing of derived content.
//!
//! Every content kind (tags, preview, metadata, feature image) gets its own
//! [`Scheduler`], driving a [`ContentStrategy`] that decides which files are
//! stale and computes their new value. Schedulers deduplicate and debounce
//! incoming work, process it in bounded batches and write the results to the
//! content cache. [`ContentPipeline`] owns the four schedulers and turns
//! vault events and settings changes into scheduler calls.
//!
//! Feature images may come from attachments that have to be rasterized
//! first; [`DependencyTracker`] keeps track of which documents show which
//! render so renders are produced once and deleted when nothing uses them.

pub mod error;
mod job;
mod pipeline;
pub mod providers;
mod scheduler;
mod strategy;

pub use crate::job::ContentJob;
pub use crate::pipeline::ContentPipeline;
pub use crate::providers::{DependencyTracker, FeatureImageDependencies};
pub use crate::scheduler::{BATCH_SIZE, PARALLEL_LIMIT, Scheduler, SchedulerStatus};
pub use crate::strategy::{ContentStrategy, Regeneration, is_stale};
