//! The extraction half of a content kind.

use crate::error::Result;
use crate::job::ContentJob;
use async_trait::async_trait;
use tome_cache::{FieldPatch, FileRecord};
use tome_config::Settings;
use tome_extract::ContentKind;

/// What a settings change means for the cached field of one kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Regeneration {
    /// Nothing relevant changed.
    None,
    /// The kind was disabled: drop the cached field everywhere.
    Clear,
    /// The kind was enabled or reconfigured: drop the field and recompute it
    /// for every file.
    Reprocess,
}

/// How one content kind decides what to process and computes its field.
///
/// A strategy never writes to the cache itself; it returns a value of its
/// [`Output`](Self::Output) type and the [`Scheduler`](crate::Scheduler)
/// persists it. `Output` converts into exactly one [`FieldPatch`] variant, so
/// a strategy can only ever write its own field. Side effects that must
/// follow the write (or be undone without it) belong in
/// [`committed()`](Self::committed) and [`discarded()`](Self::discarded).
#[async_trait]
pub trait ContentStrategy: Send + Sync + 'static {
    const KIND: ContentKind;
    /// Carried from [`needs_processing()`](Self::needs_processing) to
    /// [`process_file()`](Self::process_file) on the job.
    type Scratch: Default + Send + Sync + 'static;
    type Output: Into<FieldPatch> + Clone + Send + Sync;

    fn enabled(&self, settings: &Settings) -> bool;

    /// Cheap check run for every queued job. The default processes enabled
    /// documents whose stamp for this kind doesn't match the file.
    async fn needs_processing(
        &self,
        job: &mut ContentJob<Self::Scratch>,
        record: Option<&FileRecord>,
        settings: &Settings,
    ) -> Result<bool> {
        Ok(self.enabled(settings) && job.file.kind().is_document() && is_stale::<Self>(job, record))
    }

    /// Compute the new value, or `None` to leave the cached one (and its
    /// stamp) untouched. A value equal to the cached one is not written
    /// again; the file is only stamped.
    async fn process_file(
        &self,
        job: &ContentJob<Self::Scratch>,
        record: Option<&FileRecord>,
        settings: &Settings,
    ) -> Result<Option<Self::Output>>;

    /// Runs once `output` is in the cache, either written or found equal to
    /// the cached value, and the file is stamped. `record` is the record as
    /// it was before the batch. Returns `true` if the file has to be
    /// processed again.
    async fn committed(
        &self,
        _job: &ContentJob<Self::Scratch>,
        _record: Option<&FileRecord>,
        _output: &Self::Output,
    ) -> Result<bool> {
        Ok(false)
    }

    /// Runs for an output that will never be written: its batch was
    /// stopped, the write failed, or the file went away meanwhile.
    async fn discarded(&self, _job: &ContentJob<Self::Scratch>, _record: Option<&FileRecord>, _output: &Self::Output) {}

    fn should_regenerate(&self, old: &Settings, new: &Settings) -> Regeneration;
}

/// Whether the cached field of `S`'s kind is out of date for the job's file.
pub fn is_stale<S: ContentStrategy + ?Sized>(job: &ContentJob<S::Scratch>, record: Option<&FileRecord>) -> bool {
    job.force || record.and_then(|r| r.stamp(S::KIND)) != Some(job.file.mtime)
}

/// Shared [`should_regenerate()`](ContentStrategy::should_regenerate) logic
/// for a settings section with an `enabled` switch.
pub(crate) fn regeneration<T: PartialEq>(old: &T, new: &T, enabled: bool) -> Regeneration {
    match (old == new, enabled) {
        (true, _) => Regeneration::None,
        (false, false) => Regeneration::Clear,
        (false, true) => Regeneration::Reprocess,
    }
}
