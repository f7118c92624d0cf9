//! Debounced, deduplicated batch processing for one content kind.
//!
//! ```text
//!            queue_files + start_processing
//!   Idle ────────────────────────────────────▶ Debouncing(timer)
//!    ▲                                             │ timer fires
//!    │ queue drained                               ▼
//!    └──────────────────────────────────────── Running(token) ──┐
//!                                                  ▲            │ next batch
//!                                                  └────────────┘
//!   any state ── stop_processing ──▶ Stopped ── start_processing ──▶ Debouncing
//! ```
//!
//! Every `start_processing()` and `stop_processing()` opens a new
//! generation. A timer or batch loop only acts while its generation is the
//! current one, so a superseded loop can finish its group but never takes
//! another batch or touches the phase. At most one loop runs at a time.

use crate::job::ContentJob;
use crate::strategy::ContentStrategy;
use futures::future::join_all;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, watch};
use tokio_util::sync::CancellationToken;
use tome_cache::{CacheHandle, FieldPatch, FileRecord, ProcessResult};
use tome_config::Settings;
use tome_storage::FileRef;
use tracing::instrument;

/// Most jobs taken off the queue per batch.
pub const BATCH_SIZE: usize = 100;
/// Most files processed concurrently within a batch.
pub const PARALLEL_LIMIT: usize = 10;

/// Observable scheduler state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerStatus {
    Idle,
    Debouncing,
    Running,
    Stopped,
}

/// Each state owns the one resource that can interrupt it.
enum Phase {
    Idle,
    Debouncing(CancellationToken),
    Running(CancellationToken),
    Stopped,
}

struct State<T> {
    phase: Phase,
    generation: u64,
    settings: Option<Arc<Settings>>,
    queue: VecDeque<ContentJob<T>>,
    queued: HashSet<PathBuf>,
    /// Path to the mtime being processed.
    in_flight: HashMap<PathBuf, i64>,
    /// In-flight paths whose file went away; their results are dropped.
    forgotten: HashSet<PathBuf>,
}

/// A batch entry: the job and the record it was checked against.
type Pending<T> = (ContentJob<T>, Option<FileRecord>);

struct Inner<S: ContentStrategy> {
    strategy: S,
    cache: CacheHandle,
    state: Mutex<State<S::Scratch>>,
    idle: watch::Sender<bool>,
    /// Held by the batch loop for as long as it runs.
    looping: AsyncMutex<()>,
    /// Held while results are written, and by `forget()`.
    commits: AsyncMutex<()>,
}

/// Job queue and batch loop for one [`ContentStrategy`].
///
/// Cloning is cheap; clones share the same queue.
pub struct Scheduler<S: ContentStrategy> {
    inner: Arc<Inner<S>>,
}
impl<S: ContentStrategy> Clone for Scheduler<S> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone() }
    }
}

impl<S: ContentStrategy> Scheduler<S> {
    pub fn new(strategy: S, cache: CacheHandle) -> Self {
        let state = State {
            phase: Phase::Idle,
            generation: 0,
            settings: None,
            queue: VecDeque::new(),
            queued: HashSet::new(),
            in_flight: HashMap::new(),
            forgotten: HashSet::new(),
        };
        let (idle, _) = watch::channel(true);
        let inner = Inner {
            strategy,
            cache,
            state: Mutex::new(state),
            idle,
            looping: AsyncMutex::new(()),
            commits: AsyncMutex::new(()),
        };
        Self { inner: Arc::new(inner) }
    }

    pub fn strategy(&self) -> &S {
        &self.inner.strategy
    }

    /// Queue files for processing. Files already queued have their details
    /// refreshed; files being processed right now at the same mtime are
    /// skipped. Ignored while stopped.
    pub fn queue_files(&self, files: impl IntoIterator<Item = FileRef>) {
        self.inner.enqueue(files, false);
    }

    /// Like [`queue_files()`](Self::queue_files), but the files are
    /// processed even if their cached stamp is current.
    pub fn queue_forced(&self, files: impl IntoIterator<Item = FileRef>) {
        self.inner.enqueue(files, true);
    }

    /// Drop a file's queued job, and any result still being computed for
    /// it, e.g. because the file was deleted. Once this returns, nothing for
    /// `path` is written until it is queued again.
    pub async fn forget(&self, path: &Path) {
        let _commits = self.inner.commits.lock().await;
        let mut state = self.inner.lock();
        if state.queued.remove(path) {
            state.queue.retain(|job| job.file.path != path);
        }
        if state.in_flight.contains_key(path) {
            state.forgotten.insert(path.to_path_buf());
        }
    }

    /// Record the settings and (re)start the debounce timer. Resumes a
    /// stopped scheduler. While a batch loop is running the queue is picked
    /// up by that loop instead.
    pub fn start_processing(&self, settings: Arc<Settings>) {
        let mut state = self.inner.lock();
        let delay = Duration::from_millis(settings.debounce_ms);
        state.settings = Some(settings);
        match &state.phase {
            Phase::Running(_) => return,
            Phase::Debouncing(timer) => timer.cancel(),
            Phase::Idle | Phase::Stopped => {},
        }
        state.generation += 1;
        let generation = state.generation;
        let timer = CancellationToken::new();
        let cancelled = timer.clone();
        let inner = self.inner.clone();
        tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {},
                () = tokio::time::sleep(delay) => inner.run(generation).await,
            }
        });
        state.phase = Phase::Debouncing(timer);
        self.inner.idle.send_replace(false);
    }

    /// Swap the settings used by subsequent batches; a running batch keeps
    /// the snapshot it started with.
    pub fn on_settings_changed(&self, settings: Arc<Settings>) {
        self.inner.lock().settings = Some(settings);
    }

    /// Cancel the timer and any running batch, and forget every queued job.
    /// A cancelled batch writes nothing.
    pub fn stop_processing(&self) {
        let mut state = self.inner.lock();
        state.generation += 1;
        match std::mem::replace(&mut state.phase, Phase::Stopped) {
            Phase::Debouncing(token) | Phase::Running(token) => token.cancel(),
            Phase::Idle | Phase::Stopped => {},
        }
        state.queue.clear();
        state.queued.clear();
        state.in_flight.clear();
        state.forgotten.clear();
        self.inner.idle.send_replace(true);
    }

    /// Clear this kind's field on every cached record.
    pub async fn clear_content(&self) -> tome_cache::error::Result<()> {
        tracing::info!(kind = %S::KIND, "clearing cached content");
        self.inner.cache.clear_field(S::KIND).await
    }

    /// Resolves once the scheduler is neither debouncing nor running.
    pub async fn wait_idle(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this can't fail.
        _ = idle.wait_for(|idle| *idle).await;
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn status(&self) -> SchedulerStatus {
        match self.inner.lock().phase {
            Phase::Idle => SchedulerStatus::Idle,
            Phase::Debouncing(_) => SchedulerStatus::Debouncing,
            Phase::Running(_) => SchedulerStatus::Running,
            Phase::Stopped => SchedulerStatus::Stopped,
        }
    }
}

impl<S: ContentStrategy> Inner<S> {
    fn lock(&self) -> MutexGuard<'_, State<S::Scratch>> {
        // A panic while holding the lock leaves the state consistent enough
        // to keep going: every mutation is a single collection operation.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn enqueue(&self, files: impl IntoIterator<Item = FileRef>, force: bool) {
        let mut state = self.lock();
        if matches!(state.phase, Phase::Stopped) {
            return;
        }
        let state = &mut *state;
        for file in files {
            if state.queued.contains(&file.path) {
                if let Some(job) = state.queue.iter_mut().find(|job| job.file.path == file.path) {
                    job.force |= force;
                    job.file = file;
                }
                continue;
            }
            let current = state.in_flight.get(&file.path) == Some(&file.mtime) && !state.forgotten.contains(&file.path);
            if !force && current {
                continue;
            }
            state.queued.insert(file.path.clone());
            state.queue.push_back(ContentJob::new(file, force));
        }
    }

    /// Batch loop of one generation, entered when its debounce timer fires.
    async fn run(self: Arc<Self>, generation: u64) {
        // A stopped loop may still be finishing its last group.
        let _looping = self.looping.lock().await;
        while let Some((jobs, settings, token)) = self.next_batch(generation) {
            let worked = self.process_batch(jobs, &settings, &token).await;
            if token.is_cancelled() {
                // Stopped: `stop_processing()` already reset the state.
                return;
            }
            if worked {
                tokio::task::yield_now().await;
            }
        }
    }

    /// Take the next batch off the queue and enter `Running`, or go `Idle`
    /// when there is nothing (or no settings) to work with. Returns `None`
    /// without touching the state once `generation` is superseded.
    fn next_batch(&self, generation: u64) -> Option<(Vec<ContentJob<S::Scratch>>, Arc<Settings>, CancellationToken)> {
        let mut state = self.lock();
        if state.generation != generation {
            tracing::trace!(kind = %S::KIND, generation, "batch loop superseded");
            return None;
        }
        let settings = match &state.settings {
            Some(settings) if !state.queue.is_empty() => settings.clone(),
            _ => {
                state.phase = Phase::Idle;
                self.idle.send_replace(true);
                return None;
            },
        };
        let take = state.queue.len().min(BATCH_SIZE);
        let jobs: Vec<_> = state.queue.drain(..take).collect();
        for job in &jobs {
            state.queued.remove(&job.file.path);
        }
        let token = CancellationToken::new();
        state.phase = Phase::Running(token.clone());
        Some((jobs, settings, token))
    }

    /// Returns whether any job needed processing.
    #[instrument(skip_all, fields(kind = %S::KIND, jobs = jobs.len()))]
    async fn process_batch(
        &self,
        jobs: Vec<ContentJob<S::Scratch>>,
        settings: &Settings,
        token: &CancellationToken,
    ) -> bool {
        let mut pending: Vec<Pending<S::Scratch>> = Vec::with_capacity(jobs.len());
        for mut job in jobs {
            let record = match self.cache.get_record(&job.file.path).await {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %job.file.path.display(), error = ?e, "cache lookup failed");
                    continue;
                },
            };
            match self.strategy.needs_processing(&mut job, record.as_ref(), settings).await {
                Ok(true) => pending.push((job, record)),
                Ok(false) => {},
                Err(e) => tracing::warn!(path = %job.file.path.display(), error = ?e, "could not check file"),
            }
        }
        if pending.is_empty() {
            tracing::trace!("nothing to process");
            return false;
        }
        {
            let mut state = self.lock();
            if token.is_cancelled() {
                return true;
            }
            for (job, _) in &pending {
                state.in_flight.insert(job.file.path.clone(), job.file.mtime);
            }
        }

        let mut done = Vec::new();
        for (start, group) in (0..).step_by(PARALLEL_LIMIT).zip(pending.chunks(PARALLEL_LIMIT)) {
            if token.is_cancelled() {
                break;
            }
            let outputs = join_all(group.iter().map(|(job, record)| self.process_one(job, record.as_ref(), settings))).await;
            done.extend(outputs.into_iter().enumerate().filter_map(|(i, output)| Some((start + i, output?))));
        }

        if !done.is_empty() {
            self.commit(&pending, done, token).await;
        }
        let mut state = self.lock();
        for (job, _) in &pending {
            state.in_flight.remove(&job.file.path);
            state.forgotten.remove(&job.file.path);
        }
        true
    }

    async fn process_one(
        &self,
        job: &ContentJob<S::Scratch>,
        record: Option<&FileRecord>,
        settings: &Settings,
    ) -> Option<S::Output> {
        match self.strategy.process_file(job, record, settings).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(kind = %S::KIND, path = %job.file.path.display(), error = ?e, "extraction failed");
                None
            },
        }
    }

    /// Store the batch's outputs, unless the batch was stopped. Outputs of
    /// files forgotten while they were processed are discarded, after the
    /// rest are stored.
    async fn commit(&self, pending: &[Pending<S::Scratch>], done: Vec<(usize, S::Output)>, token: &CancellationToken) {
        let commits = self.commits.lock().await;
        let (kept, dropped): (Vec<_>, Vec<_>) = {
            let state = self.lock();
            let cancelled = token.is_cancelled();
            done.into_iter().partition(|(i, _)| !cancelled && !state.forgotten.contains(&pending[*i].0.file.path))
        };
        let again = match kept.is_empty() {
            true => Vec::new(),
            false => self.store(pending, &kept).await,
        };
        if !dropped.is_empty() {
            tracing::debug!(kind = %S::KIND, dropped = dropped.len(), "discarding results");
            self.discard(pending, &dropped).await;
        }
        drop(commits);
        if !again.is_empty() {
            tracing::debug!(kind = %S::KIND, files = again.len(), "processing again");
            self.enqueue(again, true);
        }
    }

    /// Write the outputs that change something, stamp every file that got
    /// one, then let the strategy follow up. Returns the files the strategy
    /// wants processed again.
    async fn store(&self, pending: &[Pending<S::Scratch>], kept: &[(usize, S::Output)]) -> Vec<FileRef> {
        let writes: Vec<ProcessResult> = kept
            .iter()
            .filter_map(|(i, output)| {
                let (job, record) = &pending[*i];
                let patch: FieldPatch = output.clone().into();
                match record {
                    Some(record) if record.holds(&patch) => None,
                    _ => Some(ProcessResult { path: job.file.path.clone(), patch }),
                }
            })
            .collect();
        if !writes.is_empty()
            && let Err(e) = self.cache.batch_update(&writes).await
        {
            tracing::error!(kind = %S::KIND, results = writes.len(), error = ?e, "cache write failed; batch dropped");
            self.discard(pending, kept).await;
            return Vec::new();
        }
        let mtimes: Vec<(PathBuf, i64)> =
            kept.iter().map(|(i, _)| (pending[*i].0.file.path.clone(), pending[*i].0.file.mtime)).collect();
        match self.cache.update_mtimes(S::KIND, &mtimes).await {
            Ok(()) => tracing::debug!(kind = %S::KIND, written = writes.len(), stamped = mtimes.len(), "batch committed"),
            Err(e) => tracing::error!(kind = %S::KIND, error = ?e, "stamp update failed"),
        }

        let mut again = Vec::new();
        for (i, output) in kept {
            let (job, record) = &pending[*i];
            match self.strategy.committed(job, record.as_ref(), output).await {
                Ok(true) => again.push(job.file.clone()),
                Ok(false) => {},
                Err(e) => tracing::warn!(kind = %S::KIND, path = %job.file.path.display(), error = ?e, "follow-up failed"),
            }
        }
        again
    }

    async fn discard(&self, pending: &[Pending<S::Scratch>], outputs: &[(usize, S::Output)]) {
        for (i, output) in outputs {
            let (job, record) = &pending[*i];
            self.strategy.discarded(job, record.as_ref(), output).await;
        }
    }
}
