//! Watermark orchestrator.
//!
//! Tracks every eligible image inside the configured container, dispatches
//! each one to the renderer at most once per configuration, writes results
//! back into `src`/`srcset` and keeps the pristine values so later option
//! changes re-render from the original rather than from an already
//! watermarked image.
//!
//! All entry points that start work (`bootstrap`, `process`, `scan`,
//! `set_options`) spawn tokio tasks and must be called from within a runtime.
//!
//! # Staleness
//!
//! Every admitted render carries two tokens: the options generation it read
//! and a run number drawn from one counter shared by all images. When the
//! render finishes:
//!
//! - a forced restart (or a rebuilt record) fenced the run off: the result is
//!   dropped;
//! - the image was marked pending, or the generation moved on: the result is
//!   dropped and the image is reprocessed with force;
//! - otherwise the result is applied, even when a scan has re-admitted the
//!   image since (a timed-out render still lands). A failure is only applied
//!   by the latest run.

pub mod reconfigure;
pub mod state;

pub use state::{AttributeCache, Dispatch, ImageRecord, ParseState, SkipReason};

use crate::config::{ConfigStore, InstallMode, Options, Snapshot, Timing};
use crate::document::{Document, NodeId, MODE_ATTRIBUTE, PARSE_STATE_ATTRIBUTE};
use crate::error::ConfigError;
use crate::metrics::Metrics;
use crate::watermark::{
    pipeline, AttributeKind, DrawParams, RenderError, RenderResult, RenderSource, Renderer,
};
use parking_lot::Mutex;
use reconfigure::{FrameClock, Reconfiguration};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::Instrument;

/// Cheap-to-clone handle; all clones share one side table.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    document: Arc<dyn Document>,
    renderer: Arc<dyn Renderer>,
    store: ConfigStore,
    timing: Timing,
    records: Mutex<HashMap<NodeId, ImageRecord>>,
    container: Mutex<Option<NodeId>>,
    reconfiguration: Mutex<Reconfiguration>,
    observer: Mutex<Option<JoinHandle<()>>>,
    in_flight: AtomicUsize,
    /// Last run number handed out
    runs: AtomicU64,
    metrics: Metrics,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(observer) = self.observer.get_mut().take() {
            observer.abort();
        }
        self.reconfiguration.get_mut().cancel();
    }
}

impl Orchestrator {
    /// Options are not validated here; `InstallConfig::validate` covers the
    /// initial set and `set_options` validates replacements.
    pub fn new(
        document: Arc<dyn Document>,
        renderer: Arc<dyn Renderer>,
        options: Options,
        timing: Timing,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                document,
                renderer,
                store: ConfigStore::new(options),
                timing,
                records: Mutex::new(HashMap::new()),
                container: Mutex::new(None),
                reconfiguration: Mutex::new(Reconfiguration::default()),
                observer: Mutex::new(None),
                in_flight: AtomicUsize::new(0),
                runs: AtomicU64::new(0),
                metrics: Metrics::new(),
            }),
        }
    }

    /// Mark the install mode, locate the container, scan it and start
    /// watching it for insertions.
    ///
    /// Returns false, doing nothing else, if the container selector matches
    /// nothing.
    pub fn bootstrap(&self, mode: InstallMode) -> bool {
        let inner = &self.inner;
        inner
            .document
            .set_document_attribute(MODE_ATTRIBUTE, mode.as_str());

        let location = inner.store.load().options.advanced.location.clone();
        let Some(container) = inner.document.query_selector(&location) else {
            tracing::warn!(location = %location, "Watermark container not found");
            return false;
        };

        *inner.container.lock() = Some(container);
        tracing::info!(
            mode = mode.as_str(),
            location = %location,
            container = %container,
            "Watermarking started"
        );

        self.scan();
        self.observe(container);
        true
    }

    /// Start a render for `image` if it is eligible.
    ///
    /// `force` lets an image marked pending through; nothing lets a parsing
    /// or parsed image through.
    pub fn process(&self, image: NodeId, force: bool) -> Dispatch {
        let inner = &self.inner;
        if !inner.document.contains(image) {
            return Dispatch::Skipped(SkipReason::Detached);
        }

        let snapshot = inner.store.load();
        let advanced = &snapshot.options.advanced;
        let dimensions = inner.document.dimensions(image).unwrap_or_default();
        if dimensions.width < advanced.min_width || dimensions.height < advanced.min_height {
            tracing::trace!(
                image = %image,
                width = dimensions.width,
                height = dimensions.height,
                "Image below minimum size"
            );
            return Dispatch::Skipped(SkipReason::TooSmall);
        }

        let (run, source) = {
            let mut records = inner.records.lock();
            let record = records.entry(image).or_insert_with(|| {
                // Runs still in flight for a pruned record of this node must not write
                let fence = inner.runs.load(Ordering::SeqCst) + 1;
                ImageRecord::hydrate(inner.document.as_ref(), image, fence)
            });

            if let Err(reason) = record.admit(force) {
                return Dispatch::Skipped(reason);
            }

            let run = inner.runs.fetch_add(1, Ordering::SeqCst) + 1;
            record.begin_run(run);
            self.mirror_state(image, ParseState::Parsing);
            (run, self.effective_source(image, &record.cache))
        };

        self.dispatch(image, run, source, snapshot);
        Dispatch::Started
    }

    /// Process every image currently under the container.
    ///
    /// Records of nodes no longer in the document are dropped first. Returns
    /// how many renders were started.
    pub fn scan(&self) -> usize {
        let inner = &self.inner;
        let Some(container) = *inner.container.lock() else {
            return 0;
        };

        inner
            .records
            .lock()
            .retain(|id, _| inner.document.contains(*id));
        inner.metrics.increment_scans();

        let images = inner.document.images_under(container);
        let found = images.len();
        let started = images
            .into_iter()
            .filter(|image| self.process(*image, false).is_started())
            .count();

        tracing::debug!(found, started, "Scanned container");
        started
    }

    /// Replace the options and schedule a debounced forced reprocess of every
    /// image processed so far.
    ///
    /// Invalid options are rejected and leave everything untouched.
    pub fn set_options(&self, next: Options) -> Result<u64, ConfigError> {
        next.validate()?;
        let inner = &self.inner;
        let generation = inner.store.replace(next);
        inner.metrics.increment_reconfigurations();

        let marked: Vec<NodeId> = {
            let mut records = inner.records.lock();
            records
                .iter_mut()
                .map(|(image, record)| {
                    record.state = ParseState::Pending;
                    self.mirror_state(*image, ParseState::Pending);
                    *image
                })
                .collect()
        };

        tracing::info!(
            generation,
            images = marked.len(),
            delay_ms = inner.timing.reconfigure_delay_ms,
            "Options replaced; reprocessing scheduled"
        );

        let mut reconfiguration = inner.reconfiguration.lock();
        reconfiguration.mark(marked);

        let this = self.clone();
        let delay = inner.timing.reconfigure_delay();
        reconfiguration.replace_timer(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.flush_reconfiguration().await;
        }));

        Ok(generation)
    }

    /// Parse state of `image`; `Unset` if it was never admitted.
    pub fn state(&self, image: NodeId) -> ParseState {
        self.inner
            .records
            .lock()
            .get(&image)
            .map(|r| r.state)
            .unwrap_or_default()
    }

    /// Pristine value of `kind` saved before the first write, if any.
    pub fn cached_original(&self, image: NodeId, kind: AttributeKind) -> Option<String> {
        self.inner
            .records
            .lock()
            .get(&image)
            .and_then(|r| r.cache.get(kind).map(str::to_string))
    }

    pub fn container(&self) -> Option<NodeId> {
        *self.inner.container.lock()
    }

    pub fn options(&self) -> Arc<Snapshot> {
        self.inner.store.load()
    }

    pub fn generation(&self) -> u64 {
        self.inner.store.generation()
    }

    pub fn metrics(&self) -> &Metrics {
        &self.inner.metrics
    }

    /// Renders currently running (including ones flagged as timed out).
    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.load(Ordering::SeqCst)
    }

    /// Whether nothing is rendering and no reprocess batch is scheduled.
    pub fn is_idle(&self) -> bool {
        self.in_flight() == 0 && !self.inner.reconfiguration.lock().is_scheduled()
    }

    /// Poll until idle or until `limit` elapses. Returns whether idle was reached.
    pub async fn wait_idle(&self, limit: Duration) -> bool {
        let poll = self.inner.timing.frame_interval().max(Duration::from_millis(1));
        let deadline = tokio::time::Instant::now() + limit;

        loop {
            if self.is_idle() {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(poll).await;
        }
    }

    /// Stop observing and cancel any scheduled reprocess. Renders already in
    /// flight still finish and apply.
    pub fn shutdown(&self) {
        if let Some(observer) = self.inner.observer.lock().take() {
            observer.abort();
        }
        self.inner.reconfiguration.lock().cancel();
        tracing::info!("Watermarking stopped");
    }

    fn observe(&self, container: NodeId) {
        let mut changes = self.inner.document.observe(container);
        // Weak so the observer does not keep the orchestrator alive
        let weak = Arc::downgrade(&self.inner);

        let observer = tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                Orchestrator { inner }.scan();
            }
        });

        if let Some(previous) = self.inner.observer.lock().replace(observer) {
            previous.abort();
        }
    }

    fn effective_source(&self, image: NodeId, cache: &AttributeCache) -> RenderSource {
        let document = &self.inner.document;
        let live_srcset = document
            .attribute(image, AttributeKind::Srcset.as_str())
            .filter(|v| !v.trim().is_empty());

        match live_srcset {
            Some(live) => RenderSource::Set(
                cache
                    .get(AttributeKind::Srcset)
                    .map(str::to_string)
                    .unwrap_or(live),
            ),
            None => RenderSource::Single(
                cache
                    .get(AttributeKind::Src)
                    .map(str::to_string)
                    .or_else(|| document.attribute(image, AttributeKind::Src.as_str()))
                    .unwrap_or_default(),
            ),
        }
    }

    fn dispatch(&self, image: NodeId, run: u64, source: RenderSource, snapshot: Arc<Snapshot>) {
        let inner = &self.inner;
        inner.in_flight.fetch_add(1, Ordering::SeqCst);
        inner.metrics.increment_started();

        let params = DrawParams::from_options(&snapshot.options);
        let generation = snapshot.generation;
        let span = tracing::debug_span!(
            "render",
            image = %image,
            run,
            generation,
            attribute = %source.attribute()
        );

        let this = self.clone();
        tokio::spawn(
            async move {
                tracing::debug!("Render started");
                let watchdog = this.spawn_watchdog(image, run);
                let outcome = pipeline::render(this.inner.renderer.as_ref(), &source, &params).await;
                watchdog.abort();

                this.complete(image, run, generation, outcome);
                this.inner.in_flight.fetch_sub(1, Ordering::SeqCst);
            }
            .instrument(span),
        );
    }

    /// Flag the run as timed out if it is still parsing when the budget runs
    /// out. The render keeps going.
    fn spawn_watchdog(&self, image: NodeId, run: u64) -> JoinHandle<()> {
        let this = self.clone();
        let budget = self.inner.timing.render_timeout();

        tokio::spawn(async move {
            tokio::time::sleep(budget).await;

            let mut records = this.inner.records.lock();
            let Some(record) = records.get_mut(&image) else {
                return;
            };
            if !record.is_latest(run) || record.state != ParseState::Parsing {
                return;
            }

            record.state = ParseState::Timeout;
            this.mirror_state(image, ParseState::Timeout);
            this.inner.metrics.increment_timed_out();
            tracing::warn!(
                image = %image,
                run,
                timeout_ms = budget.as_millis() as u64,
                "Watermark timeout"
            );
        })
    }

    fn complete(
        &self,
        image: NodeId,
        run: u64,
        generation: u64,
        outcome: Result<RenderResult, RenderError>,
    ) {
        let inner = &self.inner;
        let current_generation = inner.store.generation();
        let mut records = inner.records.lock();

        let Some(record) = records.get_mut(&image) else {
            tracing::debug!("Image left the document; result dropped");
            return;
        };

        if record.is_fenced(run) {
            inner.metrics.increment_superseded();
            tracing::debug!(
                current_run = record.run,
                "Superseded by a forced restart; result dropped"
            );
            return;
        }

        if record.state == ParseState::Pending || generation != current_generation {
            record.state = ParseState::Pending;
            self.mirror_state(image, ParseState::Pending);
            drop(records);

            inner.metrics.increment_restarted();
            tracing::info!(
                current_generation,
                "Options changed during render; restarting"
            );
            self.process(image, true);
            return;
        }

        match outcome {
            Err(e) if !record.is_latest(run) => {
                inner.metrics.increment_superseded();
                tracing::debug!(
                    current_run = record.run,
                    error = %e,
                    "Earlier run failed while a newer one is in flight; ignored"
                );
            }
            Err(e) => {
                record.state = ParseState::Error;
                self.mirror_state(image, ParseState::Error);
                inner.metrics.increment_failed();
                tracing::error!(image = %image, error = %e, "Watermark error");
            }
            Ok(result) => {
                let kind = result.attribute;
                if record.cache.get(kind).is_none() {
                    if let Some(original) = inner.document.attribute(image, kind.as_str()) {
                        inner
                            .document
                            .set_attribute(image, kind.cache_attribute(), &original);
                        record.cache.remember(kind, original);
                    }
                }

                inner.document.set_attribute(image, kind.as_str(), &result.value);
                record.state = ParseState::Parsed;
                self.mirror_state(image, ParseState::Parsed);
                inner.metrics.increment_succeeded();
                tracing::debug!(attribute = %kind, "Watermark applied");
            }
        }
    }

    async fn flush_reconfiguration(&self) {
        let batch = self.inner.reconfiguration.lock().take_pending();
        tracing::debug!(images = batch.len(), "Reprocessing after options change");

        let mut clock = FrameClock::new(self.inner.timing.frame_interval());
        for image in batch {
            clock.next_frame().await;
            self.process(image, true);
        }
    }

    fn mirror_state(&self, image: NodeId, state: ParseState) {
        if let Some(value) = state.as_attribute() {
            self.inner
                .document
                .set_attribute(image, PARSE_STATE_ATTRIBUTE, value);
        }
    }
}
