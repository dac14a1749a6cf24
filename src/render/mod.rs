//! Render pipeline: slot pool, active registry, render and prefetch lanes

mod buffer;
pub mod pool;
mod prefetch;
pub mod registry;
mod request;
mod scheduler;
mod worker;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use flume::{Receiver, RecvTimeoutError};
use log::{debug, error, info, warn};

pub use buffer::{BYTES_PER_PIXEL, PixelBuffer};
pub use pool::{DEFAULT_POOL_SIZE, PageSlot, SlotId, SlotPool};
pub use prefetch::{DEFAULT_PREFETCH_DEPTH, Prefetcher};
pub use registry::ActiveRegistry;
pub use request::{
    ContentId, LaneEvent, PrefetchCommand, RenderCommand, RenderJob, RenderRequest, RenderTarget,
    RequestId, ViewerEvent,
};
pub use scheduler::{RenderScheduler, Submission};
pub use worker::{PREFETCH_LANE_NAME, RENDER_LANE_NAME};

use crate::document::{Document, DocumentSource, PageGeometry, RasterEngine};
use crate::error::{ViewerError, ViewerResult};
use crate::settings::ViewerSettings;

/// Counters describing what the pipeline has done so far
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Renders sent to the render lane
    pub dispatched: usize,
    /// Requests parked behind a render in flight
    pub coalesced: usize,
    /// Renders presented to their slot
    pub completed: usize,
    /// Stale completions dropped by the generation check
    pub discarded: usize,
    /// Renders that failed to decode or rasterize
    pub failed: usize,
    /// Pages decoded by the prefetch lane
    pub prefetched: usize,
}

/// One viewer session: a document, its slots and the two lanes working on it.
///
/// All methods are meant to be called from a single presentation thread.
/// None of them call into the decoder; page sizes that are not known yet are
/// looked up on the render lane through [`measure`](Self::measure).
pub struct Pipeline {
    doc: Arc<Document>,
    settings: ViewerSettings,
    pool: SlotPool,
    registry: ActiveRegistry,
    scheduler: RenderScheduler,
    prefetcher: Prefetcher,
    events: Receiver<LaneEvent>,
    lanes: Vec<JoinHandle<()>>,
    stats: PipelineStats,
    closed: bool,
}

impl Pipeline {
    /// Open `source` and start the render and prefetch lanes
    pub fn open(
        engine: &dyn RasterEngine,
        source: &DocumentSource,
        settings: ViewerSettings,
    ) -> ViewerResult<Self> {
        let settings = settings.validated();
        let doc = Arc::new(Document::open(
            engine,
            source,
            settings.geometry_cache_size,
        )?);

        let (render_tx, render_rx) = flume::unbounded();
        let (prefetch_tx, prefetch_rx) = flume::unbounded();
        let (event_tx, event_rx) = flume::unbounded();

        let lane_error = |e: std::io::Error| {
            doc.close();
            ViewerError::open(source.describe(), format!("could not start lane: {e}"))
        };

        let render_lane = {
            let doc = doc.clone();
            let events = event_tx.clone();
            worker::spawn_lane(RENDER_LANE_NAME, move || {
                worker::render_lane(doc, render_rx, events);
            })
            .map_err(lane_error)?
        };

        let prefetch_lane = {
            let doc = doc.clone();
            worker::spawn_lane(PREFETCH_LANE_NAME, move || {
                worker::prefetch_lane(doc, prefetch_rx, event_tx);
            })
        };
        let prefetch_lane = match prefetch_lane {
            Ok(lane) => lane,
            Err(e) => {
                let _ = render_tx.send(RenderCommand::Shutdown);
                let _ = render_lane.join();
                return Err(lane_error(e));
            }
        };

        info!(
            "pipeline started: {} pages, {} slots, prefetch depth {}",
            doc.page_count(),
            settings.pool_size,
            settings.prefetch_depth
        );

        Ok(Self {
            pool: SlotPool::new(settings.pool_size),
            registry: ActiveRegistry::new(),
            scheduler: RenderScheduler::new(render_tx),
            prefetcher: Prefetcher::new(prefetch_tx, settings.prefetch_depth, doc.page_count()),
            events: event_rx,
            lanes: vec![render_lane, prefetch_lane],
            stats: PipelineStats::default(),
            closed: false,
            doc,
            settings,
        })
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.doc.page_count()
    }

    /// Size of `page` if a lane has already measured it
    #[must_use]
    pub fn page_size(&self, page: usize) -> Option<PageGeometry> {
        self.doc.cached_page_size(page)
    }

    #[must_use]
    pub fn settings(&self) -> &ViewerSettings {
        &self.settings
    }

    #[must_use]
    pub fn stats(&self) -> PipelineStats {
        self.stats
    }

    #[must_use]
    pub fn pool(&self) -> &SlotPool {
        &self.pool
    }

    #[must_use]
    pub fn registry(&self) -> &ActiveRegistry {
        &self.registry
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_page(&self, page: usize) -> ViewerResult<()> {
        if self.closed {
            return Err(ViewerError::Closed);
        }
        let page_count = self.page_count();
        if page >= page_count {
            return Err(ViewerError::PageIndex {
                index: page,
                page_count,
            });
        }
        Ok(())
    }

    /// Take a slot from the pool and make it active for `page`
    pub fn bind_page(&mut self, page: usize) -> ViewerResult<SlotId> {
        self.check_page(page)?;
        let slot = self.pool.acquire();
        let id = self.registry.bind(slot, page);
        debug!("{id} bound to page {page}");
        Ok(id)
    }

    /// Point an active slot at another page. Renders in flight for the old
    /// page become stale and a parked one is dropped.
    pub fn rebind(&mut self, slot: SlotId, page: usize) -> ViewerResult<bool> {
        self.check_page(page)?;
        if !self.registry.rebind(slot, page) {
            return Ok(false);
        }
        self.scheduler.forget(slot);
        debug!("{slot} rebound to page {page}");
        Ok(true)
    }

    /// Release the oldest slot showing `page`
    pub fn unbind_page(&mut self, page: usize) -> Option<SlotId> {
        let id = self.registry.unbind_page(page, &mut self.pool)?;
        self.scheduler.forget(id);
        debug!("{id} released from page {page}");
        Some(id)
    }

    pub fn unbind_slot(&mut self, slot: SlotId) -> Option<SlotId> {
        let id = self.registry.unbind_slot(slot, &mut self.pool)?;
        self.scheduler.forget(id);
        debug!("{id} released");
        Some(id)
    }

    /// Full-page render of the slot's bound page at the configured scale
    pub fn render_bound_page(&mut self, slot: SlotId) -> ViewerResult<Submission> {
        let Some(page) = self.registry.get(slot).and_then(PageSlot::bound_page) else {
            return Ok(Submission::Inactive);
        };
        let request = RenderRequest::full_page(page, self.settings.render_scale);
        self.request_render(slot, request)
    }

    /// Submit a render into an active slot
    pub fn request_render(
        &mut self,
        slot: SlotId,
        request: RenderRequest,
    ) -> ViewerResult<Submission> {
        self.check_page(request.page)?;
        Ok(self.submit(slot, request))
    }

    fn submit(&mut self, slot: SlotId, request: RenderRequest) -> Submission {
        let Some(active) = self.registry.get_mut(slot) else {
            debug!("{slot}: render for page {} ignored, slot inactive", request.page);
            return Submission::Inactive;
        };
        if active.bound_page() != Some(request.page) {
            debug!(
                "{slot}: render for page {} ignored, slot shows {:?}",
                request.page,
                active.bound_page()
            );
            return Submission::OtherPage;
        }

        let outcome = self.scheduler.submit(active, request);
        self.record_submission(outcome);
        outcome
    }

    /// Intrinsic size of the page bound to `slot`.
    ///
    /// A size some lane already looked up is returned right away. Otherwise
    /// the render lane measures the page and a [`ViewerEvent::PageMeasured`]
    /// follows from [`poll`](Self::poll); `None` is returned meanwhile.
    pub fn measure(&mut self, slot: SlotId) -> ViewerResult<Option<PageGeometry>> {
        if self.closed {
            return Err(ViewerError::Closed);
        }
        let Some(page) = self.registry.get(slot).and_then(PageSlot::bound_page) else {
            debug!("{slot}: measure ignored, slot inactive");
            return Ok(None);
        };

        if let Some(geometry) = self.doc.cached_page_size(page) {
            return Ok(Some(geometry));
        }
        self.scheduler.measure(slot, page);
        Ok(None)
    }

    fn record_submission(&mut self, outcome: Submission) {
        match outcome {
            Submission::Dispatched(_) => self.stats.dispatched += 1,
            Submission::Coalesced => self.stats.coalesced += 1,
            Submission::Inactive | Submission::OtherPage | Submission::LaneClosed => {}
        }
    }

    /// Queue decode-only work for the pages after `page`
    pub fn prefetch(&mut self, page: usize) -> Vec<usize> {
        if self.closed {
            return Vec::new();
        }
        self.prefetcher.prefetch(page)
    }

    /// Buffer a presenter should draw for `slot`
    #[must_use]
    pub fn visible(&self, slot: SlotId) -> Option<&PixelBuffer> {
        self.registry.get(slot).and_then(PageSlot::visible)
    }

    /// Identity of what `slot` currently shows
    #[must_use]
    pub fn content_id(&self, slot: SlotId) -> Option<ContentId> {
        let active = self.registry.get(slot)?;
        active
            .presented_generation()
            .map(|generation| ContentId { slot, generation })
    }

    /// True when no render, size lookup or prefetch is outstanding
    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.scheduler.in_flight_len() == 0
            && self.scheduler.measuring_len() == 0
            && self.prefetcher.outstanding() == 0
    }

    /// Drain lane completions without blocking
    pub fn poll(&mut self) -> Vec<ViewerEvent> {
        let mut out = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            self.handle(event, &mut out);
        }
        out
    }

    /// Block until both lanes are idle or `timeout` passes. Never call this
    /// from a latency sensitive thread.
    pub fn settle(&mut self, timeout: Duration) -> Vec<ViewerEvent> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        while !self.is_idle() {
            match self.events.recv_deadline(deadline) {
                Ok(event) => self.handle(event, &mut out),
                Err(RecvTimeoutError::Timeout) => {
                    warn!(
                        "settle timed out with {} renders, {} size lookups and {} prefetches outstanding",
                        self.scheduler.in_flight_len(),
                        self.scheduler.measuring_len(),
                        self.prefetcher.outstanding()
                    );
                    break;
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        out
    }

    fn handle(&mut self, event: LaneEvent, out: &mut Vec<ViewerEvent>) {
        match event {
            LaneEvent::Rendered {
                id,
                slot,
                generation,
                page,
                buffer,
                result,
            } => {
                let pending = self.scheduler.finish(slot);
                out.push(self.complete_render(slot, generation, page, buffer, result));
                debug!("{slot}: render {} for page {page} finished", id.0);

                if let Some(request) = pending.filter(|_| !self.closed) {
                    self.submit(slot, request);
                }
            }
            LaneEvent::Measured { slot, page, result } => {
                self.scheduler.measured();
                let bound = self.registry.get(slot).and_then(PageSlot::bound_page);
                if bound != Some(page) {
                    debug!("{slot}: size of page {page} arrived after the slot moved on");
                    return;
                }
                match result {
                    Ok(geometry) => out.push(ViewerEvent::PageMeasured {
                        slot,
                        page,
                        geometry,
                    }),
                    Err(error) => {
                        self.stats.failed += 1;
                        out.push(ViewerEvent::RenderFailed { slot, page, error });
                    }
                }
            }
            LaneEvent::Prefetched { page, decoded } => {
                self.prefetcher.complete();
                if decoded {
                    self.stats.prefetched += 1;
                    debug!("page {page} prefetched");
                }
            }
            LaneEvent::PrefetchFailed { .. } => self.prefetcher.complete(),
        }
    }

    fn complete_render(
        &mut self,
        slot: SlotId,
        generation: u64,
        page: usize,
        buffer: PixelBuffer,
        result: ViewerResult<()>,
    ) -> ViewerEvent {
        let Some(active) = self.registry.get_mut(slot) else {
            self.pool.restore_target(slot, buffer);
            self.stats.discarded += 1;
            debug!("{slot}: dropped render for page {page}, slot was released");
            return ViewerEvent::RenderDiscarded { slot, page };
        };

        if active.generation() != generation {
            active.restore_target(buffer);
            self.stats.discarded += 1;
            debug!(
                "{slot}: dropped stale render for page {page} (generation {generation}, now {})",
                active.generation()
            );
            return ViewerEvent::RenderDiscarded { slot, page };
        }

        match result {
            Ok(()) => {
                active.present(buffer, generation);
                self.stats.completed += 1;
                ViewerEvent::PageReady {
                    slot,
                    page,
                    content: ContentId { slot, generation },
                }
            }
            Err(error) => {
                active.restore_target(buffer);
                self.stats.failed += 1;
                ViewerEvent::RenderFailed { slot, page, error }
            }
        }
    }

    /// Stop both lanes, release every slot and close the document. Safe to
    /// call more than once.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        self.scheduler.shutdown();
        self.prefetcher.shutdown();
        for lane in self.lanes.drain(..) {
            let name = lane.thread().name().unwrap_or("lane").to_string();
            if lane.join().is_err() {
                error!("{name} panicked before shutdown");
            }
        }

        // returned buffers go back to their slots before the slots are released
        while let Ok(event) = self.events.try_recv() {
            let mut dropped = Vec::new();
            self.handle(event, &mut dropped);
        }
        self.registry.drain_into(&mut self.pool);
        self.doc.close();
        info!("pipeline closed");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.close();
    }
}
