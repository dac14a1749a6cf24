//! Single-surface presentation with pan, pinch zoom and fling navigation

use std::time::{Duration, Instant};

use log::{debug, warn};

use super::viewport::{Gesture, Viewport, ViewportEffect};
use crate::document::{DocumentSource, PageGeometry, RasterEngine, Size};
use crate::error::ViewerResult;
use crate::render::{ContentId, Pipeline, PixelBuffer, RenderRequest, SlotId, ViewerEvent};
use crate::settings::ViewerSettings;

/// Viewer drawing one page at a time onto a screen-sized surface.
///
/// Every viewport change renders the visible region through the render
/// lane. A burst of drags collapses into the latest region because the
/// slot keeps a single pending render behind the one in flight.
///
/// A page whose size is not known yet is laid out once the render lane
/// reports it, from [`poll`](Self::poll) or [`settle`](Self::settle).
pub struct FreePanViewer {
    pipeline: Pipeline,
    viewport: Viewport,
    slot: Option<SlotId>,
    awaiting: Option<usize>,
}

impl FreePanViewer {
    /// Open `source` and show its first page fitted to `screen`
    pub fn open(
        engine: &dyn RasterEngine,
        source: &DocumentSource,
        settings: ViewerSettings,
        screen: Size,
    ) -> ViewerResult<Self> {
        let pipeline = Pipeline::open(engine, source, settings)?;
        let viewport = Viewport::new(
            screen,
            pipeline.page_count(),
            pipeline.settings().fling_threshold,
        );
        let mut viewer = Self {
            pipeline,
            viewport,
            slot: None,
            awaiting: None,
        };

        if viewer.pipeline.page_count() > 0 {
            viewer.show_page(0)?;
        } else {
            warn!("document has no pages");
        }
        Ok(viewer)
    }

    /// Jump to `page` at fit-to-screen
    pub fn show_page(&mut self, page: usize) -> ViewerResult<()> {
        let slot = match self.slot {
            Some(slot) => {
                self.pipeline.rebind(slot, page)?;
                slot
            }
            None => {
                let slot = self.pipeline.bind_page(page)?;
                self.slot = Some(slot);
                slot
            }
        };

        self.viewport.begin_page(page);
        match self.pipeline.measure(slot)? {
            Some(geometry) => {
                self.awaiting = None;
                self.lay_out(page, geometry)?;
            }
            None => {
                self.awaiting = Some(page);
                debug!("{slot} waiting for the size of page {page}");
            }
        }
        self.pipeline.prefetch(page);
        Ok(())
    }

    fn lay_out(&mut self, page: usize, geometry: PageGeometry) -> ViewerResult<()> {
        let effects = self.viewport.load_page(page, geometry);
        self.run(effects)?;
        debug!("showing page {page}");
        Ok(())
    }

    /// React to lane events addressed to the page being shown
    fn absorb(&mut self, events: &[ViewerEvent]) {
        for event in events {
            if Some(event.slot()) != self.slot || Some(event.page()) != self.awaiting {
                continue;
            }
            match event {
                ViewerEvent::PageMeasured { page, geometry, .. } => {
                    self.awaiting = None;
                    if let Err(e) = self.lay_out(*page, *geometry) {
                        warn!("page {page} could not be shown: {e}");
                    }
                }
                ViewerEvent::RenderFailed { page, error, .. } => {
                    self.awaiting = None;
                    warn!("page {page} has no usable size: {error}");
                }
                ViewerEvent::PageReady { .. } | ViewerEvent::RenderDiscarded { .. } => {}
            }
        }
    }

    pub fn drag(&mut self, dx: f32, dy: f32) -> ViewerResult<()> {
        self.gesture(Gesture::Drag { dx, dy })
    }

    pub fn scale_begin(&mut self) -> ViewerResult<()> {
        self.gesture(Gesture::ScaleBegin)
    }

    pub fn scale(&mut self, factor: f32, focus_x: f32, focus_y: f32) -> ViewerResult<()> {
        self.gesture(Gesture::Scale {
            factor,
            focus_x,
            focus_y,
        })
    }

    pub fn scale_end(&mut self) -> ViewerResult<()> {
        self.gesture(Gesture::ScaleEnd)
    }

    pub fn fling(&mut self, vx: f32, vy: f32) -> ViewerResult<()> {
        self.gesture(Gesture::Fling { vx, vy })
    }

    pub fn resize(&mut self, screen: Size) -> ViewerResult<()> {
        let effects = self.viewport.resize(screen);
        self.run(effects)
    }

    pub fn gesture(&mut self, gesture: Gesture) -> ViewerResult<()> {
        let effects = self.viewport.apply(gesture);
        self.run(effects)
    }

    fn run(&mut self, effects: Vec<ViewportEffect>) -> ViewerResult<()> {
        for effect in effects {
            match effect {
                ViewportEffect::RenderRegion(region) => {
                    let Some(slot) = self.slot else {
                        continue;
                    };
                    let request = RenderRequest::region(
                        self.viewport.current_page(),
                        self.viewport.screen(),
                        region,
                    );
                    self.pipeline.request_render(slot, request)?;
                }
                ViewportEffect::Navigate(page) => self.show_page(page)?,
            }
        }
        Ok(())
    }

    pub fn poll(&mut self) -> Vec<ViewerEvent> {
        let events = self.pipeline.poll();
        self.absorb(&events);
        events
    }

    /// Block until the pipeline is idle, including renders started by a
    /// page layout that happened while settling
    pub fn settle(&mut self, timeout: Duration) -> Vec<ViewerEvent> {
        let deadline = Instant::now() + timeout;
        let mut out = Vec::new();
        loop {
            let events = self
                .pipeline
                .settle(deadline.saturating_duration_since(Instant::now()));
            self.absorb(&events);
            out.extend(events);
            if self.pipeline.is_idle() || Instant::now() >= deadline {
                break;
            }
        }
        out
    }

    /// Page whose size is still being looked up
    #[must_use]
    pub fn awaiting_page(&self) -> Option<usize> {
        self.awaiting
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.viewport.current_page()
    }

    #[must_use]
    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    #[must_use]
    pub fn slot(&self) -> Option<SlotId> {
        self.slot
    }

    /// Surface a presenter should draw
    #[must_use]
    pub fn visible(&self) -> Option<&PixelBuffer> {
        self.slot.and_then(|slot| self.pipeline.visible(slot))
    }

    #[must_use]
    pub fn content_id(&self) -> Option<ContentId> {
        self.slot.and_then(|slot| self.pipeline.content_id(slot))
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn close(&mut self) {
        self.pipeline.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{BackendCall, FakeEngine};

    const WAIT: Duration = Duration::from_secs(5);

    #[test]
    fn first_page_is_fitted_and_rendered() {
        let engine = FakeEngine::with_geometries(vec![PageGeometry::new(100, 200)]);
        let mut viewer = FreePanViewer::open(
            &engine,
            &DocumentSource::Bytes(vec![1]),
            ViewerSettings::default(),
            Size::new(200, 200),
        )
        .unwrap();
        viewer.settle(WAIT);

        let surface = viewer.visible().expect("rendered");
        assert_eq!(surface.size(), Size::new(200, 200));
        assert_eq!(surface.pixel(10, 100), Some([0, 0, 0, 0]));
        assert_eq!(surface.pixel(100, 100), Some(FakeEngine::page_color(0)));
    }

    #[test]
    fn fling_does_not_wait_for_the_decoder() {
        let (engine, mut gate) = FakeEngine::with_pages(3).gated();
        let mut viewer = FreePanViewer::open(
            &engine,
            &DocumentSource::Bytes(vec![1]),
            ViewerSettings::default(),
            Size::new(200, 200),
        )
        .unwrap();
        let deadline = Instant::now() + WAIT;
        while viewer.awaiting_page().is_some() && Instant::now() < deadline {
            viewer.poll();
            std::thread::sleep(Duration::from_millis(2));
        }
        let region = viewer.viewport().region();
        assert!(engine.wait_for_call(&BackendCall::RenderRegion(0, region), WAIT));

        let started = Instant::now();
        viewer.fling(150.0, 0.0).unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(viewer.current_page(), 1);

        gate.open();
        viewer.settle(WAIT);
        assert_eq!(viewer.awaiting_page(), None);
        assert!(viewer.viewport().is_laid_out());
        let surface = viewer.visible().expect("rendered");
        assert_eq!(surface.pixel(100, 100), Some(FakeEngine::page_color(1)));
    }

    #[test]
    fn empty_document_has_no_slot() {
        let engine = FakeEngine::with_pages(0);
        let mut viewer = FreePanViewer::open(
            &engine,
            &DocumentSource::Bytes(vec![1]),
            ViewerSettings::default(),
            Size::new(200, 200),
        )
        .unwrap();

        assert_eq!(viewer.slot(), None);
        assert!(viewer.fling(500.0, 0.0).is_ok());
        assert!(viewer.visible().is_none());
    }
}
