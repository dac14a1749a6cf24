//! Swipe pager presentation: one slot per instantiated page

use std::time::Duration;

use log::debug;

use crate::document::{DocumentSource, RasterEngine};
use crate::error::ViewerResult;
use crate::render::{ContentId, Pipeline, PixelBuffer, SlotId, ViewerEvent};
use crate::settings::ViewerSettings;

/// Pager-driven viewer.
///
/// A pager instantiates the page about to appear and destroys pages that
/// scrolled away. Each instantiated page gets its own slot, rendered whole
/// at the configured scale, and the following pages are decoded ahead.
/// A `render_scale` of 0.5 gives the half-resolution rendition used when
/// each page lives in its own fragment.
pub struct PagedViewer {
    pipeline: Pipeline,
}

impl PagedViewer {
    pub fn open(
        engine: &dyn RasterEngine,
        source: &DocumentSource,
        settings: ViewerSettings,
    ) -> ViewerResult<Self> {
        Ok(Self {
            pipeline: Pipeline::open(engine, source, settings)?,
        })
    }

    /// Number of pages the pager should offer
    #[must_use]
    pub fn item_count(&self) -> usize {
        if self.pipeline.is_closed() {
            0
        } else {
            self.pipeline.page_count()
        }
    }

    /// Bind a slot to `position`, start its render and prefetch what follows
    pub fn instantiate_item(&mut self, position: usize) -> ViewerResult<SlotId> {
        let slot = self.pipeline.bind_page(position)?;
        self.pipeline.render_bound_page(slot)?;
        self.pipeline.prefetch(position);
        debug!("instantiated page {position} in {slot}");
        Ok(slot)
    }

    /// The pager dropped the view backed by `slot`
    pub fn destroy_item(&mut self, slot: SlotId) -> bool {
        self.pipeline.unbind_slot(slot).is_some()
    }

    /// The pager dropped a view for `position`; the oldest such view goes first
    pub fn destroy_position(&mut self, position: usize) -> Option<SlotId> {
        self.pipeline.unbind_page(position)
    }

    pub fn poll(&mut self) -> Vec<ViewerEvent> {
        self.pipeline.poll()
    }

    pub fn settle(&mut self, timeout: Duration) -> Vec<ViewerEvent> {
        self.pipeline.settle(timeout)
    }

    #[must_use]
    pub fn visible(&self, slot: SlotId) -> Option<&PixelBuffer> {
        self.pipeline.visible(slot)
    }

    #[must_use]
    pub fn content_id(&self, slot: SlotId) -> Option<ContentId> {
        self.pipeline.content_id(slot)
    }

    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn close(&mut self) {
        self.pipeline.close();
    }
}
