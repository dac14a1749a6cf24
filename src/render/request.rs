//! Render request and lane message types

use super::buffer::PixelBuffer;
use super::pool::SlotId;
use crate::document::{PageGeometry, Region, Size};
use crate::error::ViewerError;

/// Unique identifier for dispatched render jobs
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId(pub u64);

impl RequestId {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }
}

/// What the rasterized output should look like
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RenderTarget {
    /// Whole page into a buffer sized to the page geometry times `scale`
    FullPage { scale: f32 },
    /// Page placed at `region` on a `surface`-sized display buffer
    Region { surface: Size, region: Region },
}

/// A request to render `page` into a slot
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderRequest {
    pub page: usize,
    pub target: RenderTarget,
}

impl RenderRequest {
    #[must_use]
    pub fn full_page(page: usize, scale: f32) -> Self {
        Self {
            page,
            target: RenderTarget::FullPage { scale },
        }
    }

    #[must_use]
    pub fn region(page: usize, surface: Size, region: Region) -> Self {
        Self {
            page,
            target: RenderTarget::Region { surface, region },
        }
    }
}

/// Work item sent to the render lane. Owns the buffer it renders into.
#[derive(Debug)]
pub struct RenderJob {
    pub id: RequestId,
    pub slot: SlotId,
    pub generation: u64,
    pub request: RenderRequest,
    pub buffer: PixelBuffer,
}

/// Messages consumed by the render lane
#[derive(Debug)]
pub enum RenderCommand {
    Render(RenderJob),
    /// Look up the intrinsic size of the page bound to `slot`
    Measure { slot: SlotId, page: usize },
    Shutdown,
}

/// Messages consumed by the prefetch lane
#[derive(Debug)]
pub enum PrefetchCommand {
    Decode(usize),
    Shutdown,
}

/// Messages sent back from either lane to the presentation side
#[derive(Debug)]
pub enum LaneEvent {
    Rendered {
        id: RequestId,
        slot: SlotId,
        generation: u64,
        page: usize,
        buffer: PixelBuffer,
        result: Result<(), ViewerError>,
    },
    Measured {
        slot: SlotId,
        page: usize,
        result: Result<PageGeometry, ViewerError>,
    },
    Prefetched {
        page: usize,
        decoded: bool,
    },
    PrefetchFailed {
        page: usize,
    },
}

/// Identity of the content currently shown by a slot.
///
/// A presenter should rebuild whatever display adapter it attached to a slot
/// whenever this value changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ContentId {
    pub slot: SlotId,
    pub generation: u64,
}

/// Notifications delivered to the presentation thread
#[derive(Clone, Debug, PartialEq)]
pub enum ViewerEvent {
    /// A render finished and its buffer is now the slot's visible buffer
    PageReady {
        slot: SlotId,
        page: usize,
        content: ContentId,
    },
    /// The intrinsic size of the page bound to `slot` is now known
    PageMeasured {
        slot: SlotId,
        page: usize,
        geometry: PageGeometry,
    },
    /// A render finished for a slot that had moved on; the result was dropped
    RenderDiscarded { slot: SlotId, page: usize },
    /// Decode or rasterization failed; the slot was left unchanged
    RenderFailed {
        slot: SlotId,
        page: usize,
        error: ViewerError,
    },
}

impl ViewerEvent {
    #[must_use]
    pub fn slot(&self) -> SlotId {
        match self {
            Self::PageReady { slot, .. }
            | Self::PageMeasured { slot, .. }
            | Self::RenderDiscarded { slot, .. }
            | Self::RenderFailed { slot, .. } => *slot,
        }
    }

    #[must_use]
    pub fn page(&self) -> usize {
        match self {
            Self::PageReady { page, .. }
            | Self::PageMeasured { page, .. }
            | Self::RenderDiscarded { page, .. }
            | Self::RenderFailed { page, .. } => *page,
        }
    }
}
