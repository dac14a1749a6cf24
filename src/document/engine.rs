//! Contract consumed from the external rasterization library
//!
//! The engine opens documents; each opened document is a [`RasterHandle`].
//! Handles are not assumed reentrant: the [`Document`](super::Document)
//! wrapper serializes every call behind a single lock.

use super::DocumentSource;
use super::geometry::Region;
use crate::error::BackendFault;
use crate::render::PixelBuffer;

/// Factory for document handles
pub trait RasterEngine: Send + Sync {
    /// Open a document. `None` signals open failure.
    fn open(&self, source: &DocumentSource) -> Option<Box<dyn RasterHandle>>;
}

/// An opened document inside the rasterization library
pub trait RasterHandle: Send {
    fn page_count(&self) -> usize;

    fn has_page_loaded(&self, index: usize) -> bool;

    /// Decode a page. Idempotent in the library.
    fn load_page(&mut self, index: usize) -> Result<(), BackendFault>;

    /// Intrinsic width at scale 1.0
    fn page_width(&mut self, index: usize) -> Result<u32, BackendFault>;

    /// Intrinsic height at scale 1.0
    fn page_height(&mut self, index: usize) -> Result<u32, BackendFault>;

    /// Rasterize the whole page scaled to fill `buffer`
    fn render_full_page(
        &mut self,
        buffer: &mut PixelBuffer,
        index: usize,
    ) -> Result<(), BackendFault>;

    /// Rasterize the page scaled into `region` of `surface`, clipped to the surface
    fn render_region(
        &mut self,
        surface: &mut PixelBuffer,
        index: usize,
        region: Region,
    ) -> Result<(), BackendFault>;

    /// Release native resources
    fn close(&mut self) -> Result<(), BackendFault>;
}
