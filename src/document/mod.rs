//! Document handle: an opened paginated document behind a single decoder lock

mod engine;
mod geometry;
#[cfg(feature = "pdf")]
pub mod mupdf;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, error, info};

pub use engine::{RasterEngine, RasterHandle};
pub use geometry::{GeometryCache, PageGeometry, RectF, Region, Size};

use crate::error::{ViewerError, ViewerResult};
use crate::render::PixelBuffer;

/// Where a document comes from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DocumentSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

impl DocumentSource {
    /// Short human readable description for logs and errors
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Path(path) => path.display().to_string(),
            Self::Bytes(bytes) => format!("<{} bytes in memory>", bytes.len()),
        }
    }

    fn precheck(&self) -> ViewerResult<()> {
        match self {
            Self::Path(path) => match std::fs::metadata(path) {
                Ok(meta) if meta.is_file() => Ok(()),
                Ok(_) => Err(ViewerError::open(self.describe(), "not a regular file")),
                Err(e) => Err(ViewerError::open(self.describe(), e.to_string())),
            },
            Self::Bytes(bytes) if bytes.is_empty() => {
                Err(ViewerError::open(self.describe(), "empty source"))
            }
            Self::Bytes(_) => Ok(()),
        }
    }
}

impl From<PathBuf> for DocumentSource {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<Vec<u8>> for DocumentSource {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// An opened document.
///
/// Every call into the underlying handle goes through one mutex because the
/// decoder is not assumed reentrant. Page geometries are cached outside that
/// lock so lookups for already-known pages never wait on a running render.
pub struct Document {
    handle: Mutex<Box<dyn RasterHandle>>,
    geometry: Mutex<GeometryCache>,
    page_count: usize,
    closed: AtomicBool,
}

impl Document {
    /// Open `source` with `engine`
    pub fn open(
        engine: &dyn RasterEngine,
        source: &DocumentSource,
        geometry_cache_size: usize,
    ) -> ViewerResult<Self> {
        source.precheck()?;

        let handle = engine
            .open(source)
            .ok_or_else(|| ViewerError::open(source.describe(), "engine could not open document"))?;
        let page_count = handle.page_count();
        info!("Opened {}: {page_count} pages", source.describe());

        Ok(Self {
            handle: Mutex::new(handle),
            geometry: Mutex::new(GeometryCache::new(geometry_cache_size)),
            page_count,
            closed: AtomicBool::new(false),
        })
    }

    #[must_use]
    pub fn page_count(&self) -> usize {
        self.page_count
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn handle(&self) -> MutexGuard<'_, Box<dyn RasterHandle>> {
        self.handle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn geometry_cache(&self) -> MutexGuard<'_, GeometryCache> {
        self.geometry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_index(&self, index: usize) -> ViewerResult<()> {
        if self.is_closed() {
            return Err(ViewerError::Closed);
        }
        if index >= self.page_count {
            return Err(ViewerError::PageIndex {
                index,
                page_count: self.page_count,
            });
        }
        Ok(())
    }

    /// Lock the decoder for a call on page `index`. The closed flag is read
    /// again under the lock since `close` may have won the race for it.
    fn page_handle(&self, index: usize) -> ViewerResult<MutexGuard<'_, Box<dyn RasterHandle>>> {
        self.check_index(index)?;
        let handle = self.handle();
        if self.is_closed() {
            return Err(ViewerError::Closed);
        }
        Ok(handle)
    }

    /// Intrinsic page size, cached after the first lookup
    pub fn page_size(&self, index: usize) -> ViewerResult<PageGeometry> {
        self.check_index(index)?;

        if let Some(geometry) = self.geometry_cache().get(index) {
            return Ok(geometry);
        }

        let mut handle = self.page_handle(index)?;
        self.query_geometry(&mut **handle, index)
    }

    /// Page size if some earlier lookup already measured it. Never touches
    /// the decoder.
    #[must_use]
    pub fn cached_page_size(&self, index: usize) -> Option<PageGeometry> {
        if self.check_index(index).is_err() {
            return None;
        }
        self.geometry_cache().get(index)
    }

    fn query_geometry(
        &self,
        handle: &mut dyn RasterHandle,
        index: usize,
    ) -> ViewerResult<PageGeometry> {
        let decode_err = |fault| ViewerError::Decode { index, fault };
        let width = handle.page_width(index).map_err(decode_err)?;
        let height = handle.page_height(index).map_err(decode_err)?;
        if width == 0 || height == 0 {
            return Err(ViewerError::Decode {
                index,
                fault: crate::error::BackendFault::new(format!(
                    "degenerate page size {width}x{height}"
                )),
            });
        }

        let geometry = PageGeometry::new(width, height);
        self.geometry_cache().insert(index, geometry);
        Ok(geometry)
    }

    /// Decode page `index` unless it is already decoded.
    ///
    /// Returns `true` when decode work was actually performed. Geometry is
    /// recorded while the page is hot so later lookups skip the decoder.
    pub fn ensure_decoded(&self, index: usize) -> ViewerResult<bool> {
        let mut handle = self.page_handle(index)?;
        if handle.has_page_loaded(index) {
            return Ok(false);
        }

        handle
            .load_page(index)
            .map_err(|fault| ViewerError::Decode { index, fault })?;
        debug!("Decoded page {index}");

        if !self.geometry_cache().contains(index) {
            self.query_geometry(&mut **handle, index)?;
        }
        Ok(true)
    }

    /// Rasterize page `index` into `buffer`.
    ///
    /// With no `region` the whole page fills the buffer; otherwise the page is
    /// placed at `region` on the buffer treated as a display surface.
    pub fn rasterize(
        &self,
        index: usize,
        buffer: &mut PixelBuffer,
        region: Option<Region>,
    ) -> ViewerResult<()> {
        let mut handle = self.page_handle(index)?;
        if !handle.has_page_loaded(index) {
            handle
                .load_page(index)
                .map_err(|fault| ViewerError::Decode { index, fault })?;
        }

        let result = match region {
            None => handle.render_full_page(buffer, index),
            Some(region) => handle.render_region(buffer, index, region),
        };
        result.map_err(|fault| ViewerError::Render { index, fault })
    }

    /// Release the native document. Safe to call any number of times;
    /// failures are logged and swallowed so teardown always completes.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        match self.handle().close() {
            Ok(()) => debug!("Document closed"),
            Err(e) => error!("Failed to release document resources: {e}"),
        }
        self.geometry_cache().clear();
    }
}

impl Drop for Document {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("page_count", &self.page_count)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}
