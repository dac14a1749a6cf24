//! MuPDF-backed rasterizer

use std::collections::HashMap;

use log::{debug, warn};
use mupdf::{Colorspace, Device, Document as PdfDocument, Matrix, Pixmap};

use super::{DocumentSource, PageGeometry, RasterEngine, RasterHandle, Region};
use crate::error::BackendFault;
use crate::render::{BYTES_PER_PIXEL, PixelBuffer};

const PDF_MAGIC: &str = "application/pdf";

/// Opens documents with MuPDF
#[derive(Clone, Copy, Debug, Default)]
pub struct MupdfEngine;

impl RasterEngine for MupdfEngine {
    fn open(&self, source: &DocumentSource) -> Option<Box<dyn RasterHandle>> {
        let opened = match source {
            DocumentSource::Path(path) => PdfDocument::open(path.to_string_lossy().as_ref()),
            DocumentSource::Bytes(bytes) => PdfDocument::from_bytes(bytes, PDF_MAGIC),
        };
        let doc = match opened {
            Ok(doc) => doc,
            Err(e) => {
                warn!("MuPDF could not open {}: {e}", source.describe());
                return None;
            }
        };

        let page_count = match doc.page_count() {
            Ok(count) => usize::try_from(count).unwrap_or(0),
            Err(e) => {
                warn!("MuPDF could not count pages of {}: {e}", source.describe());
                return None;
            }
        };

        Some(Box::new(MupdfHandle {
            doc: Some(OwnedDocument(doc)),
            page_count,
            loaded: HashMap::new(),
        }))
    }
}

struct OwnedDocument(PdfDocument);

// SAFETY: the handle is only reachable through the `Document` mutex, so at
// most one thread calls into this MuPDF document at a time.
unsafe impl Send for OwnedDocument {}

struct MupdfHandle {
    doc: Option<OwnedDocument>,
    page_count: usize,
    /// Decoded pages with their intrinsic size
    loaded: HashMap<usize, PageGeometry>,
}

fn fault(e: mupdf::Error) -> BackendFault {
    BackendFault::new(e.to_string())
}

impl MupdfHandle {
    fn doc(&self) -> Result<&PdfDocument, BackendFault> {
        self.doc
            .as_ref()
            .map(|doc| &doc.0)
            .ok_or_else(|| BackendFault::new("document closed"))
    }

    fn page_number(index: usize) -> Result<i32, BackendFault> {
        i32::try_from(index).map_err(|_| BackendFault::new(format!("page {index} out of range")))
    }

    fn geometry(&mut self, index: usize) -> Result<PageGeometry, BackendFault> {
        if let Some(geometry) = self.loaded.get(&index) {
            return Ok(*geometry);
        }
        self.load_page(index)?;
        self.loaded
            .get(&index)
            .copied()
            .ok_or_else(|| BackendFault::new(format!("page {index} has no geometry")))
    }

    /// Rasterize page `index` to an RGB pixmap of `width`x`height`
    fn pixmap(&mut self, index: usize, width: u32, height: u32) -> Result<Pixmap, BackendFault> {
        let geometry = self.geometry(index)?;
        let scale_x = width as f32 / geometry.width as f32;
        let scale_y = height as f32 / geometry.height as f32;

        let page = self
            .doc()?
            .load_page(Self::page_number(index)?)
            .map_err(fault)?;
        let rgb = Colorspace::device_rgb();
        page.to_pixmap(&Matrix::new_scale(scale_x, scale_y), &rgb, false, false)
            .map_err(fault)
    }

    /// Rasterize only a `width`x`height` window of page `index`. `transform`
    /// maps page space into window pixels, so nothing outside the window is
    /// ever allocated.
    fn window_pixmap(
        &mut self,
        index: usize,
        transform: &Matrix,
        width: u32,
        height: u32,
    ) -> Result<Pixmap, BackendFault> {
        let dim = |v: u32| {
            i32::try_from(v).map_err(|_| BackendFault::new(format!("window too large: {v}px")))
        };
        let page = self
            .doc()?
            .load_page(Self::page_number(index)?)
            .map_err(fault)?;

        let mut pixmap = Pixmap::new_with_w_h(
            &Colorspace::device_rgb(),
            dim(width)?,
            dim(height)?,
            false,
        )
        .map_err(fault)?;
        pixmap.clear_with(0xFF).map_err(fault)?;

        let device = Device::from_pixmap(&pixmap).map_err(fault)?;
        page.run(&device, transform).map_err(fault)?;
        drop(device);
        Ok(pixmap)
    }
}

impl RasterHandle for MupdfHandle {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn has_page_loaded(&self, index: usize) -> bool {
        self.loaded.contains_key(&index)
    }

    fn load_page(&mut self, index: usize) -> Result<(), BackendFault> {
        if self.loaded.contains_key(&index) {
            return Ok(());
        }

        let page = self
            .doc()?
            .load_page(Self::page_number(index)?)
            .map_err(fault)?;
        let bounds = page.bounds().map_err(fault)?;
        let geometry = PageGeometry::new(
            (bounds.x1 - bounds.x0).round().max(1.0) as u32,
            (bounds.y1 - bounds.y0).round().max(1.0) as u32,
        );
        debug!(
            "MuPDF loaded page {index}: {}x{}",
            geometry.width, geometry.height
        );
        self.loaded.insert(index, geometry);
        Ok(())
    }

    fn page_width(&mut self, index: usize) -> Result<u32, BackendFault> {
        Ok(self.geometry(index)?.width)
    }

    fn page_height(&mut self, index: usize) -> Result<u32, BackendFault> {
        Ok(self.geometry(index)?.height)
    }

    fn render_full_page(
        &mut self,
        buffer: &mut PixelBuffer,
        index: usize,
    ) -> Result<(), BackendFault> {
        let pixmap = self.pixmap(index, buffer.width(), buffer.height())?;
        blit(&pixmap, buffer, 0, 0)
    }

    fn render_region(
        &mut self,
        surface: &mut PixelBuffer,
        index: usize,
        region: Region,
    ) -> Result<(), BackendFault> {
        surface.fill([0, 0, 0, 0]);
        let Some((left, top, width, height)) = visible_window(region, surface) else {
            return Ok(());
        };

        let geometry = self.geometry(index)?;
        let scale_x = region.width as f32 / geometry.width as f32;
        let scale_y = region.height as f32 / geometry.height as f32;
        // page origin relative to the window
        let transform = Matrix::new(
            scale_x,
            0.0,
            0.0,
            scale_y,
            (region.left - left) as f32,
            (region.top - top) as f32,
        );

        let pixmap = self.window_pixmap(index, &transform, width, height)?;
        blit(&pixmap, surface, left, top)
    }

    fn close(&mut self) -> Result<(), BackendFault> {
        self.loaded.clear();
        self.doc = None;
        Ok(())
    }
}

/// Part of `region` that lands on `surface` as `(left, top, width, height)`
fn visible_window(region: Region, surface: &PixelBuffer) -> Option<(i32, i32, u32, u32)> {
    let left = i64::from(region.left).max(0);
    let top = i64::from(region.top).max(0);
    let right = (i64::from(region.left) + i64::from(region.width)).min(i64::from(surface.width()));
    let bottom =
        (i64::from(region.top) + i64::from(region.height)).min(i64::from(surface.height()));
    if right <= left || bottom <= top {
        return None;
    }
    Some((
        i32::try_from(left).ok()?,
        i32::try_from(top).ok()?,
        u32::try_from(right - left).ok()?,
        u32::try_from(bottom - top).ok()?,
    ))
}

/// Copy an RGB(A) pixmap into `target` with its origin at `(left, top)`,
/// dropping whatever falls outside the target.
fn blit(
    pixmap: &Pixmap,
    target: &mut PixelBuffer,
    left: i32,
    top: i32,
) -> Result<(), BackendFault> {
    let n = pixmap.n() as usize;
    if n < 3 {
        return Err(BackendFault::new(format!(
            "Unsupported pixmap format: {n} channels"
        )));
    }

    let width = pixmap.width() as usize;
    let height = pixmap.height() as usize;
    let stride = pixmap.stride() as usize;
    let samples = pixmap.samples();
    let row_bytes = width * n;
    if samples.len() < stride.saturating_mul(height) || row_bytes > stride {
        return Err(BackendFault::new("Pixmap buffer size mismatch"));
    }

    let target_width = i64::from(target.width());
    let target_height = i64::from(target.height());
    let target_stride = target.stride();
    let pixels = target.pixels_mut();

    for y in 0..height {
        let ty = i64::from(top) + y as i64;
        if ty < 0 || ty >= target_height {
            continue;
        }
        let row = &samples[y * stride..y * stride + row_bytes];
        for (x, px) in row.chunks_exact(n).enumerate() {
            let tx = i64::from(left) + x as i64;
            if tx < 0 || tx >= target_width {
                continue;
            }
            let offset = ty as usize * target_stride + tx as usize * BYTES_PER_PIXEL;
            pixels[offset..offset + 3].copy_from_slice(&px[..3]);
            pixels[offset + 3] = 0xFF;
        }
    }

    Ok(())
}
