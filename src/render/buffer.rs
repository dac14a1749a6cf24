//! Reusable RGBA pixel buffers

use image::RgbaImage;

use crate::document::Size;

/// Bytes per RGBA pixel
pub const BYTES_PER_PIXEL: usize = 4;

/// Mutable RGBA render target.
///
/// Buffers are recycled across pages; [`PixelBuffer::ensure_size`] only
/// reallocates when the requested dimensions differ from the current ones
/// or the buffer was invalidated.
#[derive(Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
    invalidated: bool,
    allocations: u32,
}

impl PixelBuffer {
    /// Allocate a zeroed (transparent) buffer
    #[must_use]
    pub fn new(size: Size) -> Self {
        Self {
            width: size.width,
            height: size.height,
            pixels: vec![0; Self::byte_len(size)],
            invalidated: false,
            allocations: 1,
        }
    }

    /// A placeholder that will be allocated on first use
    #[must_use]
    pub fn unallocated() -> Self {
        Self {
            width: 0,
            height: 0,
            pixels: Vec::new(),
            invalidated: true,
            allocations: 0,
        }
    }

    fn byte_len(size: Size) -> usize {
        size.width as usize * size.height as usize * BYTES_PER_PIXEL
    }

    #[must_use]
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Row stride in bytes
    #[must_use]
    pub fn stride(&self) -> usize {
        self.width as usize * BYTES_PER_PIXEL
    }

    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    /// Number of times backing storage was (re)allocated
    #[must_use]
    pub fn allocations(&self) -> u32 {
        self.allocations
    }

    #[must_use]
    pub fn is_invalidated(&self) -> bool {
        self.invalidated
    }

    /// Mark the storage unusable so the next [`ensure_size`](Self::ensure_size) reallocates
    pub fn invalidate(&mut self) {
        self.invalidated = true;
    }

    /// Make the buffer exactly `size`, reusing storage when possible.
    ///
    /// Returns `true` if the storage was reallocated.
    pub fn ensure_size(&mut self, size: Size) -> bool {
        if !self.invalidated && self.size() == size {
            return false;
        }

        self.width = size.width;
        self.height = size.height;
        self.pixels = vec![0; Self::byte_len(size)];
        self.invalidated = false;
        self.allocations += 1;
        true
    }

    /// Fill every pixel with one RGBA value
    pub fn fill(&mut self, rgba: [u8; 4]) {
        for px in self.pixels.chunks_exact_mut(BYTES_PER_PIXEL) {
            px.copy_from_slice(&rgba);
        }
    }

    #[must_use]
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let start = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        let px = &self.pixels[start..start + BYTES_PER_PIXEL];
        Some([px[0], px[1], px[2], px[3]])
    }

    pub fn set_pixel(&mut self, x: u32, y: u32, rgba: [u8; 4]) {
        if x >= self.width || y >= self.height {
            return;
        }
        let start = y as usize * self.stride() + x as usize * BYTES_PER_PIXEL;
        self.pixels[start..start + BYTES_PER_PIXEL].copy_from_slice(&rgba);
    }

    /// Copy into an owned image for export or inspection
    #[must_use]
    pub fn to_image(&self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

impl std::fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("invalidated", &self.invalidated)
            .field("allocations", &self.allocations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_size_reuses_storage() {
        let mut buffer = PixelBuffer::new(Size::new(10, 20));
        assert!(!buffer.ensure_size(Size::new(10, 20)));
        assert_eq!(buffer.allocations(), 1);
    }

    #[test]
    fn new_size_reallocates() {
        let mut buffer = PixelBuffer::new(Size::new(10, 20));
        assert!(buffer.ensure_size(Size::new(20, 10)));
        assert_eq!(buffer.size(), Size::new(20, 10));
        assert_eq!(buffer.pixels().len(), 20 * 10 * 4);
        assert_eq!(buffer.allocations(), 2);
    }

    #[test]
    fn invalidated_buffer_reallocates_even_at_same_size() {
        let mut buffer = PixelBuffer::new(Size::new(4, 4));
        buffer.invalidate();
        assert!(buffer.ensure_size(Size::new(4, 4)));
        assert!(!buffer.is_invalidated());
    }

    #[test]
    fn unallocated_buffer_allocates_on_first_use() {
        let mut buffer = PixelBuffer::unallocated();
        assert_eq!(buffer.allocations(), 0);
        assert!(buffer.ensure_size(Size::new(2, 2)));
        assert_eq!(buffer.allocations(), 1);
    }

    #[test]
    fn pixel_access_is_bounds_checked() {
        let mut buffer = PixelBuffer::new(Size::new(2, 2));
        buffer.set_pixel(1, 1, [9, 8, 7, 6]);
        assert_eq!(buffer.pixel(1, 1), Some([9, 8, 7, 6]));
        assert_eq!(buffer.pixel(2, 0), None);
        buffer.set_pixel(5, 5, [1, 1, 1, 1]);
    }

    #[test]
    fn exports_to_image() {
        let mut buffer = PixelBuffer::new(Size::new(3, 2));
        buffer.fill([255, 0, 0, 255]);
        let image = buffer.to_image().expect("dimensions match storage");
        assert_eq!(image.dimensions(), (3, 2));
        assert_eq!(image.get_pixel(2, 1).0, [255, 0, 0, 255]);
    }
}
