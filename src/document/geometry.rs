//! Page geometry, raster regions and the per-document geometry cache

use std::num::NonZeroUsize;

use lru::LruCache;

/// Intrinsic page dimensions at scale 1.0
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PageGeometry {
    pub width: u32,
    pub height: u32,
}

impl PageGeometry {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn aspect(self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Raster size for a full-page render at `scale`, never smaller than 1x1
    #[must_use]
    pub fn scaled(self, scale: f32) -> Size {
        Size::new(
            ((self.width as f32 * scale).round() as u32).max(1),
            ((self.height as f32 * scale).round() as u32).max(1),
        )
    }
}

/// Pixel dimensions of a buffer or screen
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    #[must_use]
    pub fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[must_use]
    pub fn aspect(self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Placement of a page on a render surface, in surface pixels.
///
/// `left`/`top` may be negative when a zoomed page extends past the surface.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Region {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    #[must_use]
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }
}

/// Floating point rectangle used by the viewport math
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RectF {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl RectF {
    #[must_use]
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    #[must_use]
    pub fn offset(&self, dx: f32, dy: f32) -> Self {
        Self::new(
            self.left + dx,
            self.top + dy,
            self.right + dx,
            self.bottom + dy,
        )
    }

    /// Scale the rectangle by `factor` about the focal point `(fx, fy)`
    #[must_use]
    pub fn scaled_about(&self, factor: f32, fx: f32, fy: f32) -> Self {
        Self::new(
            fx + (self.left - fx) * factor,
            fy + (self.top - fy) * factor,
            fx + (self.right - fx) * factor,
            fy + (self.bottom - fy) * factor,
        )
    }

    /// Whether this rectangle fully contains a `size`-sized screen anchored at the origin
    #[must_use]
    pub fn covers(&self, size: Size) -> bool {
        self.left <= 0.0
            && self.top <= 0.0
            && self.right >= size.width as f32
            && self.bottom >= size.height as f32
    }

    #[must_use]
    pub fn to_region(&self) -> Region {
        Region::new(
            self.left.round() as i32,
            self.top.round() as i32,
            self.width().round().max(1.0) as u32,
            self.height().round().max(1.0) as u32,
        )
    }
}

/// LRU cache of page geometries.
///
/// Dimensions are immutable for a given document, so entries never need
/// invalidation; the bound only caps memory for very long documents.
pub struct GeometryCache {
    cache: LruCache<usize, PageGeometry>,
}

impl GeometryCache {
    /// Create a new cache with the given capacity
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    /// Get a cached geometry, promoting it in the LRU order
    pub fn get(&mut self, page: usize) -> Option<PageGeometry> {
        self.cache.get(&page).copied()
    }

    pub fn insert(&mut self, page: usize, geometry: PageGeometry) {
        self.cache.put(page, geometry);
    }

    #[must_use]
    pub fn contains(&self, page: usize) -> bool {
        self.cache.contains(&page)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn clear(&mut self) {
        self.cache.clear();
    }
}
