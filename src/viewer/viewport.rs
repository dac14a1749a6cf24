//! Pan/zoom state for the free-pan presentation

use log::debug;

use crate::document::{PageGeometry, RectF, Region, Size};

/// Touch input after gesture recognition
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Gesture {
    /// Finger moved by `(dx, dy)` screen pixels
    Drag { dx: f32, dy: f32 },
    ScaleBegin,
    /// Incremental pinch `factor` around the focal point
    Scale {
        factor: f32,
        focus_x: f32,
        focus_y: f32,
    },
    ScaleEnd,
    /// Release velocity in screen pixels per second
    Fling { vx: f32, vy: f32 },
}

/// Effects produced by viewport changes
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportEffect {
    /// Re-render the current page placed at this region of the screen
    RenderRegion(Region),
    /// Switch to another page
    Navigate(usize),
}

/// Displayed region of the current page plus the gesture state around it.
///
/// `rect` is where the page sits on screen, in screen pixels. At scale 1.0
/// the page is fitted to the screen; pinching scales `rect` about the focal
/// point and never below the fitted size.
#[derive(Clone, Debug)]
pub struct Viewport {
    screen: Size,
    page: Option<PageGeometry>,
    rect: RectF,
    scale: f32,
    can_navigate: bool,
    scaling: bool,
    current_page: usize,
    page_count: usize,
    fling_threshold: f32,
}

impl Viewport {
    #[must_use]
    pub fn new(screen: Size, page_count: usize, fling_threshold: f32) -> Self {
        Self {
            screen,
            page: None,
            rect: RectF::default(),
            scale: 1.0,
            can_navigate: true,
            scaling: false,
            current_page: 0,
            page_count,
            fling_threshold,
        }
    }

    #[must_use]
    pub fn rect(&self) -> RectF {
        self.rect
    }

    #[must_use]
    pub fn scale(&self) -> f32 {
        self.scale
    }

    #[must_use]
    pub fn can_navigate(&self) -> bool {
        self.can_navigate
    }

    #[must_use]
    pub fn is_scaling(&self) -> bool {
        self.scaling
    }

    #[must_use]
    pub fn current_page(&self) -> usize {
        self.current_page
    }

    #[must_use]
    pub fn screen(&self) -> Size {
        self.screen
    }

    /// Region the current page occupies on screen
    #[must_use]
    pub fn region(&self) -> Region {
        self.rect.to_region()
    }

    /// Switch to `page` before its size is known. Until
    /// [`load_page`](Self::load_page) arrives only flings are accepted.
    pub fn begin_page(&mut self, page: usize) {
        self.current_page = page;
        self.page = None;
        self.rect = RectF::default();
        self.scale = 1.0;
        self.scaling = false;
        self.can_navigate = true;
    }

    /// Whether the current page has a size and a place on screen
    #[must_use]
    pub fn is_laid_out(&self) -> bool {
        self.page.is_some()
    }

    /// Show `page` fitted to the screen
    pub fn load_page(&mut self, page: usize, geometry: PageGeometry) -> Vec<ViewportEffect> {
        self.current_page = page;
        self.page = Some(geometry);
        self.scaling = false;
        self.fit();
        self.render()
    }

    /// Screen size changed; the page is fitted again
    pub fn resize(&mut self, screen: Size) -> Vec<ViewportEffect> {
        if self.screen == screen {
            return vec![];
        }
        self.screen = screen;
        if self.page.is_none() {
            return vec![];
        }
        self.fit();
        self.render()
    }

    /// Center the page, fitting width or height depending on which aspect
    /// ratio is wider. Resets scale and allows navigation.
    pub fn fit(&mut self) {
        let Some(page) = self.page else {
            return;
        };
        if self.screen.is_empty() {
            return;
        }

        let screen_w = self.screen.width as f32;
        let screen_h = self.screen.height as f32;
        let page_aspect = page.aspect();

        self.rect = if page_aspect > self.screen.aspect() {
            let height = screen_w / page_aspect;
            let top = (screen_h - height) / 2.0;
            RectF::new(0.0, top, screen_w, top + height)
        } else {
            let width = screen_h * page_aspect;
            let left = (screen_w - width) / 2.0;
            RectF::new(left, 0.0, left + width, screen_h)
        };
        self.scale = 1.0;
        self.can_navigate = true;
    }

    /// Apply a gesture and return resulting effects
    pub fn apply(&mut self, gesture: Gesture) -> Vec<ViewportEffect> {
        if let Gesture::Fling { vx, .. } = gesture {
            return self.navigate(vx);
        }
        if self.page.is_none() {
            return vec![];
        }

        match gesture {
            Gesture::Drag { dx, dy } => self.pan(dx, dy),

            Gesture::ScaleBegin => {
                self.scaling = true;
                self.can_navigate = false;
                vec![]
            }

            Gesture::Scale {
                factor,
                focus_x,
                focus_y,
            } => self.zoom(factor, focus_x, focus_y),

            Gesture::ScaleEnd => {
                self.scaling = false;
                if self.scale == 1.0 && !self.rect.covers(self.screen) {
                    debug!("zoom back at 1.0, refitting page {}", self.current_page);
                    self.fit();
                    self.render()
                } else {
                    vec![]
                }
            }

            Gesture::Fling { .. } => vec![],
        }
    }

    fn pan(&mut self, dx: f32, dy: f32) -> Vec<ViewportEffect> {
        if self.scaling || self.can_navigate {
            return vec![];
        }

        let screen_w = self.screen.width as f32;
        let screen_h = self.screen.height as f32;
        let mut moved = false;

        if axis_allows(self.rect.left + dx, self.rect.right + dx, screen_w) {
            self.rect.left += dx;
            self.rect.right += dx;
            moved |= dx != 0.0;
        }
        if axis_allows(self.rect.top + dy, self.rect.bottom + dy, screen_h) {
            self.rect.top += dy;
            self.rect.bottom += dy;
            moved |= dy != 0.0;
        }

        if moved {
            self.render()
        } else {
            vec![]
        }
    }

    fn zoom(&mut self, factor: f32, focus_x: f32, focus_y: f32) -> Vec<ViewportEffect> {
        if !factor.is_finite() || factor <= 0.0 {
            return vec![];
        }

        self.scaling = true;
        self.can_navigate = false;

        let scale = (self.scale * factor).max(1.0);
        let step = scale / self.scale;
        self.scale = scale;
        if step == 1.0 {
            return vec![];
        }

        self.rect = self.rect.scaled_about(step, focus_x, focus_y);
        self.render()
    }

    /// Positive `vx` moves forward, negative moves back; anything within
    /// the threshold is ignored.
    fn navigate(&self, vx: f32) -> Vec<ViewportEffect> {
        if !self.can_navigate || self.scaling {
            return vec![];
        }

        let target = if vx > self.fling_threshold {
            (self.current_page + 1 < self.page_count).then(|| self.current_page + 1)
        } else if vx < -self.fling_threshold {
            self.current_page.checked_sub(1)
        } else {
            None
        };

        match target {
            Some(page) => vec![ViewportEffect::Navigate(page)],
            None => vec![],
        }
    }

    fn render(&self) -> Vec<ViewportEffect> {
        vec![ViewportEffect::RenderRegion(self.region())]
    }
}

/// Content edges either stay inside `[0, extent]` or fully straddle it
fn axis_allows(start: f32, end: f32, extent: f32) -> bool {
    let within = start >= 0.0 && end <= extent;
    let straddles = start <= 0.0 && end >= extent;
    within || straddles
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;

    const SCREEN: Size = Size::new(200, 200);

    fn viewport(pages: usize) -> Viewport {
        let mut viewport = Viewport::new(SCREEN, pages, 100.0);
        viewport.load_page(0, PageGeometry::new(100, 200));
        viewport
    }

    fn pinch(
        viewport: &mut Viewport,
        factors: &[f32],
        focus: (f32, f32),
    ) -> Vec<ViewportEffect> {
        viewport.apply(Gesture::ScaleBegin);
        for &factor in factors {
            viewport.apply(Gesture::Scale {
                factor,
                focus_x: focus.0,
                focus_y: focus.1,
            });
        }
        viewport.apply(Gesture::ScaleEnd)
    }

    #[test]
    fn fit_centers_tall_page_by_height() {
        let viewport = viewport(1);
        assert_eq!(viewport.rect(), RectF::new(50.0, 0.0, 150.0, 200.0));
        assert!(viewport.can_navigate());
        assert_eq!(viewport.scale(), 1.0);
    }

    #[test]
    fn fit_centers_wide_page_by_width() {
        let mut viewport = Viewport::new(SCREEN, 1, 100.0);
        let effects = viewport.load_page(0, PageGeometry::new(400, 100));
        assert_eq!(viewport.rect(), RectF::new(0.0, 75.0, 200.0, 125.0));
        assert_eq!(
            effects,
            vec![ViewportEffect::RenderRegion(Region::new(0, 75, 200, 50))]
        );
    }

    #[test]
    fn fit_is_idempotent() {
        let mut viewport = viewport(1);
        pinch(&mut viewport, &[3.0], (10.0, 10.0));
        viewport.fit();
        let once = viewport.rect();
        viewport.fit();
        assert_eq!(viewport.rect(), once);
    }

    #[test]
    fn scale_never_drops_below_one() {
        let mut rng = StdRng::seed_from_u64(0x200f);
        let mut viewport = viewport(1);
        viewport.apply(Gesture::ScaleBegin);

        for _ in 0..300 {
            let before = viewport.scale();
            let factor = rng.gen_range(0.25..1.8);
            viewport.apply(Gesture::Scale {
                factor,
                focus_x: rng.gen_range(0.0..200.0),
                focus_y: rng.gen_range(0.0..200.0),
            });
            assert_eq!(viewport.scale(), (before * factor).max(1.0));
            assert!(viewport.scale() >= 1.0);
            assert!(!viewport.can_navigate());
        }
    }

    #[test]
    fn drag_is_ignored_until_zoomed() {
        let mut viewport = viewport(1);
        let before = viewport.rect();
        assert!(viewport.apply(Gesture::Drag { dx: 10.0, dy: 0.0 }).is_empty());
        assert_eq!(viewport.rect(), before);
    }

    #[test]
    fn drag_is_ignored_mid_pinch() {
        let mut viewport = viewport(1);
        viewport.apply(Gesture::ScaleBegin);
        viewport.apply(Gesture::Scale {
            factor: 2.0,
            focus_x: 100.0,
            focus_y: 100.0,
        });
        let before = viewport.rect();
        assert!(viewport.apply(Gesture::Drag { dx: 5.0, dy: 5.0 }).is_empty());
        assert_eq!(viewport.rect(), before);
    }

    #[test]
    fn pan_clamps_each_axis_separately() {
        let mut viewport = viewport(1);
        pinch(&mut viewport, &[2.0], (100.0, 100.0));
        // 200x400 content: x fits exactly, y straddles the screen
        assert_eq!(viewport.rect(), RectF::new(0.0, -100.0, 200.0, 300.0));

        // x would leave the screen, y stays straddling
        let effects = viewport.apply(Gesture::Drag { dx: 30.0, dy: 40.0 });
        assert_eq!(viewport.rect(), RectF::new(0.0, -60.0, 200.0, 340.0));
        assert_eq!(effects.len(), 1);

        // past the top edge is rejected
        assert!(viewport.apply(Gesture::Drag { dx: 0.0, dy: 80.0 }).is_empty());
        assert_eq!(viewport.rect().top, -60.0);
    }

    #[test]
    fn pinch_back_to_one_refits_when_screen_uncovered() {
        let mut viewport = viewport(1);
        let fitted = viewport.rect();

        let effects = pinch(&mut viewport, &[2.0, 0.5], (20.0, 20.0));

        assert_eq!(viewport.scale(), 1.0);
        assert_eq!(viewport.rect(), fitted);
        assert!(viewport.can_navigate());
        assert_eq!(effects, vec![ViewportEffect::RenderRegion(fitted.to_region())]);
    }

    #[test]
    fn pinch_back_to_one_keeps_covering_rect() {
        let mut viewport = Viewport::new(SCREEN, 1, 100.0);
        viewport.load_page(0, PageGeometry::new(300, 300));
        assert!(viewport.rect().covers(SCREEN));

        let effects = pinch(&mut viewport, &[2.0, 0.5], (100.0, 100.0));

        assert_eq!(viewport.scale(), 1.0);
        assert!(effects.is_empty());
        assert!(!viewport.can_navigate());
    }

    #[test]
    fn zoomed_pinch_end_does_not_refit() {
        let mut viewport = viewport(1);
        let effects = pinch(&mut viewport, &[1.5], (100.0, 100.0));
        assert!(effects.is_empty());
        assert_eq!(viewport.scale(), 1.5);
    }

    #[test]
    fn fling_uses_one_sign_convention() {
        let mut viewport = viewport(3);
        assert_eq!(
            viewport.apply(Gesture::Fling { vx: 150.0, vy: 0.0 }),
            vec![ViewportEffect::Navigate(1)]
        );
        assert!(viewport.apply(Gesture::Fling { vx: -150.0, vy: 0.0 }).is_empty());

        viewport.load_page(1, PageGeometry::new(100, 200));
        assert_eq!(
            viewport.apply(Gesture::Fling { vx: -150.0, vy: 0.0 }),
            vec![ViewportEffect::Navigate(0)]
        );
    }

    #[test]
    fn fling_within_threshold_does_nothing() {
        let mut viewport = viewport(3);
        for vx in [-100.0, -40.0, 0.0, 40.0, 100.0] {
            assert!(viewport.apply(Gesture::Fling { vx, vy: 900.0 }).is_empty());
        }
    }

    #[test]
    fn fling_stops_at_last_page() {
        let mut viewport = viewport(1);
        assert!(viewport.apply(Gesture::Fling { vx: 500.0, vy: 0.0 }).is_empty());
    }

    #[test]
    fn pending_page_accepts_only_flings() {
        let mut viewport = viewport(3);
        pinch(&mut viewport, &[2.0], (100.0, 100.0));
        viewport.begin_page(1);

        assert!(!viewport.is_laid_out());
        assert_eq!(viewport.current_page(), 1);
        assert_eq!(viewport.scale(), 1.0);
        assert!(viewport.apply(Gesture::ScaleBegin).is_empty());
        assert!(viewport.apply(Gesture::Drag { dx: 5.0, dy: 5.0 }).is_empty());
        assert!(viewport.resize(Size::new(300, 200)).is_empty());
        assert_eq!(
            viewport.apply(Gesture::Fling { vx: 500.0, vy: 0.0 }),
            vec![ViewportEffect::Navigate(2)]
        );

        let effects = viewport.load_page(1, PageGeometry::new(100, 200));
        assert!(viewport.is_laid_out());
        assert_eq!(viewport.rect(), RectF::new(100.0, 0.0, 200.0, 200.0));
        assert_eq!(effects.len(), 1);
    }

    #[test]
    fn fling_is_ignored_while_zoomed() {
        let mut viewport = viewport(3);
        pinch(&mut viewport, &[2.0], (100.0, 100.0));
        assert!(viewport.apply(Gesture::Fling { vx: 500.0, vy: 0.0 }).is_empty());
    }
}
