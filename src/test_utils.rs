//! Scriptable in-memory rasterizer for tests

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use flume::{Receiver, Sender};

use crate::document::{DocumentSource, PageGeometry, RasterEngine, RasterHandle, Region};
use crate::error::BackendFault;
use crate::render::PixelBuffer;

/// Longest a gated render waits for the test to release it
const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default page size used by [`FakeEngine::with_pages`]
pub const DEFAULT_PAGE: PageGeometry = PageGeometry::new(100, 140);

/// One call made into the fake library
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BackendCall {
    Open,
    LoadPage(usize),
    PageWidth(usize),
    PageHeight(usize),
    RenderFull(usize),
    RenderRegion(usize, Region),
    Close,
}

impl BackendCall {
    #[must_use]
    pub fn is_render(&self) -> bool {
        matches!(self, Self::RenderFull(_) | Self::RenderRegion(..))
    }

    #[must_use]
    pub fn page(&self) -> Option<usize> {
        match self {
            Self::LoadPage(p)
            | Self::PageWidth(p)
            | Self::PageHeight(p)
            | Self::RenderFull(p)
            | Self::RenderRegion(p, _) => Some(*p),
            Self::Open | Self::Close => None,
        }
    }
}

type CallLog = Arc<Mutex<Vec<BackendCall>>>;

/// Test control for renders held in flight
pub struct RenderGate {
    tx: Option<Sender<()>>,
}

impl RenderGate {
    /// Let `count` renders proceed
    pub fn release(&self, count: usize) {
        if let Some(tx) = &self.tx {
            for _ in 0..count {
                let _ = tx.send(());
            }
        }
    }

    /// Let every current and future render proceed
    pub fn open(&mut self) {
        self.tx = None;
    }
}

/// In-memory stand-in for the native rasterization library.
///
/// Every call is appended to a shared log so tests can assert on exactly
/// which decode and render work happened, and on which thread order.
#[derive(Clone)]
pub struct FakeEngine {
    pages: Vec<PageGeometry>,
    failing_pages: HashSet<usize>,
    fail_open: bool,
    fail_close: bool,
    log: CallLog,
    gate: Option<Receiver<()>>,
}

impl FakeEngine {
    #[must_use]
    pub fn with_pages(count: usize) -> Self {
        Self::with_geometries(vec![DEFAULT_PAGE; count])
    }

    #[must_use]
    pub fn with_geometries(pages: Vec<PageGeometry>) -> Self {
        Self {
            pages,
            failing_pages: HashSet::new(),
            fail_open: false,
            fail_close: false,
            log: Arc::new(Mutex::new(Vec::new())),
            gate: None,
        }
    }

    /// Page `index` fails to decode
    #[must_use]
    pub fn failing_page(mut self, index: usize) -> Self {
        self.failing_pages.insert(index);
        self
    }

    #[must_use]
    pub fn failing_open(mut self) -> Self {
        self.fail_open = true;
        self
    }

    #[must_use]
    pub fn failing_close(mut self) -> Self {
        self.fail_close = true;
        self
    }

    /// Hold every render until the returned gate releases it
    #[must_use]
    pub fn gated(mut self) -> (Self, RenderGate) {
        let (tx, rx) = flume::unbounded();
        self.gate = Some(rx);
        (self, RenderGate { tx: Some(tx) })
    }

    /// Colour every pixel of page `index` is painted with
    #[must_use]
    pub fn page_color(index: usize) -> [u8; 4] {
        [index as u8, 0x40, 0x80, 0xFF]
    }

    #[must_use]
    pub fn calls(&self) -> Vec<BackendCall> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    #[must_use]
    pub fn load_count(&self, index: usize) -> usize {
        self.count(|c| *c == BackendCall::LoadPage(index))
    }

    #[must_use]
    pub fn render_count(&self, index: usize) -> usize {
        self.count(|c| c.is_render() && c.page() == Some(index))
    }

    #[must_use]
    pub fn render_calls(&self) -> Vec<BackendCall> {
        self.calls().into_iter().filter(BackendCall::is_render).collect()
    }

    fn count(&self, pred: impl Fn(&BackendCall) -> bool) -> usize {
        self.calls().iter().filter(|&c| pred(c)).count()
    }

    /// Poll the call log until `call` shows up
    #[must_use]
    pub fn wait_for_call(&self, call: &BackendCall, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.calls().contains(call) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }
}

impl RasterEngine for FakeEngine {
    fn open(&self, _source: &DocumentSource) -> Option<Box<dyn RasterHandle>> {
        record(&self.log, BackendCall::Open);
        if self.fail_open {
            return None;
        }

        Some(Box::new(FakeHandle {
            engine: self.clone(),
            loaded: HashSet::new(),
        }))
    }
}

fn record(log: &CallLog, call: BackendCall) {
    log.lock().unwrap_or_else(PoisonError::into_inner).push(call);
}

struct FakeHandle {
    engine: FakeEngine,
    loaded: HashSet<usize>,
}

impl FakeHandle {
    fn geometry(&self, index: usize) -> Result<PageGeometry, BackendFault> {
        self.engine
            .pages
            .get(index)
            .copied()
            .ok_or_else(|| BackendFault::new(format!("no page {index}")))
    }

    fn wait_gate(&self) {
        if let Some(gate) = &self.engine.gate {
            let _ = gate.recv_timeout(GATE_TIMEOUT);
        }
    }
}

impl RasterHandle for FakeHandle {
    fn page_count(&self) -> usize {
        self.engine.pages.len()
    }

    fn has_page_loaded(&self, index: usize) -> bool {
        self.loaded.contains(&index)
    }

    fn load_page(&mut self, index: usize) -> Result<(), BackendFault> {
        record(&self.engine.log, BackendCall::LoadPage(index));
        if self.engine.failing_pages.contains(&index) {
            return Err(BackendFault::new(format!("page {index} is corrupt")));
        }
        self.geometry(index)?;
        self.loaded.insert(index);
        Ok(())
    }

    fn page_width(&mut self, index: usize) -> Result<u32, BackendFault> {
        record(&self.engine.log, BackendCall::PageWidth(index));
        Ok(self.geometry(index)?.width)
    }

    fn page_height(&mut self, index: usize) -> Result<u32, BackendFault> {
        record(&self.engine.log, BackendCall::PageHeight(index));
        Ok(self.geometry(index)?.height)
    }

    fn render_full_page(
        &mut self,
        buffer: &mut PixelBuffer,
        index: usize,
    ) -> Result<(), BackendFault> {
        record(&self.engine.log, BackendCall::RenderFull(index));
        self.wait_gate();
        buffer.fill(FakeEngine::page_color(index));
        Ok(())
    }

    fn render_region(
        &mut self,
        surface: &mut PixelBuffer,
        index: usize,
        region: Region,
    ) -> Result<(), BackendFault> {
        record(&self.engine.log, BackendCall::RenderRegion(index, region));
        self.wait_gate();

        surface.fill([0, 0, 0, 0]);
        let color = FakeEngine::page_color(index);
        let x0 = region.left.max(0) as u32;
        let y0 = region.top.max(0) as u32;
        let x1 = (i64::from(region.left) + i64::from(region.width))
            .clamp(0, i64::from(surface.width())) as u32;
        let y1 = (i64::from(region.top) + i64::from(region.height))
            .clamp(0, i64::from(surface.height())) as u32;
        for y in y0..y1 {
            for x in x0..x1 {
                surface.set_pixel(x, y, color);
            }
        }
        Ok(())
    }

    fn close(&mut self) -> Result<(), BackendFault> {
        record(&self.engine.log, BackendCall::Close);
        self.loaded.clear();
        if self.engine.fail_close {
            return Err(BackendFault::new("native close failed"));
        }
        Ok(())
    }
}
