pub mod document;
pub mod error;
pub mod logging;
pub mod render;
pub mod settings;
pub mod viewer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

// Re-export the session entry points
pub use document::{Document, DocumentSource, PageGeometry, RasterEngine, RasterHandle, Size};
pub use error::{BackendFault, ViewerError, ViewerResult};
pub use render::{ContentId, Pipeline, PipelineStats, PixelBuffer, SlotId, ViewerEvent};
pub use settings::ViewerSettings;
pub use viewer::{FreePanViewer, Gesture, PagedViewer, Viewport};

#[cfg(feature = "pdf")]
pub use document::mupdf::MupdfEngine;
