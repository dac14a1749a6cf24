//! Presentation strategies built on the render pipeline

mod free_pan;
mod paged;
pub mod viewport;

pub use free_pan::FreePanViewer;
pub use paged::PagedViewer;
pub use viewport::{Gesture, Viewport, ViewportEffect};
