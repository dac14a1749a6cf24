//! Render and prefetch lanes - each runs in its own dedicated thread

use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use flume::{Receiver, Sender};
use log::{debug, warn};

use super::buffer::PixelBuffer;
use super::request::{
    LaneEvent, PrefetchCommand, RenderCommand, RenderJob, RenderRequest, RenderTarget,
};
use crate::document::Document;
use crate::error::ViewerResult;

pub const RENDER_LANE_NAME: &str = "folio-render";
pub const PREFETCH_LANE_NAME: &str = "folio-prefetch";

/// Spawn a named lane thread
pub fn spawn_lane<F>(name: &str, body: F) -> io::Result<JoinHandle<()>>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new().name(name.to_string()).spawn(body)
}

/// Render lane body. Jobs run strictly in submission order, one at a time.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn render_lane(
    doc: Arc<Document>,
    commands: Receiver<RenderCommand>,
    events: Sender<LaneEvent>,
) {
    debug!("render lane started");

    for command in commands {
        match command {
            RenderCommand::Render(job) => {
                let event = render_job(&doc, job);
                if events.send(event).is_err() {
                    break;
                }
            }
            RenderCommand::Measure { slot, page } => {
                let event = LaneEvent::Measured {
                    slot,
                    page,
                    result: doc.page_size(page),
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            RenderCommand::Shutdown => break,
        }
    }

    debug!("render lane stopped");
}

fn render_job(doc: &Document, job: RenderJob) -> LaneEvent {
    let RenderJob {
        id,
        slot,
        generation,
        request,
        mut buffer,
    } = job;

    let result = rasterize_request(doc, &request, &mut buffer);
    if let Err(e) = &result {
        warn!("{slot}: {e}");
    }

    LaneEvent::Rendered {
        id,
        slot,
        generation,
        page: request.page,
        buffer,
        result,
    }
}

/// Size the buffer for the request and rasterize into it
pub(crate) fn rasterize_request(
    doc: &Document,
    request: &RenderRequest,
    buffer: &mut PixelBuffer,
) -> ViewerResult<()> {
    match request.target {
        RenderTarget::FullPage { scale } => {
            let size = doc.page_size(request.page)?.scaled(scale);
            if buffer.ensure_size(size) {
                debug!(
                    "allocated {}x{} buffer for page {}",
                    size.width, size.height, request.page
                );
            }
            doc.rasterize(request.page, buffer, None)
        }
        RenderTarget::Region { surface, region } => {
            buffer.ensure_size(surface);
            doc.rasterize(request.page, buffer, Some(region))
        }
    }
}

/// Prefetch lane body. Decodes pages ahead of time; failures are logged and dropped.
#[expect(
    clippy::needless_pass_by_value,
    reason = "Values moved into thread, need ownership"
)]
pub fn prefetch_lane(
    doc: Arc<Document>,
    commands: Receiver<PrefetchCommand>,
    events: Sender<LaneEvent>,
) {
    debug!("prefetch lane started");

    for command in commands {
        match command {
            PrefetchCommand::Decode(page) => {
                let event = match doc.ensure_decoded(page) {
                    Ok(decoded) => LaneEvent::Prefetched { page, decoded },
                    Err(e) => {
                        warn!("prefetch of page {page} dropped: {e}");
                        LaneEvent::PrefetchFailed { page }
                    }
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            PrefetchCommand::Shutdown => break,
        }
    }

    debug!("prefetch lane stopped");
}
