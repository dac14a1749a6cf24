//! Render dispatch with per-slot coalescing

use std::collections::HashMap;

use flume::{SendError, Sender};
use log::{debug, warn};

use super::pool::{PageSlot, SlotId};
use super::request::{RenderCommand, RenderJob, RenderRequest, RequestId};

/// Outcome of [`RenderScheduler::submit`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Submission {
    /// Sent to the render lane
    Dispatched(RequestId),
    /// Parked behind the render already in flight for the slot
    Coalesced,
    /// Slot is not active, nothing was queued
    Inactive,
    /// Slot is bound to another page, nothing was queued
    OtherPage,
    /// Render lane is gone
    LaneClosed,
}

/// Tags renders with slot generations and keeps at most one render in flight
/// per slot.
///
/// A request for a busy slot becomes that slot's single pending request,
/// replacing any older one. It is dispatched when the in-flight render
/// comes back.
pub struct RenderScheduler {
    commands: Sender<RenderCommand>,
    in_flight: HashMap<SlotId, RequestId>,
    pending: HashMap<SlotId, RenderRequest>,
    measuring: usize,
    next_request_id: u64,
}

impl RenderScheduler {
    pub fn new(commands: Sender<RenderCommand>) -> Self {
        Self {
            commands,
            in_flight: HashMap::new(),
            pending: HashMap::new(),
            measuring: 0,
            next_request_id: 1,
        }
    }

    pub fn submit(&mut self, slot: &mut PageSlot, request: RenderRequest) -> Submission {
        let id = slot.id();
        if self.in_flight.contains_key(&id) {
            if self.pending.insert(id, request).is_some() {
                debug!("{id}: replaced pending render with page {}", request.page);
            }
            return Submission::Coalesced;
        }
        self.dispatch(slot, request)
    }

    fn dispatch(&mut self, slot: &mut PageSlot, request: RenderRequest) -> Submission {
        let request_id = RequestId::new(self.next_request_id);
        self.next_request_id += 1;

        let job = RenderJob {
            id: request_id,
            slot: slot.id(),
            generation: slot.bump_generation(),
            request,
            buffer: slot.take_target(),
        };

        match self.commands.send(RenderCommand::Render(job)) {
            Ok(()) => {
                self.in_flight.insert(slot.id(), request_id);
                Submission::Dispatched(request_id)
            }
            Err(SendError(command)) => {
                warn!("{}: render lane closed, dropping page {}", slot.id(), request.page);
                if let RenderCommand::Render(job) = command {
                    slot.restore_target(job.buffer);
                }
                Submission::LaneClosed
            }
        }
    }

    /// Ask the render lane for the size of `page` on behalf of `slot`. The
    /// lookup queues behind renders already sent.
    pub fn measure(&mut self, slot: SlotId, page: usize) -> bool {
        match self.commands.send(RenderCommand::Measure { slot, page }) {
            Ok(()) => {
                self.measuring += 1;
                true
            }
            Err(_) => {
                warn!("{slot}: render lane closed, cannot measure page {page}");
                false
            }
        }
    }

    pub fn measured(&mut self) {
        self.measuring = self.measuring.saturating_sub(1);
    }

    #[must_use]
    pub fn measuring_len(&self) -> usize {
        self.measuring
    }

    /// Mark the slot's render as complete and hand back its pending request
    pub fn finish(&mut self, slot: SlotId) -> Option<RenderRequest> {
        self.in_flight.remove(&slot);
        self.pending.remove(&slot)
    }

    /// Drop the pending request of a slot that left the screen
    pub fn forget(&mut self, slot: SlotId) {
        if self.pending.remove(&slot).is_some() {
            debug!("{slot}: pending render dropped");
        }
    }

    #[must_use]
    pub fn is_in_flight(&self, slot: SlotId) -> bool {
        self.in_flight.contains_key(&slot)
    }

    #[must_use]
    pub fn in_flight_len(&self) -> usize {
        self.in_flight.len()
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn shutdown(&self) {
        let _ = self.commands.send(RenderCommand::Shutdown);
    }
}

#[cfg(test)]
mod tests {
    use flume::Receiver;

    use super::*;
    use crate::render::pool::SlotPool;

    fn scheduler() -> (RenderScheduler, Receiver<RenderCommand>) {
        let (tx, rx) = flume::unbounded();
        (RenderScheduler::new(tx), rx)
    }

    fn next_job(rx: &Receiver<RenderCommand>) -> RenderJob {
        match rx.try_recv() {
            Ok(RenderCommand::Render(job)) => job,
            other => panic!("expected a render job, got {other:?}"),
        }
    }

    #[test]
    fn dispatch_moves_target_and_tags_generation() {
        let (mut scheduler, rx) = scheduler();
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();
        let before = slot.generation();

        let outcome = scheduler.submit(&mut slot, RenderRequest::full_page(0, 1.0));

        let job = next_job(&rx);
        assert_eq!(outcome, Submission::Dispatched(job.id));
        assert_eq!(job.generation, before + 1);
        assert_eq!(slot.generation(), job.generation);
        assert!(!slot.has_target());
        assert!(scheduler.is_in_flight(slot.id()));
    }

    #[test]
    fn busy_slot_keeps_only_latest_request() {
        let (mut scheduler, rx) = scheduler();
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();

        scheduler.submit(&mut slot, RenderRequest::full_page(0, 1.0));
        let generation = slot.generation();
        assert_eq!(
            scheduler.submit(&mut slot, RenderRequest::full_page(1, 1.0)),
            Submission::Coalesced
        );
        assert_eq!(
            scheduler.submit(&mut slot, RenderRequest::full_page(2, 1.0)),
            Submission::Coalesced
        );

        assert_eq!(rx.len(), 1);
        assert_eq!(scheduler.pending_len(), 1);
        // parking a request does not invalidate the render in flight
        assert_eq!(slot.generation(), generation);

        let pending = scheduler.finish(slot.id()).expect("pending request");
        assert_eq!(pending.page, 2);
        assert!(!scheduler.is_in_flight(slot.id()));
        assert_eq!(scheduler.finish(slot.id()), None);
    }

    #[test]
    fn request_ids_are_unique() {
        let (mut scheduler, rx) = scheduler();
        let mut pool = SlotPool::new(2);
        let mut a = pool.acquire();
        let mut b = pool.acquire();

        scheduler.submit(&mut a, RenderRequest::full_page(0, 1.0));
        scheduler.submit(&mut b, RenderRequest::full_page(1, 1.0));

        assert_ne!(next_job(&rx).id, next_job(&rx).id);
        assert_eq!(scheduler.in_flight_len(), 2);
    }

    #[test]
    fn forget_drops_pending_but_keeps_in_flight() {
        let (mut scheduler, _rx) = scheduler();
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();

        scheduler.submit(&mut slot, RenderRequest::full_page(0, 1.0));
        scheduler.submit(&mut slot, RenderRequest::full_page(1, 1.0));
        scheduler.forget(slot.id());

        assert_eq!(scheduler.pending_len(), 0);
        assert!(scheduler.is_in_flight(slot.id()));
    }

    #[test]
    fn measure_is_counted_until_answered() {
        let (mut scheduler, rx) = scheduler();

        assert!(scheduler.measure(SlotId(3), 4));
        assert_eq!(scheduler.measuring_len(), 1);
        assert!(matches!(
            rx.try_recv(),
            Ok(RenderCommand::Measure {
                slot: SlotId(3),
                page: 4
            })
        ));

        scheduler.measured();
        scheduler.measured();
        assert_eq!(scheduler.measuring_len(), 0);

        drop(rx);
        assert!(!scheduler.measure(SlotId(3), 4));
        assert_eq!(scheduler.measuring_len(), 0);
    }

    #[test]
    fn closed_lane_returns_buffer_to_slot() {
        let (mut scheduler, rx) = scheduler();
        drop(rx);
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();

        let outcome = scheduler.submit(&mut slot, RenderRequest::full_page(0, 1.0));

        assert_eq!(outcome, Submission::LaneClosed);
        assert!(slot.has_target());
        assert!(!scheduler.is_in_flight(slot.id()));
    }
}
