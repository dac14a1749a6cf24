use std::collections::VecDeque;

use log::{debug, info};

use super::buffer::PixelBuffer;

/// Default pool size: 5 slots.
pub const DEFAULT_POOL_SIZE: usize = 5;

/// Stable identity of a slot across its whole lifetime
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotId(pub u32);

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "slot#{}", self.0)
    }
}

/// A reusable page container.
///
/// Holds two buffers: the `visible` one a presenter draws from, and the
/// `target` one the next render writes into. While a render is in flight the
/// target has moved to the render lane and `target` is empty.
pub struct PageSlot {
    id: SlotId,
    visible: Option<PixelBuffer>,
    target: Option<PixelBuffer>,
    bound_page: Option<usize>,
    generation: u64,
    presented: Option<u64>,
}

impl PageSlot {
    fn new(id: SlotId) -> Self {
        Self {
            id,
            visible: None,
            target: Some(PixelBuffer::unallocated()),
            bound_page: None,
            generation: 0,
            presented: None,
        }
    }

    #[must_use]
    pub fn id(&self) -> SlotId {
        self.id
    }

    #[must_use]
    pub fn bound_page(&self) -> Option<usize> {
        self.bound_page
    }

    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Generation of the render currently in the visible buffer
    #[must_use]
    pub fn presented_generation(&self) -> Option<u64> {
        self.presented
    }

    /// Most recently completed render, if any
    #[must_use]
    pub fn visible(&self) -> Option<&PixelBuffer> {
        self.visible.as_ref()
    }

    /// False while the target buffer is out on the render lane
    #[must_use]
    pub fn has_target(&self) -> bool {
        self.target.is_some()
    }

    pub(crate) fn bump_generation(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    pub(crate) fn bind(&mut self, page: usize) {
        self.bound_page = Some(page);
        self.bump_generation();
    }

    /// Move the target buffer out for a render. Allocates lazily if the
    /// previous target never came back.
    pub(crate) fn take_target(&mut self) -> PixelBuffer {
        self.target.take().unwrap_or_else(PixelBuffer::unallocated)
    }

    /// Give a buffer back as the render target. Surplus buffers are dropped.
    pub(crate) fn restore_target(&mut self, buffer: PixelBuffer) {
        if self.target.is_none() {
            self.target = Some(buffer);
        }
    }

    /// Swap a freshly rendered buffer in; the old visible buffer becomes the target
    pub(crate) fn present(&mut self, buffer: PixelBuffer, generation: u64) {
        self.presented = Some(generation);
        if let Some(previous) = self.visible.replace(buffer) {
            self.restore_target(previous);
        }
    }

    fn reset(&mut self) {
        self.bound_page = None;
        self.presented = None;
        self.bump_generation();
        if let Some(visible) = self.visible.take() {
            self.restore_target(visible);
        }
    }
}

impl std::fmt::Debug for PageSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageSlot")
            .field("id", &self.id)
            .field("bound_page", &self.bound_page)
            .field("generation", &self.generation)
            .field("presented", &self.presented)
            .field("visible", &self.visible.is_some())
            .field("target", &self.target.is_some())
            .finish()
    }
}

/// Free list of page slots.
///
/// The size is a soft bound: when the free list is empty, [`acquire`]
/// allocates a new slot instead of blocking. Slots are handed out by value,
/// so a slot is only ever held by one owner.
///
/// [`acquire`]: SlotPool::acquire
pub struct SlotPool {
    free: VecDeque<PageSlot>,
    capacity: usize,
    allocated: usize,
    next_id: u32,
}

impl SlotPool {
    /// Creates a pool pre-populated with `capacity` free slots
    pub fn new(capacity: usize) -> Self {
        let mut pool = Self {
            free: VecDeque::with_capacity(capacity),
            capacity,
            allocated: 0,
            next_id: 0,
        };
        for _ in 0..capacity {
            let slot = pool.allocate();
            pool.free.push_back(slot);
        }
        info!("slot pool initialized: {capacity} slots");
        pool
    }

    fn allocate(&mut self) -> PageSlot {
        let id = SlotId(self.next_id);
        self.next_id += 1;
        self.allocated += 1;
        PageSlot::new(id)
    }

    /// Take a free slot, growing the pool if none is left
    pub fn acquire(&mut self) -> PageSlot {
        if let Some(slot) = self.free.pop_front() {
            return slot;
        }

        let slot = self.allocate();
        debug!(
            "slot pool exhausted, allocated {} ({} total, soft bound {})",
            slot.id, self.allocated, self.capacity
        );
        slot
    }

    /// Return a slot. Its page binding is cleared and its generation bumped
    /// so any render still in flight for it is recognised as stale.
    pub fn release(&mut self, mut slot: PageSlot) {
        slot.reset();
        self.free.push_back(slot);
    }

    /// Hand a buffer back to a free slot whose render came back after release
    pub(crate) fn restore_target(&mut self, id: SlotId, buffer: PixelBuffer) -> bool {
        match self.free.iter_mut().find(|slot| slot.id == id) {
            Some(slot) => {
                slot.restore_target(buffer);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn contains(&self, id: SlotId) -> bool {
        self.free.iter().any(|slot| slot.id == id)
    }

    /// Number of slots waiting in the free list
    #[must_use]
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Slots created over the pool's lifetime
    #[must_use]
    pub fn allocated(&self) -> usize {
        self.allocated
    }

    /// Configured soft bound
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SlotPool {
    fn default() -> Self {
        Self::new(DEFAULT_POOL_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    use super::*;
    use crate::document::Size;

    #[test]
    fn pool_starts_full() {
        let pool = SlotPool::new(5);
        assert_eq!(pool.free_len(), 5);
        assert_eq!(pool.allocated(), 5);
    }

    #[test]
    fn acquire_grows_instead_of_blocking() {
        let mut pool = SlotPool::new(2);
        let a = pool.acquire();
        let b = pool.acquire();
        let c = pool.acquire();

        assert_eq!(pool.allocated(), 3);
        assert_eq!(pool.free_len(), 0);
        assert_ne!(a.id(), c.id());
        assert_ne!(b.id(), c.id());
    }

    #[test]
    fn released_slots_are_reused() {
        let mut pool = SlotPool::new(1);
        let slot = pool.acquire();
        let id = slot.id();
        pool.release(slot);

        let again = pool.acquire();
        assert_eq!(again.id(), id);
        assert_eq!(pool.allocated(), 1);
    }

    #[test]
    fn release_clears_binding_and_bumps_generation() {
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();
        slot.bind(4);
        let generation = slot.generation();
        pool.release(slot);

        let slot = pool.acquire();
        assert_eq!(slot.bound_page(), None);
        assert!(slot.generation() > generation);
    }

    #[test]
    fn release_retires_visible_buffer_to_target() {
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();
        let target = slot.take_target();
        slot.present(PixelBuffer::new(Size::new(4, 4)), 1);
        drop(target);
        assert!(!slot.has_target());

        pool.release(slot);
        let slot = pool.acquire();
        assert!(slot.visible().is_none());
        assert!(slot.has_target());
    }

    #[test]
    fn present_swaps_buffers() {
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();
        let mut target = slot.take_target();
        target.ensure_size(Size::new(8, 8));
        slot.present(target, 3);

        assert_eq!(slot.presented_generation(), Some(3));
        assert_eq!(slot.visible().map(PixelBuffer::size), Some(Size::new(8, 8)));
        assert!(!slot.has_target());

        slot.present(PixelBuffer::new(Size::new(2, 2)), 4);
        assert!(slot.has_target());
    }

    #[test]
    fn restore_target_reaches_free_slot() {
        let mut pool = SlotPool::new(1);
        let mut slot = pool.acquire();
        let id = slot.id();
        let in_flight = slot.take_target();
        pool.release(slot);

        // release moved nothing into target because visible was empty
        assert!(pool.restore_target(id, in_flight));
        assert!(!pool.restore_target(SlotId(99), PixelBuffer::unallocated()));
        assert!(pool.acquire().has_target());
    }

    #[test]
    fn never_hands_out_a_held_slot() {
        let mut rng = StdRng::seed_from_u64(0x5107);
        let mut pool = SlotPool::new(5);
        let mut held: Vec<PageSlot> = Vec::new();

        for _ in 0..2_000 {
            if held.is_empty() || rng.gen_bool(0.55) {
                let slot = pool.acquire();
                assert!(
                    held.iter().all(|h| h.id() != slot.id()),
                    "{} handed out twice",
                    slot.id()
                );
                assert!(!pool.contains(slot.id()));
                held.push(slot);
            } else {
                let idx = rng.gen_range(0..held.len());
                let slot = held.swap_remove(idx);
                pool.release(slot);
            }

            let ids: HashSet<SlotId> = held.iter().map(PageSlot::id).collect();
            assert_eq!(ids.len(), held.len());
            assert_eq!(held.len() + pool.free_len(), pool.allocated());
        }
    }
}
