//! # Descriptor ring
//!
//! One page of descriptors shared with the engine. The host owns `head` (the
//! next slot it writes); the engine owns the tail register (the next slot it
//! consumes). One slot always stays empty so that `head == tail` means
//! "empty" and never "full".

use crate::descriptor::RawDescriptor;
use alloc::boxed::Box;
use mic_addresses::VirtualAddress;

/// Size of the ring in bytes.
pub const RING_BYTES: usize = 4096;

/// Number of descriptors in the ring.
pub const RING_CAPACITY: usize = RING_BYTES / size_of::<RawDescriptor>();

const _: () = assert!(RING_CAPACITY == 256);

#[repr(C, align(4096))]
struct RingPage {
    slots: [RawDescriptor; RING_CAPACITY],
}

const _: () = assert!(size_of::<RingPage>() == RING_BYTES);

pub struct DescriptorRing {
    page: Box<RingPage>,
    head: usize,
    tail: usize,
}

impl Default for DescriptorRing {
    fn default() -> Self {
        Self::new()
    }
}

impl DescriptorRing {
    #[must_use]
    pub fn new() -> Self {
        Self {
            page: Box::new(RingPage {
                slots: [RawDescriptor::ZERO; RING_CAPACITY],
            }),
            head: 0,
            tail: 0,
        }
    }

    /// Where the ring lives in this address space.
    #[must_use]
    pub fn base(&self) -> VirtualAddress {
        VirtualAddress::from_ptr(self.page.slots.as_ptr())
    }

    #[inline]
    #[must_use]
    pub const fn head(&self) -> usize {
        self.head
    }

    /// Last tail value read from the engine.
    #[inline]
    #[must_use]
    pub const fn cached_tail(&self) -> usize {
        self.tail
    }

    /// Slots that can be written without overtaking the cached tail.
    #[must_use]
    pub const fn free_slots(&self) -> usize {
        let tail = if self.tail <= self.head {
            self.tail + RING_CAPACITY
        } else {
            self.tail
        };
        tail - self.head - 1
    }

    /// Whether `ndesc` slots are free.
    ///
    /// The cached tail is trusted first. Only if it says no is
    /// `read_tail` called, once, to catch up with the engine.
    pub fn has_room(&mut self, ndesc: usize, read_tail: impl FnOnce() -> u32) -> bool {
        if ndesc <= self.free_slots() {
            return true;
        }
        self.tail = read_tail() as usize % RING_CAPACITY;
        ndesc <= self.free_slots()
    }

    /// Claim the slot at head and advance head.
    ///
    /// The slot is zeroed before it is handed out. Callers must have checked
    /// [`has_room`](Self::has_room).
    pub fn reserve_next_slot(&mut self) -> &mut RawDescriptor {
        let index = self.head;
        self.head = (self.head + 1) % RING_CAPACITY;
        let slot = &mut self.page.slots[index];
        slot.store(RawDescriptor::ZERO);
        slot
    }

    /// Forget all progress and clear every slot.
    pub fn reset(&mut self) {
        for slot in &mut self.page.slots {
            slot.store(RawDescriptor::ZERO);
        }
        self.head = 0;
        self.tail = 0;
    }

    #[must_use]
    pub fn slot(&self, index: usize) -> RawDescriptor {
        self.page.slots[index % RING_CAPACITY].load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn ring_page_is_aligned() {
        let ring = DescriptorRing::new();
        assert_eq!(ring.base().as_u64() % 4096, 0);
    }

    #[test]
    fn empty_ring_keeps_one_slot_free() {
        let ring = DescriptorRing::new();
        assert_eq!(ring.free_slots(), RING_CAPACITY - 1);
    }

    #[test]
    fn has_room_trusts_cache_first() {
        let mut ring = DescriptorRing::new();
        assert!(ring.has_room(10, || panic!("tail must not be read")));
    }

    #[test]
    fn has_room_reads_tail_once() {
        let mut ring = DescriptorRing::new();
        for _ in 0..RING_CAPACITY - 1 {
            ring.reserve_next_slot();
        }
        assert_eq!(ring.free_slots(), 0);

        let mut reads = 0;
        assert!(!ring.has_room(1, || {
            reads += 1;
            0
        }));
        assert_eq!(reads, 1);

        let mut reads = 0;
        assert!(ring.has_room(5, || {
            reads += 1;
            5
        }));
        assert_eq!(reads, 1);
        assert_eq!(ring.cached_tail(), 5);
        assert_eq!(ring.free_slots(), 5);
        assert!(!ring.has_room(6, || 5));
    }

    #[test]
    fn has_room_wraps_around() {
        let mut ring = DescriptorRing::new();
        for _ in 0..250 {
            ring.reserve_next_slot();
        }
        assert!(ring.has_room(200, || 240));
        for _ in 0..200 {
            ring.reserve_next_slot();
        }
        assert_eq!(ring.head(), (250 + 200) % RING_CAPACITY);
        assert_eq!(ring.free_slots(), 240 - ring.head() - 1);
    }

    #[test]
    fn tail_register_is_reduced_modulo_capacity() {
        let mut ring = DescriptorRing::new();
        for _ in 0..RING_CAPACITY - 1 {
            ring.reserve_next_slot();
        }
        assert!(ring.has_room(3, || 3 + RING_CAPACITY as u32));
        assert_eq!(ring.cached_tail(), 3);
    }

    #[test]
    fn reservation_is_injective_within_capacity() {
        let mut ring = DescriptorRing::new();
        for _ in 0..100 {
            ring.reserve_next_slot();
        }
        let mut seen = BTreeSet::new();
        for _ in 0..RING_CAPACITY {
            let p = core::ptr::from_mut(ring.reserve_next_slot()) as usize;
            assert!(seen.insert(p));
        }
    }

    #[test]
    fn reserved_slot_is_zeroed() {
        let mut ring = DescriptorRing::new();
        ring.reserve_next_slot().store(RawDescriptor { qw0: 1, qw1: 2 });
        assert_eq!(ring.slot(0), RawDescriptor { qw0: 1, qw1: 2 });

        for _ in 1..RING_CAPACITY {
            ring.reserve_next_slot();
        }
        assert_eq!(ring.head(), 0);
        ring.reserve_next_slot();
        assert_eq!(ring.slot(0), RawDescriptor::ZERO);
    }

    #[test]
    fn reset_clears_state() {
        let mut ring = DescriptorRing::new();
        ring.reserve_next_slot().store(RawDescriptor { qw0: 1, qw1: 2 });
        ring.has_room(RING_CAPACITY, || 7);
        ring.reset();
        assert_eq!((ring.head(), ring.cached_tail()), (0, 0));
        assert_eq!(ring.slot(0), RawDescriptor::ZERO);
    }
}
