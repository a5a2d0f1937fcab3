use core::ops::Range;
use mic_addresses::PhysicalAddress;

/// Receives physical ranges the page allocator must never hand out.
pub trait ReservationSink {
    fn reserve(&mut self, range: Range<PhysicalAddress>);
}

impl<F> ReservationSink for F
where
    F: FnMut(Range<PhysicalAddress>),
{
    fn reserve(&mut self, range: Range<PhysicalAddress>) {
        self(range);
    }
}

/// Processor-model specific reservations (firmware tables, mailbox pages and
/// the like), reported after the architecture-wide ones.
pub trait MicroArchReservations {
    fn reserve_arch_pages(
        &mut self,
        start: PhysicalAddress,
        end: PhysicalAddress,
        sink: &mut dyn ReservationSink,
    );
}

/// A processor model without extra reserved memory.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoMicroArchReservations;

impl MicroArchReservations for NoMicroArchReservations {
    fn reserve_arch_pages(
        &mut self,
        _start: PhysicalAddress,
        _end: PhysicalAddress,
        _sink: &mut dyn ReservationSink,
    ) {
    }
}
