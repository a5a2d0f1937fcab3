//! # Straight-map `PhysMapper`
//!
//! Every physical address in the direct-mapped range is reachable at
//! `STRAIGHT_MAP_BASE + pa`. Page-table frames handed out by the bootstrap
//! allocator live in that range, so the kernel edits its own tables through
//! this mapper.

use mic_addresses::{PhysicalAddress, VirtualAddress};
use mic_layout::memory::STRAIGHT_MAP_BASE;
use mic_vmem::PhysMapper;

/// [`PhysMapper`] for the kernel's straight map.
///
/// # Safety
/// The straight map must be active and cover every address passed in.
#[derive(Debug, Default, Copy, Clone)]
pub struct StraightMapper;

impl StraightMapper {
    /// The straight-map alias of `pa`.
    #[inline]
    #[must_use]
    pub const fn alias(pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(pa.as_u64() + STRAIGHT_MAP_BASE)
    }
}

impl PhysMapper for StraightMapper {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let va = Self::alias(pa).as_mut_ptr::<T>();
        // SAFETY: Caller must ensure the physical address is covered by the straight map.
        unsafe { &mut *va }
    }
}
