use mic_addresses::{PhysicalAddress, VirtualAddress};

/// The host's own virtual-to-physical lookup, for memory the driver
/// allocates and hands to the engine.
pub trait HostMemory {
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress;
}

impl<T: HostMemory + ?Sized> HostMemory for &T {
    fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        (**self).virt_to_phys(va)
    }
}
