use mic_addresses::{PhysicalAddress, VirtualAddress};

/// Runtime inputs the kernel receives from its loader.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BootParameters {
    /// Physical address the image was loaded at; backs [`KERNEL_VIRT_BASE`](crate::memory::KERNEL_VIRT_BASE).
    pub kernel_phys_base: PhysicalAddress,

    /// First byte of the kernel image (virtual).
    pub kernel_start: VirtualAddress,

    /// One past the last byte of the kernel image (virtual).
    pub kernel_end: VirtualAddress,

    /// Start of the physical range covered by the straight map.
    pub map_start: PhysicalAddress,

    /// End (exclusive) of the physical range covered by the straight map.
    pub map_end: PhysicalAddress,
}
