//! # Memory Layout

/// Base of the straight map. Any physical address `pa` in the mapped range
/// is reachable at [`STRAIGHT_MAP_BASE`] + `pa`.
pub const STRAIGHT_MAP_BASE: u64 = 0xffff_8000_0000_0000;

/// Base of the append-only window used for device registers and other
/// one-off mappings made after boot.
pub const FIXED_WINDOW_BASE: u64 = 0xffff_ffff_7000_0000;

/// Where the kernel executes (VMA). The backing physical base is only known
/// at boot, see [`BootParameters`](crate::BootParameters).
pub const KERNEL_VIRT_BASE: u64 = 0xffff_ffff_8000_0000;

/// Physical location of the application-processor startup trampoline.
pub const AP_TRAMPOLINE: u64 = 0x1_0000;

/// Size of the trampoline region in bytes.
pub const AP_TRAMPOLINE_SIZE: u64 = 0x2000;

/// Offset at which host memory appears in the DMA engine's system space.
pub const DEVICE_SYSTEM_BASE: u64 = 0x80_0000_0000;

/// Amount of host physical memory reachable through the system window.
pub const HOST_APERTURE_SIZE: u64 = 32 * 1024 * 1024 * 1024;

/// Device addresses are 40 bits wide; nothing at or above this is reachable.
pub const DEVICE_ADDRESS_LIMIT: u64 = 1 << 40;

/// Span of a 4 KiB page.
pub const PAGE_SIZE: u64 = 4096;

/// Span of a 2 MiB large page.
pub const LARGE_PAGE_SIZE: u64 = 2 * 1024 * 1024;

const _: () = {
    assert!(FIXED_WINDOW_BASE > STRAIGHT_MAP_BASE);
    assert!(KERNEL_VIRT_BASE > FIXED_WINDOW_BASE);
    assert!(KERNEL_VIRT_BASE.is_multiple_of(LARGE_PAGE_SIZE));
    assert!(STRAIGHT_MAP_BASE.is_multiple_of(512 * 1024 * 1024 * 1024));
    assert!(AP_TRAMPOLINE.is_multiple_of(PAGE_SIZE));
    assert!(AP_TRAMPOLINE_SIZE.is_multiple_of(PAGE_SIZE));
    assert!(DEVICE_SYSTEM_BASE >= HOST_APERTURE_SIZE);
    assert!(DEVICE_SYSTEM_BASE + HOST_APERTURE_SIZE <= DEVICE_ADDRESS_LIMIT);
};
