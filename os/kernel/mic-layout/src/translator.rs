use crate::memory::{
    DEVICE_ADDRESS_LIMIT, DEVICE_SYSTEM_BASE, HOST_APERTURE_SIZE, KERNEL_VIRT_BASE,
    STRAIGHT_MAP_BASE,
};
use mic_addresses::{DevicePhysicalAddress, PhysicalAddress, VirtualAddress};

/// Converts between kernel virtual and physical addresses.
///
/// Addresses at or above [`KERNEL_VIRT_BASE`] belong to the kernel image and
/// are relocated by the physical load base; everything else is treated as a
/// straight-map address.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AddressTranslator {
    kernel_phys_base: PhysicalAddress,
}

impl AddressTranslator {
    #[inline]
    #[must_use]
    pub const fn new(kernel_phys_base: PhysicalAddress) -> Self {
        Self { kernel_phys_base }
    }

    #[inline]
    #[must_use]
    pub const fn kernel_phys_base(&self) -> PhysicalAddress {
        self.kernel_phys_base
    }

    /// Physical address behind `va`.
    ///
    /// Addresses below the straight map wrap; callers must only pass
    /// addresses from a mapped region.
    #[inline]
    #[must_use]
    pub const fn virt_to_phys(&self, va: VirtualAddress) -> PhysicalAddress {
        let v = va.as_u64();
        if v >= KERNEL_VIRT_BASE {
            PhysicalAddress::new(v - KERNEL_VIRT_BASE + self.kernel_phys_base.as_u64())
        } else {
            PhysicalAddress::new(v.wrapping_sub(STRAIGHT_MAP_BASE))
        }
    }

    /// Straight-map alias of `pa`. Never returns a text-region address.
    #[inline]
    #[must_use]
    pub const fn phys_to_virt(&self, pa: PhysicalAddress) -> VirtualAddress {
        VirtualAddress::new(pa.as_u64().wrapping_add(STRAIGHT_MAP_BASE))
    }
}

/// Failure to express an address in device space.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TranslateError {
    #[error("host range {addr}+{len:#x} lies outside the host aperture")]
    OutsideAperture { addr: PhysicalAddress, len: u64 },
    #[error("device range {addr}+{len:#x} does not fit the device address width")]
    OutsideDeviceSpace { addr: DevicePhysicalAddress, len: u64 },
}

/// Maps host physical memory into the DMA engine's system space.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct DeviceAddressTranslator;

impl DeviceAddressTranslator {
    /// Device address for the host range `[pa, pa + len)`.
    ///
    /// # Errors
    /// [`TranslateError::OutsideAperture`] if any byte of the range lies at or
    /// beyond [`HOST_APERTURE_SIZE`].
    pub const fn host_to_device(
        &self,
        pa: PhysicalAddress,
        len: u64,
    ) -> Result<DevicePhysicalAddress, TranslateError> {
        match pa.as_u64().checked_add(len) {
            Some(end) if end <= HOST_APERTURE_SIZE => {
                Ok(DevicePhysicalAddress::new(pa.as_u64() + DEVICE_SYSTEM_BASE))
            }
            _ => Err(TranslateError::OutsideAperture { addr: pa, len }),
        }
    }

    /// Accept a range that already is in device space, as long as the engine
    /// can address all of it.
    ///
    /// # Errors
    /// [`TranslateError::OutsideDeviceSpace`] if the range wraps or reaches
    /// [`DEVICE_ADDRESS_LIMIT`].
    pub const fn check_device(
        &self,
        dpa: DevicePhysicalAddress,
        len: u64,
    ) -> Result<DevicePhysicalAddress, TranslateError> {
        match dpa.as_u64().checked_add(len) {
            Some(end) if end <= DEVICE_ADDRESS_LIMIT => Ok(dpa),
            _ => Err(TranslateError::OutsideDeviceSpace { addr: dpa, len }),
        }
    }

    /// Device address for a host straight-map range `[va, va + len)`.
    ///
    /// # Errors
    /// See [`host_to_device`](Self::host_to_device).
    pub const fn host_virt_to_device(
        &self,
        translator: &AddressTranslator,
        va: VirtualAddress,
        len: u64,
    ) -> Result<DevicePhysicalAddress, TranslateError> {
        self.host_to_device(translator.virt_to_phys(va), len)
    }
}
