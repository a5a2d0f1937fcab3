use mic_addresses::{DevicePhysicalAddress, PhysicalAddress};
use mic_layout::{DeviceAddressTranslator, TranslateError};

/// An endpoint of a transfer.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DmaAddress {
    /// Host physical memory; translated into the device's system space.
    Host(PhysicalAddress),
    /// Already a device address; used as is.
    Device(DevicePhysicalAddress),
}

impl DmaAddress {
    /// Device address of `[self, self + len)`.
    ///
    /// # Errors
    /// - [`TranslateError::OutsideAperture`] for host ranges past the aperture.
    /// - [`TranslateError::OutsideDeviceSpace`] for device ranges the engine
    ///   cannot address.
    pub const fn to_device(
        self,
        translator: &DeviceAddressTranslator,
        len: u64,
    ) -> Result<DevicePhysicalAddress, TranslateError> {
        match self {
            Self::Host(pa) => translator.host_to_device(pa, len),
            Self::Device(dpa) => translator.check_device(dpa, len),
        }
    }
}

impl From<PhysicalAddress> for DmaAddress {
    fn from(pa: PhysicalAddress) -> Self {
        Self::Host(pa)
    }
}

impl From<DevicePhysicalAddress> for DmaAddress {
    fn from(dpa: DevicePhysicalAddress) -> Self {
        Self::Device(dpa)
    }
}

/// What the engine does once the copies of a request are done.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Completion {
    Interrupt,
    /// Write `payload` to the 8-byte word at `target`.
    Notify { target: DmaAddress, payload: u64 },
}

/// A transfer of `size` bytes from `src` to `dst`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct DmaRequest {
    pub size: u64,
    pub src: DmaAddress,
    pub dst: DmaAddress,
    pub completion: Option<Completion>,
}

impl DmaRequest {
    #[must_use]
    pub const fn new(src: DmaAddress, dst: DmaAddress, size: u64) -> Self {
        Self {
            size,
            src,
            dst,
            completion: None,
        }
    }

    #[must_use]
    pub const fn with_interrupt(mut self) -> Self {
        self.completion = Some(Completion::Interrupt);
        self
    }

    #[must_use]
    pub const fn with_notify(mut self, target: DmaAddress, payload: u64) -> Self {
        self.completion = Some(Completion::Notify { target, payload });
        self
    }

    /// Number of copy descriptors the request needs.
    #[must_use]
    pub const fn copy_descriptors(&self) -> usize {
        #[allow(clippy::cast_possible_truncation)]
        let n = self.size.div_ceil(crate::descriptor::MAX_COPY_BYTES) as usize;
        n
    }

    /// Number of ring slots the request occupies.
    #[must_use]
    pub const fn descriptor_count(&self) -> usize {
        self.copy_descriptors() + if self.completion.is_some() { 1 } else { 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mic_layout::memory::{DEVICE_SYSTEM_BASE, HOST_APERTURE_SIZE};

    fn host(v: u64) -> DmaAddress {
        DmaAddress::Host(PhysicalAddress::new(v))
    }

    #[test]
    fn descriptor_counts() {
        let r = DmaRequest::new(host(0), host(0x1000), 100_000);
        assert_eq!(r.copy_descriptors(), 2);
        assert_eq!(r.descriptor_count(), 2);
        assert_eq!(r.with_interrupt().descriptor_count(), 3);
        assert_eq!(r.with_notify(host(0x2000), 1).descriptor_count(), 3);

        assert_eq!(DmaRequest::new(host(0), host(0), 65536).copy_descriptors(), 1);
        assert_eq!(DmaRequest::new(host(0), host(0), 65537).copy_descriptors(), 2);
        assert_eq!(DmaRequest::new(host(0), host(0), 0).descriptor_count(), 0);
        assert_eq!(
            DmaRequest::new(host(0), host(0), 0)
                .with_interrupt()
                .descriptor_count(),
            1
        );
    }

    #[test]
    fn host_addresses_are_translated() {
        let t = DeviceAddressTranslator;
        assert_eq!(
            host(0x1000).to_device(&t, 64).unwrap().as_u64(),
            DEVICE_SYSTEM_BASE + 0x1000
        );
        assert!(host(HOST_APERTURE_SIZE - 32).to_device(&t, 64).is_err());
    }

    #[test]
    fn device_addresses_pass_through() {
        let t = DeviceAddressTranslator;
        let d = DmaAddress::from(DevicePhysicalAddress::new(0x4000_0000));
        assert_eq!(d.to_device(&t, 0x1000).unwrap().as_u64(), 0x4000_0000);
    }

    #[test]
    fn device_ranges_past_the_address_width_are_rejected() {
        let t = DeviceAddressTranslator;
        let high = DmaAddress::Device(DevicePhysicalAddress::new(1 << 40));
        assert!(matches!(
            high.to_device(&t, 64),
            Err(TranslateError::OutsideDeviceSpace { .. })
        ));
        let wraps = DmaAddress::Device(DevicePhysicalAddress::new(u64::MAX - 0xFFFF));
        assert!(wraps.to_device(&t, 65_537).is_err());
    }
}
