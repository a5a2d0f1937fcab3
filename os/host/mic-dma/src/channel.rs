//! # DMA channel
//!
//! A hardware channel and its ring. All ring state sits behind one spin
//! mutex taken with interrupts masked, so a completion handler on the same
//! CPU can submit without deadlocking.
//!
//! ```text
//! Uninitialized ──init──▶ Ready ──finalize──▶ Uninitialized
//!                          │ ▲
//!                          └─┘ submit / reset_registers
//! ```

use crate::descriptor::{Descriptor, MAX_COPY_BYTES};
use crate::error::DmaError;
use crate::host::HostMemory;
use crate::registers::{
    ChannelRegisterSnapshot, ChannelRegisters, DHPR, DRAR_HI, DRAR_LO, DTPR, DrarHi,
    RegisterBlock,
};
use crate::request::{Completion, DmaRequest};
use crate::ring::{DescriptorRing, RING_BYTES, RING_CAPACITY};
use core::sync::atomic::{Ordering, fence};
use log::{debug, trace, warn};
use mic_addresses::DevicePhysicalAddress;
use mic_layout::DeviceAddressTranslator;
use mic_sync::SpinMutex;

struct ReadyRing {
    ring: DescriptorRing,
    device_base: DevicePhysicalAddress,
}

pub struct DmaChannel {
    hw: usize,
    state: SpinMutex<Option<ReadyRing>>,
}

impl DmaChannel {
    #[must_use]
    pub const fn new(hardware_channel: usize) -> Self {
        Self {
            hw: hardware_channel,
            state: SpinMutex::new(None),
        }
    }

    #[inline]
    #[must_use]
    pub const fn hardware_channel(&self) -> usize {
        self.hw
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.state.lock_irq().is_some()
    }

    /// Allocate the ring and program the channel's ring registers.
    ///
    /// Initializing a ready channel replaces its ring; anything in flight on
    /// the old one is abandoned.
    ///
    /// # Errors
    /// [`DmaError::Translate`] if the ring page lies outside the host aperture.
    pub fn init<B: RegisterBlock, H: HostMemory>(
        &self,
        regs: &B,
        host: &H,
        translator: &DeviceAddressTranslator,
    ) -> Result<(), DmaError> {
        let ring = DescriptorRing::new();
        let device_base = translator.host_to_device(host.virt_to_phys(ring.base()), RING_BYTES as u64)?;
        let mut ready = ReadyRing { ring, device_base };

        let mut state = self.state.lock_irq();
        self.program(regs, &mut ready);
        if state.replace(ready).is_some() {
            warn!("DMA channel {} re-initialized, previous ring dropped", self.hw);
        }
        debug!("DMA channel {} ready, ring at {}", self.hw, device_base);
        Ok(())
    }

    /// Program the ring registers again and restart from an empty ring.
    ///
    /// Returns `false` if the channel has no ring.
    pub fn reset_registers<B: RegisterBlock>(&self, regs: &B) -> bool {
        let mut state = self.state.lock_irq();
        let Some(ready) = state.as_mut() else {
            return false;
        };
        self.program(regs, ready);
        true
    }

    fn program<B: RegisterBlock>(&self, regs: &B, ready: &mut ReadyRing) {
        let base = ready.device_base.as_u64();
        let regs = ChannelRegisters::new(regs, self.hw);

        #[allow(clippy::cast_possible_truncation)]
        regs.write(DRAR_LO, base as u32);
        regs.write(
            DRAR_HI,
            DrarHi::for_ring(base, RING_CAPACITY as u32).into_bits(),
        );
        regs.write(DTPR, 0);
        regs.write(DHPR, 0);
        ready.ring.reset();
    }

    /// Release the ring. Returns `false` if there was none.
    pub fn finalize(&self) -> bool {
        self.state.lock_irq().take().is_some()
    }

    pub fn snapshot<B: RegisterBlock>(&self, regs: &B) -> ChannelRegisterSnapshot {
        let snapshot = ChannelRegisters::new(regs, self.hw).snapshot();
        debug!("{snapshot}");
        snapshot
    }

    /// Queue `request` and ring the doorbell.
    ///
    /// Every address is translated before the first slot is claimed, so a
    /// failed request leaves the ring untouched. A request with nothing to do
    /// succeeds without touching the hardware.
    ///
    /// # Errors
    /// - [`DmaError::ChannelNotReady`] if the channel has no ring.
    /// - [`DmaError::Translate`] if a host range lies outside the aperture or
    ///   a device range is not addressable.
    /// - [`DmaError::RingFull`] if the engine has not freed enough slots.
    pub fn submit<B: RegisterBlock>(
        &self,
        regs: &B,
        translator: &DeviceAddressTranslator,
        request: &DmaRequest,
    ) -> Result<(), DmaError> {
        let mut state = self.state.lock_irq();
        let Some(ready) = state.as_mut() else {
            return Err(DmaError::ChannelNotReady);
        };

        let src = request.src.to_device(translator, request.size)?;
        let dst = request.dst.to_device(translator, request.size)?;
        let completion = match request.completion {
            None => None,
            Some(Completion::Interrupt) => Some(Descriptor::Interrupt),
            Some(Completion::Notify { target, payload }) => Some(Descriptor::Notify {
                target: target.to_device(translator, size_of::<u64>() as u64)?,
                payload,
            }),
        };

        let ndesc = request.descriptor_count();
        if ndesc == 0 {
            return Ok(());
        }

        let regs = ChannelRegisters::new(regs, self.hw);
        if !ready.ring.has_room(ndesc, || regs.read(DTPR)) {
            let available = ready.ring.free_slots();
            warn!(
                "DMA channel {}: {ndesc} descriptors requested, {available} free",
                self.hw
            );
            return Err(DmaError::RingFull {
                needed: ndesc,
                available,
            });
        }

        let mut offset = 0;
        while offset < request.size {
            let bytes = (request.size - offset).min(MAX_COPY_BYTES);
            let descriptor = Descriptor::copy(
                DevicePhysicalAddress::new(src.as_u64() + offset),
                DevicePhysicalAddress::new(dst.as_u64() + offset),
                bytes,
            );
            trace!("DMA channel {} slot {}: {descriptor:?}", self.hw, ready.ring.head());
            ready.ring.reserve_next_slot().store(descriptor.encode());
            offset += bytes;
        }

        if let Some(descriptor) = completion {
            trace!("DMA channel {} slot {}: {descriptor:?}", self.hw, ready.ring.head());
            ready.ring.reserve_next_slot().store(descriptor.encode());
        }

        // Descriptors must be visible before the engine sees the new head.
        fence(Ordering::Release);
        #[allow(clippy::cast_possible_truncation)]
        regs.write(DHPR, ready.ring.head() as u32);
        Ok(())
    }

    /// Head index and cached tail, or `None` without a ring.
    #[cfg(test)]
    pub(crate) fn positions(&self) -> Option<(usize, usize)> {
        self.state
            .lock_irq()
            .as_ref()
            .map(|r| (r.ring.head(), r.ring.cached_tail()))
    }

    #[cfg(test)]
    pub(crate) fn inspect<R>(&self, f: impl FnOnce(&DescriptorRing) -> R) -> Option<R> {
        self.state.lock_irq().as_ref().map(|r| f(&r.ring))
    }
}
