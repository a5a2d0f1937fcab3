//! # DMA device
//!
//! The engine has [`CHANNEL_COUNT`] hardware channels. The coprocessor keeps
//! the low ones; the host drives the rest, numbered from zero.
//!
//! ```text
//! logical   0 1 2 3
//!           │ │ │ │
//! hardware  4 5 6 7
//! ```

use crate::channel::DmaChannel;
use crate::error::DmaError;
use crate::host::HostMemory;
use crate::registers::{ChannelRegisterSnapshot, RegisterBlock};
use crate::request::DmaRequest;
use log::debug;
use mic_layout::DeviceAddressTranslator;

/// Hardware channels on the engine.
pub const CHANNEL_COUNT: usize = 8;

/// First hardware channel owned by the host.
pub const HOST_CHANNEL_BASE: usize = 4;

/// Channels the host can address.
pub const HOST_CHANNELS: usize = CHANNEL_COUNT - HOST_CHANNEL_BASE;

pub struct DmaDevice<B: RegisterBlock, H: HostMemory> {
    regs: B,
    host: H,
    translator: DeviceAddressTranslator,
    channels: [DmaChannel; HOST_CHANNELS],
}

impl<B: RegisterBlock, H: HostMemory> DmaDevice<B, H> {
    /// A device with every channel uninitialized.
    pub fn new(regs: B, host: H) -> Self {
        Self {
            regs,
            host,
            translator: DeviceAddressTranslator,
            channels: core::array::from_fn(|i| DmaChannel::new(i + HOST_CHANNEL_BASE)),
        }
    }

    #[inline]
    pub const fn registers(&self) -> &B {
        &self.regs
    }

    #[inline]
    pub const fn translator(&self) -> &DeviceAddressTranslator {
        &self.translator
    }

    /// Look up a host channel. No hardware is touched.
    ///
    /// # Errors
    /// [`DmaError::NoSuchChannel`] unless `logical < HOST_CHANNELS`.
    pub fn channel(&self, logical: usize) -> Result<DmaChannelHandle<'_, B, H>, DmaError> {
        let channel = self
            .channels
            .get(logical)
            .ok_or(DmaError::NoSuchChannel(logical))?;
        Ok(DmaChannelHandle {
            device: self,
            channel,
            logical,
        })
    }

    /// Allocate and program the ring of one channel.
    ///
    /// # Errors
    /// [`DmaError::NoSuchChannel`] or a ring translation failure.
    pub fn init_channel(&self, logical: usize) -> Result<(), DmaError> {
        self.channel(logical)?.init()
    }

    /// Bring up every host channel.
    ///
    /// # Errors
    /// Stops at the first channel whose ring cannot be set up.
    pub fn init(&self) -> Result<(), DmaError> {
        for logical in 0..HOST_CHANNELS {
            self.init_channel(logical)?;
        }
        debug!("DMA: {HOST_CHANNELS} host channels ready");
        Ok(())
    }

    /// Re-program every ready channel, e.g. after the card was reset.
    ///
    /// Returns the number of channels touched.
    pub fn reset_registers(&self) -> usize {
        self.channels
            .iter()
            .filter(|c| c.reset_registers(&self.regs))
            .count()
    }

    /// Release every ring.
    pub fn finalize(&self) {
        for channel in &self.channels {
            if channel.finalize() {
                debug!("DMA channel {} released", channel.hardware_channel());
            }
        }
    }
}

/// A host channel bound to its device.
pub struct DmaChannelHandle<'d, B: RegisterBlock, H: HostMemory> {
    device: &'d DmaDevice<B, H>,
    channel: &'d DmaChannel,
    logical: usize,
}

impl<B: RegisterBlock, H: HostMemory> DmaChannelHandle<'_, B, H> {
    #[inline]
    #[must_use]
    pub const fn logical(&self) -> usize {
        self.logical
    }

    #[inline]
    #[must_use]
    pub const fn hardware_channel(&self) -> usize {
        self.channel.hardware_channel()
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.channel.is_ready()
    }

    /// See [`DmaChannel::init`].
    ///
    /// # Errors
    /// Ring translation failure.
    pub fn init(&self) -> Result<(), DmaError> {
        self.channel
            .init(&self.device.regs, &self.device.host, &self.device.translator)
    }

    /// See [`DmaChannel::submit`].
    ///
    /// # Errors
    /// See [`DmaChannel::submit`].
    pub fn submit(&self, request: &DmaRequest) -> Result<(), DmaError> {
        self.channel
            .submit(&self.device.regs, &self.device.translator, request)
    }

    pub fn snapshot(&self) -> ChannelRegisterSnapshot {
        self.channel.snapshot(&self.device.regs)
    }

    #[must_use]
    pub const fn raw(&self) -> &DmaChannel {
        self.channel
    }
}
