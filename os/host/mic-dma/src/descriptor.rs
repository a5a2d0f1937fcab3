//! # DMA descriptors
//!
//! Every ring slot is a 16-byte [`RawDescriptor`]. The type tag in
//! `qw1[63:60]` selects how the two words are read:
//!
//! ```text
//! copy    qw0: | 63..60 rsvd | 59..46 length | 45..40 idx/rsvd | 39..0 source |
//!         qw1: | 63..60 type | 59..55 flags  | 54..40 rsvd     | 39..0 dest   |
//!
//! status  qw0: | 63..0 data word                                             |
//!         qw1: | 63..60 type | 59 intr | 58..40 rsvd          | 39..0 target |
//! ```

use bitfield_struct::bitfield;
use core::ptr;
use mic_addresses::DevicePhysicalAddress;

/// Bytes per length unit of a copy descriptor.
pub const COPY_UNIT: u64 = 64;

/// Largest length a single copy descriptor can carry, in units.
pub const MAX_COPY_UNITS: u16 = 1024;

/// Largest byte count a single copy descriptor can carry.
pub const MAX_COPY_BYTES: u64 = MAX_COPY_UNITS as u64 * COPY_UNIT;

const ADDRESS_MASK: u64 = (1 << 40) - 1;

/// Hardware descriptor as it sits in the ring.
#[repr(C, align(16))]
#[derive(Copy, Clone, Default, Debug, PartialEq, Eq)]
pub struct RawDescriptor {
    pub qw0: u64,
    pub qw1: u64,
}

const _: () = assert!(size_of::<RawDescriptor>() == 16);

impl RawDescriptor {
    pub const ZERO: Self = Self { qw0: 0, qw1: 0 };

    /// Type tag stored in `qw1[63:60]`.
    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn type_tag(&self) -> u8 {
        (self.qw1 >> 60) as u8
    }

    /// Volatile store; the engine may read the slot at any time.
    #[inline]
    pub fn store(&mut self, value: Self) {
        // SAFETY: `self` is a valid, aligned, exclusive reference.
        unsafe { ptr::write_volatile(ptr::from_mut(self), value) }
    }

    #[inline]
    #[must_use]
    pub fn load(&self) -> Self {
        // SAFETY: `self` is a valid, aligned reference.
        unsafe { ptr::read_volatile(ptr::from_ref(self)) }
    }
}

/// Values of the type tag.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
pub enum DescriptorType {
    Nop = 0,
    Copy = 1,
    Status = 2,
}

impl DescriptorType {
    #[must_use]
    pub const fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(Self::Nop),
            1 => Some(Self::Copy),
            2 => Some(Self::Status),
            _ => None,
        }
    }
}

/// First word of a copy descriptor.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct CopyQw0 {
    /// Source address in device space.
    #[bits(40)]
    pub source: u64,
    #[bits(3)]
    pub index: u8,
    #[bits(3)]
    __: u8,
    /// Length in 64-byte units.
    #[bits(14)]
    pub length: u16,
    #[bits(4)]
    __: u8,
}

/// Second word of a copy descriptor.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct CopyQw1 {
    /// Destination address in device space.
    #[bits(40)]
    pub destination: u64,
    #[bits(15)]
    __: u16,
    pub twb: bool,
    pub interrupt: bool,
    pub cache: bool,
    pub cache_override: bool,
    pub ecc: bool,
    #[bits(4)]
    pub kind: u8,
}

/// Second word of a status descriptor. The first word is the data.
#[bitfield(u64)]
#[derive(PartialEq, Eq)]
pub struct StatusQw1 {
    /// Where the data word is written, in device space.
    #[bits(40)]
    pub target: u64,
    #[bits(19)]
    __: u32,
    pub interrupt: bool,
    #[bits(4)]
    pub kind: u8,
}

/// A descriptor in decoded form.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Descriptor {
    /// Move `units × 64` bytes from `source` to `destination`.
    Copy {
        source: DevicePhysicalAddress,
        destination: DevicePhysicalAddress,
        units: u16,
    },
    /// Raise the channel interrupt once everything before it has completed.
    Interrupt,
    /// Write `payload` to `target` once everything before it has completed.
    Notify {
        target: DevicePhysicalAddress,
        payload: u64,
    },
}

impl Descriptor {
    /// Copy descriptor for `bytes` bytes; the length is rounded up to whole units.
    #[must_use]
    pub fn copy(source: DevicePhysicalAddress, destination: DevicePhysicalAddress, bytes: u64) -> Self {
        debug_assert!(bytes <= MAX_COPY_BYTES, "copy descriptor too long");
        #[allow(clippy::cast_possible_truncation)]
        let units = bytes.div_ceil(COPY_UNIT) as u16;
        Self::Copy {
            source,
            destination,
            units,
        }
    }

    #[must_use]
    pub const fn encode(&self) -> RawDescriptor {
        match *self {
            Self::Copy {
                source,
                destination,
                units,
            } => RawDescriptor {
                qw0: CopyQw0::new()
                    .with_source(source.as_u64() & ADDRESS_MASK)
                    .with_length(units)
                    .into_bits(),
                qw1: CopyQw1::new()
                    .with_destination(destination.as_u64() & ADDRESS_MASK)
                    .with_kind(DescriptorType::Copy as u8)
                    .into_bits(),
            },
            Self::Interrupt => RawDescriptor {
                qw0: 0,
                qw1: StatusQw1::new()
                    .with_interrupt(true)
                    .with_kind(DescriptorType::Status as u8)
                    .into_bits(),
            },
            Self::Notify { target, payload } => RawDescriptor {
                qw0: payload,
                qw1: StatusQw1::new()
                    .with_target(target.as_u64() & ADDRESS_MASK)
                    .with_kind(DescriptorType::Status as u8)
                    .into_bits(),
            },
        }
    }

    /// Decode a ring slot. Returns `None` for empty or unknown slots.
    #[must_use]
    pub const fn decode(raw: RawDescriptor) -> Option<Self> {
        match DescriptorType::from_tag(raw.type_tag()) {
            Some(DescriptorType::Copy) => {
                let qw0 = CopyQw0::from_bits(raw.qw0);
                let qw1 = CopyQw1::from_bits(raw.qw1);
                Some(Self::Copy {
                    source: DevicePhysicalAddress::new(qw0.source()),
                    destination: DevicePhysicalAddress::new(qw1.destination()),
                    units: qw0.length(),
                })
            }
            Some(DescriptorType::Status) => {
                let qw1 = StatusQw1::from_bits(raw.qw1);
                if qw1.interrupt() {
                    Some(Self::Interrupt)
                } else {
                    Some(Self::Notify {
                        target: DevicePhysicalAddress::new(qw1.target()),
                        payload: raw.qw0,
                    })
                }
            }
            Some(DescriptorType::Nop) | None => None,
        }
    }
}
