use crate::{Level, PageAttributes};
use mic_addresses::{PhysicalAddress, VirtualAddress};

/// Failure to change or look up a mapping.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    /// The slot is occupied by a leaf for a different physical address, or
    /// by an entry of the wrong kind (table where a leaf is wanted or vice versa).
    #[error("{va} is already mapped at {level:?} to {existing}")]
    Conflict {
        va: VirtualAddress,
        level: Level,
        existing: PhysicalAddress,
    },

    /// Same physical address, different attributes.
    #[error("{va} is already mapped with {existing:?}, requested {requested:?}")]
    AttributeMismatch {
        va: VirtualAddress,
        existing: PageAttributes,
        requested: PageAttributes,
    },

    /// A table level or the leaf on the walk to `va` is not present.
    #[error("{0} is not mapped")]
    NotMapped(VirtualAddress),

    /// The frame allocator could not provide a page-table frame.
    #[error("out of memory allocating a page table")]
    OutOfMemory,
}
