bitflags::bitflags! {
    /// Architecture-neutral attributes requested for a mapping.
    ///
    /// Translated into entry bits per level by [`PageEntry`](crate::PageEntry):
    /// intermediate links are always present and writable, leaves carry
    /// these bits verbatim, and [`UNCACHEABLE`](Self::UNCACHEABLE) sets both
    /// `PCD` and `PWT`.
    #[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
    pub struct PageAttributes: u8 {
        /// Allow writes.
        const WRITABLE    = 1 << 0;

        /// Allow ring-3 access.
        const USER        = 1 << 1;

        /// Disable caching (device registers, DMA rings).
        const UNCACHEABLE = 1 << 2;

        /// Terminate the walk at L2 with a 2 MiB leaf.
        const LARGE       = 1 << 3;
    }
}

impl PageAttributes {
    /// Attributes for a kernel data mapping backed by a 2 MiB page.
    pub const KERNEL_LARGE: Self = Self::WRITABLE.union(Self::LARGE);

    /// Attributes for device registers mapped through the fixed window.
    pub const DEVICE: Self = Self::WRITABLE.union(Self::UNCACHEABLE);

    #[inline]
    #[must_use]
    pub const fn is_large(self) -> bool {
        self.contains(Self::LARGE)
    }
}
