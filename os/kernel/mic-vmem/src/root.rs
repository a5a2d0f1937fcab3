use mic_addresses::{PhysicalPage, Size4K};

/// Something that can make a page-table root the active translation.
pub trait RootRegister {
    /// Make `root` the active L4 table.
    ///
    /// # Safety
    /// The tables under `root` must map all code and data that executes
    /// after the switch, including the caller's stack.
    unsafe fn load(&mut self, root: PhysicalPage<Size4K>);
}

/// The real page-table base register.
#[cfg(feature = "asm")]
#[derive(Debug, Default, Copy, Clone)]
pub struct Cr3Register;

#[cfg(feature = "asm")]
impl RootRegister for Cr3Register {
    unsafe fn load(&mut self, root: PhysicalPage<Size4K>) {
        use mic_registers::{Cr3, StoreRegisterUnsafe};
        unsafe { Cr3::from_root(root).store_unsafe() }
    }
}
