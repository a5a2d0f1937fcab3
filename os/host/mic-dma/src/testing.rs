use crate::host::HostMemory;
use crate::registers::RegisterBlock;
use mic_addresses::{PhysicalAddress, VirtualAddress};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;

/// Register block backed by a map. Counts accesses made through
/// [`RegisterBlock`]; `get`/`set` are the test's own view and are not counted.
#[derive(Default)]
pub struct FakeRegisters {
    values: RefCell<BTreeMap<usize, u32>>,
    reads: Cell<usize>,
    writes: Cell<usize>,
}

impl FakeRegisters {
    pub fn get(&self, offset: usize) -> u32 {
        self.values.borrow().get(&offset).copied().unwrap_or(0)
    }

    /// Emulate the engine updating a register.
    pub fn set(&self, offset: usize, value: u32) {
        self.values.borrow_mut().insert(offset, value);
    }

    pub fn reads(&self) -> usize {
        self.reads.get()
    }

    pub fn writes(&self) -> usize {
        self.writes.get()
    }
}

impl RegisterBlock for FakeRegisters {
    fn read32(&self, offset: usize) -> u32 {
        self.reads.set(self.reads.get() + 1);
        self.get(offset)
    }

    fn write32(&self, offset: usize, value: u32) {
        self.writes.set(self.writes.get() + 1);
        self.set(offset, value);
    }
}

/// Pretends every ring page sits at the same host frame.
pub struct FakeHost {
    pub ring_phys: u64,
}

impl FakeHost {
    pub const RING_PHYS: u64 = 0x1_2345_6000;
}

impl Default for FakeHost {
    fn default() -> Self {
        Self {
            ring_phys: Self::RING_PHYS,
        }
    }
}

impl HostMemory for FakeHost {
    fn virt_to_phys(&self, _va: VirtualAddress) -> PhysicalAddress {
        PhysicalAddress::new(self.ring_phys)
    }
}
