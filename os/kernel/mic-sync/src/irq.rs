use crate::{Mutex, MutexGuard, RawLock, RawUnlock};
use core::ops::{Deref, DerefMut};

/// A mutex guard that also disables interrupts while held.
///
/// When created via [`Mutex::lock_irq`], it:
///
/// 1. saves the current interrupt state and disables interrupts, and
/// 2. acquires the underlying mutex,
///
/// releasing them in reverse order on drop. An interrupt handler that
/// takes the same lock can therefore never spin on a lock its own CPU holds.
///
/// # Platform
///
/// On bare-metal `x86_64` this uses `cli/sti` and `pushfq/pop`. On hosted
/// targets interrupt masking is a no-op and only the lock is taken.
///
/// # Examples
///
/// ```
/// use mic_sync::SpinMutex;
///
/// static M: SpinMutex<u64> = SpinMutex::new(0);
///
/// {
///     let mut g = M.lock_irq();
///     *g += 1;
/// }
/// assert_eq!(*M.lock(), 1);
/// ```
pub struct IrqMutex<'a, T, R: RawLock + RawUnlock> {
    // Field order matters: the lock is released before interrupts are restored.
    g: MutexGuard<'a, T, R>,
    _irq: IrqGuard,
}

impl<T, R: RawLock + RawUnlock> Deref for IrqMutex<'_, T, R> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.g
    }
}

impl<T, R: RawLock + RawUnlock> DerefMut for IrqMutex<'_, T, R> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.g
    }
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// Acquires the mutex with interrupts disabled for the guard's lifetime.
    ///
    /// Dropping the guard releases the mutex and restores interrupts if they
    /// were previously enabled.
    #[inline]
    pub fn lock_irq(&self) -> IrqMutex<'_, T, R> {
        let ig = IrqGuard::new();
        let g = self.lock();
        IrqMutex { g, _irq: ig }
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none"))]
mod arch {
    #[inline]
    pub fn cli() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn sti() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    pub fn rflags() -> u64 {
        let r: u64;
        unsafe { core::arch::asm!("pushfq; pop {}", out(reg) r, options(nostack, preserves_flags)) }
        r
    }
}

#[cfg(not(all(target_arch = "x86_64", target_os = "none")))]
mod arch {
    #[inline]
    pub const fn cli() {}

    #[inline]
    pub const fn sti() {}

    #[inline]
    pub const fn rflags() -> u64 {
        0
    }
}

/// Disables hardware interrupts (`cli`).
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `cli` is permitted.
// Only const on hosted targets, where the body is empty.
#[allow(clippy::missing_const_for_fn)]
#[inline]
pub fn cli_stop_interrupts() {
    arch::cli();
}

/// Enables hardware interrupts (`sti`).
///
/// # Safety & Privilege
///
/// Must only be called in contexts where `sti` is permitted.
// Only const on hosted targets, where the body is empty.
#[allow(clippy::missing_const_for_fn)]
#[inline]
pub fn sti_enable_interrupts() {
    arch::sti();
}

/// Returns the current `RFLAGS` value. Bit 9 (`IF`) indicates whether
/// interrupts are enabled. Always `0` on hosted targets.
// Only const on hosted targets, where the body is empty.
#[allow(clippy::missing_const_for_fn)]
#[inline]
#[must_use]
pub fn rflags() -> u64 {
    arch::rflags()
}

/// Whether the `IF` flag is set.
#[inline]
#[must_use]
pub fn interrupts_enabled() -> bool {
    (rflags() & (1 << 9)) != 0
}

/// RAII guard that disables interrupts on creation and restores them on drop.
///
/// `IrqGuard::new()` snapshots the `IF` bit. If interrupts were enabled, it
/// executes `cli`. On drop, it executes `sti` **only** if they were
/// previously enabled, so nested guards compose.
pub struct IrqGuard {
    /// Whether interrupts were enabled (IF=1) when the guard was created.
    were_enabled: bool,
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let enabled = interrupts_enabled();
        if enabled {
            cli_stop_interrupts();
        }
        Self {
            were_enabled: enabled,
        }
    }

    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            sti_enable_interrupts();
        }
    }
}
