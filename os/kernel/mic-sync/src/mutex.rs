use crate::{RawLock, RawUnlock};
use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};

/// A value protected by a raw lock `R`.
///
/// `R` decides how waiting works; [`RawSpin`](crate::RawSpin) busy-waits,
/// which is all the kernel and the DMA driver need.
pub struct Mutex<T, R> {
    raw: R,
    data: UnsafeCell<T>,
}

// SAFETY: every access to `data` goes through a guard, and guards exist only
// while `raw` is held.
unsafe impl<T: Send, R: Sync> Sync for Mutex<T, R> {}

impl<T, R> Mutex<T, R> {
    pub const fn from_raw(raw: R, value: T) -> Self {
        Self {
            raw,
            data: UnsafeCell::new(value),
        }
    }

    /// Exclusive access without locking; `&mut self` already proves it.
    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }

    #[inline]
    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T, R: RawLock + RawUnlock> Mutex<T, R> {
    /// # Safety
    /// `self.raw` must be held by the caller and handed over to the guard.
    #[inline]
    unsafe fn guard(&self) -> MutexGuard<'_, T, R> {
        MutexGuard {
            raw: &self.raw,
            // SAFETY: the lock is held, so no other reference to `data` exists.
            data: unsafe { &mut *self.data.get() },
        }
    }

    /// Spins until the lock is free.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T, R> {
        self.raw.raw_lock();
        // SAFETY: just acquired.
        unsafe { self.guard() }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T, R>> {
        // SAFETY: only reached after a successful acquire.
        self.raw.raw_try_lock().then(|| unsafe { self.guard() })
    }

    /// Runs `f` with the lock held. The lock is released even if `f` unwinds.
    #[inline]
    pub fn with_lock<U>(&self, f: impl FnOnce(&mut T) -> U) -> U {
        let mut g = self.lock();
        f(&mut *g)
    }
}

/// Releases the lock on drop.
pub struct MutexGuard<'a, T, R: RawUnlock> {
    raw: &'a R,
    data: &'a mut T,
}

impl<T, R: RawUnlock> Deref for MutexGuard<'_, T, R> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        self.data
    }
}

impl<T, R: RawUnlock> DerefMut for MutexGuard<'_, T, R> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        self.data
    }
}

impl<T, R: RawUnlock> Drop for MutexGuard<'_, T, R> {
    fn drop(&mut self) {
        // SAFETY: a guard only exists while its lock is held.
        unsafe { self.raw.raw_unlock() }
    }
}
