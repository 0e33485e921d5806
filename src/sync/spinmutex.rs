use super::{
    spinlock::{Spinlock, SpinlockGuard},
    LockStats,
};
use std::{
    cell::UnsafeCell,
    ops::{Deref, DerefMut},
};

/// A `Spinlock` that owns the data it protects.
pub struct SpinMutex<T> {
    lock: Spinlock,
    inner: UnsafeCell<T>,
}
impl<T> SpinMutex<T> {
    pub const fn new(name: &'static str, value: T) -> SpinMutex<T> {
        SpinMutex {
            lock: Spinlock::new(name),
            inner: UnsafeCell::new(value),
        }
    }
    pub fn lock(&self) -> SpinMutexGuard<'_, T> {
        SpinMutexGuard {
            _guard: self.lock.lock(),
            inner: &self.inner,
        }
    }
    pub fn stats(&self) -> LockStats {
        self.lock.stats()
    }
}
unsafe impl<T> Sync for SpinMutex<T> where T: Send {}
unsafe impl<T> Send for SpinMutex<T> where T: Send {}

pub struct SpinMutexGuard<'m, T> {
    _guard: SpinlockGuard<'m>,
    inner: &'m UnsafeCell<T>,
}
impl<'m, T> Deref for SpinMutexGuard<'m, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.inner.get() }
    }
}
impl<'m, T> DerefMut for SpinMutexGuard<'m, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.inner.get() }
    }
}
