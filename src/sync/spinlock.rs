use super::LockStats;
use crate::proc::cpu::{pop_off, push_off, Cpu};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

/// Spins before the waiting context yields its OS thread.
const SPINS_BEFORE_YIELD: u32 = 64;

/// Mutual exclusion lock for short critical sections.
///
/// Must never be held across anything that can block.
pub struct Spinlock {
    name: &'static str,
    locked: AtomicBool,
    /// Context holding the lock, 0 if none.
    owner: AtomicUsize,
    acquires: AtomicU64,
    contended: AtomicU64,
}
impl Spinlock {
    /// Initializes a `Spinlock`.
    pub const fn new(name: &'static str) -> Spinlock {
        Spinlock {
            name,
            locked: AtomicBool::new(false),
            owner: AtomicUsize::new(0),
            acquires: AtomicU64::new(0),
            contended: AtomicU64::new(0),
        }
    }
    pub unsafe fn lock_unguarded(&self) {
        push_off();
        if self.holding() {
            log::error!("spinlock {} acquired twice by one context", self.name);
            panic!("acquire {}", self.name);
        }

        let mut spins = 0u32;
        while self.locked.swap(true, Ordering::Acquire) {
            self.contended.fetch_add(1, Ordering::Relaxed);
            spins += 1;
            if spins % SPINS_BEFORE_YIELD == 0 {
                std::thread::yield_now();
            } else {
                std::hint::spin_loop();
            }
        }
        self.acquires.fetch_add(1, Ordering::Relaxed);
        self.owner.store(Cpu::context_id(), Ordering::Relaxed);
    }
    pub fn lock(&self) -> SpinlockGuard<'_> {
        unsafe {
            self.lock_unguarded();
        }
        SpinlockGuard { lock: self }
    }
    pub unsafe fn unlock(&self) {
        if !self.holding() {
            log::error!("spinlock {} released by a context not holding it", self.name);
            panic!("release {}", self.name);
        }
        self.owner.store(0, Ordering::Relaxed);
        self.locked.store(false, Ordering::Release);

        pop_off();
    }
    /// Whether the calling context holds this lock.
    pub fn holding(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
            && self.owner.load(Ordering::Relaxed) == Cpu::context_id()
    }
    pub fn stats(&self) -> LockStats {
        LockStats {
            name: self.name,
            acquires: self.acquires.load(Ordering::Relaxed),
            contended: self.contended.load(Ordering::Relaxed),
        }
    }
}

pub struct SpinlockGuard<'l> {
    pub lock: &'l Spinlock,
}
impl<'l> Drop for SpinlockGuard<'l> {
    fn drop(&mut self) {
        unsafe { self.lock.unlock() }
    }
}
