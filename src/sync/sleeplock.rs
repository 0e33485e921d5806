//! Long-term locks.
//!
//! A sleeplock may be held across a blocking operation such as a disk
//! transfer. Contexts waiting for it block on its wait channel instead of
//! spinning, so nothing else is stalled while the holder waits.

use crate::proc::cpu::Cpu;
use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct SleeplockState {
    locked: bool,
    /// Context holding the lock.
    holder: usize,
}

pub struct Sleeplock {
    name: &'static str,
    state: Mutex<SleeplockState>,
    chan: Condvar,
}
impl Sleeplock {
    pub fn new(name: &'static str) -> Sleeplock {
        Sleeplock {
            name,
            state: Mutex::new(SleeplockState::default()),
            chan: Condvar::new(),
        }
    }
    /// Sleep until the lock is free, then take it.
    ///
    /// The calling context must not hold any spinlock.
    pub unsafe fn lock_unguarded(&self) {
        if Cpu::locks_held() != 0 {
            log::error!(
                "sleeplock {} requested while holding {} spinlock(s)",
                self.name,
                Cpu::locks_held()
            );
            panic!("acquiresleep {}: holding spinlock", self.name);
        }

        let mut state = self.state.lock();
        while state.locked {
            // Put the context to sleep until the lock gets released.
            self.chan.wait(&mut state);
        }
        state.locked = true;
        state.holder = Cpu::context_id();
    }
    pub fn lock(&self) -> SleeplockGuard<'_> {
        unsafe {
            self.lock_unguarded();
        }
        SleeplockGuard { lock: self }
    }
    pub unsafe fn unlock(&self) {
        let mut state = self.state.lock();
        state.locked = false;
        state.holder = 0;
        self.chan.notify_all();
    }
    /// Whether the calling context holds this lock.
    pub fn holding(&self) -> bool {
        let state = self.state.lock();
        state.locked && state.holder == Cpu::context_id()
    }
}

pub struct SleeplockGuard<'l> {
    pub lock: &'l Sleeplock,
}
impl<'l> Drop for SleeplockGuard<'l> {
    fn drop(&mut self) {
        unsafe { self.lock.unlock() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::spinlock::Spinlock;
    use std::{
        sync::{
            atomic::{AtomicUsize, Ordering},
            Arc,
        },
        time::Duration,
    };

    #[test]
    fn test_sleeplock_single_holder() {
        let lock = Arc::new(Sleeplock::new("single"));
        let inside = Arc::new(AtomicUsize::new(0));
        let threads: Vec<_> = (0..6)
            .map(|_| {
                let lock = Arc::clone(&lock);
                let inside = Arc::clone(&inside);
                std::thread::spawn(move || {
                    for _ in 0..20 {
                        let _guard = lock.lock();
                        assert!(lock.holding());
                        assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                        std::thread::sleep(Duration::from_micros(50));
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for th in threads {
            th.join().unwrap();
        }
        assert!(!lock.holding());
    }

    #[test]
    fn test_sleeplock_holder_is_context() {
        let lock = Arc::new(Sleeplock::new("holder"));
        let _guard = lock.lock();
        let other = Arc::clone(&lock);
        let held_elsewhere = std::thread::spawn(move || other.holding()).join().unwrap();
        assert!(!held_elsewhere);
        assert!(lock.holding());
    }

    #[test]
    #[should_panic(expected = "holding spinlock")]
    fn test_sleeplock_under_spinlock_panics() {
        let spin = Spinlock::new("short");
        let sleep = Sleeplock::new("long");
        let _spin = spin.lock();
        let _sleep = sleep.lock();
    }
}
