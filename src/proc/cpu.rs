//! Per-context CPU state.
//!
//! Every thread that runs kernel code is an execution context. A context
//! runs on a hart, which selects the per-CPU structures it uses, and keeps
//! count of the spinlocks it holds so lock ordering can be checked.

use crate::param::NCPU;
use std::{
    cell::Cell,
    sync::atomic::{AtomicUsize, Ordering},
};

static NEXT_CONTEXT: AtomicUsize = AtomicUsize::new(1);
static NEXT_HART: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static CPU: Cpu = Cpu::new();
}

/// Per-context state.
pub struct Cpu {
    /// Unique for the lifetime of the process. Never 0.
    context: usize,
    hart: Cell<Option<usize>>,
    /// Depth of push_off() nesting.
    locks_held: Cell<usize>,
    /// Highest depth reached since the last reset.
    max_locks_held: Cell<usize>,
}
impl Cpu {
    fn new() -> Cpu {
        Cpu {
            context: NEXT_CONTEXT.fetch_add(1, Ordering::Relaxed),
            hart: Cell::new(None),
            locks_held: Cell::new(0),
            max_locks_held: Cell::new(0),
        }
    }

    /// Run the calling context on `hart` from now on.
    pub fn bind(hart: usize) {
        assert!(hart < NCPU, "bind: hart {} out of range", hart);
        CPU.with(|cpu| cpu.hart.set(Some(hart)));
    }

    /// The hart the calling context runs on.
    ///
    /// Contexts that never called `bind` are spread round-robin.
    pub fn current_id() -> usize {
        CPU.with(|cpu| match cpu.hart.get() {
            Some(hart) => hart,
            None => {
                let hart = NEXT_HART.fetch_add(1, Ordering::Relaxed) % NCPU;
                cpu.hart.set(Some(hart));
                hart
            }
        })
    }

    /// Identity of the calling context, used as the owner of held locks.
    pub fn context_id() -> usize {
        CPU.with(|cpu| cpu.context)
    }

    /// Number of spinlocks the calling context holds.
    pub fn locks_held() -> usize {
        CPU.with(|cpu| cpu.locks_held.get())
    }

    /// Most spinlocks held at once since the last `reset_max_locks_held`.
    pub fn max_locks_held() -> usize {
        CPU.with(|cpu| cpu.max_locks_held.get())
    }

    pub fn reset_max_locks_held() {
        CPU.with(|cpu| cpu.max_locks_held.set(cpu.locks_held.get()));
    }
}

/// Record that the calling context took a spinlock.
pub fn push_off() {
    CPU.with(|cpu| {
        let depth = cpu.locks_held.get() + 1;
        cpu.locks_held.set(depth);
        if depth > cpu.max_locks_held.get() {
            cpu.max_locks_held.set(depth);
        }
    });
}

/// Record that the calling context dropped a spinlock.
pub fn pop_off() {
    CPU.with(|cpu| {
        let depth = cpu.locks_held.get();
        if depth == 0 {
            log::error!("pop_off without matching push_off");
            panic!("pop_off");
        }
        cpu.locks_held.set(depth - 1);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_depth_accounting() {
        std::thread::spawn(|| {
            assert_eq!(Cpu::locks_held(), 0);
            push_off();
            push_off();
            assert_eq!(Cpu::locks_held(), 2);
            pop_off();
            pop_off();
            assert_eq!(Cpu::locks_held(), 0);
            assert_eq!(Cpu::max_locks_held(), 2);
            Cpu::reset_max_locks_held();
            assert_eq!(Cpu::max_locks_held(), 0);
        })
        .join()
        .unwrap();
    }

    #[test]
    #[should_panic(expected = "pop_off")]
    fn test_unbalanced_pop_off() {
        pop_off();
    }

    #[test]
    fn test_contexts_are_distinct() {
        let here = Cpu::context_id();
        let there = std::thread::spawn(Cpu::context_id).join().unwrap();
        assert_ne!(here, there);
        assert_ne!(there, 0);
    }

    #[test]
    fn test_bind() {
        std::thread::spawn(|| {
            Cpu::bind(3);
            assert_eq!(Cpu::current_id(), 3);
        })
        .join()
        .unwrap();
        let hart = std::thread::spawn(Cpu::current_id).join().unwrap();
        assert!(hart < NCPU);
    }
}
