//! Core of an xv6-style kernel: a buffer cache sharded into hash buckets
//! and a physical page allocator with one free list per CPU.
//!
//! Threads stand in for harts. Each thread is an execution context with
//! its own lock accounting; see [`proc::cpu::Cpu`].

pub mod arch;
pub mod config;
pub mod error;
pub mod fs;
pub mod hardware;
pub mod io;
pub mod mem;
pub mod param;
pub mod proc;
pub mod sync;

pub use crate::{
    config::{BcacheConfig, KernelConfig, KmemConfig},
    error::{Error, Result},
    hardware::ramdisk::RamDisk,
    io::{
        bio::{BcacheStats, BufGuard, BufId, BufferCache},
        disk::{BlockDevice, Direction, Transfer},
    },
    mem::kalloc::{Frame, PhysicalAllocator},
    proc::cpu::Cpu,
    sync::LockStats,
};

use arrayvec::ArrayVec;
use std::{fmt, sync::Arc};

/// The subsystems a booted kernel shares between its harts.
pub struct Kernel {
    pub bcache: BufferCache,
    pub kmem: PhysicalAllocator,
}

impl Kernel {
    /// Bring up the allocator, then the buffer cache on top of `disk`.
    ///
    /// The calling context receives every free page.
    pub fn boot(config: KernelConfig, disk: Arc<dyn BlockDevice>) -> Result<Kernel> {
        config.validate()?;
        let kmem = PhysicalAllocator::new(&config.kmem)?;
        let bcache = BufferCache::new(&config.bcache, disk)?;
        log::info!(
            "xv6 kernel core is booting on hart {}: {} pages, {} buffers",
            Cpu::current_id(),
            kmem.total_frames(),
            bcache.nbuf()
        );
        Ok(Kernel { bcache, kmem })
    }

    pub fn stats(&self) -> KernelStats {
        let [bcache_lock, bucket_locks] = self.bcache.lock_stats();
        KernelStats {
            bcache: self.bcache.stats(),
            free_frames: self.kmem.free_frames_per_cpu(),
            steals: self.kmem.steals(),
            locks: [self.kmem.lock_stats(), bcache_lock, bucket_locks],
        }
    }
}

#[derive(Clone, Debug)]
pub struct KernelStats {
    pub bcache: BcacheStats,
    /// Free pages on each CPU's list.
    pub free_frames: ArrayVec<usize, { param::NCPU }>,
    pub steals: u64,
    pub locks: [LockStats; 3],
}

impl fmt::Display for KernelStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "--- lock kmem/bcache stats")?;
        for lock in &self.locks {
            writeln!(f, "{}", lock)?;
        }
        let contended: u64 = self.locks.iter().map(|lock| lock.contended).sum();
        writeln!(f, "tot= {}", contended)?;
        writeln!(
            f,
            "bcache: {} hits {} misses {} reads {} writes",
            self.bcache.hits, self.bcache.misses, self.bcache.disk_reads, self.bcache.disk_writes
        )?;
        write!(f, "kmem: free {:?} steals {}", self.free_frames.as_slice(), self.steals)
    }
}
