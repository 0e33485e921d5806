//! Buffer cache.
//!
//! The buffer cache is a fixed pool of buffers holding cached copies of
//! disk block contents. Caching disk blocks in memory reduces the number
//! of disk reads and also provides a synchronization point for disk blocks
//! used by multiple processes.
//!
//! The pool is spread over hash buckets by block number, each with its own
//! spinlock, so lookups of unrelated blocks do not contend. A buffer's
//! identity, reference count and release tick are guarded by the lock of
//! the bucket it lives in; its payload is guarded by its sleeplock.
//!
//! Interface:
//! - To get a buffer for a particular disk block, call `read`.
//! - After changing buffer data, call `write` to write it to disk.
//! - When done with the buffer, call `release` (or drop the guard).
//! - Only one process at a time can use a buffer,
//!   so do not keep them longer than necessary.
//!
//! Lock order: the eviction lock, then at most two bucket locks. No
//! spinlock is ever held while taking a buffer's sleeplock.

use super::{
    buf::{BlockKey, Buffer},
    bucket::{BucketGuard, BucketTable},
    disk::{BlockDevice, Transfer},
};
use crate::{
    config::BcacheConfig,
    error::Result,
    fs::{BlockData, BlockNo, Dev},
    sync::{spinlock::Spinlock, LockStats},
};
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

/// Handle naming a buffer slot and the block it was acquired for.
///
/// Stays meaningful only while the buffer is referenced.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BufId {
    slot: usize,
    key: BlockKey,
}
impl BufId {
    pub fn slot(&self) -> usize {
        self.slot
    }
    pub fn dev(&self) -> Dev {
        self.key.dev
    }
    pub fn blockno(&self) -> BlockNo {
        self.key.blockno
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct BcacheStats {
    /// Lookups that found the block cached.
    pub hits: u64,
    /// Lookups that recycled a buffer.
    pub misses: u64,
    pub disk_reads: u64,
    pub disk_writes: u64,
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    disk_reads: AtomicU64,
    disk_writes: AtomicU64,
}

pub struct BufferCache {
    /// Serializes evictions.
    lock: Spinlock,
    buf: Box<[Buffer]>,
    buckets: BucketTable,
    disk: Arc<dyn BlockDevice>,
    /// Logical clock stamped on buffers when their last reference goes.
    ticks: AtomicU64,
    counters: Counters,
}

// Buffer metadata is only touched under its bucket lock and payloads only
// under their sleeplock.
unsafe impl Sync for BufferCache {}

impl BufferCache {
    pub fn new(config: &BcacheConfig, disk: Arc<dyn BlockDevice>) -> Result<BufferCache> {
        config.validate()?;
        log::debug!(
            "binit: {} buffers in {} buckets",
            config.nbuf,
            config.nbucket
        );
        let buckets = BucketTable::new(config.nbuf, config.nbucket);
        let home = buckets.hash(0);
        Ok(BufferCache {
            lock: Spinlock::new("bcache"),
            buf: (0..config.nbuf).map(|_| Buffer::new(home)).collect(),
            buckets,
            disk,
            ticks: AtomicU64::new(0),
            counters: Counters::default(),
        })
    }

    pub fn nbuf(&self) -> usize {
        self.buf.len()
    }

    pub fn nbucket(&self) -> usize {
        self.buckets.nbucket()
    }

    /// Look through the buffer cache for block on device dev.
    ///
    /// If not found, recycle the least recently released unused buffer.
    /// In either case, return the locked buffer.
    pub fn get(&self, dev: Dev, blockno: BlockNo) -> BufGuard<'_> {
        let key = BlockKey { dev, blockno };

        // Is the block already cached?
        let cached = {
            let bucket = self.buckets.lock(self.buckets.hash(blockno));
            self.lookup(&bucket, key)
        };
        let slot = match cached {
            Some(slot) => {
                log::trace!("bget: hit {:?} in slot {}", key, slot);
                slot
            }
            None => self.recycle(key),
        };

        unsafe { self.buf[slot].lock.lock_unguarded() };
        BufGuard {
            cache: self,
            id: BufId { slot, key },
        }
    }

    /// Return a locked buffer with the contents of the indicated block.
    ///
    /// If the transfer fails the buffer stays invalid and is released.
    pub fn read(&self, dev: Dev, blockno: BlockNo) -> Result<BufGuard<'_>> {
        let b = self.get(dev, blockno);
        let buf = &self.buf[b.id.slot];
        if !buf.valid() {
            // The guard has not been handed out yet, so nothing else
            // refers to the payload.
            self.disk
                .rw(dev, blockno, Transfer::Read(unsafe { buf.data_mut() }))?;
            buf.set_valid(true);
            self.counters.disk_reads.fetch_add(1, Ordering::Relaxed);
        }
        Ok(b)
    }

    /// Write b's contents to disk. Must be locked by the caller.
    pub fn write(&self, b: &BufGuard<'_>) -> Result<()> {
        if !std::ptr::eq(b.cache, self) || !self.buf[b.id.slot].lock.holding() {
            log::error!("bwrite: {:?} not locked by the calling context", b.id);
            panic!("bwrite");
        }
        let buf = &self.buf[b.id.slot];
        self.disk.rw(
            b.id.key.dev,
            b.id.key.blockno,
            Transfer::Write(unsafe { buf.data() }),
        )?;
        self.counters.disk_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Release a locked buffer.
    pub fn release(&self, b: BufGuard<'_>) {
        debug_assert!(std::ptr::eq(b.cache, self));
        drop(b);
    }

    /// Keep a buffer resident without locking it.
    ///
    /// Panics if the slot no longer caches the block `id` was taken for.
    pub fn pin(&self, id: BufId) {
        let _bucket = self.lock_bucket_of(id.slot);
        let meta = unsafe { self.buf[id.slot].meta() };
        if meta.key != Some(id.key) {
            log::error!("bpin: slot {} no longer caches {:?}", id.slot, id.key);
            panic!("bpin");
        }
        meta.refcnt += 1;
    }

    pub fn unpin(&self, id: BufId) {
        let _bucket = self.lock_bucket_of(id.slot);
        let meta = unsafe { self.buf[id.slot].meta() };
        if meta.key != Some(id.key) || meta.refcnt == 0 {
            log::error!(
                "bunpin: slot {} is {:?} with refcnt {}, expected {:?}",
                id.slot,
                meta.key,
                meta.refcnt,
                id.key
            );
            panic!("bunpin");
        }
        meta.refcnt -= 1;
    }

    /// Reference count of a cached block, `None` if it is not cached.
    pub fn refcnt(&self, dev: Dev, blockno: BlockNo) -> Option<u32> {
        let key = BlockKey { dev, blockno };
        let bucket = self.buckets.lock(self.buckets.hash(blockno));
        let refcnt = bucket
            .iter()
            .map(|slot| unsafe { self.buf[slot].meta() })
            .find(|meta| meta.key == Some(key))
            .map(|meta| meta.refcnt);
        refcnt
    }

    /// Bucket whose list holds the block, searching every bucket.
    pub fn bucket_of(&self, dev: Dev, blockno: BlockNo) -> Option<usize> {
        let key = BlockKey { dev, blockno };
        (0..self.nbucket()).find(|&b| {
            let bucket = self.buckets.lock(b);
            let found = bucket
                .iter()
                .any(|slot| unsafe { self.buf[slot].meta() }.key == Some(key));
            found
        })
    }

    /// Check that every slot is linked exactly once, into the bucket its
    /// block hashes to. Meaningful only while no eviction is running.
    pub fn verify(&self) {
        let mut seen = HashSet::new();
        for b in 0..self.nbucket() {
            let bucket = self.buckets.lock(b);
            for slot in bucket.iter() {
                assert!(seen.insert(slot), "slot {} linked twice", slot);
                assert_eq!(self.buf[slot].bucket(), b, "slot {} misplaced", slot);
                let blockno = unsafe { self.buf[slot].meta() }
                    .key
                    .map_or(0, |key| key.blockno);
                assert_eq!(
                    self.buckets.hash(blockno),
                    b,
                    "slot {} caching block {} found in bucket {}",
                    slot,
                    blockno,
                    b
                );
            }
        }
        assert_eq!(seen.len(), self.nbuf(), "slots missing from buckets");
    }

    pub fn stats(&self) -> BcacheStats {
        BcacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            disk_reads: self.counters.disk_reads.load(Ordering::Relaxed),
            disk_writes: self.counters.disk_writes.load(Ordering::Relaxed),
        }
    }

    /// Counters of the eviction lock and of all bucket locks combined.
    pub fn lock_stats(&self) -> [LockStats; 2] {
        [
            self.lock.stats(),
            LockStats::sum("bcache.bucket", self.buckets.locks().map(Spinlock::stats)),
        ]
    }

    /// Take a reference to `key` if it is cached in `bucket`.
    fn lookup(&self, bucket: &BucketGuard<'_>, key: BlockKey) -> Option<usize> {
        let slot = bucket
            .iter()
            .find(|&slot| unsafe { self.buf[slot].meta() }.key == Some(key))?;
        unsafe { self.buf[slot].meta() }.refcnt += 1;
        self.counters.hits.fetch_add(1, Ordering::Relaxed);
        Some(slot)
    }

    /// Give `key` a buffer of its own, referenced once by the caller.
    fn recycle(&self, key: BlockKey) -> usize {
        let _evicting = self.lock.lock();
        let home = self.buckets.hash(key.blockno);

        // Someone may have cached the block since the first lookup.
        {
            let bucket = self.buckets.lock(home);
            if let Some(slot) = self.lookup(&bucket, key) {
                log::trace!("bget: {:?} cached concurrently in slot {}", key, slot);
                return slot;
            }
        }

        let (slot, mut origin) = match self.find_victim() {
            Some(victim) => victim,
            None => {
                log::error!("bget: all {} buffers are referenced", self.nbuf());
                panic!("bget: no buffers");
            }
        };

        let buf = &self.buf[slot];
        let meta = unsafe { buf.meta() };
        log::debug!(
            "bget: recycle slot {} from {:?} to {:?}",
            slot,
            meta.key,
            key
        );
        meta.key = Some(key);
        meta.refcnt = 1;
        buf.set_valid(false);

        if origin.bucket() != home {
            let mut dest = self.buckets.lock(home);
            origin.relocate(slot, &mut dest);
            buf.set_bucket(home);
            drop(dest);
        }
        drop(origin);

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        slot
    }

    /// Find the unreferenced buffer released longest ago.
    ///
    /// Buckets are visited in order. Only the bucket holding the best
    /// candidate so far stays locked while the next one is examined, and
    /// it is unlocked as soon as a better candidate turns up. The winner is
    /// returned with its bucket still locked.
    fn find_victim(&self) -> Option<(usize, BucketGuard<'_>)> {
        let mut best: Option<(usize, u64, BucketGuard<'_>)> = None;

        for b in 0..self.nbucket() {
            let bucket = self.buckets.lock(b);
            let mut limit = best.as_ref().map(|(_, ticks, _)| *ticks);
            let mut found = None;
            for slot in bucket.iter() {
                let meta = unsafe { self.buf[slot].meta() };
                if meta.refcnt == 0 && limit.map_or(true, |ticks| meta.ticks < ticks) {
                    limit = Some(meta.ticks);
                    found = Some(slot);
                }
            }
            if let Some(slot) = found {
                // Drops the previous candidate's bucket guard.
                best = Some((slot, limit.unwrap_or_default(), bucket));
            }
        }

        best.map(|(slot, _, bucket)| (slot, bucket))
    }

    /// Lock the bucket `slot` is linked into right now.
    fn lock_bucket_of(&self, slot: usize) -> BucketGuard<'_> {
        loop {
            let bucket = self.buckets.lock(self.buf[slot].bucket());
            // A slot cannot leave a bucket while that bucket is locked.
            if self.buf[slot].bucket() == bucket.bucket() {
                return bucket;
            }
        }
    }

    fn tick(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn release_slot(&self, id: BufId) {
        let buf = &self.buf[id.slot];
        if !buf.lock.holding() {
            log::error!("brelse: {:?} not locked by the calling context", id);
            panic!("brelse");
        }
        unsafe { buf.lock.unlock() };

        let _bucket = self.buckets.lock(self.buckets.hash(id.key.blockno));
        let meta = unsafe { buf.meta() };
        debug_assert_eq!(meta.key, Some(id.key));
        meta.refcnt -= 1;
        if meta.refcnt == 0 {
            // No one is waiting for it.
            meta.ticks = self.tick();
        }
    }

    fn assert_holding(&self, id: BufId, what: &str) {
        if !self.buf[id.slot].lock.holding() {
            log::error!("{}: {:?} not locked by the calling context", what, id);
            panic!("{}", what);
        }
    }
}

/// A locked buffer, released on drop.
///
/// Only the context that acquired it may touch its payload or release it.
pub struct BufGuard<'c> {
    cache: &'c BufferCache,
    id: BufId,
}
impl<'c> BufGuard<'c> {
    pub fn id(&self) -> BufId {
        self.id
    }
    pub fn dev(&self) -> Dev {
        self.id.key.dev
    }
    pub fn blockno(&self) -> BlockNo {
        self.id.key.blockno
    }
    /// Does the payload reflect the disk?
    pub fn valid(&self) -> bool {
        self.cache.buf[self.id.slot].valid()
    }
    pub fn data(&self) -> &BlockData {
        self.cache.assert_holding(self.id, "bdata");
        unsafe { self.cache.buf[self.id.slot].data() }
    }
    pub fn data_mut(&mut self) -> &mut BlockData {
        self.cache.assert_holding(self.id, "bdata");
        unsafe { self.cache.buf[self.id.slot].data_mut() }
    }
    pub fn write(&self) -> Result<()> {
        self.cache.write(self)
    }
    pub fn pin(&self) {
        self.cache.pin(self.id)
    }
    pub fn release(self) {
        drop(self)
    }
}
impl<'c> Drop for BufGuard<'c> {
    fn drop(&mut self) {
        self.cache.release_slot(self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, fs::BSIZE, hardware::ramdisk::RamDisk, proc::cpu::Cpu};
    use rand::Rng;

    fn cache(nbuf: usize, nbucket: usize) -> (Arc<RamDisk>, BufferCache) {
        let disk = Arc::new(RamDisk::new(&[1, 2], 64));
        let config = BcacheConfig::default().nbuf(nbuf).nbucket(nbucket);
        let cache = BufferCache::new(&config, disk.clone()).unwrap();
        (disk, cache)
    }

    fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
        payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_default()
    }

    #[test]
    fn test_read_write_back() {
        let (disk, cache) = cache(4, 2);
        let mut b = cache.read(1, 5).unwrap();
        assert!(b.valid());
        assert_eq!(b.data(), &[0u8; BSIZE]);
        b.data_mut()[..5].copy_from_slice(b"hello");
        b.write().unwrap();
        cache.release(b);
        assert_eq!(&disk.peek(1, 5).unwrap()[..5], b"hello");

        // Cached: no second disk read.
        let b = cache.read(1, 5).unwrap();
        assert_eq!(&b.data()[..5], b"hello");
        drop(b);
        assert_eq!(
            cache.stats(),
            BcacheStats {
                hits: 1,
                misses: 1,
                disk_reads: 1,
                disk_writes: 1,
            }
        );
    }

    #[test]
    fn test_devices_do_not_alias() {
        let (disk, cache) = cache(4, 2);
        disk.poke(2, 3, &[9u8; BSIZE]).unwrap();
        let a = cache.read(1, 3).unwrap();
        let b = cache.read(2, 3).unwrap();
        assert_ne!(a.id().slot(), b.id().slot());
        assert_eq!(a.data()[0], 0);
        assert_eq!(b.data()[0], 9);
    }

    #[test]
    fn test_evicts_least_recently_released() {
        let (_disk, cache) = cache(4, 2);
        let bufs: Vec<_> = (1..=4).map(|n| cache.read(1, n).unwrap()).collect();
        let mut bufs: Vec<_> = bufs.into_iter().map(Some).collect();
        for n in [3, 1, 4, 2] {
            cache.release(bufs[n as usize - 1].take().unwrap());
        }

        let b = cache.read(1, 5).unwrap();
        assert_eq!(cache.refcnt(1, 3), None);
        for n in [1, 2, 4] {
            assert_eq!(cache.refcnt(1, n), Some(0));
        }
        assert_eq!(cache.bucket_of(1, 5), Some(1));
        drop(b);

        // Block 1 went next-longest ago.
        drop(cache.read(1, 6).unwrap());
        assert_eq!(cache.refcnt(1, 1), None);
        assert_eq!(cache.bucket_of(1, 6), Some(0));
        cache.verify();
    }

    #[test]
    fn test_refcnt_balanced_after_release() {
        let (_disk, cache) = cache(3, 2);
        for _ in 0..10 {
            let b = cache.read(1, 7).unwrap();
            assert_eq!(cache.refcnt(1, 7), Some(1));
            cache.release(b);
            assert_eq!(cache.refcnt(1, 7), Some(0));
        }
    }

    #[test]
    fn test_pin_counts_as_reference() {
        let (_disk, cache) = cache(2, 1);
        let b = cache.read(1, 1).unwrap();
        let id = b.id();
        b.pin();
        assert_eq!(cache.refcnt(1, 1), Some(2));
        cache.release(b);
        assert_eq!(cache.refcnt(1, 1), Some(1));

        // Block 1 went longest ago but is pinned.
        drop(cache.read(1, 2).unwrap());
        drop(cache.read(1, 3).unwrap());
        assert_eq!(cache.refcnt(1, 1), Some(1));
        assert_eq!(cache.refcnt(1, 2), None);

        cache.unpin(id);
        assert_eq!(cache.refcnt(1, 1), Some(0));
        drop(cache.read(1, 4).unwrap());
        assert_eq!(cache.refcnt(1, 1), None);
    }

    #[test]
    fn test_pinned_survives_older_release() {
        let (_disk, cache) = cache(4, 2);
        drop(cache.read(1, 10).unwrap());
        let b = cache.read(1, 10).unwrap();
        b.pin();
        assert_eq!(cache.refcnt(1, 10), Some(2));
        assert_eq!(cache.stats().hits, 1);
        drop(b);
        for n in 11..=13 {
            drop(cache.read(1, n).unwrap());
        }

        // Block 10 has the oldest release but is still pinned.
        drop(cache.read(1, 14).unwrap());
        assert_eq!(cache.refcnt(1, 10), Some(1));
        assert_eq!(cache.refcnt(1, 11), None);
        assert_eq!(cache.bucket_of(1, 14), Some(0));
        cache.verify();
    }

    #[test]
    #[should_panic(expected = "bunpin")]
    fn test_unpin_unreferenced_panics() {
        let (_disk, cache) = cache(2, 1);
        let b = cache.read(1, 1).unwrap();
        let id = b.id();
        drop(b);
        cache.unpin(id);
    }

    #[test]
    #[should_panic(expected = "bpin")]
    fn test_pin_recycled_panics() {
        let (_disk, cache) = cache(1, 1);
        let id = cache.read(1, 1).unwrap().id();
        drop(cache.read(1, 2).unwrap());
        cache.pin(id);
    }

    #[test]
    #[should_panic(expected = "bpin")]
    fn test_pin_slot_moved_to_other_bucket_panics() {
        let (_disk, cache) = cache(1, 2);
        // The only slot moves to bucket 1 for block 1, then back to 0.
        let id = cache.read(1, 1).unwrap().id();
        drop(cache.read(1, 2).unwrap());
        assert_eq!(cache.bucket_of(1, 2), Some(0));
        cache.verify();
        cache.pin(id);
    }

    #[test]
    #[should_panic(expected = "bunpin")]
    fn test_unpin_slot_moved_to_other_bucket_panics() {
        let (_disk, cache) = cache(1, 2);
        let b = cache.read(1, 1).unwrap();
        let id = b.id();
        drop(b);
        drop(cache.read(1, 4).unwrap());
        cache.unpin(id);
    }

    #[test]
    #[should_panic(expected = "bget: no buffers")]
    fn test_no_buffers_panics() {
        let (_disk, cache) = cache(2, 2);
        let _a = cache.read(1, 1).unwrap();
        let _b = cache.read(1, 2).unwrap();
        let _c = cache.get(1, 3);
    }

    #[test]
    fn test_write_requires_holder() {
        let (disk, cache) = cache(2, 1);
        let b = cache.read(1, 1).unwrap();
        let result = std::thread::scope(|s| s.spawn(|| cache.write(&b)).join());
        assert_eq!(panic_message(result.unwrap_err()), "bwrite");
        assert_eq!(disk.writes(), 0);
        // The holder is unaffected.
        b.write().unwrap();
        drop(b);
        assert_eq!(cache.refcnt(1, 1), Some(0));
    }

    #[test]
    fn test_failed_read_leaves_buffer_invalid() {
        let (disk, cache) = cache(2, 1);
        disk.poke(1, 3, &[4u8; BSIZE]).unwrap();
        disk.inject_fault(1, 3);
        assert!(matches!(
            cache.read(1, 3),
            Err(Error::DiskTransfer { dev: 1, blockno: 3 })
        ));
        assert_eq!(cache.refcnt(1, 3), Some(0));

        disk.repair(1, 3);
        let b = cache.read(1, 3).unwrap();
        assert!(b.valid());
        assert_eq!(b.data()[0], 4);
        assert_eq!(cache.stats().disk_reads, 1);
    }

    #[test]
    fn test_slow_transfer_does_not_stall_bucket() {
        use std::{
            sync::{atomic::AtomicBool, Barrier},
            time::{Duration, Instant},
        };

        let latency = Duration::from_millis(200);
        let disk = Arc::new(RamDisk::new(&[1], 16).with_latency(latency));
        let config = BcacheConfig::default().nbuf(4).nbucket(2);
        let cache = BufferCache::new(&config, disk.clone()).unwrap();
        // Blocks 2 and 4 share bucket 0.
        drop(cache.read(1, 2).unwrap());
        assert_eq!(cache.bucket_of(1, 2), Some(0));

        let started = Barrier::new(2);
        let slow_done = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                started.wait();
                let b = cache.read(1, 4).unwrap();
                slow_done.store(true, Ordering::SeqCst);
                drop(b);
                assert_eq!(Cpu::locks_held(), 0);
            });
            s.spawn(|| {
                started.wait();
                std::thread::sleep(latency / 4);
                let begin = Instant::now();
                let b = cache.get(1, 2);
                assert!(b.valid());
                assert!(!slow_done.load(Ordering::SeqCst));
                assert!(begin.elapsed() < latency / 2);
                drop(b);
                assert_eq!(Cpu::locks_held(), 0);
            });
        });

        assert_eq!(cache.bucket_of(1, 4), Some(0));
        assert_eq!(disk.reads(), 2);
        cache.verify();
    }

    #[test]
    fn test_get_skips_disk() {
        let (disk, cache) = cache(2, 1);
        let b = cache.get(1, 9);
        assert!(!b.valid());
        drop(b);
        assert_eq!(disk.reads(), 0);
    }

    #[test]
    fn test_recycling_keeps_buckets_consistent() {
        let (_disk, cache) = cache(4, 3);
        for n in 0..40 {
            drop(cache.read(1, n).unwrap());
        }
        cache.verify();
        for n in 36..40 {
            assert_eq!(cache.bucket_of(1, n), Some(n as usize % 3));
        }
        assert_eq!(cache.bucket_of(1, 0), None);
    }

    #[test]
    fn test_concurrent_increments() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 300;
        const BLOCKS: u32 = 40;

        let (disk, cache) = cache(10, 7);
        std::thread::scope(|s| {
            for hart in 0..THREADS {
                let cache = &cache;
                s.spawn(move || {
                    Cpu::bind(hart);
                    let mut rng = rand::rng();
                    for _ in 0..ROUNDS {
                        let blockno = rng.random_range(0..BLOCKS);
                        let mut b = cache.read(1, blockno).unwrap();
                        let data = b.data_mut();
                        let n = u32::from_le_bytes(data[..4].try_into().unwrap());
                        data[..4].copy_from_slice(&(n + 1).to_le_bytes());
                        b.write().unwrap();
                        cache.release(b);
                    }
                    assert_eq!(Cpu::locks_held(), 0);
                    assert!(Cpu::max_locks_held() <= 3);
                });
            }
        });

        let total: u32 = (0..BLOCKS)
            .map(|n| u32::from_le_bytes(disk.peek(1, n).unwrap()[..4].try_into().unwrap()))
            .sum();
        assert_eq!(total as usize, THREADS * ROUNDS);
        cache.verify();
        for n in 0..BLOCKS {
            assert!(cache.refcnt(1, n).map_or(true, |r| r == 0));
        }
    }
}
