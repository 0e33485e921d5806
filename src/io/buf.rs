use crate::{
    fs::{BlockData, BlockNo, Dev, BSIZE},
    sync::sleeplock::Sleeplock,
};
use std::{
    cell::UnsafeCell,
    sync::atomic::{AtomicBool, AtomicUsize, Ordering},
};

/// Cache key of a buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct BlockKey {
    pub dev: Dev,
    pub blockno: BlockNo,
}

/// Bookkeeping guarded by the lock of the bucket the buffer lives in.
#[derive(Debug, Default)]
pub(crate) struct BufferMeta {
    /// Block cached by this slot, `None` until first use.
    pub key: Option<BlockKey>,
    /// Active holders and pins.
    pub refcnt: u32,
    /// Tick of the release that dropped `refcnt` to 0.
    pub ticks: u64,
}

/// One slot of the buffer pool.
pub(crate) struct Buffer {
    pub lock: Sleeplock,
    /// Has data been read from disk?
    valid: AtomicBool,
    /// Bucket whose list links this slot. Changes only while both the old
    /// and the new bucket are locked.
    bucket: AtomicUsize,
    meta: UnsafeCell<BufferMeta>,
    data: UnsafeCell<BlockData>,
}
impl Buffer {
    pub fn new(bucket: usize) -> Buffer {
        Buffer {
            lock: Sleeplock::new("buffer"),
            valid: AtomicBool::new(false),
            bucket: AtomicUsize::new(bucket),
            meta: UnsafeCell::new(BufferMeta::default()),
            data: UnsafeCell::new([0u8; BSIZE]),
        }
    }

    pub fn valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn set_valid(&self, valid: bool) {
        self.valid.store(valid, Ordering::Release);
    }

    pub fn bucket(&self) -> usize {
        self.bucket.load(Ordering::Acquire)
    }

    pub fn set_bucket(&self, bucket: usize) {
        self.bucket.store(bucket, Ordering::Release);
    }

    /// # Safety
    ///
    /// The caller holds the lock of the bucket this buffer is linked into,
    /// and does not keep another reference to the metadata alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn meta(&self) -> &mut BufferMeta {
        &mut *self.meta.get()
    }

    /// # Safety
    ///
    /// The caller holds `self.lock`, and no mutable reference to the
    /// payload is alive.
    pub unsafe fn data(&self) -> &BlockData {
        &*self.data.get()
    }

    /// # Safety
    ///
    /// The caller holds `self.lock`, and does not keep another reference
    /// to the payload alive.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn data_mut(&self) -> &mut BlockData {
        &mut *self.data.get()
    }
}
