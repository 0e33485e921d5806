//! Hash buckets of the buffer cache.
//!
//! Each bucket is a circular doubly linked list of buffer slots with its own
//! spinlock. Links are slot indices into one arena: nodes `0..nbuf` are the
//! buffers, node `nbuf + b` is the list head of bucket `b`. A node's links
//! are only touched while holding the lock of the bucket it is linked into.

use crate::{
    fs::BlockNo,
    sync::spinlock::{Spinlock, SpinlockGuard},
};
use std::cell::UnsafeCell;

#[derive(Copy, Clone, Debug)]
struct Link {
    prev: usize,
    next: usize,
}

pub(crate) struct BucketTable {
    nbuf: usize,
    locks: Box<[Spinlock]>,
    links: Box<[UnsafeCell<Link>]>,
}
unsafe impl Sync for BucketTable {}

impl BucketTable {
    /// All slots start out in the bucket of block 0.
    pub fn new(nbuf: usize, nbucket: usize) -> BucketTable {
        let table = BucketTable {
            nbuf,
            locks: (0..nbucket)
                .map(|_| Spinlock::new("bcache.bucket"))
                .collect(),
            links: (0..nbuf + nbucket)
                .map(|node| UnsafeCell::new(Link { prev: node, next: node }))
                .collect(),
        };
        let mut home = table.lock(table.hash(0));
        for slot in 0..nbuf {
            home.push_front(slot);
        }
        drop(home);
        table
    }

    pub fn nbucket(&self) -> usize {
        self.locks.len()
    }

    /// Bucket a block lives in.
    pub fn hash(&self, blockno: BlockNo) -> usize {
        blockno as usize % self.nbucket()
    }

    pub fn lock(&self, bucket: usize) -> BucketGuard<'_> {
        BucketGuard {
            table: self,
            bucket,
            _guard: self.locks[bucket].lock(),
        }
    }

    pub fn locks(&self) -> impl Iterator<Item = &Spinlock> {
        self.locks.iter()
    }

    /// # Safety
    ///
    /// The caller holds the lock of the bucket `node` is linked into.
    #[allow(clippy::mut_from_ref)]
    unsafe fn link(&self, node: usize) -> &mut Link {
        &mut *self.links[node].get()
    }
}

/// Proof that the calling context holds one bucket lock.
pub(crate) struct BucketGuard<'t> {
    table: &'t BucketTable,
    bucket: usize,
    _guard: SpinlockGuard<'t>,
}
impl<'t> BucketGuard<'t> {
    pub fn bucket(&self) -> usize {
        self.bucket
    }

    fn head(&self) -> usize {
        self.table.nbuf + self.bucket
    }

    /// Slots in this bucket, most recently inserted first.
    pub fn iter(&self) -> BucketIter<'_, 't> {
        let head = self.head();
        BucketIter {
            guard: self,
            node: unsafe { self.table.link(head).next },
        }
    }

    pub fn contains(&self, slot: usize) -> bool {
        self.iter().any(|s| s == slot)
    }

    /// Link an unlinked slot at the head of this bucket.
    pub fn push_front(&mut self, slot: usize) {
        let head = self.head();
        unsafe {
            let first = self.table.link(head).next;
            *self.table.link(slot) = Link {
                prev: head,
                next: first,
            };
            self.table.link(first).prev = slot;
            self.table.link(head).next = slot;
        }
    }

    /// Unlink a slot of this bucket.
    pub fn remove(&mut self, slot: usize) {
        debug_assert!(self.contains(slot), "slot {} not in bucket {}", slot, self.bucket);
        unsafe {
            let Link { prev, next } = *self.table.link(slot);
            self.table.link(prev).next = next;
            self.table.link(next).prev = prev;
            *self.table.link(slot) = Link {
                prev: slot,
                next: slot,
            };
        }
    }

    /// Move `slot` from this bucket to the head of `to`.
    pub fn relocate(&mut self, slot: usize, to: &mut BucketGuard<'_>) {
        debug_assert_ne!(self.bucket, to.bucket);
        self.remove(slot);
        to.push_front(slot);
    }
}

pub(crate) struct BucketIter<'g, 't> {
    guard: &'g BucketGuard<'t>,
    node: usize,
}
impl<'g, 't> Iterator for BucketIter<'g, 't> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.node == self.guard.head() {
            return None;
        }
        let slot = self.node;
        self.node = unsafe { self.guard.table.link(slot).next };
        Some(slot)
    }
}
