//! Physical memory allocator, for user processes,
//! kernel stacks, page-table pages,
//! and pipe buffers. Allocates whole 4096-byte pages.
//!
//! Every CPU owns a free list behind its own lock. A free page stores the
//! link to the next free page in its first bytes. Pages are freed onto the
//! list of the freeing CPU and allocated from the list of the allocating
//! CPU, falling back to taking a page from another CPU's list when the
//! local one is empty. No more than one list lock is held at a time.

use super::memset;
use crate::{
    arch::mem::{is_page_aligned, round_up_page, PAGE_SIZE},
    config::KmemConfig,
    error::{Error, Result},
    param::{JUNK_ON_ALLOC, JUNK_ON_FREE, NCPU},
    proc::cpu::Cpu,
    sync::{spinmutex::SpinMutex, LockStats},
};
use arrayvec::ArrayVec;
use std::{
    alloc::{alloc, dealloc, Layout},
    marker::PhantomData,
    ptr::NonNull,
    sync::atomic::{AtomicU64, Ordering},
};

struct Run {
    next: Option<NonNull<Run>>,
}

#[derive(Default)]
struct FreeList {
    head: Option<NonNull<Run>>,
    len: usize,
}
// The pages on the list are owned by the list alone.
unsafe impl Send for FreeList {}

impl FreeList {
    /// # Safety
    ///
    /// `page` is a whole page of managed memory that nobody else refers to.
    unsafe fn push(&mut self, page: NonNull<u8>) {
        let run = page.cast::<Run>();
        run.as_ptr().write(Run { next: self.head });
        self.head = Some(run);
        self.len += 1;
    }

    fn pop(&mut self) -> Option<NonNull<u8>> {
        let run = self.head?;
        self.head = unsafe { run.as_ref().next };
        self.len -= 1;
        Some(run.cast())
    }
}

/// Page-aligned region standing in for the physical memory after the kernel.
struct PhysicalMemory {
    start: NonNull<u8>,
    layout: Layout,
}
unsafe impl Send for PhysicalMemory {}
unsafe impl Sync for PhysicalMemory {}

impl PhysicalMemory {
    fn new(pages: usize) -> Result<PhysicalMemory> {
        let size = pages
            .checked_mul(PAGE_SIZE)
            .ok_or(Error::InsufficientMemory(usize::MAX))?;
        if size == 0 {
            return Err(Error::InsufficientMemory(0));
        }
        let layout = Layout::from_size_align(size, PAGE_SIZE)
            .map_err(|_| Error::InsufficientMemory(size))?;
        let start = NonNull::new(unsafe { alloc(layout) }).ok_or(Error::InsufficientMemory(size))?;
        Ok(PhysicalMemory { start, layout })
    }

    fn start(&self) -> usize {
        self.start.as_ptr() as usize
    }

    fn end(&self) -> usize {
        self.start() + self.layout.size()
    }

    /// Pointer to the byte at physical address `pa`, which must be in range.
    fn page(&self, pa: usize) -> NonNull<u8> {
        debug_assert!(pa >= self.start() && pa < self.end());
        unsafe { NonNull::new_unchecked(self.start.as_ptr().add(pa - self.start())) }
    }
}
impl Drop for PhysicalMemory {
    fn drop(&mut self) {
        unsafe { dealloc(self.start.as_ptr(), self.layout) }
    }
}

/// One page of physical memory, owned exclusively by whoever allocated it.
///
/// A frame that is dropped instead of freed is lost to the allocator.
#[must_use]
pub struct Frame<'k> {
    page: NonNull<u8>,
    _kmem: PhantomData<&'k PhysicalAllocator>,
}
unsafe impl<'k> Send for Frame<'k> {}
unsafe impl<'k> Sync for Frame<'k> {}

impl<'k> Frame<'k> {
    /// Rebuild a frame from a physical address.
    ///
    /// # Safety
    ///
    /// `pa` came from `into_addr` on a frame of the allocator the result
    /// is handed back to, and no other frame for it exists.
    pub unsafe fn from_addr(pa: usize) -> Option<Frame<'k>> {
        NonNull::new(pa as *mut u8).map(|page| Frame {
            page,
            _kmem: PhantomData,
        })
    }

    /// Physical address of the frame.
    pub fn addr(&self) -> usize {
        self.page.as_ptr() as usize
    }

    /// Give up the frame, keeping only its address.
    pub fn into_addr(self) -> usize {
        self.addr()
    }

    pub fn as_bytes(&self) -> &[u8; PAGE_SIZE] {
        unsafe { &*self.page.as_ptr().cast::<[u8; PAGE_SIZE]>() }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8; PAGE_SIZE] {
        unsafe { &mut *self.page.as_ptr().cast::<[u8; PAGE_SIZE]>() }
    }
}

pub struct PhysicalAllocator {
    memory: PhysicalMemory,
    /// One free list per CPU.
    kmem: Box<[SpinMutex<FreeList>]>,
    junk_on_alloc: bool,
    junk_on_free: bool,
    steals: AtomicU64,
}

impl PhysicalAllocator {
    /// Claim the managed memory and free every page of it onto the
    /// calling CPU's list. Must finish before anyone else allocates.
    pub fn new(config: &KmemConfig) -> Result<PhysicalAllocator> {
        config.validate()?;
        let kmem = PhysicalAllocator {
            memory: PhysicalMemory::new(config.pages)?,
            kmem: (0..config.ncpu)
                .map(|_| SpinMutex::new("kmem", FreeList::default()))
                .collect(),
            junk_on_alloc: config.junk_on_alloc,
            junk_on_free: config.junk_on_free,
            steals: AtomicU64::new(0),
        };
        kmem.free_range(kmem.memory.start(), kmem.memory.end());
        log::debug!(
            "kinit: {} pages at {:#x}..{:#x} seeded on cpu {}",
            kmem.total_frames(),
            kmem.memory.start(),
            kmem.memory.end(),
            kmem.current_cpu()
        );
        Ok(kmem)
    }

    fn free_range(&self, pa_start: usize, pa_end: usize) {
        let mut pa = round_up_page(pa_start);
        while pa + PAGE_SIZE <= pa_end {
            unsafe { self.free_addr(pa) };
            pa += PAGE_SIZE;
        }
    }

    fn current_cpu(&self) -> usize {
        Cpu::current_id() % self.kmem.len()
    }

    /// Allocate one 4096-byte page of physical memory.
    ///
    /// Returns `None` if every CPU's list is empty.
    pub fn alloc(&self) -> Option<Frame<'_>> {
        let cpu = self.current_cpu();
        let local = self.kmem[cpu].lock().pop();
        let page = match local {
            Some(page) => page,
            None => self.steal(cpu)?,
        };

        if self.junk_on_alloc {
            unsafe { memset(page.as_ptr(), JUNK_ON_ALLOC, PAGE_SIZE) };
        }
        Some(Frame {
            page,
            _kmem: PhantomData,
        })
    }

    /// Take a page from the first other CPU that has one, in round-robin
    /// order starting after `cpu`.
    fn steal(&self, cpu: usize) -> Option<NonNull<u8>> {
        let ncpu = self.kmem.len();
        (1..ncpu)
            .map(|i| (cpu + i) % ncpu)
            .find_map(|victim| {
                let page = self.kmem[victim].lock().pop()?;
                self.steals.fetch_add(1, Ordering::Relaxed);
                log::trace!("kalloc: cpu {} took a page from cpu {}", cpu, victim);
                Some(page)
            })
    }

    /// Free the page of physical memory held by `frame`, which normally
    /// should have been returned by a call to `alloc`.
    pub fn free(&self, frame: Frame<'_>) {
        unsafe { self.free_addr(frame.into_addr()) }
    }

    /// # Safety
    ///
    /// If `pa` passes the range checks, nobody refers to that page anymore.
    unsafe fn free_addr(&self, pa: usize) {
        if !is_page_aligned(pa) || pa < self.memory.start() || pa >= self.memory.end() {
            log::error!(
                "kfree: {:#x} is not a page in {:#x}..{:#x}",
                pa,
                self.memory.start(),
                self.memory.end()
            );
            panic!("kfree");
        }

        let page = self.memory.page(pa);
        if self.junk_on_free {
            // Fill with junk to catch dangling refs.
            memset(page.as_ptr(), JUNK_ON_FREE, PAGE_SIZE);
        }

        let cpu = self.current_cpu();
        self.kmem[cpu].lock().push(page);
    }

    pub fn ncpu(&self) -> usize {
        self.kmem.len()
    }

    /// Pages managed in total, free or not.
    pub fn total_frames(&self) -> usize {
        self.memory.layout.size() / PAGE_SIZE
    }

    /// Free pages on each CPU's list. Lists are read one at a time.
    pub fn free_frames_per_cpu(&self) -> ArrayVec<usize, NCPU> {
        self.kmem.iter().map(|list| list.lock().len).collect()
    }

    pub fn free_frames(&self) -> usize {
        self.free_frames_per_cpu().iter().sum()
    }

    /// Pages allocated from another CPU's list.
    pub fn steals(&self) -> u64 {
        self.steals.load(Ordering::Relaxed)
    }

    pub fn lock_stats(&self) -> LockStats {
        LockStats::sum("kmem", self.kmem.iter().map(SpinMutex::stats))
    }
}
