//! Ramdisk that keeps disk images in memory.

use crate::{
    error::{Error, Result},
    fs::{BlockData, BlockNo, Dev, BSIZE},
    io::disk::{BlockDevice, Transfer},
};
use parking_lot::Mutex;
use std::{
    collections::{HashMap, HashSet},
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

pub struct RamDisk {
    /// One image per device number.
    images: HashMap<Dev, Mutex<Vec<BlockData>>>,
    /// Time each transfer keeps the caller waiting.
    latency: Option<Duration>,
    /// Blocks whose reads fail.
    faulty: Mutex<HashSet<(Dev, BlockNo)>>,
    reads: AtomicU64,
    writes: AtomicU64,
}
impl RamDisk {
    /// A zero-filled image of `nblocks` for each device in `devs`.
    pub fn new(devs: &[Dev], nblocks: usize) -> RamDisk {
        let images = devs
            .iter()
            .map(|&dev| (dev, Mutex::new(vec![[0u8; BSIZE]; nblocks])))
            .collect();
        RamDisk {
            images,
            latency: None,
            faulty: Mutex::new(HashSet::new()),
            reads: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }
    pub fn with_latency(mut self, latency: Duration) -> RamDisk {
        self.latency = Some(latency);
        self
    }
    /// Make reads of one block fail until `repair` is called.
    pub fn inject_fault(&self, dev: Dev, blockno: BlockNo) {
        self.faulty.lock().insert((dev, blockno));
    }
    pub fn repair(&self, dev: Dev, blockno: BlockNo) {
        self.faulty.lock().remove(&(dev, blockno));
    }
    /// Read a block straight from the image, bypassing any cache.
    pub fn peek(&self, dev: Dev, blockno: BlockNo) -> Result<BlockData> {
        let image = self.images.get(&dev).ok_or(Error::NoSuchDevice(dev))?.lock();
        image
            .get(blockno as usize)
            .copied()
            .ok_or(Error::BlockOutOfRange { dev, blockno })
    }
    /// Overwrite a block straight in the image, bypassing any cache.
    pub fn poke(&self, dev: Dev, blockno: BlockNo, data: &BlockData) -> Result<()> {
        let mut image = self.images.get(&dev).ok_or(Error::NoSuchDevice(dev))?.lock();
        let block = image
            .get_mut(blockno as usize)
            .ok_or(Error::BlockOutOfRange { dev, blockno })?;
        block.copy_from_slice(data);
        Ok(())
    }
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::Relaxed)
    }
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

impl BlockDevice for RamDisk {
    fn rw(&self, dev: Dev, blockno: BlockNo, transfer: Transfer<'_>) -> Result<()> {
        if let Some(latency) = self.latency {
            std::thread::sleep(latency);
        }
        let direction = transfer.direction();
        let mut image = self.images.get(&dev).ok_or(Error::NoSuchDevice(dev))?.lock();
        let block = image
            .get_mut(blockno as usize)
            .ok_or(Error::BlockOutOfRange { dev, blockno })?;
        match transfer {
            Transfer::Read(data) => {
                if self.faulty.lock().contains(&(dev, blockno)) {
                    log::warn!("ramdisk: injected read fault dev {} block {}", dev, blockno);
                    return Err(Error::DiskTransfer { dev, blockno });
                }
                data.copy_from_slice(block);
                self.reads.fetch_add(1, Ordering::Relaxed);
            }
            Transfer::Write(data) => {
                block.copy_from_slice(data);
                self.writes.fetch_add(1, Ordering::Relaxed);
            }
        }
        log::trace!("ramdisk: {:?} dev {} block {}", direction, dev, blockno);
        Ok(())
    }
}
