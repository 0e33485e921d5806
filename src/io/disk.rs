//! Boundary between the buffer cache and the block device driver.

use crate::{
    error::Result,
    fs::{BlockData, BlockNo, Dev},
};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Direction {
    /// Device to memory.
    Read,
    /// Memory to device.
    Write,
}

/// One block transfer together with the payload it fills or drains.
#[derive(Debug)]
pub enum Transfer<'a> {
    Read(&'a mut BlockData),
    Write(&'a BlockData),
}
impl<'a> Transfer<'a> {
    pub fn direction(&self) -> Direction {
        match self {
            Transfer::Read(_) => Direction::Read,
            Transfer::Write(_) => Direction::Write,
        }
    }
}

/// A synchronous block transfer primitive.
///
/// The caller holds the sleeplock of the buffer owning the payload for the
/// whole call, so implementations may block until the device completes.
pub trait BlockDevice: Send + Sync {
    fn rw(&self, dev: Dev, blockno: BlockNo, transfer: Transfer<'_>) -> Result<()>;
}
