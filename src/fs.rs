//! On-disk block format shared with the disk driver.

/// Block size.
pub const BSIZE: usize = 1024;

/// Device number.
pub type Dev = u32;
/// Block number within a device.
pub type BlockNo = u32;

/// Contents of one disk block.
pub type BlockData = [u8; BSIZE];
