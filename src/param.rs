/// Maximum number of CPUs
pub const NCPU: usize = 8;
/// Device number of file system root disk
pub const ROOTDEV: u32 = 1;
/// Max num of blocks any FS op writes
pub const MAXOPBLOCKS: usize = 10;
/// Size of disk block cache
pub const NBUF: usize = MAXOPBLOCKS * 3;
/// Number of hash buckets in the disk block cache
pub const NBUCKET: usize = 17;
/// Pages handed to the physical allocator at boot
pub const NPAGES: usize = 1024;
/// Byte written over a page when it is freed.
pub const JUNK_ON_FREE: u8 = 1;
/// Byte written over a page when it is allocated.
pub const JUNK_ON_ALLOC: u8 = 5;
