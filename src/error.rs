use crate::fs::{BlockNo, Dev};
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no such device {0}")]
    NoSuchDevice(Dev),
    #[error("block {blockno} out of range on device {dev}")]
    BlockOutOfRange { dev: Dev, blockno: BlockNo },
    #[error("disk transfer failed on device {dev} block {blockno}")]
    DiskTransfer { dev: Dev, blockno: BlockNo },
    #[error("insufficient memory({0})")]
    InsufficientMemory(usize),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
