//! Block I/O: the buffer cache and its disk boundary.

pub mod bio;
pub(crate) mod buf;
pub(crate) mod bucket;
pub mod disk;
