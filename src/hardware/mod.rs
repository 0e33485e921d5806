//! Device drivers.

pub mod ramdisk;
