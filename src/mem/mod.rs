pub mod kalloc;

/// Fill `max_bytes` bytes at `dst` with `data`.
///
/// # Safety
///
/// `dst` must be valid for writes of `max_bytes` bytes.
pub unsafe fn memset(dst: *mut u8, data: u8, max_bytes: usize) -> *mut u8 {
    core::ptr::write_bytes(dst, data, max_bytes);
    dst
}
