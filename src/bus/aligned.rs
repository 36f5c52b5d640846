//! A 16-byte-aligned byte buffer, the typed bus's backing storage (§4.E).
//!
//! No existing example repo has an aligned-allocation type and none of the
//! pack's crates are narrowly about it, so this is hand-rolled plumbing on
//! top of `std::alloc` -- ungrounded but unavoidable.

use std::alloc::{alloc_zeroed, dealloc, handle_alloc_error, Layout};
use std::ptr::NonNull;

/// Alignment every bus segment is allocated at, per §4.E.
pub const ALIGNMENT: usize = 16;

/// An owned, zero-initialized, 16-byte-aligned byte buffer.
pub struct AlignedBuffer {
    ptr: NonNull<u8>,
    len: usize,
    layout: Layout,
}

// Safe: `AlignedBuffer` has no interior mutability of its own, and the
// bus registry is solely responsible for synchronizing access to the
// bytes it points at (one writer before publish, many readers after).
unsafe impl Send for AlignedBuffer {}
unsafe impl Sync for AlignedBuffer {}

impl AlignedBuffer {
    pub fn new(len_bytes: usize) -> Self {
        let size = len_bytes.max(1);
        let layout = Layout::from_size_align(size, ALIGNMENT).expect("invalid aligned layout");
        let raw = unsafe { alloc_zeroed(layout) };
        let ptr = match NonNull::new(raw) {
            Some(p) => p,
            None => handle_alloc_error(layout),
        };
        Self { ptr, len: len_bytes, layout }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// View the buffer as `[T]`, truncating to a whole number of `T`s.
    pub fn typed<T: Copy>(&self) -> &[T] {
        let count = self.len / std::mem::size_of::<T>();
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const T, count) }
    }

    /// Mutable `[T]` view, truncating to a whole number of `T`s.
    pub fn typed_mut<T: Copy>(&mut self) -> &mut [T] {
        let count = self.len / std::mem::size_of::<T>();
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut T, count) }
    }
}

impl Drop for AlignedBuffer {
    fn drop(&mut self) {
        unsafe { dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

/// Reinterpret a raw byte buffer (as returned by `Bus::acquire_read_bytes`)
/// as native-endian `f64`s, the element type every built-in engine publishes.
/// Trailing bytes that don't make a whole `f64` are dropped.
pub fn bytes_to_f64_vec(bytes: &[u8]) -> Vec<f64> {
    bytes
        .chunks_exact(std::mem::size_of::<f64>())
        .map(|chunk| f64::from_ne_bytes(chunk.try_into().unwrap()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocation_is_16_byte_aligned() {
        let buf = AlignedBuffer::new(256);
        assert_eq!(buf.as_bytes().as_ptr() as usize % ALIGNMENT, 0);
    }

    #[test]
    fn test_zero_initialized() {
        let buf = AlignedBuffer::new(64);
        assert!(buf.as_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_typed_round_trip() {
        let mut buf = AlignedBuffer::new(8 * std::mem::size_of::<f64>());
        {
            let slice = buf.typed_mut::<f64>();
            for (i, v) in slice.iter_mut().enumerate() {
                *v = i as f64;
            }
        }
        let read_back = buf.typed::<f64>();
        assert_eq!(read_back, [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0]);
    }
}
