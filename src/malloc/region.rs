//! Raw memory regions backing a pool
//!
//! This is the only place that turns addresses into slices. Pools hand
//! out offsets, and every offset goes through [`Region::slice`] or
//! [`Region::slice_mut`], which bound-check it against the region.

use crate::error::{Error, Result};
use std::alloc::{self, Layout};
use std::ptr::NonNull;

/// Regions start on a cache line, so an offset that is a multiple of
/// [`super::ALIGNMENT`] is an aligned address.
pub const REGION_ALIGN: usize = 64;

/// Contiguous, exclusively owned block of memory from the platform allocator
///
/// Memory is zeroed when acquired and returned to the allocator when
/// the region is dropped.
#[derive(Debug)]
pub struct Region {
    ptr: NonNull<u8>,
    layout: Layout,
}

impl Region {
    /// Acquire `len` bytes from the platform allocator.
    pub fn acquire(len: usize) -> Result<Self> {
        if len == 0 {
            return Err(Error::Config("cannot acquire an empty region".to_string()));
        }
        let layout = Layout::from_size_align(len, REGION_ALIGN)
            .map_err(|e| Error::Config(format!("invalid region of {} bytes: {}", len, e)))?;

        // SAFETY: layout has a non-zero size.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = match NonNull::new(ptr) {
            Some(ptr) => ptr,
            None => alloc::handle_alloc_error(layout),
        };

        Ok(Self { ptr, layout })
    }

    pub fn len(&self) -> usize {
        self.layout.size()
    }

    pub fn is_empty(&self) -> bool {
        self.layout.size() == 0
    }

    /// Address of the first byte
    pub fn base_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    fn check(&self, offset: usize, len: usize) {
        let end = offset.checked_add(len);
        if end.map_or(true, |end| end > self.len()) {
            panic!(
                "range {}+{} outside region of {} bytes",
                offset,
                len,
                self.len()
            );
        }
    }

    /// # Panics
    ///
    /// Panics if `offset..offset + len` is not inside the region.
    pub fn slice(&self, offset: usize, len: usize) -> &[u8] {
        self.check(offset, len);
        // SAFETY: the range is inside the allocation and the memory was
        // zero-initialized at acquire time.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len) }
    }

    /// # Panics
    ///
    /// Panics if `offset..offset + len` is not inside the region.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> &mut [u8] {
        self.check(offset, len);
        // SAFETY: as in `slice`, and `&mut self` guarantees exclusivity.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len) }
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // SAFETY: ptr was allocated in `acquire` with this exact layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), self.layout) };
    }
}

// SAFETY: Region owns its memory and only hands out borrows tied to
// `&self`/`&mut self`.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}
