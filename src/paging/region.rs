/*!
 * Page Region
 * An OS-granted, page-count-sized memory mapping
 */

use crate::core::types::Size;
use std::ptr::NonNull;
use std::slice;

/// A whole-page-multiple anonymous mapping holding `len` elements of `T`.
///
/// Created only by [`PageAllocator`](super::PageAllocator) and released only
/// as the exact region via [`PageAllocator::release`](super::PageAllocator::release);
/// there is no partial release or splitting. Dropping a region without
/// releasing it leaks the mapping.
#[derive(Debug)]
pub struct PageRegion<T> {
    ptr: NonNull<T>,
    len: usize,
    pages: usize,
    page_size: usize,
}

impl<T> PageRegion<T> {
    pub(crate) fn from_raw_parts(
        ptr: NonNull<T>,
        len: usize,
        pages: usize,
        page_size: usize,
    ) -> Self {
        Self {
            ptr,
            len,
            pages,
            page_size,
        }
    }

    /// Number of constructed elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of OS pages backing the region.
    #[inline]
    #[must_use]
    pub fn pages(&self) -> usize {
        self.pages
    }

    /// Total mapped bytes, always a whole number of pages. The bytes past the
    /// element span are usable scratch space; nothing is charged against them.
    #[inline]
    #[must_use]
    pub fn byte_len(&self) -> Size {
        self.pages * self.page_size
    }

    #[inline]
    #[must_use]
    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    #[inline]
    #[must_use]
    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// The constructed elements.
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        unsafe { slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    /// The constructed elements, mutably.
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        unsafe { slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    /// Decompose for release: element pointer, element count, mapped bytes.
    pub(crate) fn into_raw(self) -> (NonNull<T>, usize, usize) {
        let byte_len = self.byte_len();
        (self.ptr, self.len, byte_len)
    }
}
