/*!
 * Paging Provider
 * Whole-page anonymous mappings obtained directly from the OS
 *
 * Page-granularity requests amortize the fixed cost of the mapping call and
 * make every region page-aligned for free, which the arena relies on when
 * placing allocations that need large alignments.
 */

use super::region::PageRegion;
use crate::arena::handle::Repr;
use crate::arena::{fits_inline, write_elements, AllocOptions, MemHandle};
use crate::core::errors::{PageError, PageResult};
use crate::core::types::{page_size, Size};
use log::{error, info};
use nix::errno::Errno;
use nix::sys::mman::{mmap_anonymous, munmap, MapFlags, ProtFlags};
use std::ffi::c_void;
use std::mem::{align_of, needs_drop, size_of, MaybeUninit};
use std::num::NonZeroUsize;
use std::ptr::{self, NonNull};
use std::slice;

/// Requests and releases memory in OS-page-aligned, page-count-sized units,
/// with no metadata overhead charged against the caller's usable bytes.
///
/// Single-threaded by contract, like the rest of the core: no internal
/// locking, one OS call per operation, no retries.
#[derive(Debug, Clone)]
pub struct PageAllocator {
    page_size: usize,
}

impl PageAllocator {
    pub fn new() -> Self {
        Self {
            page_size: page_size(),
        }
    }

    /// Page size this provider rounds requests up to.
    #[inline]
    #[must_use]
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Map enough anonymous read/write pages for `bytes`, at least one page.
    fn map_pages(&self, bytes: Size) -> PageResult<(NonNull<c_void>, usize)> {
        let pages = bytes.div_ceil(self.page_size).max(1);
        let total = pages
            .checked_mul(self.page_size)
            .and_then(NonZeroUsize::new)
            .ok_or(PageError::OsAllocationFailure(Errno::ENOMEM))?;
        // Safety: no address hint and no MAP_FIXED, so the mapping cannot
        // replace an existing one.
        let ptr = unsafe {
            mmap_anonymous(
                None,
                total,
                ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
                MapFlags::MAP_PRIVATE,
            )
        }
        .map_err(|errno| {
            error!("mmap of {} pages refused by the OS: {}", pages, errno);
            PageError::OsAllocationFailure(errno)
        })?;
        Ok((ptr, pages))
    }

    fn unmap(&self, ptr: NonNull<c_void>, byte_len: usize) -> PageResult<()> {
        unsafe { munmap(ptr, byte_len) }.map_err(|errno| {
            error!("munmap of {} bytes refused by the OS: {}", byte_len, errno);
            PageError::OsAllocationFailure(errno)
        })
    }

    /// Allocate a region holding `count` default-constructed elements of `T`.
    ///
    /// The byte size is rounded up to a whole number of pages; zero elements
    /// or a zero-sized type still map one page. Fails with
    /// [`PageError::OsAllocationFailure`] when the OS cannot satisfy the
    /// request; never silently retried.
    pub fn allocate<T: Default>(&self, count: usize) -> PageResult<PageRegion<T>> {
        let bytes = size_of::<T>()
            .checked_mul(count)
            .ok_or(PageError::OsAllocationFailure(Errno::ENOMEM))?;
        let (raw, pages) = self.map_pages(bytes)?;
        let ptr = raw.cast::<T>();
        for i in 0..count {
            // Safety: the mapping spans at least `count` elements and is
            // page-aligned, which satisfies T's alignment.
            unsafe { ptr.as_ptr().add(i).write(T::default()) };
        }
        info!(
            "mapped {} pages ({} bytes) holding {} elements",
            pages,
            pages * self.page_size,
            count
        );
        Ok(PageRegion::from_raw_parts(ptr, count, pages, self.page_size))
    }

    /// Allocate a region of uninitialized element slots, typically used as the
    /// backing buffer of an [`Arena`](crate::arena::Arena).
    pub fn allocate_uninit<T>(&self, count: usize) -> PageResult<PageRegion<MaybeUninit<T>>> {
        let bytes = size_of::<T>()
            .checked_mul(count)
            .ok_or(PageError::OsAllocationFailure(Errno::ENOMEM))?;
        let (raw, pages) = self.map_pages(bytes)?;
        Ok(PageRegion::from_raw_parts(
            raw.cast::<MaybeUninit<T>>(),
            count,
            pages,
            self.page_size,
        ))
    }

    /// Run the region's element destructors, then return the exact page range
    /// to the OS.
    ///
    /// Releasing a region not obtained from a [`PageAllocator`], or one that
    /// was already released, is a precondition violation with an undefined
    /// outcome, not a recoverable error.
    pub fn release<T>(&self, region: PageRegion<T>) -> PageResult<()> {
        let (ptr, len, byte_len) = region.into_raw();
        if needs_drop::<T>() {
            // Safety: exactly the `len` elements this provider constructed.
            unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) };
        }
        self.unmap(ptr.cast::<c_void>(), byte_len)?;
        info!("released {} bytes back to the OS", byte_len);
        Ok(())
    }

    // ---- handle-returning allocation ----

    /// Map a dedicated region for one element and return a handle over it.
    ///
    /// The mapping belongs to the handle until [`free`](Self::free) returns
    /// it to the OS.
    pub fn try_alloc<T>(&self, value: T) -> PageResult<MemHandle<T>> {
        let (raw, pages) = self.map_pages(size_of::<T>())?;
        let ptr = raw.cast::<T>();
        // Safety: the mapping spans at least one element and is page-aligned.
        unsafe { ptr.as_ptr().write(value) };
        Ok(MemHandle::mapped(ptr, 1, pages))
    }

    /// Map a dedicated region for `count` contiguous elements, each
    /// constructed from `value`.
    pub fn try_alloc_n<T: Clone>(&self, count: usize, value: T) -> PageResult<MemHandle<T>> {
        self.try_alloc_n_with(AllocOptions::NATURAL, count, value)
    }

    /// Multi-element mapping under explicit options.
    ///
    /// Page mappings satisfy any alignment up to the page size for free;
    /// requesting more is a precondition violation (debug-asserted).
    pub fn try_alloc_n_with<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> PageResult<MemHandle<T>> {
        let align = options.align.resolve::<T>();
        debug_assert!(
            align <= self.page_size,
            "requested alignment {align} exceeds the page size"
        );
        let bytes = size_of::<T>()
            .checked_mul(count)
            .ok_or(PageError::OsAllocationFailure(Errno::ENOMEM))?;
        let (raw, pages) = self.map_pages(bytes)?;
        let ptr = raw.cast::<T>();
        // Safety: the mapping spans at least `count` elements.
        unsafe { write_elements(ptr.as_ptr(), count, value) };
        Ok(MemHandle::mapped(ptr, count, pages))
    }

    /// Store the element inside the returned handle when it fits, mapping no
    /// pages at all; otherwise fall back to a dedicated mapping.
    pub fn try_alloc_inline<T>(&self, value: T) -> PageResult<MemHandle<T>> {
        if fits_inline::<T>(align_of::<T>(), 1) {
            return Ok(unsafe { MemHandle::inline_with(1, |ptr: *mut T| ptr.write(value)) });
        }
        self.try_alloc(value)
    }

    /// Inline-optimized multi-element allocation.
    pub fn try_alloc_inline_n<T: Clone>(
        &self,
        count: usize,
        value: T,
    ) -> PageResult<MemHandle<T>> {
        if fits_inline::<T>(align_of::<T>(), count) {
            let handle = unsafe {
                MemHandle::inline_with(count, |ptr: *mut T| write_elements(ptr, count, value))
            };
            return Ok(handle);
        }
        self.try_alloc_n(count, value)
    }

    // ---- handle resolution ----

    /// Resolve a single-element handle produced by this provider.
    pub fn get<'h, T>(&self, handle: &'h MemHandle<T>) -> &'h T {
        &self.get_slice(handle)[0]
    }

    /// Resolve a single-element handle to an exclusive reference.
    pub fn get_mut<'h, T>(&self, handle: &'h mut MemHandle<T>) -> &'h mut T {
        &mut self.get_slice_mut(handle)[0]
    }

    /// Resolve any provider-produced handle to its elements.
    ///
    /// Arena-resident handles carry an offset without a base address and can
    /// only be resolved by their arena; passing one here panics.
    pub fn get_slice<'h, T>(&self, handle: &'h MemHandle<T>) -> &'h [T] {
        match &handle.repr {
            Repr::Mapped { ptr, len, .. } => unsafe {
                slice::from_raw_parts(ptr.as_ptr() as *const T, *len)
            },
            Repr::Inline { storage, len, .. } => unsafe {
                slice::from_raw_parts(storage.as_ptr() as *const T, *len)
            },
            Repr::Resident { .. } => {
                panic!("arena-resident handle resolved through the page provider")
            }
        }
    }

    /// Resolve any provider-produced handle to its elements, mutably.
    pub fn get_slice_mut<'h, T>(&self, handle: &'h mut MemHandle<T>) -> &'h mut [T] {
        match &mut handle.repr {
            Repr::Mapped { ptr, len, .. } => unsafe {
                slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
            Repr::Inline { storage, len, .. } => unsafe {
                slice::from_raw_parts_mut(storage.as_mut_ptr() as *mut T, *len)
            },
            Repr::Resident { .. } => {
                panic!("arena-resident handle resolved through the page provider")
            }
        }
    }

    /// Drop the handle's elements, then return its mapping, if any, to the OS.
    ///
    /// Inline handles map no pages; freeing one only runs the element
    /// destructors. Freeing a handle produced by a provider with a different
    /// page size is a precondition violation.
    pub fn free<T>(&self, handle: MemHandle<T>) -> PageResult<()> {
        match handle.repr {
            Repr::Mapped { ptr, len, pages } => {
                if needs_drop::<T>() {
                    // Safety: exactly the `len` elements this provider constructed.
                    unsafe { ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len)) };
                }
                self.unmap(ptr.cast::<c_void>(), pages * self.page_size)
            }
            Repr::Inline {
                mut storage, len, ..
            } => {
                if needs_drop::<T>() {
                    unsafe {
                        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                            storage.as_mut_ptr() as *mut T,
                            len,
                        ))
                    };
                }
                Ok(())
            }
            Repr::Resident { .. } => {
                debug_assert!(false, "arena-resident handle freed through the page provider");
                Ok(())
            }
        }
    }
}

impl Default for PageAllocator {
    fn default() -> Self {
        Self::new()
    }
}
