/*!
 * Arena Allocator
 * Monotonic-cursor allocation over a fixed backing buffer
 *
 * Every allocation policy (alignment, fallibility, cardinality, access form,
 * result shape, storage locality) composes over one placement algorithm:
 * align the cursor, charge the padding to the request, advance the frontier.
 * Nothing is reclaimed except by `reset()`, which invalidates every handle
 * the arena has produced at once.
 */

use super::handle::{MemHandle, Repr, INLINE_MAX_ALIGN};
use super::options::AllocOptions;
use crate::core::errors::{ArenaExhausted, ArenaResult};
use crate::core::types::{align_up, Size, INLINE_BUFFER_SIZE};
use crate::paging::PageRegion;
use log::debug;
use serde::{Deserialize, Serialize};
use std::cell::Cell;
use std::marker::PhantomData;
use std::mem::{needs_drop, size_of, MaybeUninit};
use std::ptr::{self, NonNull};
use std::slice;

/// Point-in-time usage snapshot of an arena.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArenaStats {
    pub capacity: Size,
    pub used: Size,
    pub remaining: Size,
    pub usage_percentage: f64,
}

/// A bump allocator over a caller- or provider-supplied backing buffer.
///
/// Allocation methods take `&self`: the cursor lives in a [`Cell`], so several
/// pointer-returning allocations can be live at once (they reference disjoint
/// buffer ranges). The arena is deliberately `!Sync`; concurrent use must be
/// serialized by the caller.
///
/// `reset()` invalidates all outstanding handles by contract and runs no
/// destructors; freeing non-trivial elements first is the caller's
/// responsibility.
#[derive(Debug)]
pub struct Arena<'buf> {
    base: NonNull<u8>,
    capacity: usize,
    cursor: Cell<usize>,
    generation: Cell<u64>,
    _buffer: PhantomData<&'buf mut [u8]>,
}

/// Resolved byte span for one request: `[start, end)` plus the total cost
/// charged to it (padding included).
struct Placement {
    start: usize,
    end: usize,
    consumed: usize,
}

/// Move `value` into `count` consecutive slots, cloning for all but the last.
///
/// # Safety
/// `ptr` must be valid for writes of `count` elements of `T`.
pub(crate) unsafe fn write_elements<T: Clone>(ptr: *mut T, count: usize, value: T) {
    if count == 0 {
        return;
    }
    for i in 0..count - 1 {
        unsafe { ptr.add(i).write(value.clone()) };
    }
    unsafe { ptr.add(count - 1).write(value) };
}

/// Whether `count` elements of `T` at the given alignment can live inside a
/// handle instead of backing storage.
pub(crate) fn fits_inline<T>(align: usize, count: usize) -> bool {
    match size_of::<T>().checked_mul(count) {
        Some(bytes) => bytes < INLINE_BUFFER_SIZE && align <= INLINE_MAX_ALIGN,
        None => false,
    }
}

impl<'buf> Arena<'buf> {
    /// Construct an arena over a caller-supplied byte buffer.
    ///
    /// The buffer's address decides which natural-alignment requests need
    /// padding; page-backed buffers start page-aligned and never pad the
    /// first request.
    pub fn new(buffer: &'buf mut [MaybeUninit<u8>]) -> Self {
        let capacity = buffer.len();
        let base =
            NonNull::new(buffer.as_mut_ptr() as *mut u8).unwrap_or_else(NonNull::dangling);
        Self {
            base,
            capacity,
            cursor: Cell::new(0),
            generation: Cell::new(0),
            _buffer: PhantomData,
        }
    }

    /// Construct an arena over the full mapped extent of an uninitialized
    /// page region, as produced by
    /// [`PageAllocator::allocate_uninit`](crate::paging::PageAllocator::allocate_uninit).
    ///
    /// Regions of live elements keep exclusive ownership of their contents
    /// until [`PageAllocator::release`](crate::paging::PageAllocator::release)
    /// and cannot back an arena:
    ///
    /// ```compile_fail
    /// use pagebump::{Arena, PageAllocator};
    ///
    /// let provider = PageAllocator::new();
    /// let mut region = provider.allocate::<String>(8).unwrap();
    /// let arena = Arena::from_region(&mut region);
    /// ```
    pub fn from_region<T>(region: &'buf mut PageRegion<MaybeUninit<T>>) -> Self {
        let capacity = region.byte_len();
        let base = NonNull::new(region.as_mut_ptr() as *mut u8).unwrap_or_else(NonNull::dangling);
        Self {
            base,
            capacity,
            cursor: Cell::new(0),
            generation: Cell::new(0),
            _buffer: PhantomData,
        }
    }

    /// Total backing-buffer bytes.
    #[inline]
    #[must_use]
    pub fn capacity(&self) -> Size {
        self.capacity
    }

    /// Bytes consumed so far (the cursor position).
    #[inline]
    #[must_use]
    pub fn used(&self) -> Size {
        self.cursor.get()
    }

    /// Bytes still available before exhaustion, ignoring future padding.
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> Size {
        self.capacity - self.cursor.get()
    }

    /// Usage snapshot.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let used = self.cursor.get();
        let usage_percentage = if self.capacity == 0 {
            0.0
        } else {
            (used as f64 / self.capacity as f64) * 100.0
        };
        ArenaStats {
            capacity: self.capacity,
            used,
            remaining: self.capacity - used,
            usage_percentage,
        }
    }

    /// Invalidate every outstanding handle and return the cursor to zero.
    ///
    /// Runs no destructors: the arena keeps no record of what was allocated.
    /// Callers holding handles to non-trivial elements must [`free`](Self::free)
    /// them first if their destructors matter.
    pub fn reset(&mut self) {
        debug!(
            "arena reset: discarding {} of {} bytes",
            self.cursor.get(),
            self.capacity
        );
        self.cursor.set(0);
        self.generation.set(self.generation.get() + 1);
    }

    // ---- placement core ----

    fn place(&self, size: usize, align: usize, count: usize) -> ArenaResult<Placement> {
        let cursor = self.cursor.get();
        let base = self.base.as_ptr() as usize;
        let Some(bytes) = size.checked_mul(count) else {
            return Err(ArenaExhausted {
                requested: usize::MAX,
                cursor,
                capacity: self.capacity,
            });
        };
        // Alignment is computed on the absolute address, so the returned
        // references are correctly aligned whatever the buffer's own address.
        let start = align_up(base + cursor, align) - base;
        let Some(end) = start.checked_add(bytes) else {
            return Err(ArenaExhausted {
                requested: usize::MAX,
                cursor,
                capacity: self.capacity,
            });
        };
        if end > self.capacity {
            return Err(ArenaExhausted {
                requested: end - cursor,
                cursor,
                capacity: self.capacity,
            });
        }
        Ok(Placement {
            start,
            end,
            consumed: end - cursor,
        })
    }

    /// # Safety
    /// The caller asserts the request fits the remaining capacity.
    #[inline]
    unsafe fn place_unchecked(&self, size: usize, align: usize, count: usize) -> Placement {
        let placement = self.place(size, align, count);
        debug_assert!(
            placement.is_ok(),
            "unchecked allocation exceeds remaining arena capacity"
        );
        unsafe { placement.unwrap_unchecked() }
    }

    #[inline]
    fn ptr_at<T>(&self, offset: usize) -> *mut T {
        // Offsets handed out by place() never exceed the capacity.
        unsafe { self.base.as_ptr().add(offset) as *mut T }
    }

    fn check_generation(&self, generation: u64) {
        debug_assert_eq!(
            generation,
            self.generation.get(),
            "stale memory handle: the arena was reset after this handle was allocated"
        );
    }

    // ---- handle-returning allocation ----

    /// Allocate one naturally-aligned element, yielding a handle.
    pub fn try_alloc<T>(&self, value: T) -> ArenaResult<MemHandle<T>> {
        self.try_alloc_with(AllocOptions::default(), value)
    }

    /// Allocate one element under explicit options.
    pub fn try_alloc_with<T>(&self, options: AllocOptions, value: T) -> ArenaResult<MemHandle<T>> {
        Ok(self.try_alloc_sized(options, value)?.0)
    }

    /// Allocate one element, also reporting the exact bytes consumed
    /// (padding charged to this request included).
    pub fn try_alloc_sized<T>(
        &self,
        options: AllocOptions,
        value: T,
    ) -> ArenaResult<(MemHandle<T>, Size)> {
        let placement = self.place(size_of::<T>(), options.align.resolve::<T>(), 1)?;
        self.cursor.set(placement.end);
        unsafe { self.ptr_at::<T>(placement.start).write(value) };
        Ok((
            MemHandle::resident(placement.start, 1, self.generation.get()),
            placement.consumed,
        ))
    }

    /// Allocate `count` contiguous elements, each constructed from `value`.
    pub fn try_alloc_n<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> ArenaResult<MemHandle<T>> {
        Ok(self.try_alloc_n_sized(options, count, value)?.0)
    }

    /// Multi-element allocation that also reports the bytes consumed.
    pub fn try_alloc_n_sized<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> ArenaResult<(MemHandle<T>, Size)> {
        let placement = self.place(size_of::<T>(), options.align.resolve::<T>(), count)?;
        self.cursor.set(placement.end);
        unsafe { write_elements(self.ptr_at::<T>(placement.start), count, value) };
        Ok((
            MemHandle::resident(placement.start, count, self.generation.get()),
            placement.consumed,
        ))
    }

    /// Single-element allocation that must succeed.
    ///
    /// # Safety
    /// The caller must have proven the request fits the remaining capacity,
    /// e.g. via [`request_size`](Self::request_size). Overcommitting is
    /// undefined behavior (debug-asserted).
    pub unsafe fn alloc_unchecked<T>(&self, options: AllocOptions, value: T) -> MemHandle<T> {
        unsafe { self.alloc_sized_unchecked(options, value).0 }
    }

    /// Sized variant of [`alloc_unchecked`](Self::alloc_unchecked).
    ///
    /// # Safety
    /// Same contract as [`alloc_unchecked`](Self::alloc_unchecked).
    pub unsafe fn alloc_sized_unchecked<T>(
        &self,
        options: AllocOptions,
        value: T,
    ) -> (MemHandle<T>, Size) {
        let placement =
            unsafe { self.place_unchecked(size_of::<T>(), options.align.resolve::<T>(), 1) };
        self.cursor.set(placement.end);
        unsafe { self.ptr_at::<T>(placement.start).write(value) };
        (
            MemHandle::resident(placement.start, 1, self.generation.get()),
            placement.consumed,
        )
    }

    /// Multi-element allocation that must succeed.
    ///
    /// # Safety
    /// Same contract as [`alloc_unchecked`](Self::alloc_unchecked).
    pub unsafe fn alloc_n_unchecked<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> MemHandle<T> {
        let placement =
            unsafe { self.place_unchecked(size_of::<T>(), options.align.resolve::<T>(), count) };
        self.cursor.set(placement.end);
        unsafe { write_elements(self.ptr_at::<T>(placement.start), count, value) };
        MemHandle::resident(placement.start, count, self.generation.get())
    }

    // ---- pointer-returning allocation ----

    /// Allocate one element and return a direct reference into the buffer.
    ///
    /// Not available for inline or page-level allocation, where the handle
    /// indirection is structurally required.
    pub fn try_alloc_mut<T>(&self, value: T) -> ArenaResult<&mut T> {
        self.try_alloc_mut_with(AllocOptions::default(), value)
    }

    /// Pointer-returning allocation under explicit options.
    pub fn try_alloc_mut_with<T>(&self, options: AllocOptions, value: T) -> ArenaResult<&mut T> {
        Ok(self.try_alloc_mut_sized(options, value)?.0)
    }

    /// Pointer-returning allocation that also reports the bytes consumed.
    pub fn try_alloc_mut_sized<T>(
        &self,
        options: AllocOptions,
        value: T,
    ) -> ArenaResult<(&mut T, Size)> {
        let placement = self.place(size_of::<T>(), options.align.resolve::<T>(), 1)?;
        self.cursor.set(placement.end);
        let ptr = self.ptr_at::<T>(placement.start);
        unsafe {
            ptr.write(value);
            Ok((&mut *ptr, placement.consumed))
        }
    }

    /// Allocate `count` contiguous elements and return them as a slice.
    pub fn try_alloc_slice<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> ArenaResult<&mut [T]> {
        Ok(self.try_alloc_slice_sized(options, count, value)?.0)
    }

    /// Slice-returning allocation that also reports the bytes consumed.
    pub fn try_alloc_slice_sized<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> ArenaResult<(&mut [T], Size)> {
        let placement = self.place(size_of::<T>(), options.align.resolve::<T>(), count)?;
        self.cursor.set(placement.end);
        let ptr = self.ptr_at::<T>(placement.start);
        unsafe {
            write_elements(ptr, count, value);
            Ok((slice::from_raw_parts_mut(ptr, count), placement.consumed))
        }
    }

    /// Pointer-returning allocation that must succeed.
    ///
    /// # Safety
    /// Same contract as [`alloc_unchecked`](Self::alloc_unchecked).
    pub unsafe fn alloc_mut_unchecked<T>(&self, options: AllocOptions, value: T) -> &mut T {
        let placement =
            unsafe { self.place_unchecked(size_of::<T>(), options.align.resolve::<T>(), 1) };
        self.cursor.set(placement.end);
        let ptr = self.ptr_at::<T>(placement.start);
        unsafe {
            ptr.write(value);
            &mut *ptr
        }
    }

    /// Slice-returning allocation that must succeed.
    ///
    /// # Safety
    /// Same contract as [`alloc_unchecked`](Self::alloc_unchecked).
    pub unsafe fn alloc_slice_unchecked<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> &mut [T] {
        let placement =
            unsafe { self.place_unchecked(size_of::<T>(), options.align.resolve::<T>(), count) };
        self.cursor.set(placement.end);
        let ptr = self.ptr_at::<T>(placement.start);
        unsafe {
            write_elements(ptr, count, value);
            slice::from_raw_parts_mut(ptr, count)
        }
    }

    // ---- inline-optimized allocation ----

    /// Allocate one element, storing it inside the returned handle when it
    /// fits; otherwise falls back to the arena path. Inline allocations never
    /// move the cursor.
    pub fn try_alloc_inline<T>(&self, value: T) -> ArenaResult<MemHandle<T>> {
        self.try_alloc_inline_with(AllocOptions::default(), value)
    }

    /// Inline-optimized allocation under explicit options.
    ///
    /// A requested alignment stronger than the inline storage can satisfy
    /// routes the element to the arena.
    pub fn try_alloc_inline_with<T>(
        &self,
        options: AllocOptions,
        value: T,
    ) -> ArenaResult<MemHandle<T>> {
        Ok(self.try_alloc_inline_sized(options, value)?.0)
    }

    /// Inline-optimized allocation that also reports the byte cost: the full
    /// inline buffer size when the element stays inline, the arena cost when
    /// it falls back.
    pub fn try_alloc_inline_sized<T>(
        &self,
        options: AllocOptions,
        value: T,
    ) -> ArenaResult<(MemHandle<T>, Size)> {
        if fits_inline::<T>(options.align.resolve::<T>(), 1) {
            let handle = unsafe { MemHandle::inline_with(1, |ptr: *mut T| ptr.write(value)) };
            return Ok((handle, INLINE_BUFFER_SIZE));
        }
        self.try_alloc_sized(options, value)
    }

    /// Inline-optimized multi-element allocation.
    pub fn try_alloc_inline_n<T: Clone>(
        &self,
        options: AllocOptions,
        count: usize,
        value: T,
    ) -> ArenaResult<MemHandle<T>> {
        if fits_inline::<T>(options.align.resolve::<T>(), count) {
            let handle = unsafe {
                MemHandle::inline_with(count, |ptr: *mut T| write_elements(ptr, count, value))
            };
            return Ok(handle);
        }
        self.try_alloc_n(options, count, value)
    }

    // ---- size queries ----

    /// Dry-run cost of allocating `count` elements of `T` under `options`:
    /// the exact bytes a committing call would consume right now. Performs no
    /// cursor movement and no construction.
    pub fn request_size<T>(&self, options: AllocOptions, count: usize) -> ArenaResult<Size> {
        Ok(self
            .place(size_of::<T>(), options.align.resolve::<T>(), count)?
            .consumed)
    }

    /// Dry-run cost for a request the caller asserts would fit.
    ///
    /// Never mutates the arena, so a release-mode violation still only yields
    /// a number (debug-asserted).
    pub fn request_size_unchecked<T>(&self, options: AllocOptions, count: usize) -> Size {
        let placement = self.place(size_of::<T>(), options.align.resolve::<T>(), count);
        debug_assert!(
            placement.is_ok(),
            "unchecked size query exceeds remaining arena capacity"
        );
        match placement {
            Ok(placement) => placement.consumed,
            Err(exhausted) => exhausted.requested,
        }
    }

    /// Dry-run cost of an inline-optimized request: the full inline buffer
    /// size when it would stay inline, the arena cost otherwise.
    pub fn request_size_inline<T>(&self, options: AllocOptions, count: usize) -> ArenaResult<Size> {
        if fits_inline::<T>(options.align.resolve::<T>(), count) {
            return Ok(INLINE_BUFFER_SIZE);
        }
        self.request_size::<T>(options, count)
    }

    // ---- handle resolution ----

    /// Resolve a single-element handle to a shared reference.
    pub fn get<'h, T>(&'h self, handle: &'h MemHandle<T>) -> &'h T {
        &self.get_slice(handle)[0]
    }

    /// Resolve a single-element handle to an exclusive reference.
    pub fn get_mut<'h, T>(&'h self, handle: &'h mut MemHandle<T>) -> &'h mut T {
        &mut self.get_slice_mut(handle)[0]
    }

    /// Resolve any handle to its elements.
    pub fn get_slice<'h, T>(&'h self, handle: &'h MemHandle<T>) -> &'h [T] {
        match &handle.repr {
            Repr::Resident {
                offset,
                len,
                generation,
                ..
            } => {
                self.check_generation(*generation);
                unsafe { slice::from_raw_parts(self.ptr_at::<T>(*offset) as *const T, *len) }
            }
            Repr::Mapped { ptr, len, .. } => unsafe {
                slice::from_raw_parts(ptr.as_ptr() as *const T, *len)
            },
            Repr::Inline { storage, len, .. } => unsafe {
                slice::from_raw_parts(storage.as_ptr() as *const T, *len)
            },
        }
    }

    /// Resolve any handle to its elements, mutably.
    pub fn get_slice_mut<'h, T>(&'h self, handle: &'h mut MemHandle<T>) -> &'h mut [T] {
        match &mut handle.repr {
            Repr::Resident {
                offset,
                len,
                generation,
                ..
            } => {
                self.check_generation(*generation);
                unsafe { slice::from_raw_parts_mut(self.ptr_at::<T>(*offset), *len) }
            }
            Repr::Mapped { ptr, len, .. } => unsafe {
                slice::from_raw_parts_mut(ptr.as_ptr(), *len)
            },
            Repr::Inline { storage, len, .. } => unsafe {
                slice::from_raw_parts_mut(storage.as_mut_ptr() as *mut T, *len)
            },
        }
    }

    // ---- freeing ----

    /// Run the destructors of the handle's elements.
    ///
    /// For arena-resident handles this is purely advisory: the bytes are not
    /// reclaimed (only [`reset`](Self::reset) reclaims space). For inline
    /// handles it drops the payload stored in the handle.
    pub fn free<T>(&self, handle: MemHandle<T>) {
        match handle.repr {
            Repr::Resident {
                offset,
                len,
                generation,
                ..
            } => {
                self.check_generation(generation);
                if needs_drop::<T>() {
                    unsafe {
                        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(
                            self.ptr_at::<T>(offset),
                            len,
                        ))
                    };
                }
            }
            Repr::Mapped { ptr, len, .. } => {
                debug_assert!(
                    false,
                    "page-mapped handle freed through an arena; its mapping leaks"
                );
                if needs_drop::<T>() {
                    unsafe {
                        ptr::drop_in_place(ptr::slice_from_raw_parts_mut(ptr.as_ptr(), len))
                    };
                }
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
            }
        }
    }

    /// Run the destructor of a pointer-returning allocation.
    ///
    /// Advisory like [`free`](Self::free): the bytes are not reclaimed.
    ///
    /// # Safety
    /// `slot` must point to a live element obtained from this arena's
    /// pointer-returning surface, with no intervening reset, and must not be
    /// used again after this call.
    pub unsafe fn free_ptr<T>(&self, slot: *mut T) {
        if needs_drop::<T>() {
            unsafe { ptr::drop_in_place(slot) };
        }
    }

    /// Slice counterpart of [`free_ptr`](Self::free_ptr).
    ///
    /// # Safety
    /// Same contract as [`free_ptr`](Self::free_ptr), over every element.
    pub unsafe fn free_slice<T>(&self, slot: *mut [T]) {
        if needs_drop::<T>() {
            unsafe { ptr::drop_in_place(slot) };
        }
    }
}
