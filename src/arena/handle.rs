/*!
 * Memory Handles
 * Tagged capabilities over allocated storage: arena-resident or inline
 */

use crate::core::types::{Size, INLINE_BUFFER_SIZE};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{size_of, MaybeUninit};
use std::ptr::NonNull;

/// Strongest alignment an inline payload can request; anything stronger is
/// routed to the arena instead.
pub(crate) const INLINE_MAX_ALIGN: usize = 64;

/// Fixed in-handle payload buffer.
#[repr(C, align(64))]
pub(crate) struct InlineStorage {
    bytes: [MaybeUninit<u8>; INLINE_BUFFER_SIZE],
}

impl InlineStorage {
    fn new() -> Self {
        Self {
            bytes: [MaybeUninit::uninit(); INLINE_BUFFER_SIZE],
        }
    }

    #[inline]
    pub(crate) fn as_ptr(&self) -> *const u8 {
        self.bytes.as_ptr() as *const u8
    }

    #[inline]
    pub(crate) fn as_mut_ptr(&mut self) -> *mut u8 {
        self.bytes.as_mut_ptr() as *mut u8
    }
}

pub(crate) enum Repr<T> {
    /// Data lives in the arena's backing buffer at `offset`.
    Resident {
        offset: usize,
        len: usize,
        generation: u64,
        _marker: PhantomData<T>,
    },
    /// Data lives in a dedicated page mapping, owned by this handle until
    /// the producing provider frees it.
    Mapped {
        ptr: NonNull<T>,
        len: usize,
        pages: usize,
    },
    /// Data lives inside the handle itself.
    Inline {
        storage: InlineStorage,
        len: usize,
        _marker: PhantomData<T>,
    },
}

/// An opaque capability referencing `len` contiguous elements of `T`.
///
/// Produced by allocation calls on either allocator; resolved to concrete
/// references through the producing [`Arena`](super::Arena) or
/// [`PageAllocator`](crate::paging::PageAllocator). The residency decision
/// (inline, arena-resident, or page-mapped) is made once at allocation time
/// and never changes.
///
/// Handles carry no ownership of the arena. An arena-resident handle is valid
/// only until the producing arena is reset; using it afterwards is a
/// precondition violation, detected by a generation check in debug builds.
/// A page-mapped handle owns its mapping; hand it back to the producing
/// provider's [`free`](crate::paging::PageAllocator::free) to unmap it.
/// Dropping a handle does not run element destructors; pass it to
/// [`Arena::free`](super::Arena::free) when the element type needs them.
pub struct MemHandle<T> {
    pub(crate) repr: Repr<T>,
}

impl<T> MemHandle<T> {
    pub(crate) fn resident(offset: usize, len: usize, generation: u64) -> Self {
        Self {
            repr: Repr::Resident {
                offset,
                len,
                generation,
                _marker: PhantomData,
            },
        }
    }

    pub(crate) fn mapped(ptr: NonNull<T>, len: usize, pages: usize) -> Self {
        Self {
            repr: Repr::Mapped { ptr, len, pages },
        }
    }

    /// Build an inline handle and let `init` write exactly `len` elements
    /// into its storage.
    ///
    /// # Safety
    /// The caller must guarantee `size_of::<T>() * len` fits the inline buffer
    /// and that `init` initializes every one of the `len` slots.
    pub(crate) unsafe fn inline_with(len: usize, init: impl FnOnce(*mut T)) -> Self {
        debug_assert!(size_of::<T>().saturating_mul(len) <= INLINE_BUFFER_SIZE);
        let mut storage = InlineStorage::new();
        init(storage.as_mut_ptr() as *mut T);
        Self {
            repr: Repr::Inline {
                storage,
                len,
                _marker: PhantomData,
            },
        }
    }

    /// Whether the payload is stored inside the handle itself.
    #[inline]
    #[must_use]
    pub fn is_inline(&self) -> bool {
        matches!(self.repr, Repr::Inline { .. })
    }

    /// Number of elements this handle references.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        match self.repr {
            Repr::Resident { len, .. } | Repr::Mapped { len, .. } | Repr::Inline { len, .. } => {
                len
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of element storage this handle references.
    #[inline]
    #[must_use]
    pub fn raw_size(&self) -> Size {
        size_of::<T>() * self.len()
    }
}

impl<T> fmt::Debug for MemHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.repr {
            Repr::Resident { offset, len, .. } => f
                .debug_struct("MemHandle::Resident")
                .field("offset", &offset)
                .field("len", &len)
                .finish(),
            Repr::Mapped { len, pages, .. } => f
                .debug_struct("MemHandle::Mapped")
                .field("len", &len)
                .field("pages", &pages)
                .finish(),
            Repr::Inline { len, .. } => f
                .debug_struct("MemHandle::Inline")
                .field("len", &len)
                .finish(),
        }
    }
}
