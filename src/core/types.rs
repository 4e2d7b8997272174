/*!
 * Core Types
 * Shared aliases, constants, and byte-arithmetic helpers
 */

use std::sync::OnceLock;

/// Address type for memory operations
pub type Address = usize;

/// Size type for memory operations
pub type Size = usize;

/// Payload capacity of an inline-resident memory handle, in bytes.
///
/// Requests strictly smaller than this (and alignable within handle storage)
/// are stored inside the handle itself and never move the arena cursor.
pub const INLINE_BUFFER_SIZE: usize = 256;

/// Fallback page size when the OS query is unavailable
const DEFAULT_PAGE_SIZE: usize = 4096;

static PAGE_SIZE: OnceLock<usize> = OnceLock::new();

/// OS page size in bytes, queried once and cached.
pub fn page_size() -> usize {
    *PAGE_SIZE.get_or_init(|| {
        // Safety: sysconf has no memory preconditions.
        let raw = unsafe { nix::libc::sysconf(nix::libc::_SC_PAGESIZE) };
        if raw > 0 {
            raw as usize
        } else {
            DEFAULT_PAGE_SIZE
        }
    })
}

/// Round `value` up to the next multiple of `align`.
///
/// `align` must be a power of two.
#[inline(always)]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value.wrapping_add(align).wrapping_sub(1)) & !align.wrapping_sub(1)
}

/// Whether `address` is a multiple of `align` (power of two).
#[inline(always)]
pub const fn is_aligned(address: Address, align: usize) -> bool {
    address & align.wrapping_sub(1) == 0
}
