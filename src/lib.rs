/*!
 * pagebump Library
 * Freestanding memory-management core: an OS page provider and a bump-pointer
 * arena allocator with inline small-object optimization.
 *
 * A caller acquires a backing buffer from the [`paging`] provider, constructs
 * an [`arena::Arena`] over it, allocates through the policy surface
 * (alignment, fallibility, cardinality, inline optimization, size reporting),
 * and eventually resets the arena or releases the buffer. Single-threaded
 * throughout; callers serialize access.
 */

pub mod arena;
pub mod core;
pub mod paging;

// Re-exports
pub use crate::core::{
    ArenaExhausted, ArenaResult, PageError, PageResult, INLINE_BUFFER_SIZE,
};
pub use arena::{Align, AllocOptions, Arena, ArenaStats, MemHandle};
pub use paging::{PageAllocator, PageRegion};
