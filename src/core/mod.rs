/*!
 * Core Module
 * Shared types, constants, and errors
 */

pub mod errors;
pub mod types;

pub use errors::{ArenaExhausted, ArenaResult, PageError, PageResult};
pub use types::{align_up, is_aligned, page_size, Address, Size, INLINE_BUFFER_SIZE};
