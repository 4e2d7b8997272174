/*!
 * Core Errors
 * The two recoverable error kinds of the allocation core
 */

use super::types::Size;
use thiserror::Error;

/// Arena operation result
pub type ArenaResult<T> = Result<T, ArenaExhausted>;

/// Paging operation result
pub type PageResult<T> = Result<T, PageError>;

/// A checked arena request would exceed the remaining capacity.
///
/// Always recoverable: the caller may reset the arena, construct a larger one,
/// or fall back to another allocation strategy. A failed checked request leaves
/// the arena unchanged. `requested` is the total byte cost of the request,
/// including the alignment padding that would have been charged to it.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("arena exhausted: request needs {requested} bytes, cursor at {cursor} of {capacity}")]
pub struct ArenaExhausted {
    pub requested: Size,
    pub cursor: Size,
    pub capacity: Size,
}

/// Paging provider errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PageError {
    /// The OS refused to grant or release a page mapping.
    ///
    /// Never retried internally; retry policy is application-specific.
    #[error("OS refused page mapping: {0}")]
    OsAllocationFailure(#[from] nix::Error),
}
