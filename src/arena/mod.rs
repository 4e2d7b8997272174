/*!
 * Arena Module
 * Bump allocation, memory handles, and the allocation policy surface
 */

mod bump;
pub(crate) mod handle;
mod options;

pub use bump::{Arena, ArenaStats};
pub use handle::MemHandle;
pub use options::{Align, AllocOptions};

pub(crate) use bump::{fits_inline, write_elements};
