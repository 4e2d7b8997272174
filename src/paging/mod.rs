/*!
 * Paging Module
 * OS page mappings and their regions
 */

mod provider;
mod region;

pub use provider::PageAllocator;
pub use region::PageRegion;
