/*!
 * Page-Level Handle Tests
 * The provider's handle-returning and inline-optimized surface
 */

use pagebump::{AllocOptions, PageAllocator};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};

static MAPPED_DROPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone)]
struct Tracked;

impl Drop for Tracked {
    fn drop(&mut self) {
        MAPPED_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_single_element_handle() {
    let provider = PageAllocator::new();

    let mut handle = provider.try_alloc(1234u64).unwrap();
    assert!(!handle.is_inline());
    assert_eq!(handle.len(), 1);
    assert_eq!(*provider.get(&handle), 1234);

    *provider.get_mut(&mut handle) = 4321;
    assert_eq!(*provider.get(&handle), 4321);

    provider.free(handle).unwrap();
}

#[test]
fn test_multi_element_handle() {
    let provider = PageAllocator::new();

    let mut handle = provider.try_alloc_n(10, 7u32).unwrap();
    assert!(!handle.is_inline());
    assert_eq!(handle.len(), 10);
    assert_eq!(handle.raw_size(), 40);
    assert!(provider.get_slice(&handle).iter().all(|&v| v == 7));

    provider.get_slice_mut(&mut handle)[9] = 9;
    assert_eq!(provider.get_slice(&handle)[9], 9);

    provider.free(handle).unwrap();
}

#[test]
fn test_mapped_handles_are_page_aligned() {
    let provider = PageAllocator::new();

    let handle = provider
        .try_alloc_n_with(AllocOptions::aligned(64), 8, 1u64)
        .unwrap();
    let address = provider.get(&handle) as *const u64 as usize;
    assert_eq!(address % provider.page_size(), 0);
    assert_eq!(address % 64, 0);

    provider.free(handle).unwrap();
}

#[test]
fn test_small_element_stays_inline() {
    let provider = PageAllocator::new();

    let handle = provider.try_alloc_inline(5u32).unwrap();
    assert!(handle.is_inline());
    assert_eq!(*provider.get(&handle), 5);

    provider.free(handle).unwrap();
}

#[test]
fn test_inline_multi_and_fallback() {
    let provider = PageAllocator::new();

    let inline = provider.try_alloc_inline_n(5, 3u16).unwrap();
    assert!(inline.is_inline());
    assert_eq!(provider.get_slice(&inline), &[3, 3, 3, 3, 3]);

    // 64 * 4 bytes equals the inline buffer size; routed to a mapping.
    let mapped = provider.try_alloc_inline_n(64, 0u32).unwrap();
    assert!(!mapped.is_inline());
    assert_eq!(mapped.len(), 64);

    provider.free(inline).unwrap();
    provider.free(mapped).unwrap();
}

#[test]
fn test_inline_handles_own_independent_storage() {
    let provider = PageAllocator::new();

    let a = provider.try_alloc_inline(1u64).unwrap();
    let mut b = provider.try_alloc_inline(2u64).unwrap();

    *provider.get_mut(&mut b) = 20;
    assert_eq!(*provider.get(&a), 1);
    assert_eq!(*provider.get(&b), 20);

    provider.free(a).unwrap();
    provider.free(b).unwrap();
}

#[test]
#[serial]
fn test_free_runs_destructors_for_both_residencies() {
    let provider = PageAllocator::new();

    MAPPED_DROPS.store(0, Ordering::SeqCst);
    let mapped = provider.try_alloc_n(4, Tracked).unwrap();
    assert!(!mapped.is_inline());
    assert_eq!(MAPPED_DROPS.load(Ordering::SeqCst), 0);
    provider.free(mapped).unwrap();
    assert_eq!(MAPPED_DROPS.load(Ordering::SeqCst), 4);

    MAPPED_DROPS.store(0, Ordering::SeqCst);
    let inline = provider.try_alloc_inline(Tracked).unwrap();
    assert!(inline.is_inline());
    provider.free(inline).unwrap();
    assert_eq!(MAPPED_DROPS.load(Ordering::SeqCst), 1);
}
