/*!
 * Inline Small-Object Optimization Tests
 * Threshold, fallback routing, storage independence, cost reporting
 */

use pagebump::{AllocOptions, Arena, PageAllocator, INLINE_BUFFER_SIZE};
use pretty_assertions::assert_eq;
use serial_test::serial;
use std::sync::atomic::{AtomicUsize, Ordering};

static INLINE_DROPS: AtomicUsize = AtomicUsize::new(0);

#[derive(Clone)]
struct TrackedPayload(u8);

impl Drop for TrackedPayload {
    fn drop(&mut self) {
        INLINE_DROPS.fetch_add(1, Ordering::SeqCst);
    }
}

// One byte past the inline buffer, so it always routes to the arena.
#[derive(Clone)]
struct HugeObject {
    bytes: [u8; INLINE_BUFFER_SIZE + 1],
}

impl HugeObject {
    fn filled(byte: u8) -> Self {
        Self {
            bytes: [byte; INLINE_BUFFER_SIZE + 1],
        }
    }
}

#[test]
fn test_small_allocation_stays_inline() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(64).unwrap();
    let arena = Arena::from_region(&mut region);

    let handle = arena.try_alloc_inline(42u32).unwrap();
    assert!(handle.is_inline());
    assert_eq!(*arena.get(&handle), 42);
    assert_eq!(arena.used(), 0);

    drop(arena);
    provider.release(region).unwrap();
}

#[test]
fn test_huge_allocation_falls_back_to_arena() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(1024).unwrap();
    let arena = Arena::from_region(&mut region);

    let handle = arena.try_alloc_inline(HugeObject::filled(7)).unwrap();
    assert!(!handle.is_inline());
    assert_eq!(arena.used(), INLINE_BUFFER_SIZE + 1);
    assert!(arena.get(&handle).bytes.iter().all(|&b| b == 7));

    drop(arena);
    provider.release(region).unwrap();
}

#[test]
fn test_exact_buffer_size_is_not_inline() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(1024).unwrap();
    let arena = Arena::from_region(&mut region);

    // 64 * 4 bytes equals the inline buffer size exactly; only strictly
    // smaller payloads stay inline.
    let at_limit = arena
        .try_alloc_inline_n(AllocOptions::NATURAL, 64, 0u32)
        .unwrap();
    assert!(!at_limit.is_inline());

    let below_limit = arena
        .try_alloc_inline_n(AllocOptions::NATURAL, 63, 0u32)
        .unwrap();
    assert!(below_limit.is_inline());
    assert_eq!(below_limit.len(), 63);

    drop(arena);
    provider.release(region).unwrap();
}

#[test]
fn test_inline_handles_own_independent_storage() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(64).unwrap();
    let arena = Arena::from_region(&mut region);

    let a = arena.try_alloc_inline(1u64).unwrap();
    let b = arena.try_alloc_inline(2u64).unwrap();
    let mut c = arena.try_alloc_inline(3u64).unwrap();

    *arena.get_mut(&mut c) = 30;
    assert_eq!(*arena.get(&a), 1);
    assert_eq!(*arena.get(&b), 2);
    assert_eq!(*arena.get(&c), 30);

    drop(arena);
    provider.release(region).unwrap();
}

#[test]
fn test_inline_storage_satisfies_requested_alignment() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(1024).unwrap();
    let arena = Arena::from_region(&mut region);

    let aligned = arena
        .try_alloc_inline_with(AllocOptions::aligned(64), 5u32)
        .unwrap();
    assert!(aligned.is_inline());
    let address = arena.get(&aligned) as *const u32 as usize;
    assert_eq!(address % 64, 0);

    // Stronger than the inline storage can guarantee: routed to the arena.
    let routed = arena
        .try_alloc_inline_with(AllocOptions::aligned(128), 5u32)
        .unwrap();
    assert!(!routed.is_inline());
    let routed_address = arena.get(&routed) as *const u32 as usize;
    assert_eq!(routed_address % 128, 0);

    drop(arena);
    provider.release(region).unwrap();
}

#[test]
fn test_inline_cost_reporting() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(1024).unwrap();
    let arena = Arena::from_region(&mut region);

    // Inline requests report the whole inline buffer, arena-routed ones the
    // arena cost; the dry-run agrees with the committing call either way.
    assert_eq!(
        arena
            .request_size_inline::<u32>(AllocOptions::NATURAL, 5)
            .unwrap(),
        INLINE_BUFFER_SIZE
    );
    assert_eq!(
        arena
            .request_size_inline::<HugeObject>(AllocOptions::NATURAL, 1)
            .unwrap(),
        INLINE_BUFFER_SIZE + 1
    );

    let (inline, inline_cost) = arena
        .try_alloc_inline_sized(AllocOptions::NATURAL, 9u32)
        .unwrap();
    assert!(inline.is_inline());
    assert_eq!(inline_cost, INLINE_BUFFER_SIZE);

    let (routed, routed_cost) = arena
        .try_alloc_inline_sized(AllocOptions::NATURAL, HugeObject::filled(0))
        .unwrap();
    assert!(!routed.is_inline());
    assert_eq!(routed_cost, INLINE_BUFFER_SIZE + 1);

    drop(arena);
    provider.release(region).unwrap();
}

#[test]
fn test_inline_multi_values_read_and_write() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(64).unwrap();
    let arena = Arena::from_region(&mut region);

    let mut handle = arena
        .try_alloc_inline_n(AllocOptions::NATURAL, 5, 3u16)
        .unwrap();
    assert!(handle.is_inline());
    assert_eq!(arena.get_slice(&handle), &[3, 3, 3, 3, 3]);

    arena.get_slice_mut(&mut handle)[4] = 8;
    assert_eq!(arena.get_slice(&handle), &[3, 3, 3, 3, 8]);

    drop(arena);
    provider.release(region).unwrap();
}

#[test]
#[serial]
fn test_free_drops_inline_payload() {
    let provider = PageAllocator::new();
    let mut region = provider.allocate_uninit::<u8>(64).unwrap();
    let arena = Arena::from_region(&mut region);

    INLINE_DROPS.store(0, Ordering::SeqCst);
    let handle = arena
        .try_alloc_inline_n(AllocOptions::NATURAL, 3, TrackedPayload(0))
        .unwrap();
    assert!(handle.is_inline());
    assert_eq!(INLINE_DROPS.load(Ordering::SeqCst), 0);

    arena.free(handle);
    assert_eq!(INLINE_DROPS.load(Ordering::SeqCst), 3);

    drop(arena);
    provider.release(region).unwrap();
}
