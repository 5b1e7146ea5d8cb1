// Arena allocator behavior through the public API.
//
// - Identity: allocators over distinct storages compare unequal, even with
//   the same element type and capacity; allocators over one storage compare
//   equal whatever their element types.
// - Exhaustion: a request that does not fit (padding included) fails,
//   leaves the high-water mark untouched, and a smaller request that fits
//   still succeeds afterwards.
use rc_arena::{allocate_shared, AllocError, Allocator, ArenaAllocator, ArenaStorage};

#[test]
fn allocator_identity_follows_the_storage() {
    let s1 = ArenaStorage::new(128);
    let s2 = ArenaStorage::new(128);
    let a: ArenaAllocator<u32> = s1.allocator();
    let b: ArenaAllocator<u32> = s2.allocator();
    assert_ne!(a, b);

    let c: ArenaAllocator<u32> = ArenaAllocator::new(&s1);
    assert_eq!(a, c);
    let rebound: ArenaAllocator<String> = a.rebind();
    assert!(rebound == a);
    assert!(rebound != b);
    assert_eq!(a.clone(), a);
}

#[test]
fn exhaustion_is_all_or_nothing() {
    let storage = ArenaStorage::new(100);
    let a: ArenaAllocator<u64> = storage.allocator();
    a.allocate(10).unwrap();
    assert_eq!(storage.used(), 80);

    let before = storage.used();
    let err = a.allocate(3).unwrap_err();
    assert_eq!(
        err,
        AllocError::Exhausted {
            requested: 24,
            align: 8,
            remaining: 20
        }
    );
    assert_eq!(storage.used(), before);

    let p = a.allocate(2).unwrap();
    assert_eq!(p.as_ptr() as usize % 8, 0);
    assert_eq!(storage.used(), 96);
    assert_eq!(a.remaining(), 4);
}

#[test]
fn padding_counts_against_capacity() {
    let storage = ArenaStorage::new(16);
    let bytes: ArenaAllocator<u8> = storage.allocator();
    bytes.allocate(1).unwrap();
    let words: ArenaAllocator<u64> = bytes.rebind();
    // 15 bytes remain, but an aligned u64 would start at offset 8 and end at 16.
    assert!(words.allocate(1).is_ok());
    assert_eq!(storage.used(), 16);
    assert!(bytes.allocate(1).is_err());
}

#[test]
fn overflowing_request_is_refused() {
    let storage = ArenaStorage::new(64);
    let a: ArenaAllocator<u64> = storage.allocator();
    assert_eq!(a.allocate(usize::MAX), Err(AllocError::CapacityOverflow));
    assert_eq!(storage.used(), 0);
}

#[test]
fn shared_blocks_fill_the_arena_until_exhausted() {
    let storage = ArenaStorage::new(512);
    let mut held = Vec::new();
    loop {
        match allocate_shared(storage.allocator::<()>(), [0u8; 40]) {
            Ok(s) => held.push(s),
            Err(AllocError::Exhausted { remaining, .. }) => {
                assert_eq!(remaining, storage.remaining());
                break;
            }
            Err(e) => panic!("unexpected error: {e}"),
        }
    }
    assert!(!held.is_empty());
    let used = storage.used();
    held.clear();
    assert_eq!(storage.used(), used);
    // A byte-sized request still fits in whatever is left.
    if storage.remaining() > 0 {
        let b: ArenaAllocator<u8> = storage.allocator();
        assert!(b.allocate(1).is_ok());
    }
}
