use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};
use rc_arena::{Allocator, ArenaStorage, List, SystemAlloc};
use std::time::Duration;

fn bench_bump(c: &mut Criterion) {
    c.bench_function("arena_bump_10k", |b| {
        b.iter_batched(
            || ArenaStorage::new(1 << 20),
            |storage| {
                let a = storage.allocator::<u64>();
                for _ in 0..10_000 {
                    black_box(a.allocate(1).unwrap());
                }
                black_box(storage)
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_list_arena(c: &mut Criterion) {
    c.bench_function("list_push_back_arena_10k", |b| {
        b.iter_batched(
            || ArenaStorage::new(1 << 20),
            |storage| {
                let mut l = List::new_in(storage.allocator::<u64>());
                for i in 0..10_000u64 {
                    l.push_back(i).unwrap();
                }
                black_box((l, storage))
            },
            BatchSize::SmallInput,
        )
    });
}

fn bench_list_system(c: &mut Criterion) {
    c.bench_function("list_push_back_system_10k", |b| {
        b.iter(|| {
            let mut l = List::new_in(SystemAlloc::<u64>::new());
            for i in 0..10_000u64 {
                l.push_back(i).unwrap();
            }
            black_box(l)
        })
    });
}

fn bench_config() -> Criterion {
    Criterion::default()
        .sample_size(50)
        .measurement_time(Duration::from_secs(8))
        .warm_up_time(Duration::from_secs(2))
}

criterion_group! {
    name = benches;
    config = bench_config();
    targets = bench_bump, bench_list_arena, bench_list_system
}
criterion_main!(benches);
