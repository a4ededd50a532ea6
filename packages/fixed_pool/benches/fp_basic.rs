//! Basic benchmarks for the `fixed_pool` crate, comparing pool allocation with the global
//! allocator.
#![allow(
    missing_docs,
    reason = "No need for API documentation in benchmark code"
)]

use std::hint::black_box;
use std::ptr::NonNull;
use std::time::Instant;

use criterion::{Criterion, criterion_group, criterion_main};
use fixed_pool::{ElementAllocator, PoolAllocator, PoolConfig, SystemAllocator};

criterion_group!(benches, entrypoint);
criterion_main!(benches);

type TestItem = [u64; 4];
const POOL_CAPACITY: usize = 1024;

type Pool = PoolAllocator<TestItem, POOL_CAPACITY>;

fn entrypoint(c: &mut Criterion) {
    Pool::configure(PoolConfig::new().with_element_dealloc(true));

    let mut group = c.benchmark_group("fp_basic");

    group.bench_function("pool_alloc_dealloc", |b| {
        let pool = Pool::new();

        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let block = black_box(pool.allocate(1).unwrap());

                // SAFETY: The block came from this pool and holds no value.
                unsafe {
                    pool.deallocate(block, 1);
                }
            }

            start.elapsed()
        });
    });

    group.bench_function("system_alloc_dealloc", |b| {
        let allocator = SystemAllocator::default();

        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                let block: NonNull<TestItem> = black_box(allocator.allocate(1).unwrap());

                // SAFETY: The block came from this allocator and holds no value.
                unsafe {
                    allocator.deallocate(block, 1);
                }
            }

            start.elapsed()
        });
    });

    group.bench_function("pool_fill_then_teardown", |b| {
        let pool = Pool::new();

        b.iter_custom(|iters| {
            let start = Instant::now();

            for _ in 0..iters {
                for _ in 0..POOL_CAPACITY {
                    _ = black_box(pool.allocate(1).unwrap());
                }

                Pool::teardown();
            }

            start.elapsed()
        });
    });

    group.finish();
}
