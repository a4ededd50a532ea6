//! Basic usage of the `fixed_pool` crate:
//!
//! * Configuring a pool.
//! * Allocating and releasing blocks.
//! * Observing the shared arena from a second handle.
//! * Tearing the arena down.

use fixed_pool::{ElementAllocator, PoolAllocator};

type Pool = PoolAllocator<String, 4>;

fn main() {
    let pool = Pool::builder().element_dealloc(true).build();

    let block = pool.allocate(1).unwrap();

    // SAFETY: The block is fresh and sized for one String.
    unsafe {
        pool.construct(block, "Alice".to_string());
        println!("Stored {} in the pool", block.as_ref());
    }

    // Handles are stateless; a second handle sees the same arena.
    let other = Pool::new();
    println!(
        "Free blocks seen through another handle: {} of {}",
        Pool::free_blocks(),
        Pool::capacity()
    );

    // SAFETY: The value was constructed above and is not used after this.
    unsafe {
        other.destroy(block);
        other.deallocate(block, 1);
    }

    println!("Free blocks after release: {}", Pool::free_blocks());

    // The arena is only released on request.
    Pool::teardown();
    println!("Arena reserved after teardown: {}", Pool::is_initialized());
}
