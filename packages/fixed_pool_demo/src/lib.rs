#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! Core logic of the `fixed_pool_demo` binary.
//!
//! Fills an ordered map of `i -> i!` and a list of `i` with pool-backed nodes, prints the
//! contents and reports how many pool blocks remain free. Both pools have room for
//! [`POOL_CAPACITY`] nodes, so asking for more elements fails unless expansion is enabled.

use std::io::{self, Write};

use fixed_pool::{PoolAllocator, PoolConfig};
use pool_collections::{ListNode, MapEntry, PoolList, PoolMap};
use thiserror::Error;
use tracing::debug;

/// Number of blocks in each of the demo pools.
pub const POOL_CAPACITY: usize = 10;

/// Pool of the map's key-value pairs. Its policies carry over to [`MapEntries`].
pub type MapPool = PoolAllocator<(u32, u64), POOL_CAPACITY>;

/// Pool of the list's values. Its policies carry over to [`ListNodes`].
pub type ListPool = PoolAllocator<u32, POOL_CAPACITY>;

/// Pool that the map actually takes its entries from.
pub type MapEntries = PoolAllocator<MapEntry<u32, u64>, POOL_CAPACITY>;

/// Pool that the list actually takes its nodes from.
pub type ListNodes = PoolAllocator<ListNode<u32>, POOL_CAPACITY>;

/// Input for [`run()`].
#[doc(hidden)]
#[derive(Clone, Copy, Debug)]
#[allow(
    clippy::exhaustive_structs,
    reason = "This is a hidden struct for internal/test use only"
)]
pub struct RunInput {
    /// How many elements to insert into each container.
    pub count: u32,
    /// Policies applied to both pools before any element is inserted.
    pub config: PoolConfig,
}

/// Why a run failed.
#[doc(hidden)]
#[derive(Debug, Error)]
#[allow(
    clippy::exhaustive_enums,
    reason = "This is a hidden enum for internal/test use only"
)]
pub enum RunError {
    /// A container could not obtain memory for a node.
    #[error("pool allocation failed: {0}")]
    Pool(#[from] fixed_pool::Error),

    /// The report could not be written.
    #[error("failed to write output: {0}")]
    Output(#[from] io::Error),
}

/// Runs the demo, writing the report to `out`.
///
/// Both pools are torn down before returning, whether the run succeeded or not.
#[doc(hidden)]
pub fn run(input: &RunInput, out: &mut impl Write) -> Result<(), RunError> {
    MapPool::configure(input.config);
    ListPool::configure(input.config);

    debug!(
        count = input.count,
        capacity = POOL_CAPACITY,
        allow_expand = input.config.allow_expand(),
        element_dealloc = input.config.element_dealloc(),
        "demo pools configured"
    );

    let result = fill_map(input.count, out).and_then(|()| fill_list(input.count, out));

    MapEntries::teardown();
    ListNodes::teardown();

    result
}

fn fill_map(count: u32, out: &mut impl Write) -> Result<(), RunError> {
    let mut map = PoolMap::with_pool(MapPool::new());

    for i in 0..count {
        map.insert(i, factorial(i))?;
    }

    writeln!(out, "Map contents:")?;
    for (key, value) in &map {
        writeln!(out, "{key} {value}")?;
    }

    writeln!(out, "Map pool free blocks: {}", MapEntries::free_blocks())?;

    Ok(())
}

fn fill_list(count: u32, out: &mut impl Write) -> Result<(), RunError> {
    let mut list = PoolList::with_pool(ListPool::new());

    for i in 0..count {
        list.push_back(i)?;
    }

    let values = list
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");

    writeln!(out, "List contents:")?;
    writeln!(out, "{values}")?;
    writeln!(out, "List size: {}", list.len())?;

    list.clear();
    writeln!(
        out,
        "List pool free blocks after clear: {}",
        ListNodes::free_blocks()
    )?;

    Ok(())
}

/// Accepts `--el_deall` as an alias of `--el-deall`; everything else passes through unchanged.
#[doc(hidden)]
#[must_use]
pub fn normalize_arg(arg: String) -> String {
    if arg == "--el_deall" {
        "--el-deall".to_owned()
    } else {
        arg
    }
}

/// `n!`, saturating at `u64::MAX`.
#[must_use]
pub fn factorial(n: u32) -> u64 {
    (1..=u64::from(n)).fold(1, u64::saturating_mul)
}
