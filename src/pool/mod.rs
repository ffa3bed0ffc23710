//! Address pool.
//!
//! - [`address`]: addresses and CIDR blocks
//! - [`sequential`]: single-process allocator
//! - [`heap`]: cache of available addresses
//! - [`watcher`]: keeps the cache in step with the store
//! - [`coordinator`]: allocate and release against the store
//! - [`seed`]: populate the store for a block

pub mod address;
pub mod coordinator;
pub mod heap;
pub mod keys;
pub mod seed;
pub mod sequential;
pub mod watcher;

pub use address::{Address, AddressSpace};
pub use coordinator::{AllocationCoordinator, OpContext, PoolUsage};
pub use heap::AvailabilityHeap;
pub use keys::PoolKeys;
pub use seed::{seed_pool, SeedReport};
pub use sequential::LocalSequentialAllocator;
pub use watcher::{PoolWatcher, WatchOutcome, WatcherHandle};

use crate::core::error::PoolResult;
use crate::store::PoolStore;

/// Read every available address from the store, sorted.
///
/// Keys that do not decode are logged and skipped.
pub async fn load_available(
    store: &dyn PoolStore,
    keys: &PoolKeys,
    ctx: &OpContext,
) -> PoolResult<Vec<Address>> {
    let records = ctx
        .run("load_available", store.list_prefix(keys.available_prefix()))
        .await?;

    let mut addrs = Vec::with_capacity(records.len());
    for kv in records {
        match keys.decode_available(&kv.key) {
            Some(addr) => addrs.push(addr),
            None => tracing::warn!(
                key = %String::from_utf8_lossy(&kv.key),
                "skipping malformed availability key"
            ),
        }
    }
    addrs.sort();
    Ok(addrs)
}
