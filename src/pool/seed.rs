//! Populate the available namespace for a block.
//!
//! Each address is created with its own conditional transaction requiring
//! that neither record exists, so seeding can run repeatedly, and concurrently
//! with live allocators, without ever producing an address that is both
//! available and taken.

use super::address::AddressSpace;
use super::coordinator::OpContext;
use super::keys::PoolKeys;
use crate::core::error::{PoolError, PoolResult};
use crate::store::{Condition, PoolStore, TxnOp};
use serde::Serialize;
use std::collections::HashSet;

/// Result of a seeding pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    /// AvailabilityRecords created by this pass.
    pub created: u64,
    /// Addresses that already had a record.
    pub skipped: u64,
}

/// Seed every usable address of `space` that has no record yet.
///
/// Refuses blocks with more than `limit` usable addresses.
pub async fn seed_pool(
    store: &dyn PoolStore,
    space: &AddressSpace,
    keys: &PoolKeys,
    limit: u64,
    ctx: &OpContext,
) -> PoolResult<SeedReport> {
    let usable = space.usable_count();
    if usable > u128::from(limit) {
        return Err(PoolError::SeedLimitExceeded {
            addresses: usable,
            limit,
        });
    }

    // Skip the per-address round trip for addresses already recorded.
    let mut known = HashSet::new();
    for prefix in [keys.available_prefix(), keys.taken_prefix()] {
        for kv in ctx.run("seed", store.list_prefix(prefix)).await? {
            known.insert(kv.key);
        }
    }

    let mut report = SeedReport::default();
    for addr in space.usable() {
        let available = keys.available(&addr);
        let taken = keys.taken(&addr);
        if known.contains(&available) || known.contains(&taken) {
            report.skipped += 1;
            continue;
        }

        let created = ctx
            .run(
                "seed",
                store.txn(
                    vec![
                        Condition::Absent(available.clone()),
                        Condition::Absent(taken),
                    ],
                    vec![TxnOp::put(available, "")],
                ),
            )
            .await?;
        if created {
            report.created += 1;
        } else {
            report.skipped += 1;
        }
    }

    tracing::info!(
        cidr = %space,
        created = report.created,
        skipped = report.skipped,
        "address pool seeded"
    );
    Ok(report)
}
