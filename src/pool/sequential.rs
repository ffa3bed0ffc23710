//! Single-process sequential allocator.
//!
//! Walks an [`AddressSpace`] in ascending order from base + 2, skipping
//! addresses already marked used. There is no release: once the cursor leaves
//! the block, every further call fails with `PoolExhausted`.

use super::address::{Address, AddressSpace};
use crate::core::error::{PoolError, PoolResult};
use parking_lot::Mutex;
use std::collections::HashSet;

/// Cursor state guarded by the allocator mutex.
#[derive(Debug)]
struct CursorState {
    /// Next candidate, or `None` once the block is exhausted.
    cursor: Option<Address>,
    /// Addresses handed out or reserved.
    used: HashSet<Address>,
}

/// In-process allocator over a single CIDR block.
#[derive(Debug)]
pub struct LocalSequentialAllocator {
    space: AddressSpace,
    state: Mutex<CursorState>,
}

impl LocalSequentialAllocator {
    /// Create an allocator for the given CIDR.
    pub fn new(cidr: &str) -> PoolResult<Self> {
        Ok(Self::with_space(AddressSpace::parse(cidr)?))
    }

    /// Create an allocator for an already parsed space.
    pub fn with_space(space: AddressSpace) -> Self {
        Self {
            space,
            state: Mutex::new(CursorState {
                cursor: space.first_usable(),
                used: HashSet::new(),
            }),
        }
    }

    /// The block this allocator walks.
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// Mark an address as used without allocating it.
    ///
    /// Returns false if the address is outside the block or already used.
    pub fn reserve(&self, addr: Address) -> bool {
        if !self.space.contains(&addr) {
            return false;
        }
        self.state.lock().used.insert(addr)
    }

    /// Allocate the next unused address.
    pub fn allocate(&self) -> PoolResult<Address> {
        let mut state = self.state.lock();
        loop {
            let candidate = match state.cursor {
                Some(addr) if self.space.contains(&addr) => addr,
                _ => {
                    state.cursor = None;
                    return Err(PoolError::PoolExhausted);
                }
            };
            state.cursor = candidate.successor();
            if state.used.insert(candidate) {
                tracing::debug!(address = %candidate, "sequential allocation");
                return Ok(candidate);
            }
        }
    }

    /// Number of addresses handed out or reserved.
    pub fn used_count(&self) -> usize {
        self.state.lock().used.len()
    }
}
