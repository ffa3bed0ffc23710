//! Wireable - distributed IP address pool for WireGuard peer provisioning.
//!
//! Nodes share one flat CIDR block through a replicated key-value store.
//! Every usable address has exactly one record: `<ns>/available/<addr>` while
//! free, `<ns>/taken/<addr>` (valued with the owner) while allocated. Moves
//! between the two are conditional transactions, so concurrent nodes never
//! hand out the same address.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                 CLI  /  Provisioner (keys, config)              │
//! └─────────────────────────────────────────────────────────────────┘
//!                                  │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    AllocationCoordinator                        │
//! │        pop lowest from heap → conditional txn → owner           │
//! └─────────────────────────────────────────────────────────────────┘
//!            │                                      ▲
//! ┌────────────────────────┐          ┌────────────────────────────┐
//! │   AvailabilityHeap     │ ◄─────── │        PoolWatcher         │
//! └────────────────────────┘          └────────────────────────────┘
//!                                                   ▲ watch
//! ┌─────────────────────────────────────────────────────────────────┐
//! │            PoolStore: embedded (snapshot) │ etcd v3 gRPC        │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Module Organization
//!
//! ## Core
//! - [`core::config`] - Configuration parsing and validation
//! - [`core::runtime`] - Startup and shutdown ordering
//! - [`core::error`] - Error types
//!
//! ## Pool
//! - [`pool::address`] - Addresses and CIDR blocks
//! - [`pool::sequential`] - Single-process sequential allocator
//! - [`pool::heap`] - Availability cache
//! - [`pool::watcher`] - Change-feed consumer
//! - [`pool::coordinator`] - Allocate and release
//! - [`pool::seed`] - Store seeding
//!
//! ## Store
//! - [`store::memory`] - Embedded store
//! - [`store::state_machine`] - Revisioned KV state
//! - `store::etcd` - etcd v3 client (feature `grpc`)
//!
//! ## Provisioning
//! - [`provision::keys`] - WireGuard keys
//! - [`provision::template`] - Config rendering
//! - [`provision::secrets`] - Secret lookup
//!
//! ## Operations
//! - [`ops::observability`] - Metrics and health checks

// Core infrastructure
pub mod core;

// Address pool
pub mod pool;

// Backing stores
pub mod store;

// Peer provisioning
pub mod provision;

// Operations and observability
pub mod ops;

// CLI
pub mod cli;

// Re-exports for convenience
pub use self::core::{config, error, runtime};
pub use ops::observability;
pub use pool::{Address, AddressSpace, AllocationCoordinator, OpContext};
