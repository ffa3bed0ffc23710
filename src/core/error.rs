//! Error types for the address pool.
//!
//! [`PoolError`] is the taxonomy surfaced to callers of the allocators and the
//! coordinator. [`StoreError`] is the narrower set of failures a
//! [`PoolStore`](crate::store::PoolStore) can report; it converts into
//! `PoolError` at the coordinator boundary. [`ProvisionError`] wraps both for
//! the peer provisioning flow.

use thiserror::Error;

/// Address pool error conditions.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The subnet specification could not be parsed or is unusable.
    #[error("invalid CIDR {cidr:?}: {reason}")]
    InvalidCidr { cidr: String, reason: String },

    /// No address is available. Not retryable without an external release.
    #[error("address pool exhausted")]
    PoolExhausted,

    /// Another actor claimed or removed the address first.
    #[error("allocation conflict on {address}")]
    AllocationConflict { address: String },

    /// Transport failure or deadline expiry talking to the store.
    #[error("store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// Release of an address that is not currently taken.
    #[error("address {address} is not allocated")]
    NotAllocated { address: String },

    /// The availability change-feed broke.
    #[error("watch disrupted: {message}")]
    WatchDisrupted { message: String },

    /// The caller cancelled the operation.
    #[error("operation cancelled")]
    Cancelled,

    /// Owner identifiers must be non-empty.
    #[error("owner identifier must not be empty")]
    InvalidOwner,

    /// Seeding would create more records than allowed.
    #[error("refusing to seed {addresses} addresses (limit {limit})")]
    SeedLimitExceeded { addresses: u128, limit: u64 },
}

impl PoolError {
    /// Create an InvalidCidr error.
    pub fn invalid_cidr(cidr: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidCidr {
            cidr: cidr.into(),
            reason: reason.into(),
        }
    }

    /// Create a StoreUnavailable error.
    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create a WatchDisrupted error.
    pub fn watch_disrupted(message: impl Into<String>) -> Self {
        Self::WatchDisrupted {
            message: message.into(),
        }
    }

    /// Check if the caller may retry the operation.
    ///
    /// Conflicts are retried immediately; store failures with backoff.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::AllocationConflict { .. } | Self::StoreUnavailable { .. }
        )
    }

    /// Check if an address popped for this failed attempt goes back on the heap.
    ///
    /// Only transient failures requeue. A failed precondition means the
    /// address is already gone from availability.
    pub fn requeues_popped_address(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. } | Self::Cancelled)
    }

    /// Check if this error must be reported as a liveness failure.
    pub fn is_liveness_failure(&self) -> bool {
        matches!(self, Self::WatchDisrupted { .. })
    }

    /// Stable short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidCidr { .. } => "invalid_cidr",
            Self::PoolExhausted => "pool_exhausted",
            Self::AllocationConflict { .. } => "allocation_conflict",
            Self::StoreUnavailable { .. } => "store_unavailable",
            Self::NotAllocated { .. } => "not_allocated",
            Self::WatchDisrupted { .. } => "watch_disrupted",
            Self::Cancelled => "cancelled",
            Self::InvalidOwner => "invalid_owner",
            Self::SeedLimitExceeded { .. } => "seed_limit_exceeded",
        }
    }
}

/// Result type using PoolError.
pub type PoolResult<T> = Result<T, PoolError>;

/// Failures reported by a pool store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The store could not be reached or did not answer in time.
    #[error("store unavailable: {message}")]
    Unavailable { message: String },

    /// A watch subscription lost its feed.
    #[error("watch feed disrupted: {message}")]
    Disrupted { message: String },

    /// The store has been shut down.
    #[error("store closed")]
    Closed,

    /// Persisted or wire data could not be decoded.
    #[error("corrupt store data: {message}")]
    Corrupt { message: String },
}

impl StoreError {
    /// Create an Unavailable error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable {
            message: message.into(),
        }
    }

    /// Create a Disrupted error.
    pub fn disrupted(message: impl Into<String>) -> Self {
        Self::Disrupted {
            message: message.into(),
        }
    }

    /// Create a Corrupt error.
    pub fn corrupt(message: impl Into<String>) -> Self {
        Self::Corrupt {
            message: message.into(),
        }
    }
}

/// Result type using StoreError.
pub type StoreResult<T> = Result<T, StoreError>;

/// Peer provisioning failures.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A key was not 32 bytes of standard base64.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    #[error("key file {path}: {source}")]
    KeyFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Template could not be read or rendered.
    #[error("template error: {0}")]
    Template(String),

    #[error("secret {mount}/{name}#{key} not found")]
    SecretNotFound {
        mount: String,
        name: String,
        key: String,
    },

    #[error("secrets file error: {0}")]
    Secrets(String),

    /// A setting provisioning cannot run without.
    #[error("missing provisioning setting: {0}")]
    MissingSetting(&'static str),

    #[error(transparent)]
    Pool(#[from] PoolError),
}

/// Result type using ProvisionError.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl From<StoreError> for PoolError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Disrupted { message } => PoolError::WatchDisrupted { message },
            other => PoolError::StoreUnavailable {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retriable_classification() {
        assert!(PoolError::AllocationConflict {
            address: "10.0.0.2".into()
        }
        .is_retriable());
        assert!(PoolError::store_unavailable("timeout").is_retriable());
        assert!(!PoolError::PoolExhausted.is_retriable());
        assert!(!PoolError::NotAllocated {
            address: "10.0.0.2".into()
        }
        .is_retriable());
    }

    #[test]
    fn test_requeue_policy() {
        assert!(PoolError::store_unavailable("down").requeues_popped_address());
        assert!(PoolError::Cancelled.requeues_popped_address());
        assert!(!PoolError::AllocationConflict {
            address: "10.0.0.2".into()
        }
        .requeues_popped_address());
        assert!(!PoolError::PoolExhausted.requeues_popped_address());
    }

    #[test]
    fn test_store_error_conversion() {
        let err: PoolError = StoreError::unavailable("connection refused").into();
        assert_eq!(err.kind(), "store_unavailable");

        let err: PoolError = StoreError::disrupted("stream reset").into();
        assert!(err.is_liveness_failure());

        let err: PoolError = StoreError::Closed.into();
        assert!(matches!(err, PoolError::StoreUnavailable { .. }));
    }
}
