//! etcd v3 pool store.
//!
//! Talks to an etcd cluster over gRPC with hand-written protobuf messages:
//! - `KV/Range` for prefix and point reads
//! - `KV/Txn` for conditional transactions
//! - `Watch/Watch` (bidirectional stream) for the change-feed

pub mod client;
pub mod proto;

pub use client::{EtcdOptions, EtcdPoolStore};

use super::{Condition, TxnOp};
use proto::{compare_result, compare_target, Compare, DeleteRangeRequest, PutRequest, RequestOp, TxnRequest};

/// Map a precondition onto an etcd version compare.
///
/// A key exists iff its version is non-zero.
pub fn compare_for(condition: &Condition) -> Compare {
    match condition {
        Condition::Exists(key) => Compare {
            result: compare_result::GREATER,
            target: compare_target::VERSION,
            key: key.clone(),
            version: 0,
        },
        Condition::Absent(key) => Compare {
            result: compare_result::EQUAL,
            target: compare_target::VERSION,
            key: key.clone(),
            version: 0,
        },
    }
}

/// Map a mutation onto a request op.
pub fn request_op_for(op: &TxnOp) -> RequestOp {
    match op {
        TxnOp::Put { key, value } => RequestOp::Put(PutRequest {
            key: key.clone(),
            value: value.clone(),
        }),
        TxnOp::Delete { key } => RequestOp::DeleteRange(DeleteRangeRequest {
            key: key.clone(),
            range_end: Vec::new(),
        }),
    }
}

/// Build the Txn request: all compares, then ops, no else branch.
pub fn txn_request(conditions: &[Condition], ops: &[TxnOp]) -> TxnRequest {
    TxnRequest {
        compare: conditions.iter().map(compare_for).collect(),
        success: ops.iter().map(request_op_for).collect(),
        failure: Vec::new(),
    }
}
