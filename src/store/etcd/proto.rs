//! Protobuf encoding for the etcd v3 messages the pool store uses.
//!
//! Manual `prost::Message` implementations for the subset of
//! `etcdserverpb`/`mvccpb` needed for Range, Txn and Watch, so the client
//! builds without proto codegen.

use prost::{DecodeError, Message};

// ============================================================================
// ResponseHeader
// ============================================================================

/// etcdserverpb.ResponseHeader.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct ResponseHeader {
    pub cluster_id: u64, // field 1
    pub member_id: u64,  // field 2
    pub revision: i64,   // field 3
    pub raft_term: u64,  // field 4
}

impl Message for ResponseHeader {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if self.cluster_id != 0 {
            prost::encoding::uint64::encode(1, &self.cluster_id, buf);
        }
        if self.member_id != 0 {
            prost::encoding::uint64::encode(2, &self.member_id, buf);
        }
        if self.revision != 0 {
            prost::encoding::int64::encode(3, &self.revision, buf);
        }
        if self.raft_term != 0 {
            prost::encoding::uint64::encode(4, &self.raft_term, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::uint64::merge(wire_type, &mut self.cluster_id, buf, ctx),
            2 => prost::encoding::uint64::merge(wire_type, &mut self.member_id, buf, ctx),
            3 => prost::encoding::int64::merge(wire_type, &mut self.revision, buf, ctx),
            4 => prost::encoding::uint64::merge(wire_type, &mut self.raft_term, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.cluster_id != 0 {
            len += prost::encoding::uint64::encoded_len(1, &self.cluster_id);
        }
        if self.member_id != 0 {
            len += prost::encoding::uint64::encoded_len(2, &self.member_id);
        }
        if self.revision != 0 {
            len += prost::encoding::int64::encoded_len(3, &self.revision);
        }
        if self.raft_term != 0 {
            len += prost::encoding::uint64::encoded_len(4, &self.raft_term);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// KeyValue
// ============================================================================

/// mvccpb.KeyValue.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct KeyValue {
    pub key: Vec<u8>,         // field 1
    pub create_revision: i64, // field 2
    pub mod_revision: i64,    // field 3
    pub version: i64,         // field 4
    pub value: Vec<u8>,       // field 5
    pub lease: i64,           // field 6
}

impl Message for KeyValue {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            prost::encoding::bytes::encode(1, &self.key, buf);
        }
        if self.create_revision != 0 {
            prost::encoding::int64::encode(2, &self.create_revision, buf);
        }
        if self.mod_revision != 0 {
            prost::encoding::int64::encode(3, &self.mod_revision, buf);
        }
        if self.version != 0 {
            prost::encoding::int64::encode(4, &self.version, buf);
        }
        if !self.value.is_empty() {
            prost::encoding::bytes::encode(5, &self.value, buf);
        }
        if self.lease != 0 {
            prost::encoding::int64::encode(6, &self.lease, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => prost::encoding::int64::merge(wire_type, &mut self.create_revision, buf, ctx),
            3 => prost::encoding::int64::merge(wire_type, &mut self.mod_revision, buf, ctx),
            4 => prost::encoding::int64::merge(wire_type, &mut self.version, buf, ctx),
            5 => prost::encoding::bytes::merge(wire_type, &mut self.value, buf, ctx),
            6 => prost::encoding::int64::merge(wire_type, &mut self.lease, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += prost::encoding::bytes::encoded_len(1, &self.key);
        }
        if self.create_revision != 0 {
            len += prost::encoding::int64::encoded_len(2, &self.create_revision);
        }
        if self.mod_revision != 0 {
            len += prost::encoding::int64::encoded_len(3, &self.mod_revision);
        }
        if self.version != 0 {
            len += prost::encoding::int64::encoded_len(4, &self.version);
        }
        if !self.value.is_empty() {
            len += prost::encoding::bytes::encoded_len(5, &self.value);
        }
        if self.lease != 0 {
            len += prost::encoding::int64::encoded_len(6, &self.lease);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// RangeRequest / RangeResponse
// ============================================================================

/// etcdserverpb.RangeRequest (key, range_end and limit only).
#[derive(Clone, Default, Debug, PartialEq)]
pub struct RangeRequest {
    pub key: Vec<u8>,       // field 1
    pub range_end: Vec<u8>, // field 2
    pub limit: i64,         // field 3
}

impl Message for RangeRequest {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            prost::encoding::bytes::encode(1, &self.key, buf);
        }
        if !self.range_end.is_empty() {
            prost::encoding::bytes::encode(2, &self.range_end, buf);
        }
        if self.limit != 0 {
            prost::encoding::int64::encode(3, &self.limit, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => prost::encoding::bytes::merge(wire_type, &mut self.range_end, buf, ctx),
            3 => prost::encoding::int64::merge(wire_type, &mut self.limit, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += prost::encoding::bytes::encoded_len(1, &self.key);
        }
        if !self.range_end.is_empty() {
            len += prost::encoding::bytes::encoded_len(2, &self.range_end);
        }
        if self.limit != 0 {
            len += prost::encoding::int64::encoded_len(3, &self.limit);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// etcdserverpb.RangeResponse.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct RangeResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub kvs: Vec<KeyValue>,             // field 2
    pub more: bool,                     // field 3
    pub count: i64,                     // field 4
}

impl Message for RangeResponse {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            prost::encoding::message::encode(1, header, buf);
        }
        for kv in &self.kvs {
            prost::encoding::message::encode(2, kv, buf);
        }
        if self.more {
            prost::encoding::bool::encode(3, &self.more, buf);
        }
        if self.count != 0 {
            prost::encoding::int64::encode(4, &self.count, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => {
                let mut header = self.header.take().unwrap_or_default();
                prost::encoding::message::merge(wire_type, &mut header, buf, ctx)?;
                self.header = Some(header);
                Ok(())
            }
            2 => {
                let mut kv = KeyValue::default();
                prost::encoding::message::merge(wire_type, &mut kv, buf, ctx)?;
                self.kvs.push(kv);
                Ok(())
            }
            3 => prost::encoding::bool::merge(wire_type, &mut self.more, buf, ctx),
            4 => prost::encoding::int64::merge(wire_type, &mut self.count, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if let Some(ref header) = self.header {
            len += prost::encoding::message::encoded_len(1, header);
        }
        for kv in &self.kvs {
            len += prost::encoding::message::encoded_len(2, kv);
        }
        if self.more {
            len += prost::encoding::bool::encoded_len(3, &self.more);
        }
        if self.count != 0 {
            len += prost::encoding::int64::encoded_len(4, &self.count);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// PutRequest / DeleteRangeRequest
// ============================================================================

/// etcdserverpb.PutRequest (key and value only).
#[derive(Clone, Default, Debug, PartialEq)]
pub struct PutRequest {
    pub key: Vec<u8>,   // field 1
    pub value: Vec<u8>, // field 2
}

impl Message for PutRequest {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            prost::encoding::bytes::encode(1, &self.key, buf);
        }
        if !self.value.is_empty() {
            prost::encoding::bytes::encode(2, &self.value, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => prost::encoding::bytes::merge(wire_type, &mut self.value, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += prost::encoding::bytes::encoded_len(1, &self.key);
        }
        if !self.value.is_empty() {
            len += prost::encoding::bytes::encoded_len(2, &self.value);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// etcdserverpb.DeleteRangeRequest (single key or range).
#[derive(Clone, Default, Debug, PartialEq)]
pub struct DeleteRangeRequest {
    pub key: Vec<u8>,       // field 1
    pub range_end: Vec<u8>, // field 2
}

impl Message for DeleteRangeRequest {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            prost::encoding::bytes::encode(1, &self.key, buf);
        }
        if !self.range_end.is_empty() {
            prost::encoding::bytes::encode(2, &self.range_end, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => prost::encoding::bytes::merge(wire_type, &mut self.range_end, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += prost::encoding::bytes::encoded_len(1, &self.key);
        }
        if !self.range_end.is_empty() {
            len += prost::encoding::bytes::encoded_len(2, &self.range_end);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Compare / RequestOp / TxnRequest / TxnResponse
// ============================================================================

/// Compare.CompareResult values.
pub mod compare_result {
    pub const EQUAL: i32 = 0;
    pub const GREATER: i32 = 1;
    pub const LESS: i32 = 2;
    pub const NOT_EQUAL: i32 = 3;
}

/// Compare.CompareTarget values.
pub mod compare_target {
    pub const VERSION: i32 = 0;
    pub const CREATE: i32 = 1;
    pub const MOD: i32 = 2;
    pub const VALUE: i32 = 3;
}

/// etcdserverpb.Compare restricted to the `version` arm of target_union.
///
/// `version` is a oneof member, so it is always encoded, zero included.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Compare {
    pub result: i32,   // field 1
    pub target: i32,   // field 2
    pub key: Vec<u8>,  // field 3
    pub version: i64,  // field 4 (oneof target_union)
}

impl Message for Compare {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if self.result != 0 {
            prost::encoding::int32::encode(1, &self.result, buf);
        }
        if self.target != 0 {
            prost::encoding::int32::encode(2, &self.target, buf);
        }
        if !self.key.is_empty() {
            prost::encoding::bytes::encode(3, &self.key, buf);
        }
        prost::encoding::int64::encode(4, &self.version, buf);
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::int32::merge(wire_type, &mut self.result, buf, ctx),
            2 => prost::encoding::int32::merge(wire_type, &mut self.target, buf, ctx),
            3 => prost::encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            4 => prost::encoding::int64::merge(wire_type, &mut self.version, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.result != 0 {
            len += prost::encoding::int32::encoded_len(1, &self.result);
        }
        if self.target != 0 {
            len += prost::encoding::int32::encoded_len(2, &self.target);
        }
        if !self.key.is_empty() {
            len += prost::encoding::bytes::encoded_len(3, &self.key);
        }
        len += prost::encoding::int64::encoded_len(4, &self.version);
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// etcdserverpb.RequestOp (oneof request).
#[derive(Clone, Debug, PartialEq)]
pub enum RequestOp {
    Range(RangeRequest),             // field 1
    Put(PutRequest),                 // field 2
    DeleteRange(DeleteRangeRequest), // field 3
}

impl Default for RequestOp {
    fn default() -> Self {
        Self::Range(RangeRequest::default())
    }
}

impl Message for RequestOp {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        match self {
            Self::Range(req) => prost::encoding::message::encode(1, req, buf),
            Self::Put(req) => prost::encoding::message::encode(2, req, buf),
            Self::DeleteRange(req) => prost::encoding::message::encode(3, req, buf),
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => {
                let mut req = RangeRequest::default();
                prost::encoding::message::merge(wire_type, &mut req, buf, ctx)?;
                *self = Self::Range(req);
                Ok(())
            }
            2 => {
                let mut req = PutRequest::default();
                prost::encoding::message::merge(wire_type, &mut req, buf, ctx)?;
                *self = Self::Put(req);
                Ok(())
            }
            3 => {
                let mut req = DeleteRangeRequest::default();
                prost::encoding::message::merge(wire_type, &mut req, buf, ctx)?;
                *self = Self::DeleteRange(req);
                Ok(())
            }
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        match self {
            Self::Range(req) => prost::encoding::message::encoded_len(1, req),
            Self::Put(req) => prost::encoding::message::encoded_len(2, req),
            Self::DeleteRange(req) => prost::encoding::message::encoded_len(3, req),
        }
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// etcdserverpb.TxnRequest.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct TxnRequest {
    pub compare: Vec<Compare>,   // field 1
    pub success: Vec<RequestOp>, // field 2
    pub failure: Vec<RequestOp>, // field 3
}

impl Message for TxnRequest {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        for cmp in &self.compare {
            prost::encoding::message::encode(1, cmp, buf);
        }
        for op in &self.success {
            prost::encoding::message::encode(2, op, buf);
        }
        for op in &self.failure {
            prost::encoding::message::encode(3, op, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => {
                let mut cmp = Compare::default();
                prost::encoding::message::merge(wire_type, &mut cmp, buf, ctx)?;
                self.compare.push(cmp);
                Ok(())
            }
            2 | 3 => {
                let mut op = RequestOp::default();
                prost::encoding::message::merge(wire_type, &mut op, buf, ctx)?;
                if tag == 2 {
                    self.success.push(op);
                } else {
                    self.failure.push(op);
                }
                Ok(())
            }
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        for cmp in &self.compare {
            len += prost::encoding::message::encoded_len(1, cmp);
        }
        for op in &self.success {
            len += prost::encoding::message::encoded_len(2, op);
        }
        for op in &self.failure {
            len += prost::encoding::message::encoded_len(3, op);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// etcdserverpb.TxnResponse. Per-op responses are skipped.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct TxnResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub succeeded: bool,                // field 2
}

impl Message for TxnResponse {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            prost::encoding::message::encode(1, header, buf);
        }
        if self.succeeded {
            prost::encoding::bool::encode(2, &self.succeeded, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => {
                let mut header = self.header.take().unwrap_or_default();
                prost::encoding::message::merge(wire_type, &mut header, buf, ctx)?;
                self.header = Some(header);
                Ok(())
            }
            2 => prost::encoding::bool::merge(wire_type, &mut self.succeeded, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if let Some(ref header) = self.header {
            len += prost::encoding::message::encoded_len(1, header);
        }
        if self.succeeded {
            len += prost::encoding::bool::encoded_len(2, &self.succeeded);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

// ============================================================================
// Watch
// ============================================================================

/// etcdserverpb.WatchCreateRequest.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct WatchCreateRequest {
    pub key: Vec<u8>,        // field 1
    pub range_end: Vec<u8>,  // field 2
    pub start_revision: i64, // field 3
}

impl Message for WatchCreateRequest {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if !self.key.is_empty() {
            prost::encoding::bytes::encode(1, &self.key, buf);
        }
        if !self.range_end.is_empty() {
            prost::encoding::bytes::encode(2, &self.range_end, buf);
        }
        if self.start_revision != 0 {
            prost::encoding::int64::encode(3, &self.start_revision, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::bytes::merge(wire_type, &mut self.key, buf, ctx),
            2 => prost::encoding::bytes::merge(wire_type, &mut self.range_end, buf, ctx),
            3 => prost::encoding::int64::merge(wire_type, &mut self.start_revision, buf, ctx),
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if !self.key.is_empty() {
            len += prost::encoding::bytes::encoded_len(1, &self.key);
        }
        if !self.range_end.is_empty() {
            len += prost::encoding::bytes::encoded_len(2, &self.range_end);
        }
        if self.start_revision != 0 {
            len += prost::encoding::int64::encoded_len(3, &self.start_revision);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// etcdserverpb.WatchRequest carrying only a create request.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct WatchRequest {
    pub create_request: Option<WatchCreateRequest>, // field 1 (oneof request_union)
}

impl Message for WatchRequest {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if let Some(ref create) = self.create_request {
            prost::encoding::message::encode(1, create, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => {
                let mut create = self.create_request.take().unwrap_or_default();
                prost::encoding::message::merge(wire_type, &mut create, buf, ctx)?;
                self.create_request = Some(create);
                Ok(())
            }
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        self.create_request
            .as_ref()
            .map_or(0, |create| prost::encoding::message::encoded_len(1, create))
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// mvccpb.Event.EventType values.
pub mod event_type {
    pub const PUT: i32 = 0;
    pub const DELETE: i32 = 1;
}

/// mvccpb.Event.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct Event {
    pub event_type: i32,           // field 1
    pub kv: Option<KeyValue>,      // field 2
    pub prev_kv: Option<KeyValue>, // field 3
}

impl Message for Event {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if self.event_type != 0 {
            prost::encoding::int32::encode(1, &self.event_type, buf);
        }
        if let Some(ref kv) = self.kv {
            prost::encoding::message::encode(2, kv, buf);
        }
        if let Some(ref kv) = self.prev_kv {
            prost::encoding::message::encode(3, kv, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => prost::encoding::int32::merge(wire_type, &mut self.event_type, buf, ctx),
            2 => {
                let mut kv = self.kv.take().unwrap_or_default();
                prost::encoding::message::merge(wire_type, &mut kv, buf, ctx)?;
                self.kv = Some(kv);
                Ok(())
            }
            3 => {
                let mut kv = self.prev_kv.take().unwrap_or_default();
                prost::encoding::message::merge(wire_type, &mut kv, buf, ctx)?;
                self.prev_kv = Some(kv);
                Ok(())
            }
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if self.event_type != 0 {
            len += prost::encoding::int32::encoded_len(1, &self.event_type);
        }
        if let Some(ref kv) = self.kv {
            len += prost::encoding::message::encoded_len(2, kv);
        }
        if let Some(ref kv) = self.prev_kv {
            len += prost::encoding::message::encoded_len(3, kv);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// etcdserverpb.WatchResponse.
#[derive(Clone, Default, Debug, PartialEq)]
pub struct WatchResponse {
    pub header: Option<ResponseHeader>, // field 1
    pub watch_id: i64,                  // field 2
    pub created: bool,                  // field 3
    pub canceled: bool,                 // field 4
    pub compact_revision: i64,          // field 5
    pub cancel_reason: String,          // field 6
    pub events: Vec<Event>,             // field 11
}

impl Message for WatchResponse {
    fn encode_raw(&self, buf: &mut impl prost::bytes::BufMut)
    where
        Self: Sized,
    {
        if let Some(ref header) = self.header {
            prost::encoding::message::encode(1, header, buf);
        }
        if self.watch_id != 0 {
            prost::encoding::int64::encode(2, &self.watch_id, buf);
        }
        if self.created {
            prost::encoding::bool::encode(3, &self.created, buf);
        }
        if self.canceled {
            prost::encoding::bool::encode(4, &self.canceled, buf);
        }
        if self.compact_revision != 0 {
            prost::encoding::int64::encode(5, &self.compact_revision, buf);
        }
        if !self.cancel_reason.is_empty() {
            prost::encoding::string::encode(6, &self.cancel_reason, buf);
        }
        for event in &self.events {
            prost::encoding::message::encode(11, event, buf);
        }
    }

    fn merge_field(
        &mut self,
        tag: u32,
        wire_type: prost::encoding::WireType,
        buf: &mut impl prost::bytes::Buf,
        ctx: prost::encoding::DecodeContext,
    ) -> Result<(), DecodeError>
    where
        Self: Sized,
    {
        match tag {
            1 => {
                let mut header = self.header.take().unwrap_or_default();
                prost::encoding::message::merge(wire_type, &mut header, buf, ctx)?;
                self.header = Some(header);
                Ok(())
            }
            2 => prost::encoding::int64::merge(wire_type, &mut self.watch_id, buf, ctx),
            3 => prost::encoding::bool::merge(wire_type, &mut self.created, buf, ctx),
            4 => prost::encoding::bool::merge(wire_type, &mut self.canceled, buf, ctx),
            5 => prost::encoding::int64::merge(wire_type, &mut self.compact_revision, buf, ctx),
            6 => prost::encoding::string::merge(wire_type, &mut self.cancel_reason, buf, ctx),
            11 => {
                let mut event = Event::default();
                prost::encoding::message::merge(wire_type, &mut event, buf, ctx)?;
                self.events.push(event);
                Ok(())
            }
            _ => prost::encoding::skip_field(wire_type, tag, buf, ctx),
        }
    }

    fn encoded_len(&self) -> usize {
        let mut len = 0;
        if let Some(ref header) = self.header {
            len += prost::encoding::message::encoded_len(1, header);
        }
        if self.watch_id != 0 {
            len += prost::encoding::int64::encoded_len(2, &self.watch_id);
        }
        if self.created {
            len += prost::encoding::bool::encoded_len(3, &self.created);
        }
        if self.canceled {
            len += prost::encoding::bool::encoded_len(4, &self.canceled);
        }
        if self.compact_revision != 0 {
            len += prost::encoding::int64::encoded_len(5, &self.compact_revision);
        }
        if !self.cancel_reason.is_empty() {
            len += prost::encoding::string::encoded_len(6, &self.cancel_reason);
        }
        for event in &self.events {
            len += prost::encoding::message::encoded_len(11, event);
        }
        len
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_version_compare_is_encoded() {
        let cmp = Compare {
            result: compare_result::EQUAL,
            target: compare_target::VERSION,
            key: b"k".to_vec(),
            version: 0,
        };
        let bytes = cmp.encode_to_vec();
        // key (tag 3, len 1, 'k') followed by version (tag 4, varint 0)
        assert_eq!(bytes, vec![0x1a, 0x01, b'k', 0x20, 0x00]);
    }

    #[test]
    fn test_txn_request_decodes_oneof_ops() {
        let req = TxnRequest {
            compare: vec![Compare {
                result: compare_result::GREATER,
                target: compare_target::VERSION,
                key: b"/ip-pool/available/10.0.0.2".to_vec(),
                version: 0,
            }],
            success: vec![
                RequestOp::DeleteRange(DeleteRangeRequest {
                    key: b"/ip-pool/available/10.0.0.2".to_vec(),
                    range_end: Vec::new(),
                }),
                RequestOp::Put(PutRequest {
                    key: b"/ip-pool/taken/10.0.0.2".to_vec(),
                    value: b"peer-1".to_vec(),
                }),
            ],
            failure: Vec::new(),
        };
        let decoded = TxnRequest::decode(req.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded, req);
    }

    #[test]
    fn test_watch_response_with_events() {
        let resp = WatchResponse {
            header: Some(ResponseHeader {
                revision: 12,
                ..Default::default()
            }),
            watch_id: 1,
            events: vec![Event {
                event_type: event_type::DELETE,
                kv: Some(KeyValue {
                    key: b"/ip-pool/available/10.0.0.2".to_vec(),
                    mod_revision: 12,
                    ..Default::default()
                }),
                prev_kv: None,
            }],
            ..Default::default()
        };
        let decoded = WatchResponse::decode(resp.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.events.len(), 1);
        assert_eq!(decoded.events[0].event_type, event_type::DELETE);
        assert_eq!(decoded.header.map(|h| h.revision), Some(12));
    }
}
