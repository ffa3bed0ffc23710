//! etcd gRPC client implementing [`PoolStore`].

use super::proto::{
    self, event_type, RangeRequest, RangeResponse, TxnResponse, WatchCreateRequest, WatchRequest,
    WatchResponse,
};
use super::txn_request;
use crate::core::error::{StoreError, StoreResult};
use crate::store::{
    prefix_range_end, Condition, KeyValue, PoolStore, StoreFuture, TxnOp, WatchEvent, WatchFeed,
    WatchStream,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::codec::ProstCodec;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::{Channel, Endpoint};

const RANGE_PATH: &str = "/etcdserverpb.KV/Range";
const TXN_PATH: &str = "/etcdserverpb.KV/Txn";
const WATCH_PATH: &str = "/etcdserverpb.Watch/Watch";

/// Connection settings.
#[derive(Debug, Clone)]
pub struct EtcdOptions {
    /// Endpoints tried in order, e.g. `http://127.0.0.1:2379`.
    pub endpoints: Vec<String>,
    pub dial_timeout: Duration,
    /// Deadline for unary calls and for watch creation.
    pub request_timeout: Duration,
    /// Per-subscription event buffer.
    pub watch_buffer: usize,
}

/// Pool store backed by an etcd v3 cluster.
#[derive(Debug, Clone)]
pub struct EtcdPoolStore {
    channel: Channel,
    endpoint: String,
    options: EtcdOptions,
}

impl EtcdPoolStore {
    /// Connect to the first reachable endpoint.
    pub async fn connect(options: EtcdOptions) -> StoreResult<Self> {
        if options.endpoints.is_empty() {
            return Err(StoreError::unavailable("no etcd endpoints configured"));
        }

        let mut last_error = String::new();
        for raw in &options.endpoints {
            let uri = normalize_endpoint(raw);
            let endpoint = match Endpoint::from_shared(uri.clone()) {
                Ok(endpoint) => endpoint
                    .connect_timeout(options.dial_timeout)
                    .tcp_nodelay(true),
                Err(e) => {
                    last_error = format!("{}: {}", uri, e);
                    continue;
                }
            };

            match endpoint.connect().await {
                Ok(channel) => {
                    tracing::info!(endpoint = %uri, "connected to etcd");
                    return Ok(Self {
                        channel,
                        endpoint: uri,
                        options,
                    });
                }
                Err(e) => {
                    tracing::warn!(endpoint = %uri, error = %e, "etcd endpoint unreachable");
                    last_error = format!("{}: {}", uri, e);
                }
            }
        }

        Err(StoreError::unavailable(format!(
            "failed to connect to etcd: {}",
            last_error
        )))
    }

    /// Endpoint this store is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn unary<Req, Resp>(&self, path: &'static str, request: Req) -> StoreResult<Resp>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        let call = async {
            grpc.ready()
                .await
                .map_err(|e| StoreError::unavailable(format!("etcd channel not ready: {}", e)))?;
            let codec: ProstCodec<Req, Resp> = ProstCodec::default();
            grpc.unary(
                tonic::Request::new(request),
                PathAndQuery::from_static(path),
                codec,
            )
            .await
            .map(|response| response.into_inner())
            .map_err(|status| status_error(path, &status))
        };

        tokio::time::timeout(self.options.request_timeout, call)
            .await
            .map_err(|_| {
                StoreError::unavailable(format!(
                    "{} timed out after {:?}",
                    path, self.options.request_timeout
                ))
            })?
    }

    async fn open_watch(
        &self,
        prefix: &[u8],
    ) -> StoreResult<(tonic::Streaming<WatchResponse>, mpsc::Sender<WatchRequest>)> {
        let range_end = prefix_range_end(prefix).unwrap_or_else(|| vec![0]);
        let (requests, request_rx) = mpsc::channel(1);
        requests
            .send(WatchRequest {
                create_request: Some(WatchCreateRequest {
                    key: prefix.to_vec(),
                    range_end,
                    start_revision: 0,
                }),
            })
            .await
            .map_err(|_| StoreError::unavailable("watch request channel closed"))?;

        let mut grpc = tonic::client::Grpc::new(self.channel.clone());
        let open = async {
            grpc.ready()
                .await
                .map_err(|e| StoreError::unavailable(format!("etcd channel not ready: {}", e)))?;
            let codec: ProstCodec<WatchRequest, WatchResponse> = ProstCodec::default();
            let response = grpc
                .streaming(
                    tonic::Request::new(ReceiverStream::new(request_rx)),
                    PathAndQuery::from_static(WATCH_PATH),
                    codec,
                )
                .await
                .map_err(|status| status_error(WATCH_PATH, &status))?;

            // The first response confirms the watch is registered.
            let mut inbound = response.into_inner();
            match inbound.message().await {
                Ok(Some(resp)) if resp.created && !resp.canceled => Ok(inbound),
                Ok(Some(resp)) => Err(StoreError::unavailable(format!(
                    "etcd refused watch: {}",
                    resp.cancel_reason
                ))),
                Ok(None) => Err(StoreError::unavailable(
                    "watch stream closed before creation",
                )),
                Err(status) => Err(status_error(WATCH_PATH, &status)),
            }
        };

        let inbound = tokio::time::timeout(self.options.request_timeout, open)
            .await
            .map_err(|_| {
                StoreError::unavailable(format!(
                    "watch creation timed out after {:?}",
                    self.options.request_timeout
                ))
            })??;
        Ok((inbound, requests))
    }
}

impl PoolStore for EtcdPoolStore {
    fn list_prefix<'a>(&'a self, prefix: &'a [u8]) -> StoreFuture<'a, Vec<KeyValue>> {
        Box::pin(async move {
            let request = RangeRequest {
                key: prefix.to_vec(),
                range_end: prefix_range_end(prefix).unwrap_or_else(|| vec![0]),
                limit: 0,
            };
            let response: RangeResponse = self.unary(RANGE_PATH, request).await?;
            Ok(response
                .kvs
                .into_iter()
                .map(|kv| KeyValue {
                    key: kv.key,
                    value: kv.value,
                })
                .collect())
        })
    }

    fn get<'a>(&'a self, key: &'a [u8]) -> StoreFuture<'a, Option<Vec<u8>>> {
        Box::pin(async move {
            let request = RangeRequest {
                key: key.to_vec(),
                range_end: Vec::new(),
                limit: 1,
            };
            let response: RangeResponse = self.unary(RANGE_PATH, request).await?;
            Ok(response.kvs.into_iter().next().map(|kv| kv.value))
        })
    }

    fn watch_prefix<'a>(&'a self, prefix: &'a [u8]) -> StoreFuture<'a, WatchStream> {
        Box::pin(async move {
            let (inbound, requests) = self.open_watch(prefix).await?;
            let (feed, stream) = WatchStream::channel(self.options.watch_buffer);
            tracing::debug!(prefix = %String::from_utf8_lossy(prefix), "etcd watch created");
            tokio::spawn(forward_watch(inbound, requests, feed));
            Ok(stream)
        })
    }

    fn txn<'a>(&'a self, conditions: Vec<Condition>, ops: Vec<TxnOp>) -> StoreFuture<'a, bool> {
        Box::pin(async move {
            let response: TxnResponse = self
                .unary(TXN_PATH, txn_request(&conditions, &ops))
                .await?;
            Ok(response.succeeded)
        })
    }

    fn name(&self) -> &'static str {
        "etcd"
    }
}

/// Pump watch responses into the subscriber's feed until either side stops.
async fn forward_watch(
    mut inbound: tonic::Streaming<WatchResponse>,
    requests: mpsc::Sender<WatchRequest>,
    feed: WatchFeed,
) {
    // Dropping the request sender half-closes the stream.
    let _requests = requests;

    loop {
        tokio::select! {
            _ = feed.cancelled() => {
                tracing::debug!("etcd watch released");
                return;
            }
            message = inbound.message() => match message {
                Ok(Some(resp)) => {
                    if resp.canceled {
                        feed.fail(StoreError::disrupted(format!(
                            "watch canceled by server: {}",
                            resp.cancel_reason
                        )))
                        .await;
                        return;
                    }
                    if resp.compact_revision != 0 {
                        feed.fail(StoreError::disrupted(format!(
                            "watch history compacted at revision {}",
                            resp.compact_revision
                        )))
                        .await;
                        return;
                    }

                    let header_revision = resp.header.as_ref().map_or(0, |h| h.revision);
                    for event in resp.events {
                        let Some(event) = decode_event(event, header_revision) else {
                            continue;
                        };
                        if !feed.send(Ok(event)).await {
                            return;
                        }
                    }
                }
                Ok(None) => {
                    feed.fail(StoreError::disrupted("watch stream closed by server")).await;
                    return;
                }
                Err(status) => {
                    feed.fail(StoreError::disrupted(format!(
                        "watch stream failed: {}",
                        status.message()
                    )))
                    .await;
                    return;
                }
            },
        }
    }
}

fn decode_event(event: proto::Event, header_revision: i64) -> Option<WatchEvent> {
    let kv = event.kv?;
    let revision = if kv.mod_revision > 0 {
        kv.mod_revision
    } else {
        header_revision
    };
    let revision = u64::try_from(revision).unwrap_or(0);
    match event.event_type {
        event_type::PUT => Some(WatchEvent::put(kv.key, revision)),
        event_type::DELETE => Some(WatchEvent::delete(kv.key, revision)),
        other => {
            tracing::warn!(event_type = other, "ignoring unknown etcd event type");
            None
        }
    }
}

fn status_error(path: &str, status: &tonic::Status) -> StoreError {
    StoreError::unavailable(format!(
        "{} failed: {} ({:?})",
        path,
        status.message(),
        status.code()
    ))
}

fn normalize_endpoint(raw: &str) -> String {
    let raw = raw.trim();
    if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{}", raw)
    }
}
