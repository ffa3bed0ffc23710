//! Address pool tests: allocation, release, convergence and races.

mod common;

use common::{addr, assert_err, assert_ok, seeded_store, start_node, temp_test_dir, wait_until};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use wireable::core::error::PoolError;
use wireable::pool::{
    load_available, AllocationCoordinator, AvailabilityHeap, LocalSequentialAllocator, OpContext,
    PoolKeys, PoolWatcher, WatchOutcome,
};
use wireable::provision::{allocate_with_retry, RetryPolicy};
use wireable::store::{MemoryPoolStore, PoolStore, TxnOp, WatchEvent};

// ============================================================================
// Ordering and local allocation
// ============================================================================

#[test]
fn comparator_orders_numerically() {
    assert!(addr("10.0.0.9") < addr("10.0.0.10"));
    assert!(addr("10.0.0.255") < addr("10.0.1.0"));
}

#[test]
fn local_allocator_hands_out_sequentially() {
    let allocator = LocalSequentialAllocator::new("10.0.0.0/24").unwrap();
    let got: Vec<_> = (0..3).map(|_| allocator.allocate().unwrap()).collect();
    assert_eq!(got, vec![addr("10.0.0.2"), addr("10.0.0.3"), addr("10.0.0.4")]);
}

#[test]
fn heap_push_is_idempotent() {
    let heap = AvailabilityHeap::new();
    assert!(heap.push(addr("10.0.0.7")));
    assert!(!heap.push(addr("10.0.0.7")));
    assert_eq!(heap.len(), 1);
}

// ============================================================================
// Coordinator against the store
// ============================================================================

#[tokio::test]
async fn heap_build_allocates_lowest_first() {
    let store = Arc::new(MemoryPoolStore::new());
    let keys = PoolKeys::default();
    for a in ["10.0.0.5", "10.0.0.2", "10.0.0.9"] {
        store
            .txn(vec![], vec![TxnOp::put(keys.available(&addr(a)), "")])
            .await
            .unwrap();
    }

    let ctx = OpContext::default();
    let available = load_available(store.as_ref(), &keys, &ctx).await.unwrap();
    let heap = Arc::new(AvailabilityHeap::from_addresses(available));
    let coordinator = AllocationCoordinator::new(store.clone(), heap, keys.clone());

    assert_eq!(
        coordinator.allocate("peer-1", &ctx).await.unwrap(),
        addr("10.0.0.2")
    );
    assert_eq!(
        store.get(&keys.taken(&addr("10.0.0.2"))).await.unwrap(),
        Some(b"peer-1".to_vec())
    );
}

#[tokio::test]
async fn released_address_is_reused_after_watch() {
    let dir = temp_test_dir();
    let store = seeded_store("10.0.0.0/29").await;
    let mut node = start_node("10.0.0.0/29", store, dir.path()).await;
    let ctx = node.op_context();
    let coordinator = node.coordinator().clone();

    let first = coordinator.allocate("peer-1", &ctx).await.unwrap();
    assert_eq!(first, addr("10.0.0.2"));
    assert_eq!(
        coordinator.allocate("peer-2", &ctx).await.unwrap(),
        addr("10.0.0.3")
    );

    coordinator.release(first, &ctx).await.unwrap();
    let heap = coordinator.heap().clone();
    assert!(wait_until(Duration::from_secs(5), || {
        let heap = heap.clone();
        async move { heap.contains(&addr("10.0.0.2")) }
    })
    .await);

    assert_eq!(coordinator.allocate("peer-3", &ctx).await.unwrap(), first);
    assert_eq!(
        coordinator.owner_of(first, &ctx).await.unwrap().as_deref(),
        Some("peer-3")
    );
    node.shutdown().await.unwrap();
}

#[tokio::test]
async fn release_of_free_address_is_rejected() {
    let store = seeded_store("10.0.0.0/29").await;
    let coordinator = AllocationCoordinator::new(
        store.clone(),
        Arc::new(AvailabilityHeap::new()),
        PoolKeys::default(),
    );
    let revision = store.revision();

    let err = assert_err(
        coordinator
            .release(addr("10.0.0.4"), &OpContext::default())
            .await,
    );
    assert!(matches!(err, PoolError::NotAllocated { .. }));
    assert_eq!(store.revision(), revision);
}

#[tokio::test]
async fn transport_failure_requeues_and_conflict_drops() {
    let store = seeded_store("10.0.0.0/29").await;
    let keys = PoolKeys::default();
    let ctx = OpContext::default();
    let available = load_available(store.as_ref(), &keys, &ctx).await.unwrap();
    let heap = Arc::new(AvailabilityHeap::from_addresses(available));
    let coordinator = AllocationCoordinator::new(store.clone(), heap.clone(), keys.clone());

    store.set_unavailable(true);
    let err = assert_err(coordinator.allocate("peer-1", &ctx).await);
    assert!(matches!(err, PoolError::StoreUnavailable { .. }));
    assert!(heap.contains(&addr("10.0.0.2")));
    store.set_unavailable(false);

    // Claimed elsewhere: the precondition fails and the address is dropped.
    store
        .txn(
            vec![],
            vec![
                TxnOp::delete(keys.available(&addr("10.0.0.2"))),
                TxnOp::put(keys.taken(&addr("10.0.0.2")), "other-node"),
            ],
        )
        .await
        .unwrap();
    let err = assert_err(coordinator.allocate("peer-1", &ctx).await);
    assert!(matches!(err, PoolError::AllocationConflict { .. }));
    assert!(!heap.contains(&addr("10.0.0.2")));

    assert_eq!(
        assert_ok(coordinator.allocate("peer-1", &ctx).await),
        addr("10.0.0.3")
    );
}

// ============================================================================
// Watcher
// ============================================================================

#[tokio::test]
async fn delete_for_absent_address_is_a_noop() {
    let heap = Arc::new(AvailabilityHeap::from_addresses([addr("10.0.0.3")]));
    let keys = PoolKeys::default();
    let watcher = PoolWatcher::new(heap.clone(), keys.clone());

    let outcome = watcher.apply(&WatchEvent::delete(keys.available(&addr("10.0.0.2")), 7));
    assert_eq!(outcome, WatchOutcome::Absent(addr("10.0.0.2")));
    assert_eq!(heap.snapshot_sorted(), vec![addr("10.0.0.3")]);
}

#[tokio::test]
async fn malformed_keys_are_skipped_everywhere() {
    let store = Arc::new(MemoryPoolStore::new());
    let keys = PoolKeys::default();
    store
        .txn(
            vec![],
            vec![
                TxnOp::put(keys.available(&addr("10.0.0.2")), ""),
                TxnOp::put("/ip-pool/available/not-an-ip", ""),
            ],
        )
        .await
        .unwrap();

    let available = load_available(store.as_ref(), &keys, &OpContext::default())
        .await
        .unwrap();
    assert_eq!(available, vec![addr("10.0.0.2")]);

    let watcher = PoolWatcher::new(Arc::new(AvailabilityHeap::new()), keys);
    assert_eq!(
        watcher.apply(&WatchEvent::put("/ip-pool/available/10.0.0", 3)),
        WatchOutcome::Skipped
    );
}

#[tokio::test]
async fn non_canonical_ipv6_key_never_reaches_heap() {
    let store = Arc::new(MemoryPoolStore::new());
    let keys = PoolKeys::default();
    store
        .txn(
            vec![],
            vec![
                TxnOp::put("/ip-pool/available/fd00:0::2", ""),
                TxnOp::put(keys.available(&addr("fd00::3")), ""),
            ],
        )
        .await
        .unwrap();

    let available = load_available(store.as_ref(), &keys, &OpContext::default())
        .await
        .unwrap();
    assert_eq!(available, vec![addr("fd00::3")]);

    let heap = Arc::new(AvailabilityHeap::from_addresses(available));
    let coordinator = AllocationCoordinator::new(store.clone(), heap.clone(), keys.clone());
    let ctx = OpContext::default();
    assert_eq!(coordinator.allocate("peer", &ctx).await.unwrap(), addr("fd00::3"));

    let watcher = PoolWatcher::new(heap.clone(), keys);
    assert_eq!(
        watcher.apply(&WatchEvent::put("/ip-pool/available/fd00:0::2", 5)),
        WatchOutcome::Skipped
    );
    assert!(heap.is_empty());
}

#[tokio::test]
async fn disrupted_feed_marks_node_unhealthy() {
    let dir = temp_test_dir();
    let store = seeded_store("10.0.0.0/29").await;
    let mut node = start_node("10.0.0.0/29", store.clone(), dir.path()).await;
    assert!(node.health().is_healthy());

    store.disrupt_watches();
    let health = node.health().clone();
    assert!(wait_until(Duration::from_secs(5), || {
        let health = health.clone();
        async move { !health.is_healthy() }
    })
    .await);
    assert!(!node.readiness().is_ready());

    let err = tokio::time::timeout(Duration::from_secs(5), node.run())
        .await
        .unwrap()
        .unwrap_err();
    assert!(err.chain().any(|e| e.to_string().contains("watch disrupted")));
}

// ============================================================================
// Races
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_allocations_never_duplicate() {
    let dir = temp_test_dir();
    // /28: 14 usable addresses.
    let store = seeded_store("10.0.0.0/28").await;
    let mut node = start_node("10.0.0.0/28", store, dir.path()).await;
    let coordinator = node.coordinator().clone();

    let mut tasks = Vec::new();
    for i in 0..20 {
        let coordinator = coordinator.clone();
        let ctx = node.op_context();
        tasks.push(tokio::spawn(async move {
            coordinator.allocate(&format!("peer-{}", i), &ctx).await
        }));
    }

    let mut granted = HashSet::new();
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(a) => assert!(granted.insert(a), "duplicate grant {}", a),
            Err(PoolError::PoolExhausted) => exhausted += 1,
            Err(e) => panic!("unexpected error: {:?}", e),
        }
    }
    assert_eq!(granted.len(), 14);
    assert_eq!(exhausted, 6);
    node.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn two_nodes_race_for_last_address() {
    let dir_a = temp_test_dir();
    let dir_b = temp_test_dir();
    // /30: only 10.0.0.2 and 10.0.0.3 are usable.
    let store = seeded_store("10.0.0.0/30").await;
    let mut node_a = start_node("10.0.0.0/30", store.clone(), dir_a.path()).await;
    let mut node_b = start_node("10.0.0.0/30", store.clone(), dir_b.path()).await;

    let ctx_a = node_a.op_context();
    let ctx_b = node_b.op_context();
    node_a.coordinator().allocate("setup", &ctx_a).await.unwrap();

    // Wait until B's cache reflects the first claim so both see one address.
    let heap_b = node_b.coordinator().heap().clone();
    assert!(wait_until(Duration::from_secs(5), || {
        let heap_b = heap_b.clone();
        async move { heap_b.len() == 1 }
    })
    .await);

    let coord_a = node_a.coordinator().clone();
    let coord_b = node_b.coordinator().clone();
    let (a, b) = tokio::join!(
        tokio::spawn(async move { coord_a.allocate("peer-a", &ctx_a).await }),
        tokio::spawn(async move { coord_b.allocate("peer-b", &ctx_b).await }),
    );
    let results = [a.unwrap(), b.unwrap()];

    let winners: Vec<_> = results.iter().filter_map(|r| r.as_ref().ok()).collect();
    assert_eq!(winners, vec![&addr("10.0.0.3")]);
    let loser = results.iter().find_map(|r| r.as_ref().err()).unwrap();
    assert!(matches!(
        loser,
        PoolError::AllocationConflict { .. } | PoolError::PoolExhausted
    ));

    let keys = PoolKeys::default();
    assert!(store
        .get(&keys.available(&addr("10.0.0.3")))
        .await
        .unwrap()
        .is_none());

    node_a.shutdown().await.unwrap();
    node_b.shutdown().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nodes_converge_on_released_addresses() {
    let dir_a = temp_test_dir();
    let dir_b = temp_test_dir();
    let store = seeded_store("10.0.0.0/29").await;
    let mut node_a = start_node("10.0.0.0/29", store.clone(), dir_a.path()).await;
    let mut node_b = start_node("10.0.0.0/29", store.clone(), dir_b.path()).await;

    let ctx_a = node_a.op_context();
    let ctx_b = node_b.op_context();
    let mut held = Vec::new();
    for i in 0..6 {
        let node = if i % 2 == 0 { &node_a } else { &node_b };
        let ctx = if i % 2 == 0 { &ctx_a } else { &ctx_b };
        let result = allocate_with_retry(node.coordinator(), "peer", ctx, RetryPolicy::default())
            .await
            .unwrap();
        held.push(result);
    }
    let distinct: HashSet<_> = held.iter().collect();
    assert_eq!(distinct.len(), 6);

    node_a
        .coordinator()
        .release(addr("10.0.0.5"), &ctx_a)
        .await
        .unwrap();
    let heap_b = node_b.coordinator().heap().clone();
    assert!(wait_until(Duration::from_secs(5), || {
        let heap_b = heap_b.clone();
        async move { heap_b.snapshot_sorted() == vec![addr("10.0.0.5")] }
    })
    .await);
    assert_eq!(
        node_b.coordinator().allocate("peer-late", &ctx_b).await.unwrap(),
        addr("10.0.0.5")
    );

    node_a.shutdown().await.unwrap();
    node_b.shutdown().await.unwrap();
}
