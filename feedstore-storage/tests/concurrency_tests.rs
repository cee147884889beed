//! Concurrency and Ordering Tests
//!
//! Retrievals may overlap each other; insertions and deletions run alone.
//! Operations issued by one caller take effect in issue order even when
//! the caller does not wait between them.

use std::time::Duration;

use feedstore_core::{CachedFeed, FeedStore, LocalFeedImage, RetrievalOutcome, StoreResult};
use feedstore_storage::{InMemoryPersistence, LocalFeedStore, PersistencePort};
use feedstore_test_utils::fixtures::{any_timestamp, unique_image_feed};
use feedstore_test_utils::generators::{arb_feed, arb_timestamp};
use feedstore_test_utils::stubs::OccupancyProbe;
use futures_util::future::join_all;
use proptest::prelude::*;
use tokio::runtime::Runtime;
use tokio::sync::mpsc;

#[path = "support/ports.rs"]
mod test_ports;
use test_ports::{lmdb_port, memory_port};

const HOLD: Duration = Duration::from_millis(25);

// ============================================================================
// SHARED / EXCLUSIVE ACCESS
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_retrievals_overlap_and_agree() {
    let probe = OccupancyProbe::new(InMemoryPersistence::new(), HOLD);
    let occupancy = probe.occupancy();
    let store = LocalFeedStore::new(probe).unwrap();

    let feed = unique_image_feed();
    let timestamp = any_timestamp();
    store.insert(feed.clone(), timestamp).await.unwrap();

    let outcomes = join_all((0..6).map(|_| store.retrieve())).await;

    let expected = RetrievalOutcome::Found { feed, timestamp };
    for outcome in outcomes {
        assert_eq!(outcome.unwrap(), expected);
    }
    assert!(
        occupancy.max_concurrent_readers() >= 2,
        "retrievals should run in parallel"
    );
    assert_eq!(occupancy.violations(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_writes_never_overlap_other_work() {
    let (port, _guard) = lmdb_port();
    let probe = OccupancyProbe::new(port, HOLD);
    let occupancy = probe.occupancy();
    let store = LocalFeedStore::new(probe).unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel::<StoreResult<()>>();
    for i in 0..12 {
        let tx = tx.clone();
        match i % 4 {
            0 => store.insert_with(unique_image_feed(), any_timestamp(), move |r| {
                let _ = tx.send(r);
            }),
            1 => store.delete_cached_feed_with(move |r| {
                let _ = tx.send(r);
            }),
            _ => store.retrieve_with(move |r| {
                let _ = tx.send(r.map(|_| ()));
            }),
        }
    }
    drop(tx);

    let mut completed = 0;
    while let Some(result) = rx.recv().await {
        result.unwrap();
        completed += 1;
    }

    assert_eq!(completed, 12);
    assert_eq!(occupancy.violations(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_retrievals_around_slow_insert_see_whole_snapshots() {
    let (port, _guard) = lmdb_port();
    let probe = OccupancyProbe::new(port, HOLD);
    let occupancy = probe.occupancy();
    let store = LocalFeedStore::new(probe).unwrap();

    let old = CachedFeed::new(unique_image_feed(), any_timestamp());
    store
        .insert(old.feed.clone(), old.timestamp)
        .await
        .unwrap();
    let new = CachedFeed::new(unique_image_feed(), any_timestamp());

    let issue_read = |reads: &mut Vec<_>| {
        let (tx, rx) = tokio::sync::oneshot::channel();
        store.retrieve_with(move |r| {
            let _ = tx.send(r);
        });
        reads.push(rx);
    };

    let mut before = Vec::new();
    for _ in 0..3 {
        issue_read(&mut before);
    }
    let (inserted_tx, inserted_rx) = tokio::sync::oneshot::channel();
    store.insert_with(new.feed.clone(), new.timestamp, move |r| {
        let _ = inserted_tx.send(r);
    });
    let mut after = Vec::new();
    for _ in 0..3 {
        issue_read(&mut after);
    }

    inserted_rx.await.unwrap().unwrap();
    let old_outcome = RetrievalOutcome::from(old);
    let new_outcome = RetrievalOutcome::from(new);
    for rx in before {
        assert_eq!(rx.await.unwrap().unwrap(), old_outcome);
    }
    for rx in after {
        assert_eq!(rx.await.unwrap().unwrap(), new_outcome);
    }
    assert!(occupancy.max_concurrent_readers() >= 2);
    assert_eq!(occupancy.violations(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_every_operation_completes_exactly_once() {
    let (port, _guard) = memory_port();
    let store = LocalFeedStore::new(port).unwrap();
    let (tx, mut rx) = mpsc::unbounded_channel();

    for i in 0..30usize {
        let tx = tx.clone();
        match i % 3 {
            0 => store.retrieve_with(move |_| {
                let _ = tx.send(i);
            }),
            1 => store.insert_with(unique_image_feed(), any_timestamp(), move |_| {
                let _ = tx.send(i);
            }),
            _ => store.delete_cached_feed_with(move |_| {
                let _ = tx.send(i);
            }),
        }
    }
    drop(tx);

    let mut seen = Vec::new();
    while let Some(i) = rx.recv().await {
        seen.push(i);
    }
    seen.sort_unstable();
    assert_eq!(seen, (0..30).collect::<Vec<_>>());
}

// ============================================================================
// ISSUE ORDER
// ============================================================================

#[derive(Debug, Clone)]
enum Op {
    Insert(Vec<LocalFeedImage>, feedstore_core::Timestamp),
    Delete,
    Retrieve,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_feed(4), arb_timestamp()).prop_map(|(feed, ts)| Op::Insert(feed, ts)),
        Just(Op::Delete),
        Just(Op::Retrieve),
    ]
}

/// Issue `ops` without waiting and return what each retrieval saw, next to
/// what running the operations one at a time would have produced.
async fn run_unawaited<P: PersistencePort>(
    store: &LocalFeedStore<P>,
    ops: Vec<Op>,
) -> (Vec<RetrievalOutcome>, Vec<RetrievalOutcome>) {
    let mut model: Option<CachedFeed> = None;
    let mut expected = Vec::new();
    let mut pending = Vec::new();

    for op in ops {
        match op {
            Op::Insert(feed, timestamp) => {
                model = Some(CachedFeed::new(feed.clone(), timestamp));
                store.insert_with(feed, timestamp, |r| r.expect("insert should succeed"));
            }
            Op::Delete => {
                model = None;
                store.delete_cached_feed_with(|r| r.expect("delete should succeed"));
            }
            Op::Retrieve => {
                expected.push(RetrievalOutcome::from(model.clone()));
                let (tx, rx) = tokio::sync::oneshot::channel();
                store.retrieve_with(move |r| {
                    let _ = tx.send(r);
                });
                pending.push(rx);
            }
        }
    }

    let mut observed = Vec::new();
    for rx in pending {
        observed.push(rx.await.unwrap().unwrap());
    }
    // Final state, after every queued write.
    observed.push(store.retrieve().await.unwrap());
    expected.push(RetrievalOutcome::from(model));

    (observed, expected)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_unawaited_operations_take_effect_in_issue_order() {
    let (port, _guard) = lmdb_port();
    let store = LocalFeedStore::new(port).unwrap();
    let first = unique_image_feed();
    let second = unique_image_feed();
    let ts = any_timestamp();

    let ops = vec![
        Op::Retrieve,
        Op::Insert(first, ts),
        Op::Retrieve,
        Op::Delete,
        Op::Retrieve,
        Op::Insert(second.clone(), ts),
        Op::Insert(second, ts),
        Op::Retrieve,
    ];

    let (observed, expected) = run_unawaited(&store, ops).await;
    assert_eq!(observed, expected);
}

fn test_runtime() -> Result<Runtime, TestCaseError> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|e| TestCaseError::fail(format!("Failed to create runtime: {}", e)))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any mix of operations issued back to back ends in the same
    /// observations as running them one at a time.
    #[test]
    fn prop_issue_order_matches_serial_model(ops in prop::collection::vec(arb_op(), 1..12)) {
        let rt = test_runtime()?;
        let (observed, expected) = rt.block_on(async {
            let (port, _guard) = memory_port();
            let store = LocalFeedStore::new(port).unwrap();
            run_unawaited(&store, ops).await
        });
        prop_assert_eq!(observed, expected);
    }

    /// The last of two insertions replaces the first.
    #[test]
    fn prop_insert_replaces_previous_snapshot(
        first in arb_feed(5),
        second in arb_feed(5),
        t1 in arb_timestamp(),
        t2 in arb_timestamp(),
    ) {
        let rt = test_runtime()?;
        let outcome = rt.block_on(async {
            let (port, _guard) = lmdb_port();
            let store = LocalFeedStore::new(port).unwrap();
            store.insert(first, t1).await.unwrap();
            store.insert(second.clone(), t2).await.unwrap();
            store.retrieve().await.unwrap()
        });
        prop_assert_eq!(outcome, RetrievalOutcome::Found { feed: second, timestamp: t2 });
    }
}
