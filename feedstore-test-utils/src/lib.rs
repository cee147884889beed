//! Feedstore Test Utilities
//!
//! Shared test infrastructure for the feedstore workspace:
//! - Proptest generators for feed images, feeds and timestamps
//! - Fixtures for common scenarios
//! - Port doubles that inject failures or record concurrency
//! - Store conformance assertions, generic over [`FeedStore`]

// Re-export core types for convenience
pub use feedstore_core::{
    CachedFeed, FeedStore, LocalFeedImage, MalformedRecordPolicy, RetrievalOutcome, StoreError,
    StoreResult, Timestamp,
};
pub use feedstore_storage::{
    InMemoryPersistence, LocalFeedStore, PersistenceHandle, PersistencePort, PersistenceTxn,
    StoredCache,
};

use chrono::Utc;
use url::Url;
use uuid::Uuid;

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for feed domain types.

    use super::*;
    use proptest::prelude::*;

    /// Generate a random UUID.
    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate a well-formed http(s) URL.
    pub fn arb_url() -> impl Strategy<Value = Url> {
        (
            prop_oneof![Just("http"), Just("https")],
            "[a-z]{1,12}",
            prop_oneof![Just("com"), Just("org"), Just("net")],
            "[a-z0-9/]{0,20}",
        )
            .prop_filter_map("url must parse", |(scheme, host, tld, path)| {
                Url::parse(&format!("{scheme}://{host}.{tld}/{path}")).ok()
            })
    }

    /// Generate a feed image with optional free text.
    pub fn arb_local_feed_image() -> impl Strategy<Value = LocalFeedImage> {
        (
            arb_uuid(),
            prop::option::of("[a-zA-Z0-9 ]{0,60}"),
            prop::option::of("[a-zA-Z0-9 ,]{0,40}"),
            arb_url(),
        )
            .prop_map(|(id, description, location, url)| {
                LocalFeedImage::new(id, description, location, url)
            })
    }

    /// Generate a feed of up to `max_len - 1` images.
    pub fn arb_feed(max_len: usize) -> impl Strategy<Value = Vec<LocalFeedImage>> {
        prop::collection::vec(arb_local_feed_image(), 0..max_len.max(1))
    }

    /// Generate a Timestamp with sub-second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-2030
        (1577836800i64..1893456000i64, 0u32..1_000_000_000u32).prop_map(|(secs, nanos)| {
            chrono::DateTime::from_timestamp(secs, nanos).unwrap_or_else(Utc::now)
        })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built values for common scenarios.

    use super::*;

    pub fn any_url() -> Url {
        Url::parse("https://any-url.com/").expect("static url is valid")
    }

    /// An image whose id is not shared with any other fixture call.
    pub fn unique_image() -> LocalFeedImage {
        LocalFeedImage::new(
            Uuid::now_v7(),
            Some("any description".to_string()),
            Some("any location".to_string()),
            any_url(),
        )
    }

    /// A two-image feed with distinct ids.
    pub fn unique_image_feed() -> Vec<LocalFeedImage> {
        let mut bare = unique_image();
        bare.description = None;
        bare.location = None;
        vec![unique_image(), bare]
    }

    pub fn any_timestamp() -> Timestamp {
        Utc::now()
    }

    pub fn any_error() -> StoreError {
        StoreError::transaction("any error")
    }
}

// ============================================================================
// PORT DOUBLES
// ============================================================================

pub mod stubs {
    //! Persistence port wrappers for failure and concurrency scenarios.
    //!
    //! Both wrappers share the wrapped port, so the test can look at the
    //! underlying state through the original value after the store is done.

    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Which step of an operation fails.
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub enum Fault {
        /// Nothing fails.
        #[default]
        None,
        /// `open_handle` fails with [`StoreError::Handle`].
        OpenHandle,
        /// Every write transaction fails before its body runs.
        Transaction,
        /// Inside a write transaction, the first `add` after a
        /// `delete_all` fails, so the body aborts half way.
        AfterDelete,
    }

    #[derive(Debug)]
    pub struct FaultInjectingPersistence<P> {
        inner: Arc<P>,
        fault: Arc<Mutex<Fault>>,
    }

    impl<P> Clone for FaultInjectingPersistence<P> {
        fn clone(&self) -> Self {
            Self {
                inner: Arc::clone(&self.inner),
                fault: Arc::clone(&self.fault),
            }
        }
    }

    impl<P: PersistencePort> FaultInjectingPersistence<P> {
        pub fn new(inner: P, fault: Fault) -> Self {
            Self::shared(Arc::new(inner), fault)
        }

        pub fn shared(inner: Arc<P>, fault: Fault) -> Self {
            Self {
                inner,
                fault: Arc::new(Mutex::new(fault)),
            }
        }

        /// Change the fault for handles opened from now on.
        pub fn set_fault(&self, fault: Fault) {
            *self.fault.lock().unwrap_or_else(|e| e.into_inner()) = fault;
        }

        pub fn fault(&self) -> Fault {
            *self.fault.lock().unwrap_or_else(|e| e.into_inner())
        }

        pub fn inner(&self) -> &P {
            &self.inner
        }
    }

    impl<P: PersistencePort> PersistencePort for FaultInjectingPersistence<P> {
        type Handle = FaultInjectingHandle<P::Handle>;

        fn open_handle(&self) -> StoreResult<Self::Handle> {
            let fault = self.fault();
            if fault == Fault::OpenHandle {
                return Err(StoreError::handle("injected handle failure"));
            }
            Ok(FaultInjectingHandle {
                inner: self.inner.open_handle()?,
                fault,
            })
        }
    }

    pub struct FaultInjectingHandle<H> {
        inner: H,
        fault: Fault,
    }

    impl<H: PersistenceHandle> PersistenceHandle for FaultInjectingHandle<H> {
        fn query_all(&self) -> StoreResult<Vec<StoredCache>> {
            self.inner.query_all()
        }

        fn run_transaction<F>(&self, body: F) -> StoreResult<()>
        where
            F: FnOnce(&mut dyn PersistenceTxn) -> StoreResult<()>,
        {
            match self.fault {
                Fault::Transaction => Err(StoreError::transaction("injected transaction failure")),
                Fault::AfterDelete => self.inner.run_transaction(move |txn| {
                    let mut wrapped = FailAfterDelete {
                        inner: txn,
                        deleted: false,
                    };
                    body(&mut wrapped as &mut dyn PersistenceTxn)
                }),
                Fault::None | Fault::OpenHandle => self.inner.run_transaction(body),
            }
        }
    }

    struct FailAfterDelete<'a> {
        inner: &'a mut dyn PersistenceTxn,
        deleted: bool,
    }

    impl PersistenceTxn for FailAfterDelete<'_> {
        fn delete_all(&mut self) -> StoreResult<()> {
            self.inner.delete_all()?;
            self.deleted = true;
            Ok(())
        }

        fn add(&mut self, cache: StoredCache) -> StoreResult<()> {
            if self.deleted {
                return Err(StoreError::transaction("injected failure after delete"));
            }
            self.inner.add(cache)
        }
    }

    /// Counts of work observed running at the same time.
    #[derive(Debug, Default)]
    pub struct Occupancy {
        readers: AtomicUsize,
        writers: AtomicUsize,
        max_readers: AtomicUsize,
        violations: AtomicUsize,
    }

    impl Occupancy {
        pub fn max_concurrent_readers(&self) -> usize {
            self.max_readers.load(Ordering::SeqCst)
        }

        /// Times a write overlapped other work, or a read overlapped a write.
        pub fn violations(&self) -> usize {
            self.violations.load(Ordering::SeqCst)
        }

        fn enter_read(&self) {
            let now = self.readers.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_readers.fetch_max(now, Ordering::SeqCst);
            if self.writers.load(Ordering::SeqCst) != 0 {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn exit_read(&self) {
            self.readers.fetch_sub(1, Ordering::SeqCst);
        }

        fn enter_write(&self) {
            let now = self.writers.fetch_add(1, Ordering::SeqCst) + 1;
            if now != 1 || self.readers.load(Ordering::SeqCst) != 0 {
                self.violations.fetch_add(1, Ordering::SeqCst);
            }
        }

        fn exit_write(&self) {
            self.writers.fetch_sub(1, Ordering::SeqCst);
        }
    }

    /// Port wrapper that holds every read and write open for `hold` and
    /// records how they overlapped.
    #[derive(Debug)]
    pub struct OccupancyProbe<P> {
        inner: Arc<P>,
        occupancy: Arc<Occupancy>,
        hold: Duration,
    }

    impl<P: PersistencePort> OccupancyProbe<P> {
        pub fn new(inner: P, hold: Duration) -> Self {
            Self {
                inner: Arc::new(inner),
                occupancy: Arc::new(Occupancy::default()),
                hold,
            }
        }

        pub fn occupancy(&self) -> Arc<Occupancy> {
            Arc::clone(&self.occupancy)
        }
    }

    impl<P: PersistencePort> PersistencePort for OccupancyProbe<P> {
        type Handle = ProbeHandle<P::Handle>;

        fn open_handle(&self) -> StoreResult<Self::Handle> {
            Ok(ProbeHandle {
                inner: self.inner.open_handle()?,
                occupancy: Arc::clone(&self.occupancy),
                hold: self.hold,
            })
        }
    }

    pub struct ProbeHandle<H> {
        inner: H,
        occupancy: Arc<Occupancy>,
        hold: Duration,
    }

    impl<H: PersistenceHandle> PersistenceHandle for ProbeHandle<H> {
        fn query_all(&self) -> StoreResult<Vec<StoredCache>> {
            self.occupancy.enter_read();
            std::thread::sleep(self.hold);
            let result = self.inner.query_all();
            self.occupancy.exit_read();
            result
        }

        fn run_transaction<F>(&self, body: F) -> StoreResult<()>
        where
            F: FnOnce(&mut dyn PersistenceTxn) -> StoreResult<()>,
        {
            self.occupancy.enter_write();
            std::thread::sleep(self.hold);
            let result = self.inner.run_transaction(body);
            self.occupancy.exit_write();
            result
        }
    }
}

// ============================================================================
// STORE CONFORMANCE ASSERTIONS
// ============================================================================

pub mod specs {
    //! One assertion per store scenario. Each takes a fresh store.
    //!
    //! The failable groups need a store whose port fails the named step;
    //! see [`crate::stubs::FaultInjectingPersistence`].

    use super::*;
    use crate::fixtures::{any_timestamp, unique_image_feed};

    #[track_caller]
    fn assert_outcome(actual: StoreResult<RetrievalOutcome>, expected: &RetrievalOutcome) {
        match actual {
            Ok(outcome) => assert_eq!(&outcome, expected, "Unexpected retrieval outcome"),
            Err(e) => panic!("Expected {:?}, got error: {}", expected, e),
        }
    }

    async fn expect_retrieve<S: FeedStore + ?Sized>(sut: &S, expected: &RetrievalOutcome) {
        assert_outcome(sut.retrieve().await, expected);
    }

    async fn expect_retrieve_twice<S: FeedStore + ?Sized>(sut: &S, expected: &RetrievalOutcome) {
        expect_retrieve(sut, expected).await;
        expect_retrieve(sut, expected).await;
    }

    async fn expect_retrieve_fails<S: FeedStore + ?Sized>(sut: &S) {
        let result = sut.retrieve().await;
        assert!(result.is_err(), "Expected retrieval failure, got {:?}", result);
    }

    async fn insert_ok<S: FeedStore + ?Sized>(
        sut: &S,
        feed: Vec<LocalFeedImage>,
        timestamp: Timestamp,
    ) {
        if let Err(e) = sut.insert(feed, timestamp).await {
            panic!("Expected insertion to succeed, got: {}", e);
        }
    }

    async fn delete_ok<S: FeedStore + ?Sized>(sut: &S) {
        if let Err(e) = sut.delete_cached_feed().await {
            panic!("Expected deletion to succeed, got: {}", e);
        }
    }

    // === Retrieval ===

    pub async fn assert_retrieve_delivers_empty_on_empty_cache<S: FeedStore + ?Sized>(sut: &S) {
        expect_retrieve(sut, &RetrievalOutcome::Empty).await;
    }

    pub async fn assert_retrieve_has_no_side_effects_on_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        expect_retrieve_twice(sut, &RetrievalOutcome::Empty).await;
    }

    pub async fn assert_retrieve_delivers_found_values_on_non_empty_cache<
        S: FeedStore + ?Sized,
    >(
        sut: &S,
    ) {
        let feed = unique_image_feed();
        let timestamp = any_timestamp();

        insert_ok(sut, feed.clone(), timestamp).await;

        expect_retrieve(sut, &RetrievalOutcome::Found { feed, timestamp }).await;
    }

    pub async fn assert_retrieve_has_no_side_effects_on_non_empty_cache<
        S: FeedStore + ?Sized,
    >(
        sut: &S,
    ) {
        let feed = unique_image_feed();
        let timestamp = any_timestamp();

        insert_ok(sut, feed.clone(), timestamp).await;

        expect_retrieve_twice(sut, &RetrievalOutcome::Found { feed, timestamp }).await;
    }

    // === Insertion ===

    pub async fn assert_insert_delivers_no_error_on_empty_cache<S: FeedStore + ?Sized>(sut: &S) {
        insert_ok(sut, unique_image_feed(), any_timestamp()).await;
    }

    pub async fn assert_insert_delivers_no_error_on_non_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        insert_ok(sut, unique_image_feed(), any_timestamp()).await;
        insert_ok(sut, unique_image_feed(), any_timestamp()).await;
    }

    pub async fn assert_insert_overrides_previously_inserted_cache_values<
        S: FeedStore + ?Sized,
    >(
        sut: &S,
    ) {
        insert_ok(sut, unique_image_feed(), any_timestamp()).await;

        let latest_feed = unique_image_feed();
        let latest_timestamp = any_timestamp();
        insert_ok(sut, latest_feed.clone(), latest_timestamp).await;

        expect_retrieve(
            sut,
            &RetrievalOutcome::Found {
                feed: latest_feed,
                timestamp: latest_timestamp,
            },
        )
        .await;
    }

    // === Deletion ===

    pub async fn assert_delete_delivers_no_error_on_empty_cache<S: FeedStore + ?Sized>(sut: &S) {
        delete_ok(sut).await;
    }

    pub async fn assert_delete_has_no_side_effects_on_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        delete_ok(sut).await;
        expect_retrieve(sut, &RetrievalOutcome::Empty).await;
    }

    pub async fn assert_delete_delivers_no_error_on_non_empty_cache<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        insert_ok(sut, unique_image_feed(), any_timestamp()).await;
        delete_ok(sut).await;
    }

    pub async fn assert_delete_empties_previously_inserted_cache<S: FeedStore + ?Sized>(sut: &S) {
        insert_ok(sut, unique_image_feed(), any_timestamp()).await;
        delete_ok(sut).await;
        expect_retrieve(sut, &RetrievalOutcome::Empty).await;
    }

    // === Failable retrieval ===

    /// `sut` must fail every retrieval.
    pub async fn assert_retrieve_delivers_failure_on_retrieval_error<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        expect_retrieve_fails(sut).await;
    }

    /// `sut` must fail every retrieval.
    pub async fn assert_retrieve_has_no_side_effects_on_failure<S: FeedStore + ?Sized>(sut: &S) {
        expect_retrieve_fails(sut).await;
        expect_retrieve_fails(sut).await;
    }

    // === Failable insertion ===

    /// `sut` must fail every insertion.
    pub async fn assert_insert_delivers_error_on_insertion_error<S: FeedStore + ?Sized>(sut: &S) {
        let result = sut.insert(unique_image_feed(), any_timestamp()).await;
        assert!(result.is_err(), "Expected insertion to fail");
    }

    /// `sut` must fail every insertion and still serve retrievals.
    pub async fn assert_insert_has_no_side_effects_on_insertion_error<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        let _ = sut.insert(unique_image_feed(), any_timestamp()).await;
        expect_retrieve(sut, &RetrievalOutcome::Empty).await;
    }

    // === Failable deletion ===

    /// `sut` must fail every deletion.
    pub async fn assert_delete_delivers_error_on_deletion_error<S: FeedStore + ?Sized>(sut: &S) {
        let result = sut.delete_cached_feed().await;
        assert!(result.is_err(), "Expected deletion to fail");
    }

    /// `sut` must fail every deletion and still serve retrievals.
    pub async fn assert_delete_has_no_side_effects_on_deletion_error<S: FeedStore + ?Sized>(
        sut: &S,
    ) {
        let _ = sut.delete_cached_feed().await;
        expect_retrieve(sut, &RetrievalOutcome::Empty).await;
    }

    // === Ordering ===

    /// Side effects issued back to back through the callback API complete
    /// in issue order.
    pub async fn assert_side_effects_run_serially<P: PersistencePort>(sut: &LocalFeedStore<P>) {
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();

        let first = tx.clone();
        sut.insert_with(unique_image_feed(), any_timestamp(), move |_| {
            let _ = first.send(1);
        });
        let second = tx.clone();
        sut.delete_cached_feed_with(move |_| {
            let _ = second.send(2);
        });
        sut.insert_with(unique_image_feed(), any_timestamp(), move |_| {
            let _ = tx.send(3);
        });

        let mut completed = Vec::new();
        while let Some(op) = rx.recv().await {
            completed.push(op);
        }
        assert_eq!(
            completed,
            vec![1, 2, 3],
            "Expected side effects to run serially but operations finished in the wrong order"
        );
    }
}

// ============================================================================
// TESTS
// ============================================================================
