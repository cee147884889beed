//! Shared-read / exclusive-write sequencing of store work.
//!
//! Work is queued in submission order and admitted by a single dispatcher
//! task. Admission means holding a guard on a fair `tokio::sync::RwLock`:
//!
//! ```text
//! schedule_read ──┐                        ┌─ read guard ─→ spawn_blocking(work)
//!                 ├─→ [queue] ─→ dispatcher┤
//! schedule_write ─┘                        └─ write guard ─→ spawn_blocking(work)
//! ```
//!
//! While the dispatcher waits for a write guard it admits nothing else, so
//! a write starts only after every earlier read has finished and no later
//! job starts before the write has finished. Consecutive reads are
//! admitted back to back and run in parallel on the blocking pool.
//!
//! The guard moves into the blocking closure and is released when the
//! closure exits, including by panic.

use std::fmt;
use std::sync::Arc;

use feedstore_core::{StoreError, StoreResult};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, RwLock};

/// Exclusivity class of a unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessClass {
    /// May run alongside other shared work.
    Shared,
    /// Runs alone.
    Exclusive,
}

impl fmt::Display for AccessClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AccessClass::Shared => f.write_str("shared"),
            AccessClass::Exclusive => f.write_str("exclusive"),
        }
    }
}

type Work = Box<dyn FnOnce() + Send + 'static>;

struct Job {
    class: AccessClass,
    work: Work,
}

/// Read or write guard, held for as long as admitted work runs.
type AccessGuard = Box<dyn Send + 'static>;

/// The single serialization point in front of a persistence port.
///
/// Cloning yields another submitter onto the same queue.
#[derive(Clone)]
pub struct CacheSequencer {
    jobs: mpsc::UnboundedSender<Job>,
}

impl CacheSequencer {
    /// Create a sequencer on the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Worker`] when called outside a runtime.
    pub fn new() -> StoreResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| StoreError::worker(format!("no tokio runtime available: {e}")))?;
        Ok(Self::with_handle(runtime))
    }

    /// Create a sequencer whose dispatcher and workers run on `runtime`.
    pub fn with_handle(runtime: Handle) -> Self {
        let (jobs, queue) = mpsc::unbounded_channel();
        let lock = Arc::new(RwLock::new(()));
        runtime.spawn(Self::dispatch_loop(queue, lock, runtime.clone()));
        Self { jobs }
    }

    /// Admit `work` with shared access. Returns immediately.
    pub fn schedule_read<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(AccessClass::Shared, Box::new(work));
    }

    /// Admit `work` with exclusive access. Returns immediately.
    pub fn schedule_write<F>(&self, work: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(AccessClass::Exclusive, Box::new(work));
    }

    fn schedule(&self, class: AccessClass, work: Work) {
        if let Err(rejected) = self.jobs.send(Job { class, work }) {
            // Dispatcher is gone with its runtime. Dropping the work drops
            // any completion it owns, which reports the failure.
            tracing::warn!(class = %rejected.0.class, "Sequencer queue closed; dropping work");
        }
    }

    async fn dispatch_loop(
        mut queue: mpsc::UnboundedReceiver<Job>,
        lock: Arc<RwLock<()>>,
        runtime: Handle,
    ) {
        while let Some(Job { class, work }) = queue.recv().await {
            let guard: AccessGuard = match class {
                AccessClass::Shared => Box::new(Arc::clone(&lock).read_owned().await),
                AccessClass::Exclusive => Box::new(Arc::clone(&lock).write_owned().await),
            };
            tracing::trace!(%class, "Admitted store work");

            runtime.spawn_blocking(move || {
                let _guard = guard;
                work();
            });
        }
        tracing::debug!("Sequencer queue drained; dispatcher exiting");
    }
}

impl fmt::Debug for CacheSequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSequencer")
            .field("closed", &self.jobs.is_closed())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
