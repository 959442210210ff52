//! Bounded, per-key, cancellable job queue.
//!
//! A physical surface is a slow, stateful sink: writing a key image can take
//! milliseconds and two writes to the same key must never overlap.  The
//! [`WriteQueue`] lets several keys be written at once while guaranteeing:
//!
//! - at most `max_concurrent` jobs run at any moment;
//! - at most one job per key is running;
//! - at most one job per key is waiting; queuing again for a key that has not
//!   started yet replaces the waiting job in place (last write wins, keeping
//!   the original position);
//! - [`abort`](WriteQueue::abort) drops everything waiting, cancels the shared
//!   token, and hands back a drain future that completes once every job that
//!   was running at that moment has finished.
//!
//! # How cancellation works here (for beginners)
//!
//! Rust futures cannot be interrupted from outside in the middle of a write.
//! Instead each job receives a [`CancellationToken`] and is expected to check
//! it (`token.is_cancelled()`) before doing anything expensive.  A job that
//! never checks still runs to completion; the drain future simply waits for
//! it.  That is why `abort()` returns a future rather than finishing
//! synchronously.

use std::collections::{HashMap, VecDeque};
use std::fmt::Debug;
use std::future::Future;
use std::hash::Hash;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{join_all, BoxFuture, Shared};
use futures_util::FutureExt;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Default concurrency for one surface.
pub const DEFAULT_MAX_CONCURRENT: usize = 3;

/// The future a queued job produces once it is started.
pub type JobFuture = BoxFuture<'static, anyhow::Result<()>>;

type JobFn = Box<dyn FnOnce(CancellationToken) -> JobFuture + Send>;
type DoneSignal = Shared<oneshot::Receiver<()>>;

/// Future returned by [`WriteQueue::abort`].  Cloneable so several waiters can
/// share one drain.
pub type DrainFuture = Shared<BoxFuture<'static, ()>>;

struct QueueState<K> {
    max_concurrent: usize,
    running: bool,
    pending: VecDeque<(K, JobFn)>,
    in_flight: HashMap<u64, (K, DoneSignal)>,
    next_job_id: u64,
    cancel: CancellationToken,
    /// The most recent drain; a later abort waits for it first.
    last_drain: Option<DrainFuture>,
}

/// See the module documentation.
pub struct WriteQueue<K> {
    state: Arc<Mutex<QueueState<K>>>,
}

impl<K> Clone for WriteQueue<K> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<K> WriteQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + Sync + 'static,
{
    /// Creates a queue.  With `autostart == false` jobs are accepted but not
    /// started until [`set_running`](Self::set_running).
    pub fn new(max_concurrent: usize, autostart: bool) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState {
                max_concurrent: max_concurrent.max(1),
                running: autostart,
                pending: VecDeque::new(),
                in_flight: HashMap::new(),
                next_job_id: 0,
                cancel: CancellationToken::new(),
                last_drain: None,
            })),
        }
    }

    /// Queues `job` for `key`.
    ///
    /// `job` is not called until the queue starts it, so any expensive
    /// preparation inside it is skipped for jobs that are replaced or aborted.
    pub fn queue<F, Fut>(&self, key: K, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let boxed: JobFn = Box::new(move |token| job(token).boxed());
        {
            let mut state = self.lock();
            match state.pending.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = boxed,
                None => state.pending.push_back((key, boxed)),
            }
        }
        self.try_dequeue();
    }

    /// Starts waiting jobs while there is capacity.
    fn try_dequeue(&self) {
        loop {
            let (job_id, key, job, token, done_tx) = {
                let mut state = self.lock();
                if !state.running || state.in_flight.len() >= state.max_concurrent {
                    return;
                }
                let busy = |k: &K| state.in_flight.values().any(|(running, _)| running == k);
                let Some(index) = state.pending.iter().position(|(k, _)| !busy(k)) else {
                    return;
                };
                let Some((key, job)) = state.pending.remove(index) else {
                    return;
                };

                let (done_tx, done_rx) = oneshot::channel();
                let job_id = state.next_job_id;
                state.next_job_id += 1;
                state.in_flight.insert(job_id, (key.clone(), done_rx.shared()));
                (job_id, key, job, state.cancel.clone(), done_tx)
            };

            let queue = self.clone();
            tokio::spawn(async move {
                let outcome = AssertUnwindSafe(async move { job(token).await })
                    .catch_unwind()
                    .await;
                match outcome {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => warn!(?key, "write job failed: {e:#}"),
                    Err(_) => warn!(?key, "write job panicked"),
                }

                queue.lock().in_flight.remove(&job_id);
                let _ = done_tx.send(());
                queue.try_dequeue();
            });
        }
    }

    /// Drops all waiting jobs, cancels running ones and stops dequeuing.
    ///
    /// The returned future completes once every job running at call time has
    /// finished, and never before an earlier abort's drain.  The queue stays
    /// held until [`set_running`](Self::set_running).
    pub fn abort(&self) -> DrainFuture {
        let mut state = self.lock();

        let dropped = state.pending.len();
        state.pending.clear();
        state.running = false;
        state.cancel.cancel();
        state.cancel = CancellationToken::new();

        let waits: Vec<DoneSignal> = state.in_flight.values().map(|(_, d)| d.clone()).collect();
        let previous = state.last_drain.take();
        debug!(
            dropped,
            in_flight = waits.len(),
            "aborting write queue"
        );

        let drain: DrainFuture = async move {
            if let Some(previous) = previous {
                previous.await;
            }
            join_all(waits).await;
        }
        .boxed()
        .shared();
        state.last_drain = Some(drain.clone());
        drain
    }

    /// Releases a held queue.
    pub fn set_running(&self) {
        self.lock().running = true;
        self.try_dequeue();
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Jobs accepted but not yet started.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Jobs currently executing.
    pub fn in_flight_len(&self) -> usize {
        self.lock().in_flight.len()
    }

    fn lock(&self) -> MutexGuard<'_, QueueState<K>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Notify;
    use tokio_test::{assert_pending, assert_ready};

    /// Lets spawned tasks make progress on the current-thread test runtime.
    async fn settle() {
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
    }

    /// Queues a job that records its start and then waits on `gate`.
    fn gated_job(
        queue: &WriteQueue<u32>,
        key: u32,
        started: &Arc<Mutex<Vec<u32>>>,
        gate: &Arc<Notify>,
    ) {
        let started = Arc::clone(started);
        let gate = Arc::clone(gate);
        queue.queue(key, move |_token| async move {
            started.lock().unwrap().push(key);
            gate.notified().await;
            anyhow::Ok(())
        });
    }

    #[tokio::test]
    async fn test_five_distinct_keys_start_three() {
        // Arrange
        let queue = WriteQueue::new(3, true);
        let started = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Notify::new());

        // Act
        for key in 0..5 {
            gated_job(&queue, key, &started, &gate);
        }
        settle().await;

        // Assert
        assert_eq!(*started.lock().unwrap(), vec![0, 1, 2]);
        assert_eq!(queue.in_flight_len(), 3);
        assert_eq!(queue.pending_len(), 2);

        // Releasing one running job lets the next queued key start.
        gate.notify_one();
        settle().await;
        assert_eq!(started.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_same_unstarted_key_replaced_in_place() {
        // Arrange
        let queue: WriteQueue<u32> = WriteQueue::new(3, false);
        let ran = Arc::new(Mutex::new(Vec::new()));

        for (key, label) in [(1, "first"), (2, "other"), (1, "second")] {
            let ran = Arc::clone(&ran);
            queue.queue(key, move |_| async move {
                ran.lock().unwrap().push(label);
                anyhow::Ok(())
            });
        }
        assert_eq!(queue.pending_len(), 2);

        // Act
        queue.set_running();
        settle().await;

        // Assert
        let ran = ran.lock().unwrap();
        assert!(!ran.contains(&"first"));
        assert!(ran.contains(&"second"));
        assert!(ran.contains(&"other"));
    }

    #[tokio::test]
    async fn test_same_key_never_runs_concurrently() {
        // Arrange
        let queue = WriteQueue::new(3, true);
        let started = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Notify::new());

        // Act: key 7 is in flight, then queued again.
        gated_job(&queue, 7, &started, &gate);
        settle().await;
        gated_job(&queue, 7, &started, &gate);
        gated_job(&queue, 8, &started, &gate);
        settle().await;

        // Assert: 8 overtakes the waiting 7.
        assert_eq!(*started.lock().unwrap(), vec![7, 8]);
        assert_eq!(queue.pending_len(), 1);
    }

    #[tokio::test]
    async fn test_lazy_job_body_skipped_when_replaced() {
        let queue: WriteQueue<&'static str> = WriteQueue::new(1, false);
        let calls = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let calls = Arc::clone(&calls);
            queue.queue("img", move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { anyhow::Ok(()) }
            });
        }
        queue.set_running();
        settle().await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_job_does_not_stop_queue() {
        let queue = WriteQueue::new(1, true);
        let ok = Arc::new(AtomicUsize::new(0));

        queue.queue(1u32, |_| async { Err::<(), _>(anyhow::anyhow!("device write failed")) });
        let ok2 = Arc::clone(&ok);
        queue.queue(2u32, move |_| async move {
            ok2.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        });
        settle().await;

        assert_eq!(ok.load(Ordering::SeqCst), 1);
        assert_eq!(queue.in_flight_len(), 0);
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let queue = WriteQueue::new(1, true);
        let ok = Arc::new(AtomicUsize::new(0));

        queue.queue(1u32, |_| async {
            let frame: Option<()> = None;
            frame.expect("driver bug");
            anyhow::Ok(())
        });
        let ok2 = Arc::clone(&ok);
        queue.queue(2u32, move |_| async move {
            ok2.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        });
        settle().await;

        assert_eq!(ok.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_drains_only_after_in_flight_jobs_settle() {
        // Arrange
        let queue = WriteQueue::new(3, true);
        let started = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Notify::new());
        for key in 0..5 {
            gated_job(&queue, key, &started, &gate);
        }
        settle().await;

        // Act
        let mut drain = tokio_test::task::spawn(queue.abort());

        // Assert: waiting jobs are dropped, the drain waits for 3 running jobs.
        assert_eq!(queue.pending_len(), 0);
        assert_pending!(drain.poll());

        gate.notify_one();
        gate.notify_one();
        settle().await;
        assert_pending!(drain.poll());

        gate.notify_one();
        settle().await;
        assert_ready!(drain.poll());

        // No new job starts until the queue is resumed.
        gated_job(&queue, 9, &started, &gate);
        settle().await;
        assert_eq!(started.lock().unwrap().len(), 3);
        queue.set_running();
        settle().await;
        assert_eq!(started.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_abort_signals_cancellation_token() {
        // Arrange
        let queue = WriteQueue::new(3, true);
        let observed = Arc::new(AtomicUsize::new(0));
        let observed2 = Arc::clone(&observed);
        queue.queue(1u32, move |token| async move {
            token.cancelled().await;
            observed2.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        });
        settle().await;

        // Act
        tokio::time::timeout(Duration::from_secs(1), queue.abort())
            .await
            .expect("drain must complete once the job observes cancellation");

        // Assert
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_abort_with_nothing_in_flight_is_immediate() {
        let queue: WriteQueue<u32> = WriteQueue::new(3, true);
        let mut drain = tokio_test::task::spawn(queue.abort());
        assert_ready!(drain.poll());
    }

    #[tokio::test]
    async fn test_second_abort_waits_for_first_drain() {
        // Arrange
        let queue = WriteQueue::new(3, true);
        let started = Arc::new(Mutex::new(Vec::new()));
        let gate = Arc::new(Notify::new());
        gated_job(&queue, 1, &started, &gate);
        settle().await;

        // Act
        let mut first = tokio_test::task::spawn(queue.abort());
        let mut second = tokio_test::task::spawn(queue.abort());

        // Assert
        assert_pending!(first.poll());
        assert_pending!(second.poll());
        gate.notify_one();
        settle().await;
        assert_ready!(first.poll());
        assert_ready!(second.poll());
    }
}
