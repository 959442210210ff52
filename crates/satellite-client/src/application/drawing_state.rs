//! Named drawing state wrapped around a per-surface [`WriteQueue`].
//!
//! A surface is always drawing *for some reason*: normal key images, a blank
//! screen, the lock keypad, a status card.  When the reason changes, frames
//! queued for the old reason must not land after the new one has started.
//! [`DrawingState::abort_queued`] enforces that:
//!
//! 1. the label changes and a fresh, held queue replaces the old one;
//! 2. the old queue is aborted and drained;
//! 3. the optional pre-queue step (usually "blank the device") runs;
//! 4. only then does the new queue start.
//!
//! Jobs may be queued for the new state immediately after step 1; they simply
//! wait in the held queue.

use std::fmt;
use std::future::Future;
use std::hash::Hash;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, Shared};
use futures_util::FutureExt;
use tokio_util::sync::CancellationToken;

use super::write_queue::{WriteQueue, DEFAULT_MAX_CONCURRENT};

/// Why the surface is currently being drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawState {
    /// Server-driven key images.
    Draw,
    Blank,
    /// Pincode keypad overlay.
    Locked,
    /// Full-surface status card.
    Status,
    Reinit,
    Closed,
}

impl fmt::Display for DrawState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            DrawState::Draw => "draw",
            DrawState::Blank => "blank",
            DrawState::Locked => "locked",
            DrawState::Status => "status",
            DrawState::Reinit => "reinit",
            DrawState::Closed => "closed",
        };
        f.write_str(label)
    }
}

/// Completion of one state transition.
pub type Transition = Shared<BoxFuture<'static, ()>>;

struct Inner<K> {
    state: DrawState,
    queue: WriteQueue<K>,
    /// The latest transition; the next one chains after it.
    transition: Option<Transition>,
}

pub struct DrawingState<K> {
    inner: Mutex<Inner<K>>,
    max_concurrent: usize,
}

impl<K> DrawingState<K>
where
    K: Clone + Eq + Hash + fmt::Debug + Send + Sync + 'static,
{
    pub fn new(initial: DrawState) -> Self {
        Self::with_concurrency(initial, DEFAULT_MAX_CONCURRENT)
    }

    pub fn with_concurrency(initial: DrawState, max_concurrent: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: initial,
                queue: WriteQueue::new(max_concurrent, true),
                transition: None,
            }),
            max_concurrent,
        }
    }

    pub fn state(&self) -> DrawState {
        self.lock().state
    }

    /// Queues a job under the current state.
    ///
    /// The state lock is held while enqueuing, so a concurrent
    /// [`abort_queued`](Self::abort_queued) either discards the job or hands
    /// it to the new state's queue; it never lands on a retired queue.
    pub fn queue_job<F, Fut>(&self, key: K, job: F)
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let inner = self.lock();
        inner.queue.queue(key, job);
    }

    /// Switches to `new_state`, discarding work queued under the old one.
    ///
    /// `before_run` runs after the old queue has drained and before any job of
    /// the new state starts.  Transitions complete in call order.  The returned
    /// future resolves when this transition has finished; it also makes
    /// progress without being awaited.
    pub fn abort_queued(
        &self,
        new_state: DrawState,
        before_run: Option<BoxFuture<'static, ()>>,
    ) -> Transition {
        let mut inner = self.lock();

        let fresh = WriteQueue::new(self.max_concurrent, false);
        let old = std::mem::replace(&mut inner.queue, fresh.clone());
        inner.state = new_state;

        let drain = old.abort();
        let previous = inner.transition.take();

        let transition: Transition = async move {
            if let Some(previous) = previous {
                previous.await;
            }
            drain.await;
            if let Some(before_run) = before_run {
                before_run.await;
            }
            fresh.set_running();
        }
        .boxed()
        .shared();

        inner.transition = Some(transition.clone());
        tokio::spawn(transition.clone());
        transition
    }

    /// Resolves once the most recent transition has completed.
    pub fn settled(&self) -> BoxFuture<'static, ()> {
        match self.lock().transition.clone() {
            Some(transition) => transition.boxed(),
            None => futures_util::future::ready(()).boxed(),
        }
    }

    /// Jobs waiting plus jobs running in the current queue.
    pub fn outstanding(&self) -> usize {
        let queue = self.lock().queue.clone();
        queue.pending_len() + queue.in_flight_len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner<K>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::time::Duration;

    use tokio::sync::Notify;

    type Log = Arc<Mutex<Vec<&'static str>>>;

    fn push(log: &Log, entry: &'static str) {
        log.lock().unwrap().push(entry);
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(DrawState::Locked.to_string(), "locked");
        assert_eq!(DrawState::Status.to_string(), "status");
    }

    #[tokio::test]
    async fn test_pre_queue_callback_happens_before_new_state_jobs() {
        // Arrange: one slow job in flight under `Draw`.
        let drawing: DrawingState<u32> = DrawingState::new(DrawState::Draw);
        let log: Log = Arc::default();
        let gate = Arc::new(Notify::new());
        {
            let log = Arc::clone(&log);
            let gate = Arc::clone(&gate);
            drawing.queue_job(1, move |_| async move {
                gate.notified().await;
                push(&log, "old-frame");
                anyhow::Ok(())
            });
        }
        tokio::task::yield_now().await;

        // Act: switch to `Locked`, blanking first, and queue a lock frame.
        let blank_log = Arc::clone(&log);
        let transition = drawing.abort_queued(
            DrawState::Locked,
            Some(async move { push(&blank_log, "blank") }.boxed()),
        );
        let job_log = Arc::clone(&log);
        drawing.queue_job(1, move |_| async move {
            push(&job_log, "lock-frame");
            anyhow::Ok(())
        });
        assert_eq!(drawing.state(), DrawState::Locked);

        gate.notify_one();
        transition.await;
        drawing.settled().await;
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["old-frame", "blank", "lock-frame"]);
    }

    #[tokio::test]
    async fn test_jobs_wait_while_transition_is_pending() {
        // Arrange
        let drawing: DrawingState<u32> = DrawingState::new(DrawState::Blank);
        let release = Arc::new(Notify::new());
        let ran: Log = Arc::default();

        // Act
        let release2 = Arc::clone(&release);
        let _transition = drawing.abort_queued(
            DrawState::Draw,
            Some(async move { release2.notified().await }.boxed()),
        );
        let ran2 = Arc::clone(&ran);
        drawing.queue_job(3, move |_| async move {
            push(&ran2, "job");
            anyhow::Ok(())
        });
        tokio::time::sleep(Duration::from_millis(20)).await;

        // Assert
        assert!(ran.lock().unwrap().is_empty());
        assert_eq!(drawing.outstanding(), 1);

        release.notify_one();
        drawing.settled().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(*ran.lock().unwrap(), vec!["job"]);
    }

    #[tokio::test]
    async fn test_transitions_run_callbacks_in_call_order() {
        let drawing: DrawingState<u32> = DrawingState::new(DrawState::Draw);
        let log: Log = Arc::default();

        for (state, label) in [
            (DrawState::Blank, "blank"),
            (DrawState::Status, "status"),
            (DrawState::Locked, "locked"),
        ] {
            let log = Arc::clone(&log);
            let _ = drawing.abort_queued(state, Some(async move { push(&log, label) }.boxed()));
        }
        drawing.settled().await;

        assert_eq!(*log.lock().unwrap(), vec!["blank", "status", "locked"]);
        assert_eq!(drawing.state(), DrawState::Locked);
    }

    #[tokio::test]
    async fn test_abort_cancels_in_flight_token() {
        // Arrange
        let drawing: DrawingState<u32> = DrawingState::new(DrawState::Draw);
        let log: Log = Arc::default();
        let log2 = Arc::clone(&log);
        drawing.queue_job(5, move |token| async move {
            token.cancelled().await;
            push(&log2, "cancelled");
            anyhow::Ok(())
        });
        tokio::task::yield_now().await;

        // Act
        tokio::time::timeout(
            Duration::from_secs(1),
            drawing.abort_queued(DrawState::Closed, None),
        )
        .await
        .expect("transition completes once the job exits");

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["cancelled"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_job_queued_during_transition_is_never_lost() {
        // Arrange
        let drawing: Arc<DrawingState<u32>> = Arc::new(DrawingState::new(DrawState::Draw));
        let started = Arc::new(AtomicUsize::new(0));

        for round in 0..200u32 {
            // Act: race one enqueue against one state change.
            let barrier = Arc::new(Barrier::new(2));
            let queuer = {
                let (drawing, started, barrier) =
                    (Arc::clone(&drawing), Arc::clone(&started), Arc::clone(&barrier));
                tokio::task::spawn_blocking(move || {
                    barrier.wait();
                    drawing.queue_job(round, move |_| async move {
                        started.fetch_add(1, Ordering::SeqCst);
                        anyhow::Ok(())
                    });
                })
            };
            let aborter = {
                let (drawing, barrier) = (Arc::clone(&drawing), Arc::clone(&barrier));
                tokio::task::spawn_blocking(move || {
                    barrier.wait();
                    let _ = drawing.abort_queued(DrawState::Draw, None);
                })
            };
            queuer.await.unwrap();
            aborter.await.unwrap();
            drawing.settled().await;

            // Assert: the job started on the old queue or on the new one.
            let expected = round as usize + 1;
            let mut waited = 0;
            while started.load(Ordering::SeqCst) < expected && waited < 100 {
                tokio::time::sleep(Duration::from_millis(10)).await;
                waited += 1;
            }
            assert_eq!(started.load(Ordering::SeqCst), expected, "round {round}");
        }
    }
}
