//! Keyed background task submission and restartable loops.
//!
//! A key names a target (e.g. the terminal). While a task for a key is in
//! flight, further submissions for that key are refused.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashSet;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    Started,
    AlreadyRunning,
}

/// Removes the key when the task ends, including on panic.
struct InFlightGuard {
    key: String,
    in_flight: Arc<DashSet<String>>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.remove(&self.key);
        debug!(key = %self.key, "Task finished");
    }
}

#[derive(Clone, Default)]
pub struct TaskRunner {
    in_flight: Arc<DashSet<String>>,
    tracker: TaskTracker,
}

impl TaskRunner {
    pub fn new() -> Self {
        Self::default()
    }

    fn claim(&self, key: &str) -> Option<InFlightGuard> {
        if !self.in_flight.insert(key.to_string()) {
            warn!(key, "Task already running, submission refused");
            return None;
        }
        Some(InFlightGuard {
            key: key.to_string(),
            in_flight: self.in_flight.clone(),
        })
    }

    /// Spawn `task` under `key` unless one is already in flight.
    pub fn submit<F>(&self, key: &str, task: F) -> Submission
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let Some(guard) = self.claim(key) else {
            return Submission::AlreadyRunning;
        };
        debug!(key, "Task submitted");
        self.tracker.spawn(async move {
            let _guard = guard;
            task.await;
        });
        Submission::Started
    }

    /// Run `task` inline under `key`. `None` when the key is busy.
    pub async fn run_exclusive<F, T>(&self, key: &str, task: F) -> Option<T>
    where
        F: Future<Output = T>,
    {
        let _guard = self.claim(key)?;
        Some(task.await)
    }

    pub fn is_running(&self, key: &str) -> bool {
        self.in_flight.contains(key)
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Stop accepting work and wait for everything in flight.
    pub async fn shutdown(&self) {
        self.tracker.close();
        info!(tasks = self.tracker.len(), "Waiting for in-flight tasks");
        self.tracker.wait().await;
    }
}

struct RunningLoop {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// One background loop that can be started and stopped repeatedly.
///
/// Starting while running and stopping while stopped do nothing. Stopping
/// cancels the loop's token and waits for the task, so a loop that only
/// checks the token between iterations finishes its current one.
pub struct LoopSlot {
    name: &'static str,
    running: Mutex<Option<RunningLoop>>,
}

impl LoopSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            running: Mutex::new(None),
        }
    }

    /// Spawn `run` with a fresh token. `false` when already running.
    pub fn start<F, Fut>(&self, run: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let mut running = self.running.lock();
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            debug!(name = self.name, "Loop already running");
            return false;
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(run(token.clone()));
        *running = Some(RunningLoop { token, handle });
        info!(name = self.name, "Loop started");
        true
    }

    /// Cancel the loop and wait for it. `false` when it was not running.
    pub async fn stop(&self) -> bool {
        let Some(RunningLoop { token, handle }) = self.running.lock().take() else {
            debug!(name = self.name, "Loop not running");
            return false;
        };
        let was_running = !handle.is_finished();
        token.cancel();
        if let Err(e) = handle.await {
            error!(name = self.name, error = %e, "Loop ended abnormally");
        }
        info!(name = self.name, "Loop stopped");
        was_running
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn test_duplicate_key_refused() {
        let runner = TaskRunner::new();
        let (tx, rx) = oneshot::channel::<()>();

        assert_eq!(
            runner.submit("terminal", async move {
                let _ = rx.await;
            }),
            Submission::Started
        );
        assert!(runner.is_running("terminal"));
        assert_eq!(runner.submit("terminal", async {}), Submission::AlreadyRunning);
        assert_eq!(runner.submit("client", async {}), Submission::Started);

        tx.send(()).unwrap();
        runner.shutdown().await;
        assert!(!runner.is_running("terminal"));
        assert_eq!(runner.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_key_released_after_completion() {
        let runner = TaskRunner::new();
        runner.submit("terminal", async {});
        tokio::time::timeout(Duration::from_secs(1), async {
            while runner.is_running("terminal") {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert_eq!(runner.submit("terminal", async {}), Submission::Started);
    }

    #[tokio::test]
    async fn test_run_exclusive() {
        let runner = TaskRunner::new();
        assert_eq!(runner.run_exclusive("client", async { 7 }).await, Some(7));

        let (tx, rx) = oneshot::channel::<()>();
        runner.submit("client", async move {
            let _ = rx.await;
        });
        assert_eq!(runner.run_exclusive("client", async { 7 }).await, None);
        tx.send(()).unwrap();
        runner.shutdown().await;
    }

    #[test]
    fn test_run_exclusive_holds_key_while_pending() {
        let runner = TaskRunner::new();
        let (tx, rx) = oneshot::channel::<()>();
        let mut task = tokio_test::task::spawn(runner.run_exclusive("terminal", async move {
            let _ = rx.await;
        }));

        tokio_test::assert_pending!(task.poll());
        assert!(runner.is_running("terminal"));

        tx.send(()).unwrap();
        assert!(task.is_woken());
        assert_eq!(tokio_test::assert_ready!(task.poll()), Some(()));
        assert!(!runner.is_running("terminal"));
    }

    #[tokio::test]
    async fn test_shutdown_waits_for_in_flight() {
        let runner = TaskRunner::new();
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        runner.submit("slow", async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = tx.send(()).await;
        });
        runner.shutdown().await;
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_slot_start_and_stop_are_idempotent() {
        let slot = LoopSlot::new("ticker");
        let ticks = Arc::new(std::sync::atomic::AtomicUsize::new(0));

        let counter = ticks.clone();
        assert!(slot.start(move |token| async move {
            token.cancelled().await;
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }));
        assert!(slot.is_running());
        assert!(!slot.start(|_| async {}));

        assert!(slot.stop().await);
        assert!(!slot.is_running());
        assert!(!slot.stop().await);
        assert_eq!(ticks.load(std::sync::atomic::Ordering::SeqCst), 1);

        assert!(slot.start(|token| async move { token.cancelled().await }));
        assert!(slot.stop().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_loop_slot_stop_waits_for_current_iteration() {
        let slot = LoopSlot::new("slow");
        let (tx, mut rx) = tokio::sync::mpsc::channel(1);
        slot.start(move |token| async move {
            while !token.is_cancelled() {
                tokio::time::sleep(Duration::from_secs(5)).await;
                let _ = tx.send(()).await;
            }
        });

        tokio::time::sleep(Duration::from_secs(1)).await;
        slot.stop().await;
        assert!(rx.try_recv().is_ok());
    }
}
