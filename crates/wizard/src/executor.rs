//! Background execution funnel.
//!
//! Every piece of work the wizard moves off the interactive path goes
//! through one [`BackgroundExecutor`]. Tests plug in [`InlineExecutor`] to
//! make that work synchronous; applications use [`TokioExecutor`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

pub trait BackgroundExecutor: Send + Sync {
    fn execute(&self, task: Task);
}

/// Runs each task on the calling thread before `execute` returns.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutor;

impl BackgroundExecutor for InlineExecutor {
    fn execute(&self, task: Task) {
        task()
    }
}

/// Dispatches tasks to a tokio runtime's blocking pool.
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self {
        TokioExecutor { handle }
    }

    /// Bind to the runtime of the calling task, if there is one.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(TokioExecutor::new)
    }
}

impl BackgroundExecutor for TokioExecutor {
    fn execute(&self, task: Task) {
        // Detached: completion is reported through the task's own channel.
        drop(self.handle.spawn_blocking(task));
    }
}

/// Run `f` on `executor` and receive its result over a oneshot channel.
pub fn submit<T, F>(executor: &dyn BackgroundExecutor, f: F) -> oneshot::Receiver<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    executor.execute(Box::new(move || {
        // The receiver may already be gone; the result is then unwanted.
        let _ = tx.send(f());
    }));
    rx
}

/// Cooperative cancellation shared between a session and its background
/// tasks. Once raised it stays raised.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        CancelFlag::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ──────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn inline_runs_before_returning() {
        let hits = Arc::new(Mutex::new(0));
        let h = hits.clone();
        InlineExecutor.execute(Box::new(move || *h.lock().unwrap() += 1));
        assert_eq!(*hits.lock().unwrap(), 1);
    }

    #[test]
    fn inline_submit_result_is_ready() {
        let mut rx = submit(&InlineExecutor, || 6 * 7);
        assert_eq!(rx.try_recv().unwrap(), 42);
    }

    #[tokio::test]
    async fn tokio_executor_delivers_result() {
        let exec = TokioExecutor::current().unwrap();
        let rx = submit(&exec, || "done".to_string());
        assert_eq!(rx.await.unwrap(), "done");
    }

    #[test]
    fn tokio_executor_needs_runtime() {
        assert!(TokioExecutor::current().is_none());
    }

    #[test]
    fn cancel_flag_is_shared() {
        let a = CancelFlag::new();
        let b = a.clone();
        assert!(!b.is_cancelled());
        a.cancel();
        assert!(b.is_cancelled());
    }
}
