//! The timer host: a dedicated thread that owns every armed timer.
//!
//! Expiries are delivered on this thread's own event loop (a current-thread
//! tokio runtime), never on the caller's thread. Every timer is a one-shot;
//! recurrence happens by re-arming on the next scheduling pass. Each expiry
//! runs in its own task, so a panicking callback is confined to that task.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use belltower_core::error::{AlertsError, Result};
use tokio::runtime;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// What an armed timer means to the scheduler when it expires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// An alert reached its fire instant.
    Fire(String),
    /// The asset pre-warning lead for an alert elapsed.
    Asset(String),
    /// The minimum ring duration for an alert elapsed.
    Duration(String),
    /// The ignore coalescing window closed.
    IgnoreFlush,
    /// The post-ring snooze availability window closed.
    SnoozeWindow,
}

type Dispatch = Arc<dyn Fn(TimerEvent) + Send + Sync>;

/// Cancellation handle for one armed timer. Cancelling a timer that already
/// fired is a no-op; an expiry already in flight may still deliver once.
#[derive(Debug)]
pub struct TimerHandle(JoinHandle<()>);

impl TimerHandle {
    pub fn cancel(&self) {
        self.0.abort();
    }
}

/// Owns the "alert-timer" thread and its event loop.
pub struct TimerHost {
    handle: runtime::Handle,
    dispatch: Arc<Mutex<Option<Dispatch>>>,
    shutdown: Mutex<Option<oneshot::Sender<()>>>,
    thread: Mutex<Option<thread::JoinHandle<()>>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl TimerHost {
    /// Spin up the background thread and its event loop.
    pub fn start() -> Result<Self> {
        let rt = runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .map_err(|e| AlertsError::TimerHost(format!("runtime: {e}")))?;
        let handle = rt.handle().clone();
        let (tx, rx) = oneshot::channel::<()>();

        let thread = thread::Builder::new()
            .name("alert-timer".into())
            .spawn(move || {
                tracing::debug!("timer loop started");
                // Parks until the shutdown channel fires; dropping the
                // runtime afterwards cancels every outstanding timer.
                let _ = rt.block_on(rx);
                tracing::debug!("timer loop exited");
            })
            .map_err(|e| AlertsError::TimerHost(format!("thread spawn: {e}")))?;

        Ok(Self {
            handle,
            dispatch: Arc::new(Mutex::new(None)),
            shutdown: Mutex::new(Some(tx)),
            thread: Mutex::new(Some(thread)),
        })
    }

    /// Install the expiry callback. Expiries landing before a dispatch is
    /// installed are dropped.
    pub fn set_dispatch<F>(&self, f: F)
    where
        F: Fn(TimerEvent) + Send + Sync + 'static,
    {
        *lock(&self.dispatch) = Some(Arc::new(f));
    }

    /// Arm a one-shot timer; the dispatch callback runs on the timer thread
    /// after `delay_secs` whole seconds.
    pub fn arm_once(&self, delay_secs: u64, event: TimerEvent) -> Result<TimerHandle> {
        if lock(&self.shutdown).is_none() {
            return Err(AlertsError::TimerHost("timer host is stopped".into()));
        }
        tracing::debug!(delay_secs, ?event, "arm timer");
        let dispatch = Arc::clone(&self.dispatch);
        let task = self.handle.spawn(async move {
            tokio::time::sleep(Duration::from_secs(delay_secs)).await;
            let cb = lock(&dispatch).clone();
            if let Some(cb) = cb {
                cb(event);
            }
        });
        Ok(TimerHandle(task))
    }

    /// Signal shutdown and join the timer thread. Outstanding handles are
    /// invalidated; further arming fails.
    pub fn stop(&self) {
        let sender = lock(&self.shutdown).take();
        if let Some(tx) = sender {
            let _ = tx.send(());
        }
        let thread = lock(&self.thread).take();
        if let Some(t) = thread {
            if t.join().is_err() {
                tracing::error!("timer thread panicked during shutdown");
            }
        }
    }
}

impl Drop for TimerHost {
    fn drop(&mut self) {
        self.stop();
    }
}
