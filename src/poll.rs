//! Periodic fetchers.
//!
//! A [`Poller`] owns one timer and one cancellation flag. Each tick runs the
//! fetch closure; `Ok(Some(value))` is delivered on the poller's channel,
//! `Ok(None)` means "nothing yet" and errors are logged and retried on the
//! next tick. Stopping aborts an in-flight fetch and guarantees that nothing
//! is delivered afterwards.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

pub struct Poller<T> {
    name: &'static str,
    period: Duration,
    task: Option<JoinHandle<()>>,
    cancelled: Arc<AtomicBool>,
    tx: UnboundedSender<T>,
}

impl<T: Send + 'static> Poller<T> {
    /// Creates a stopped poller and the receiving end of its channel.
    pub fn new(name: &'static str, period: Duration) -> (Self, UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poller = Self {
            name,
            period,
            task: None,
            cancelled: Arc::new(AtomicBool::new(true)),
            tx,
        };
        (poller, rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_running(&self) -> bool {
        self.task.is_some()
    }

    /// Starts polling; the first fetch happens one period from now.
    /// No-op while already running.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<F, Fut>(&mut self, mut fetch: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<Option<T>>> + Send + 'static,
    {
        if self.task.is_some() {
            return;
        }

        // A fresh flag per run: a late result from the previous run keeps
        // seeing its own, already set, flag.
        let cancelled = Arc::new(AtomicBool::new(false));
        self.cancelled = Arc::clone(&cancelled);
        let tx = self.tx.clone();
        let name = self.name;
        let period = self.period;

        debug!(poller = name, period_ms = period.as_millis() as u64, "Poller started");
        self.task = Some(tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + period, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                match fetch().await {
                    Ok(Some(value)) => {
                        if cancelled.load(Ordering::SeqCst) {
                            break;
                        }
                        if tx.send(value).is_err() {
                            debug!(poller = name, "Receiver dropped, stopping");
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!(poller = name, error = %e, "Poll failed"),
                }
            }
        }));
    }

    /// Stops polling. Idempotent.
    pub fn stop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
            debug!(poller = self.name, "Poller stopped");
        }
    }
}

impl<T> Drop for Poller<T> {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
