//! Windowed call statistics.
//!
//! Each Statistics stream owns one [`StatWindow`]. Every intercepted call
//! increments every open window; a per-window timer task periodically takes
//! the window's contents (leaving a zeroed window behind) and hands the
//! snapshot to the stream owner.
//!
//! The take-and-reset happens under the aggregator lock, so a call is
//! counted in exactly one emitted window. Delivery happens after the lock
//! is released and never stalls `record`.

use crate::errors::BastionError;
use crate::observability::metrics;
use common::types::ConsumerId;
use parking_lot::Mutex;
use proto_gen::bastion::Stat;
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_stream::Stream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Default upper bound on a requested emission interval.
pub const DEFAULT_MAX_STAT_INTERVAL: Duration = Duration::from_secs(3600);

/// Call counters accumulated between two emissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatWindow {
    pub by_method: HashMap<String, u64>,
    pub by_consumer: HashMap<ConsumerId, u64>,
}

impl StatWindow {
    /// Count one call of `method` by `consumer`.
    pub fn record(&mut self, consumer: &ConsumerId, method: &str) {
        *self.by_method.entry(method.to_string()).or_default() += 1;
        *self.by_consumer.entry(consumer.clone()).or_default() += 1;
    }

    /// Total number of calls counted in this window.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.by_method.values().sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_method.is_empty()
    }
}

/// An emitted window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatSnapshot {
    /// Unix timestamp (seconds) of the emission.
    pub timestamp: i64,
    pub window: StatWindow,
}

impl From<StatSnapshot> for Stat {
    fn from(snapshot: StatSnapshot) -> Self {
        Stat {
            timestamp: snapshot.timestamp,
            by_method: snapshot.window.by_method,
            by_consumer: snapshot
                .window
                .by_consumer
                .into_iter()
                .map(|(consumer, count)| (consumer.into(), count))
                .collect(),
        }
    }
}

struct OpenWindow {
    id: u64,
    window: StatWindow,
}

struct StatsInner {
    next_id: AtomicU64,
    max_interval: Duration,
    shutdown: CancellationToken,
    windows: Mutex<HashMap<ConsumerId, OpenWindow>>,
}

impl StatsInner {
    /// Swap the window for a zeroed one and return the old contents.
    fn take(&self, consumer: &ConsumerId, id: u64) -> Option<StatWindow> {
        let mut windows = self.windows.lock();
        windows
            .get_mut(consumer)
            .filter(|open| open.id == id)
            .map(|open| std::mem::take(&mut open.window))
    }

    fn remove(&self, consumer: &ConsumerId, id: u64) -> bool {
        let mut windows = self.windows.lock();
        let owned = windows.get(consumer).is_some_and(|open| open.id == id);
        if owned {
            windows.remove(consumer);
            metrics::set_stat_windows_active(windows.len());
        }
        owned
    }
}

/// Registry of open statistics windows.
///
/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct StatsAggregator {
    inner: Arc<StatsInner>,
}

impl StatsAggregator {
    /// Create an aggregator.
    ///
    /// Windows reject intervals above `max_interval`. Cancelling `shutdown`
    /// stops every window timer, which ends the owners' streams.
    #[must_use]
    pub fn new(max_interval: Duration, shutdown: CancellationToken) -> Self {
        Self {
            inner: Arc::new(StatsInner {
                next_id: AtomicU64::new(1),
                max_interval,
                shutdown,
                windows: Mutex::new(HashMap::new()),
            }),
        }
    }

    #[must_use]
    pub fn max_interval(&self) -> Duration {
        self.inner.max_interval
    }

    /// Open a zeroed window for `consumer`, emitted every `interval`.
    ///
    /// Must be called from within a tokio runtime: the emission timer runs
    /// on a spawned task.
    ///
    /// # Errors
    ///
    /// - [`BastionError::InvalidInterval`] if `interval` is zero or above the
    ///   configured maximum
    /// - [`BastionError::AlreadySubscribed`] if `consumer` already has a window
    pub fn open_window(
        &self,
        consumer: ConsumerId,
        interval: Duration,
    ) -> Result<StatWindowHandle, BastionError> {
        if interval.is_zero() {
            return Err(BastionError::InvalidInterval(
                "interval must be greater than zero".to_string(),
            ));
        }
        if interval > self.inner.max_interval {
            return Err(BastionError::InvalidInterval(format!(
                "interval must not exceed {}s",
                self.inner.max_interval.as_secs()
            )));
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        {
            let mut windows = self.inner.windows.lock();
            if windows.contains_key(&consumer) {
                debug!(
                    target: "bastion.stats",
                    consumer = %consumer,
                    "Rejected duplicate statistics window"
                );
                return Err(BastionError::AlreadySubscribed(consumer.to_string()));
            }
            windows.insert(
                consumer.clone(),
                OpenWindow {
                    id,
                    window: StatWindow::default(),
                },
            );
            metrics::set_stat_windows_active(windows.len());
        }

        let cancel = self.inner.shutdown.child_token();
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(run_timer(
            Arc::clone(&self.inner),
            consumer.clone(),
            id,
            interval,
            tx,
            cancel.clone(),
        ));

        info!(
            target: "bastion.stats",
            consumer = %consumer,
            interval_secs = interval.as_secs_f64(),
            "Statistics window opened"
        );

        Ok(StatWindowHandle {
            consumer,
            id,
            rx,
            cancel,
            inner: Arc::clone(&self.inner),
            closed: false,
        })
    }

    /// Count one call of `method` by `consumer` in every open window.
    pub fn record(&self, consumer: &ConsumerId, method: &str) {
        let mut windows = self.inner.windows.lock();
        for open in windows.values_mut() {
            open.window.record(consumer, method);
        }
    }

    /// Cancel the window's timer and remove it. Idempotent.
    pub fn close_window(&self, handle: &mut StatWindowHandle) -> bool {
        handle.close()
    }

    /// Number of open windows.
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.inner.windows.lock().len()
    }

    /// Copy of `consumer`'s current (not yet emitted) window.
    #[must_use]
    pub fn peek(&self, consumer: &str) -> Option<StatWindow> {
        self.inner
            .windows
            .lock()
            .get(consumer)
            .map(|open| open.window.clone())
    }
}

/// Emit `consumer`'s window every `interval` until cancelled or the owner
/// stops listening.
async fn run_timer(
    inner: Arc<StatsInner>,
    consumer: ConsumerId,
    id: u64,
    interval: Duration,
    tx: mpsc::Sender<StatSnapshot>,
    cancel: CancellationToken,
) {
    let mut ticker = interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(window) = inner.take(&consumer, id) else {
            break;
        };
        let snapshot = StatSnapshot {
            timestamp: chrono::Utc::now().timestamp(),
            window,
        };

        tokio::select! {
            () = cancel.cancelled() => break,
            sent = tx.send(snapshot) => {
                if sent.is_err() {
                    debug!(target: "bastion.stats", consumer = %consumer, "Window owner gone");
                    break;
                }
                metrics::record_stat_snapshot();
            }
        }
    }

    inner.remove(&consumer, id);
    debug!(target: "bastion.stats", consumer = %consumer, "Statistics timer stopped");
}

/// A consumer's handle on its statistics window.
///
/// Yields one [`StatSnapshot`] per interval. Dropping the handle closes the
/// window.
pub struct StatWindowHandle {
    consumer: ConsumerId,
    id: u64,
    rx: mpsc::Receiver<StatSnapshot>,
    cancel: CancellationToken,
    inner: Arc<StatsInner>,
    closed: bool,
}

impl StatWindowHandle {
    #[must_use]
    pub fn consumer(&self) -> &ConsumerId {
        &self.consumer
    }

    /// Wait for the next emission. Returns `None` once the window is closed.
    pub async fn recv(&mut self) -> Option<StatSnapshot> {
        self.rx.recv().await
    }

    /// Stop the timer and remove the window. Idempotent.
    pub fn close(&mut self) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        self.cancel.cancel();
        self.rx.close();
        let removed = self.inner.remove(&self.consumer, self.id);
        if removed {
            info!(
                target: "bastion.stats",
                consumer = %self.consumer,
                "Statistics window closed"
            );
        }
        removed
    }
}

impl Stream for StatWindowHandle {
    type Item = StatSnapshot;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

impl Drop for StatWindowHandle {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for StatWindowHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatWindowHandle")
            .field("consumer", &self.consumer)
            .field("id", &self.id)
            .field("closed", &self.closed)
            .finish_non_exhaustive()
    }
}
