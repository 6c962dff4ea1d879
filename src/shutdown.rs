use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use crate::pending::PendingTable;

/// Process lifecycle as seen by the broker and the hosting server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Running,
    Draining,
    Stopped,
}

/// Drives `Running -> Draining -> Stopped` off an abstract termination
/// event.
///
/// On trigger, submission is closed immediately; requests already accepted
/// keep being serviced for up to the grace timeout, then whatever is still
/// pending is force-cancelled and the pool and hosting server are told to
/// stop. Re-entrant triggers are ignored.
pub struct ShutdownCoordinator {
    state: watch::Sender<Lifecycle>,
    pending: PendingTable,
    closed: Arc<AtomicBool>,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub(crate) fn new(pending: PendingTable, closed: Arc<AtomicBool>, grace: Duration) -> Self {
        let (state, _) = watch::channel(Lifecycle::Running);
        Self {
            state,
            pending,
            closed,
            grace,
        }
    }

    pub fn lifecycle(&self) -> watch::Receiver<Lifecycle> {
        self.state.subscribe()
    }

    pub fn state(&self) -> Lifecycle {
        *self.state.subscribe().borrow()
    }

    /// Waits for `signal`, then drains.
    pub async fn run(&self, signal: impl Future<Output = ()>) {
        signal.await;
        info!("termination signal received");
        self.drain().await;
    }

    /// Runs the drain protocol to completion. A second concurrent or later
    /// call observes the transition already made and returns immediately.
    pub async fn drain(&self) {
        let started = self.state.send_if_modified(|state| {
            if *state == Lifecycle::Running {
                // Submission must be closed by the time Draining is
                // observable.
                self.closed.store(true, Ordering::SeqCst);
                *state = Lifecycle::Draining;
                true
            } else {
                false
            }
        });
        if !started {
            debug!("shutdown already in progress, ignoring");
            return;
        }

        info!(
            pending = self.pending.len(),
            grace_ms = self.grace.as_millis() as u64,
            "draining in-flight requests"
        );

        let deadline = Instant::now() + self.grace;
        while !self.pending.is_empty() && Instant::now() < deadline {
            sleep(Duration::from_millis(5)).await;
        }

        let leftovers = self.pending.snapshot();
        if leftovers.is_empty() {
            info!("all in-flight requests settled before the grace deadline");
        } else {
            warn!(
                abandoned = leftovers.len(),
                "grace period elapsed, cancelling remaining requests"
            );
            for id in leftovers {
                self.pending.cancel(id);
            }
        }

        // send_replace: the transition must land even when every receiver
        // is already gone, so a late subscriber still reads Stopped.
        self.state.send_replace(Lifecycle::Stopped);
        info!("shutdown complete");
    }
}

/// Hosting-server side of the stop handshake: a readable flag plus an
/// awaitable stop event, both derived from the coordinator's state.
#[derive(Clone)]
pub struct ServerControl {
    rx: watch::Receiver<Lifecycle>,
}

impl ServerControl {
    pub(crate) fn new(rx: watch::Receiver<Lifecycle>) -> Self {
        Self { rx }
    }

    pub fn should_exit(&self) -> bool {
        *self.rx.borrow() == Lifecycle::Stopped
    }

    /// Resolves once the process has fully stopped.
    pub async fn stopped(&mut self) {
        while *self.rx.borrow_and_update() != Lifecycle::Stopped {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Resolves on SIGINT or, on unix, SIGTERM.
pub async fn terminate_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler, falling back to ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drain_with_empty_table_stops_immediately() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator =
            ShutdownCoordinator::new(pending, closed.clone(), Duration::from_secs(5));

        coordinator.drain().await;

        assert_eq!(coordinator.state(), Lifecycle::Stopped);
        assert!(closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn second_drain_is_a_no_op() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator =
            ShutdownCoordinator::new(pending, closed, Duration::from_millis(10));

        coordinator.drain().await;
        coordinator.drain().await;

        assert_eq!(coordinator.state(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn drain_cancels_requests_that_outlive_the_grace_period() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator = ShutdownCoordinator::new(
            pending.clone(),
            closed,
            Duration::from_millis(30),
        );

        let id = uuid::Uuid::new_v4();
        let rx = pending.register(id);

        coordinator.drain().await;

        assert_eq!(coordinator.state(), Lifecycle::Stopped);
        assert!(pending.is_empty());
        assert!(rx.await.is_err());
    }

    #[tokio::test]
    async fn drain_waits_for_requests_that_settle_in_time() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator = Arc::new(ShutdownCoordinator::new(
            pending.clone(),
            closed,
            Duration::from_millis(200),
        ));

        let id = uuid::Uuid::new_v4();
        let rx = pending.register(id);

        let completer = {
            let pending = pending.clone();
            tokio::spawn(async move {
                sleep(Duration::from_millis(20)).await;
                pending.complete(id, Ok(vec![1.0]));
            })
        };

        let started = Instant::now();
        coordinator.drain().await;
        completer.await.unwrap();

        assert!(started.elapsed() < Duration::from_millis(150));
        assert_eq!(rx.await.unwrap(), Ok(vec![1.0]));
    }

    #[tokio::test]
    async fn stop_is_published_even_with_no_subscribers() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator =
            ShutdownCoordinator::new(pending, closed, Duration::from_millis(10));

        // No receiver exists while the drain runs.
        coordinator.drain().await;
        assert_eq!(coordinator.state(), Lifecycle::Stopped);

        // A subscriber arriving after the fact still sees the stop.
        let mut control = ServerControl::new(coordinator.lifecycle());
        assert!(control.should_exit());
        control.stopped().await;
    }

    #[tokio::test]
    async fn submission_is_closed_before_draining_is_observable() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator = Arc::new(ShutdownCoordinator::new(
            pending.clone(),
            closed.clone(),
            Duration::from_millis(200),
        ));

        let id = uuid::Uuid::new_v4();
        let rx = pending.register(id);

        let mut lifecycle = coordinator.lifecycle();
        let drainer = {
            let coordinator = coordinator.clone();
            tokio::spawn(async move { coordinator.drain().await })
        };

        lifecycle.changed().await.unwrap();
        assert_eq!(*lifecycle.borrow(), Lifecycle::Draining);
        assert!(closed.load(Ordering::SeqCst));

        pending.complete(id, Ok(vec![1.0]));
        drainer.await.unwrap();
        assert_eq!(rx.await.unwrap(), Ok(vec![1.0]));
        assert_eq!(coordinator.state(), Lifecycle::Stopped);
    }

    #[tokio::test]
    async fn server_control_observes_the_stop() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator =
            ShutdownCoordinator::new(pending, closed, Duration::from_millis(10));
        let mut control = ServerControl::new(coordinator.lifecycle());

        assert!(!control.should_exit());
        coordinator.drain().await;
        control.stopped().await;
        assert!(control.should_exit());
    }

    #[tokio::test]
    async fn run_drains_after_the_signal_fires() {
        let pending = PendingTable::new();
        let closed = Arc::new(AtomicBool::new(false));
        let coordinator =
            ShutdownCoordinator::new(pending, closed, Duration::from_millis(10));

        coordinator.run(async {}).await;
        assert_eq!(coordinator.state(), Lifecycle::Stopped);
    }
}
