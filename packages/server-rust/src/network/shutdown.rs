//! Lifecycle controller with in-flight request tracking.
//!
//! Uses `ArcSwap` for lock-free state transitions, an atomic counter with
//! RAII guards for in-flight tracking, a root `CancellationToken` that
//! every request context derives from, and a separate token that severs
//! accepted connections.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Server lifecycle state.
///
/// State machine: Starting -> Serving -> `ShuttingDown` -> Stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    /// Listener not yet accepting requests.
    Starting,
    /// Listener bound and accepting requests.
    Serving,
    /// Termination requested; in-flight requests are draining.
    ShuttingDown,
    /// Listener closed.
    Stopped,
}

impl LifecycleState {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Serving => "serving",
            Self::ShuttingDown => "shutting_down",
            Self::Stopped => "stopped",
        }
    }
}

/// Coordinates shutdown across the server:
/// 1. Health probes read `state()` to report readiness
/// 2. `trigger_shutdown()` moves to `ShuttingDown` and notifies listeners
/// 3. `force_close()` severs open connections and cancels every live
///    request context once the grace period is spent
#[derive(Debug)]
pub struct ShutdownController {
    shutdown_signal: watch::Sender<bool>,
    in_flight: Arc<AtomicU64>,
    state: Arc<ArcSwap<LifecycleState>>,
    root: CancellationToken,
    connections: CancellationToken,
}

impl ShutdownController {
    /// Creates a new controller in the `Starting` state.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            shutdown_signal: tx,
            in_flight: Arc::new(AtomicU64::new(0)),
            state: Arc::new(ArcSwap::from_pointee(LifecycleState::Starting)),
            root: CancellationToken::new(),
            connections: CancellationToken::new(),
        }
    }

    /// Transitions to `Serving`.
    pub fn set_serving(&self) {
        self.state.store(Arc::new(LifecycleState::Serving));
    }

    /// Returns a receiver that flips to `true` when shutdown is triggered.
    #[must_use]
    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_signal.subscribe()
    }

    /// Transitions to `ShuttingDown` and signals all shutdown receivers.
    /// Calling it again has no further effect.
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(LifecycleState::ShuttingDown));
        self.shutdown_signal.send_replace(true);
    }

    /// Severs every accepted connection, then cancels the root token and
    /// with it every live request context. Connections go first so that no
    /// reply produced by a cancelled handler reaches the wire.
    pub fn force_close(&self) {
        self.connections.cancel();
        self.root.cancel();
    }

    /// Transitions to `Stopped`.
    pub fn mark_stopped(&self) {
        self.state.store(Arc::new(LifecycleState::Stopped));
    }

    #[must_use]
    pub fn state(&self) -> LifecycleState {
        **self.state.load()
    }

    /// Token that request contexts are derived from.
    #[must_use]
    pub fn root_token(&self) -> &CancellationToken {
        &self.root
    }

    /// Token that accepted connections watch; see [`super::connection`].
    #[must_use]
    pub fn connection_token(&self) -> CancellationToken {
        self.connections.clone()
    }

    /// Creates an RAII guard that tracks an in-flight request.
    ///
    /// The counter is decremented when the guard is dropped, even if the
    /// handler panics or its future is dropped mid-flight.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.fetch_add(1, Ordering::Relaxed);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.load(Ordering::Relaxed)
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// RAII guard that decrements the in-flight counter when dropped.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::Relaxed);
    }
}
