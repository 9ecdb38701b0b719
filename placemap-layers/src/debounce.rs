//! Viewport change debouncer
//!
//! The map view reports region changes at arbitrary frequency (every frame
//! during a pan). Each report is turned into a [`BoundingBox`] and compared
//! with the last box that was handed to the composer:
//! - within epsilon on all four edges: suppressed, and any pending box is
//!   dropped (the view came back to where it was)
//! - otherwise: becomes the pending box and (re)starts the quiet period
//!
//! When the quiet period elapses without a newer report, the pending box is
//! emitted exactly once and becomes the last handled box. Emission happens
//! whether or not any paged source is active, so a source activated later
//! still knows the current viewport.

use placemap_common::BoundingBox;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Outcome of observing one raw viewport report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// Not materially different from the last handled box
    Suppressed,
    /// Pending; emit after the quiet period unless superseded
    Scheduled,
}

/// Pure debounce bookkeeping, independent of timers
#[derive(Debug, Clone)]
pub struct DebounceState {
    epsilon: f64,
    last_handled: Option<BoundingBox>,
    pending: Option<BoundingBox>,
}

impl DebounceState {
    pub fn new(epsilon: f64) -> Self {
        Self {
            epsilon,
            last_handled: None,
            pending: None,
        }
    }

    pub fn observe(&mut self, bbox: BoundingBox) -> Observation {
        let material = self
            .last_handled
            .map_or(true, |last| bbox.materially_different(&last, self.epsilon));

        if material {
            self.pending = Some(bbox);
            Observation::Scheduled
        } else {
            self.pending = None;
            Observation::Suppressed
        }
    }

    /// Quiet period elapsed: hand out the pending box, if any
    pub fn fire(&mut self) -> Option<BoundingBox> {
        let bbox = self.pending.take()?;
        self.last_handled = Some(bbox);
        Some(bbox)
    }

    pub fn last_handled(&self) -> Option<BoundingBox> {
        self.last_handled
    }

    pub fn pending(&self) -> Option<BoundingBox> {
        self.pending
    }
}

/// Timer-driven debouncer task
pub struct ViewportDebouncer {
    quiet: Duration,
    state: DebounceState,
}

impl ViewportDebouncer {
    pub fn new(quiet: Duration, epsilon: f64) -> Self {
        Self {
            quiet,
            state: DebounceState::new(epsilon),
        }
    }

    /// Run until `raw_rx` closes or `shutdown` fires, calling `emit` with
    /// each settled box
    pub fn spawn<F>(
        self,
        raw_rx: mpsc::UnboundedReceiver<BoundingBox>,
        shutdown: CancellationToken,
        emit: F,
    ) -> JoinHandle<()>
    where
        F: FnMut(BoundingBox) + Send + 'static,
    {
        tokio::spawn(self.run(raw_rx, shutdown, emit))
    }

    async fn run<F>(
        mut self,
        mut raw_rx: mpsc::UnboundedReceiver<BoundingBox>,
        shutdown: CancellationToken,
        mut emit: F,
    ) where
        F: FnMut(BoundingBox) + Send + 'static,
    {
        let mut deadline: Option<Instant> = None;

        loop {
            // Disabled branches still evaluate their future expression
            let wake_at = deadline.unwrap_or_else(|| Instant::now() + Duration::from_secs(3600));

            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("Viewport debouncer shutting down");
                    break;
                }

                raw = raw_rx.recv() => {
                    let Some(bbox) = raw else {
                        debug!("Viewport channel closed, debouncer exiting");
                        break;
                    };
                    match self.state.observe(bbox) {
                        Observation::Scheduled => {
                            trace!(?bbox, "Viewport change scheduled");
                            deadline = Some(Instant::now() + self.quiet);
                        }
                        Observation::Suppressed => {
                            trace!(?bbox, "Viewport jitter suppressed");
                            deadline = None;
                        }
                    }
                }

                _ = tokio::time::sleep_until(wake_at), if deadline.is_some() => {
                    deadline = None;
                    if let Some(bbox) = self.state.fire() {
                        debug!(?bbox, "Viewport settled");
                        emit(bbox);
                    }
                }
            }
        }
    }
}
