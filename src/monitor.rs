//! Multi-session monitor loop.
//!
//! Each tick: discover sessions by prefix, capture and classify every pane
//! (fanned out across a small worker pool), feed the results through the
//! tracker in one place, and hand any resulting notices to the notifier.
//! Capture and classification may run in parallel across sessions, but for
//! a single session the capture → classify → track → dispatch sequence is
//! strict: tracking and dispatch happen serially on the monitor thread.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::mux::{DiscoveredPane, MuxError, PaneAdapter, ScreenCapture};
use crate::notify::Notifier;
use crate::tracker::{SessionTracker, SessionView};

/// Rows captured per pane for classification.
const CAPTURE_LINES: u16 = 120;

/// Upper bound on parallel capture workers per tick.
const MAX_WORKERS: usize = 8;

/// Granularity of the inter-tick sleep, so shutdown is observed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(200);

pub struct Monitor {
    adapter: Arc<dyn PaneAdapter>,
    classifier: Classifier,
    tracker: SessionTracker,
    notifier: Notifier,
    board: Arc<Mutex<Vec<SessionView>>>,
    full_prefix: String,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
    ticks: Arc<AtomicU64>,
}

impl Monitor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn PaneAdapter>,
        classifier: Classifier,
        notifier: Notifier,
        board: Arc<Mutex<Vec<SessionView>>>,
        full_prefix: String,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
        ticks: Arc<AtomicU64>,
    ) -> Self {
        let tracker = SessionTracker::new(full_prefix.clone());
        Self {
            adapter,
            classifier,
            tracker,
            notifier,
            board,
            full_prefix,
            interval,
            shutdown,
            ticks,
        }
    }

    /// Run ticks until the shutdown flag is raised.
    pub fn run(&mut self) {
        info!(
            prefix = %self.full_prefix,
            interval_secs = self.interval.as_secs(),
            "monitor loop started"
        );
        while !self.shutdown.load(Ordering::Relaxed) {
            let started = Instant::now();
            self.tick();
            self.ticks.fetch_add(1, Ordering::Relaxed);

            if let Some(remaining) = self.interval.checked_sub(started.elapsed()) {
                self.sleep_observing_shutdown(remaining);
            }
        }
        info!("monitor loop stopped");
    }

    pub fn tick(&mut self) {
        let discovered = match self.discover() {
            Ok(discovered) => discovered,
            Err(e) => {
                warn!(error = %e, "session discovery failed, skipping tick");
                return;
            }
        };

        let captures = capture_all(self.adapter.as_ref(), &discovered);

        let now = Instant::now();
        let mut seen: HashSet<String> = HashSet::new();
        for (pane, result) in captures {
            seen.insert(self.tracker.normalize_name(&pane.name));
            match result {
                Ok(capture) => {
                    let classification = self.classifier.classify(&capture);
                    for notice in self.tracker.observe(&pane, &classification, &capture, now) {
                        self.notifier.dispatch(&notice);
                    }
                }
                Err(MuxError::NotFound(_)) => {
                    // Vanished between discovery and capture; the next
                    // discovery pass starts its removal countdown.
                    debug!(session = %pane.name, "pane vanished before capture");
                }
                Err(MuxError::Transient(e)) => {
                    debug!(session = %pane.name, error = %e, "capture failed, session skipped this tick");
                }
            }
        }

        let removed = self.tracker.finish_pass(&seen);
        if !removed.is_empty() {
            self.notifier.forget_sessions(&removed);
        }
        self.publish_board();
    }

    /// Discovery with a single retry on transient failure.
    fn discover(&self) -> Result<Vec<DiscoveredPane>, MuxError> {
        match self.adapter.list_sessions(&self.full_prefix) {
            Ok(discovered) => Ok(discovered),
            Err(MuxError::Transient(first)) => {
                debug!(error = %first, "discovery failed, retrying once");
                self.adapter.list_sessions(&self.full_prefix)
            }
            Err(e) => Err(e),
        }
    }

    fn publish_board(&self) {
        let views = self.tracker.views();
        *self.board.lock().unwrap_or_else(|e| e.into_inner()) = views;
    }

    fn sleep_observing_shutdown(&self, total: Duration) {
        let deadline = Instant::now() + total;
        while Instant::now() < deadline {
            if self.shutdown.load(Ordering::Relaxed) {
                return;
            }
            thread::sleep(SLEEP_SLICE.min(deadline.saturating_duration_since(Instant::now())));
        }
    }

    #[cfg(test)]
    fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }
}

/// Capture every discovered pane, fanning out across at most `MAX_WORKERS`
/// scoped threads. Each worker owns its chunk of sessions for the tick;
/// ordering across sessions is not observable.
fn capture_all(
    adapter: &dyn PaneAdapter,
    discovered: &[DiscoveredPane],
) -> Vec<(DiscoveredPane, Result<ScreenCapture, MuxError>)> {
    if discovered.is_empty() {
        return Vec::new();
    }
    if discovered.len() == 1 {
        let pane = discovered[0].clone();
        let result = capture_with_retry(adapter, &pane.name);
        return vec![(pane, result)];
    }

    let chunk_size = discovered.len().div_ceil(MAX_WORKERS).max(1);
    thread::scope(|scope| {
        let handles: Vec<_> = discovered
            .chunks(chunk_size)
            .map(|chunk| {
                scope.spawn(move || {
                    chunk
                        .iter()
                        .map(|pane| (pane.clone(), capture_with_retry(adapter, &pane.name)))
                        .collect::<Vec<_>>()
                })
            })
            .collect();
        handles
            .into_iter()
            .flat_map(|handle| handle.join().unwrap_or_default())
            .collect()
    })
}

/// One retry per tick on transient capture failure.
fn capture_with_retry(
    adapter: &dyn PaneAdapter,
    name: &str,
) -> Result<ScreenCapture, MuxError> {
    match adapter.capture(name, CAPTURE_LINES) {
        Err(MuxError::Transient(first)) => {
            debug!(session = %name, error = %first, "capture retry");
            adapter.capture(name, CAPTURE_LINES)
        }
        other => other,
    }
}
