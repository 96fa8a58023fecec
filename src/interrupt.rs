//! Per-pin edge bookkeeping shared between interrupt and polling contexts.

use crate::error::{Error, Result};
use crate::gpio::{Edge, Transition};
use log::trace;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// An edge delivered to a callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EdgeEvent {
    /// Pin the edge was seen on.
    pub pin: u8,
    /// Direction of the transition.
    pub transition: Transition,
}

/// Callback invoked for every matching edge.
///
/// Runs on whatever context delivers the edge (a platform thread, or the
/// caller of a polling operation). It must not block and must not issue
/// bus transactions itself; hand work off to another thread instead.
pub type EdgeCallback = Arc<dyn Fn(EdgeEvent) + Send + Sync>;

#[derive(Default)]
struct TrackerState {
    armed: Option<Edge>,
    callback: Option<EdgeCallback>,
    // Bumped on every disarm so waiters can tell they were cancelled.
    epoch: u64,
    // Bumped on every arm so a temporary arming can tell it was replaced.
    generation: u64,
}

/// Records whether an edge fired on one pin and dispatches it.
///
/// Edges reach the tracker through [`crate::transport::EdgeNotifier`]. With a
/// callback registered each edge goes to the callback; without one, the edge
/// sets a pending flag that [`EdgeEventTracker::take_pending`] reads and
/// clears in one atomic step, so consecutive edges between two polls collapse
/// into one.
pub struct EdgeEventTracker {
    pin: u8,
    pending: AtomicBool,
    edges: AtomicU64,
    state: Mutex<TrackerState>,
    wakeup: Condvar,
}

/// Outcome of a bounded wait on a tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WaitStatus {
    Edge,
    Cancelled,
    TimedOut,
    /// The slice ran out; the caller may service the transport and retry.
    Idle,
}

/// Snapshot taken when a wait begins.
#[derive(Debug, Clone, Copy)]
pub(crate) struct WaitToken {
    edges: u64,
    epoch: u64,
}

impl EdgeEventTracker {
    /// Creates an unarmed tracker for `pin`.
    pub fn new(pin: u8) -> Self {
        Self {
            pin,
            pending: AtomicBool::new(false),
            edges: AtomicU64::new(0),
            state: Mutex::new(TrackerState::default()),
            wakeup: Condvar::new(),
        }
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        // A panicking callback never runs under this lock, so the state
        // behind a poisoned mutex is still consistent.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arms the tracker for `edge`, replacing any previous configuration.
    ///
    /// Returns the arm generation, which changes on every call.
    pub fn arm(&self, edge: Edge, callback: Option<EdgeCallback>) -> u64 {
        let mut state = self.lock();
        state.armed = Some(edge);
        state.callback = callback;
        state.generation = state.generation.wrapping_add(1);
        self.pending.store(false, Ordering::Release);
        state.generation
    }

    /// Generation of the latest [`EdgeEventTracker::arm`], if still armed.
    pub fn armed_generation(&self) -> Option<u64> {
        let state = self.lock();
        state.armed.map(|_| state.generation)
    }

    /// Disarms the tracker, dropping pending state and the callback, and
    /// cancels any wait in progress.
    pub fn disarm(&self) {
        let mut state = self.lock();
        state.armed = None;
        state.callback = None;
        state.epoch = state.epoch.wrapping_add(1);
        self.pending.store(false, Ordering::Release);
        drop(state);
        self.wakeup.notify_all();
    }

    /// Replaces the callback without touching the armed edge.
    pub fn set_callback(&self, callback: EdgeCallback) -> Result<()> {
        let mut state = self.lock();
        if state.armed.is_none() {
            return Err(Error::EdgeNotArmed { pin: self.pin });
        }
        state.callback = Some(callback);
        Ok(())
    }

    /// Edge the tracker is armed for, if any.
    pub fn armed_edge(&self) -> Option<Edge> {
        self.lock().armed
    }

    /// Read-and-clear: true at most once per recorded edge.
    pub fn take_pending(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Total matching edges seen since creation.
    pub fn edge_count(&self) -> u64 {
        self.edges.load(Ordering::Acquire)
    }

    /// Records a transition observed by the platform.
    ///
    /// Returns false (and does nothing) if the tracker is unarmed or armed for
    /// the other direction.
    pub fn record(&self, transition: Transition) -> bool {
        let state = self.lock();
        match state.armed {
            Some(edge) if edge.matches(transition) => {}
            _ => return false,
        }
        self.edges.fetch_add(1, Ordering::AcqRel);
        let callback = state.callback.clone();
        if callback.is_none() {
            self.pending.store(true, Ordering::Release);
        }
        drop(state);
        self.wakeup.notify_all();

        trace!("Edge {:?} on pin {}", transition, self.pin);
        if let Some(callback) = callback {
            callback(EdgeEvent {
                pin: self.pin,
                transition,
            });
        }
        true
    }

    pub(crate) fn wait_token(&self) -> WaitToken {
        let state = self.lock();
        WaitToken {
            edges: self.edge_count(),
            epoch: state.epoch,
        }
    }

    /// Blocks for at most `slice` (never past `deadline`) until an edge
    /// arrives after `token` was taken or the tracker is disarmed.
    pub(crate) fn wait_slice(&self, token: WaitToken, deadline: Instant, slice: Duration) -> WaitStatus {
        let mut state = self.lock();
        loop {
            if state.epoch != token.epoch {
                return WaitStatus::Cancelled;
            }
            if self.take_pending() || self.edge_count() != token.edges {
                return WaitStatus::Edge;
            }
            let now = Instant::now();
            if now >= deadline {
                return WaitStatus::TimedOut;
            }
            let wait_for = slice.min(deadline - now);
            let (guard, timeout) = self
                .wakeup
                .wait_timeout(state, wait_for)
                .unwrap_or_else(PoisonError::into_inner);
            state = guard;
            if timeout.timed_out() && Instant::now() < deadline {
                // Re-check once more so an edge racing the timeout is not lost.
                if state.epoch != token.epoch {
                    return WaitStatus::Cancelled;
                }
                if self.take_pending() || self.edge_count() != token.edges {
                    return WaitStatus::Edge;
                }
                return WaitStatus::Idle;
            }
        }
    }
}

impl fmt::Debug for EdgeEventTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("EdgeEventTracker")
            .field("pin", &self.pin)
            .field("armed", &state.armed)
            .field("has_callback", &state.callback.is_some())
            .field("pending", &self.pending.load(Ordering::Acquire))
            .field("edges", &self.edge_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_unarmed_tracker_ignores_edges() {
        let tracker = EdgeEventTracker::new(3);
        assert!(!tracker.record(Transition::Rising));
        assert!(!tracker.take_pending());
        assert_eq!(tracker.edge_count(), 0);
    }

    #[test]
    fn test_pending_is_read_and_clear() {
        let tracker = EdgeEventTracker::new(3);
        tracker.arm(Edge::Rising, None);
        assert!(tracker.record(Transition::Rising));
        assert!(tracker.take_pending());
        assert!(!tracker.take_pending());
        assert!(!tracker.take_pending());
    }

    #[test]
    fn test_edges_collapse_between_polls() {
        let tracker = EdgeEventTracker::new(3);
        tracker.arm(Edge::Both, None);
        tracker.record(Transition::Rising);
        tracker.record(Transition::Falling);
        tracker.record(Transition::Rising);
        assert_eq!(tracker.edge_count(), 3);
        assert!(tracker.take_pending());
        assert!(!tracker.take_pending());
    }

    #[test]
    fn test_direction_filter() {
        let tracker = EdgeEventTracker::new(3);
        tracker.arm(Edge::Falling, None);
        assert!(!tracker.record(Transition::Rising));
        assert!(!tracker.take_pending());
        assert!(tracker.record(Transition::Falling));
        assert!(tracker.take_pending());
    }

    #[test]
    fn test_callback_consumes_edge() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let tracker = EdgeEventTracker::new(7);
        tracker.arm(
            Edge::Both,
            Some(Arc::new(move |event: EdgeEvent| {
                assert_eq!(event.pin, 7);
                counter.fetch_add(1, Ordering::SeqCst);
            })),
        );
        tracker.record(Transition::Rising);
        tracker.record(Transition::Falling);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
        assert!(!tracker.take_pending());
    }

    #[test]
    fn test_set_callback_requires_armed() {
        let tracker = EdgeEventTracker::new(1);
        let result = tracker.set_callback(Arc::new(|_: EdgeEvent| {}));
        assert!(matches!(result, Err(Error::EdgeNotArmed { pin: 1 })));
        tracker.arm(Edge::Rising, None);
        assert!(tracker.set_callback(Arc::new(|_: EdgeEvent| {})).is_ok());
        assert_eq!(tracker.armed_edge(), Some(Edge::Rising));
    }

    #[test]
    fn test_disarm_clears_everything() {
        let tracker = EdgeEventTracker::new(2);
        tracker.arm(Edge::Rising, Some(Arc::new(|_: EdgeEvent| {})));
        tracker.disarm();
        assert_eq!(tracker.armed_edge(), None);
        assert!(!tracker.record(Transition::Rising));
        assert!(!tracker.take_pending());
    }

    #[test]
    fn test_wait_slice_cancelled_by_disarm() {
        let tracker = EdgeEventTracker::new(2);
        tracker.arm(Edge::Rising, None);
        let token = tracker.wait_token();
        tracker.disarm();
        let deadline = Instant::now() + Duration::from_millis(100);
        assert_eq!(
            tracker.wait_slice(token, deadline, Duration::from_millis(10)),
            WaitStatus::Cancelled
        );
    }

    #[test]
    fn test_arm_generation_changes_on_rearm() {
        let tracker = EdgeEventTracker::new(4);
        assert_eq!(tracker.armed_generation(), None);
        let first = tracker.arm(Edge::Rising, None);
        assert_eq!(tracker.armed_generation(), Some(first));
        let second = tracker.arm(Edge::Rising, None);
        assert_ne!(first, second);
        assert_eq!(tracker.armed_generation(), Some(second));
        tracker.disarm();
        assert_eq!(tracker.armed_generation(), None);
    }
}
