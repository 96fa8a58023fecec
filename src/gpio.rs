//! GPIO pin configuration and edge-event delivery.

use crate::error::{Error, Result};
use crate::interrupt::{EdgeCallback, EdgeEventTracker, WaitStatus};
use crate::transport::{EdgeDelivery, EdgeNotifier, GpioTransport};
use log::{debug, trace};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

/// Default bound on [`GpioController::wait_for_edge`] when no timeout is given.
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 1000;
/// Default interval between transport services while waiting.
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinMode {
    Unconfigured,
    Input,
    Output,
    /// Pin handed to a peripheral function (UART, PWM, ...).
    Alternate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioPull {
    None,
    Up,
    Down,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLevel {
    Low,
    High,
}

impl GpioLevel {
    #[inline]
    pub fn is_high(self) -> bool {
        self == GpioLevel::High
    }
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

impl From<GpioLevel> for bool {
    fn from(level: GpioLevel) -> Self {
        level.is_high()
    }
}

/// Which transitions edge detection reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
    Both,
}

impl Edge {
    /// True if a `transition` should fire for this edge selection.
    pub fn matches(self, transition: Transition) -> bool {
        matches!(
            (self, transition),
            (Edge::Both, _)
                | (Edge::Rising, Transition::Rising)
                | (Edge::Falling, Transition::Falling)
        )
    }
}

/// A single observed level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Rising,
    Falling,
}

impl Transition {
    /// The transition between two levels, if they differ.
    pub fn between(from: GpioLevel, to: GpioLevel) -> Option<Self> {
        match (from, to) {
            (GpioLevel::Low, GpioLevel::High) => Some(Transition::Rising),
            (GpioLevel::High, GpioLevel::Low) => Some(Transition::Falling),
            _ => None,
        }
    }
}

/// Tuning for [`GpioController`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioConfig {
    /// Longest single sleep inside [`GpioController::wait_for_edge`]; on
    /// polled platforms also the interval between transport services.
    pub poll_interval: Duration,
    /// Bound used by `wait_for_edge` when the caller passes no timeout.
    pub default_wait_timeout: Duration,
}

impl Default for GpioConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            default_wait_timeout: Duration::from_millis(DEFAULT_WAIT_TIMEOUT_MS),
        }
    }
}

impl GpioConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }

    pub fn with_default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout = timeout;
        self
    }
}

#[derive(Debug)]
struct PinState {
    mode: PinMode,
    pull: GpioPull,
    tracker: Arc<EdgeEventTracker>,
}

/// Owner of a GPIO backend and of the per-pin configuration registry.
///
/// Pins are created lazily by [`GpioController::setup_pin`] and live as long
/// as the controller. Registry mutations are serialised against readers, and
/// the backend sits behind its own lock so a controller can be shared
/// between threads (wrap it in an `Arc`).
///
/// Lock order is registry, then backend, then tracker. Edge callbacks run
/// with the backend lock held on polled platforms, which is one more reason
/// they must not call back into the controller.
pub struct GpioController<T: GpioTransport> {
    transport: Mutex<T>,
    pins: RwLock<Vec<Option<PinState>>>,
    pin_count: u8,
    delivery: EdgeDelivery,
    config: GpioConfig,
}

impl<T: GpioTransport> GpioController<T> {
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, GpioConfig::default())
    }

    pub fn with_config(transport: T, config: GpioConfig) -> Self {
        let pin_count = transport.pin_count();
        let delivery = transport.delivery();
        debug!(
            "GPIO controller over {} pins, {:?} edge delivery",
            pin_count, delivery
        );
        Self {
            transport: Mutex::new(transport),
            pins: RwLock::new((0..pin_count).map(|_| None).collect()),
            pin_count,
            delivery,
            config,
        }
    }

    pub fn pin_count(&self) -> u8 {
        self.pin_count
    }

    pub fn config(&self) -> &GpioConfig {
        &self.config
    }

    /// Consumes the controller and returns the backend.
    pub fn into_transport(self) -> T {
        self.transport
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn transport(&self) -> MutexGuard<'_, T> {
        self.transport.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pins(&self) -> RwLockReadGuard<'_, Vec<Option<PinState>>> {
        self.pins.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn pins_mut(&self) -> RwLockWriteGuard<'_, Vec<Option<PinState>>> {
        self.pins.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_pin(&self, pin: u8) -> Result<usize> {
        if pin < self.pin_count {
            Ok(pin as usize)
        } else {
            Err(Error::InvalidPin {
                pin,
                count: self.pin_count,
            })
        }
    }

    /// Returns the tracker of a pin configured in `expected` mode.
    fn tracker_in_mode(&self, pin: u8, expected: PinMode) -> Result<Arc<EdgeEventTracker>> {
        let pins = self.pins();
        self.tracker_in_mode_locked(&pins, pin, expected)
    }

    fn require_mode(&self, pin: u8, expected: PinMode) -> Result<()> {
        self.tracker_in_mode(pin, expected).map(|_| ())
    }

    /// Current mode of `pin` (`Unconfigured` if never set up).
    pub fn pin_mode(&self, pin: u8) -> Result<PinMode> {
        let index = self.check_pin(pin)?;
        Ok(self.pins()[index]
            .as_ref()
            .map_or(PinMode::Unconfigured, |s| s.mode))
    }

    /// Current pull configuration of `pin`, if configured.
    pub fn pin_pull(&self, pin: u8) -> Result<Option<GpioPull>> {
        let index = self.check_pin(pin)?;
        Ok(self.pins()[index].as_ref().map(|s| s.pull))
    }

    /// Configures `pin`, replacing any earlier configuration.
    ///
    /// Reconfiguring an armed pin disarms it first, which cancels waiters.
    pub fn setup_pin(&self, pin: u8, mode: PinMode, pull: GpioPull, initial: GpioLevel) -> Result<()> {
        let index = self.check_pin(pin)?;
        let mut pins = self.pins_mut();
        let mut transport = self.transport();

        if let Some(old) = &pins[index] {
            if old.tracker.armed_edge().is_some() {
                debug!("Pin {} reconfigured while armed, disarming", pin);
                transport.disarm_edge(pin)?;
                old.tracker.disarm();
            }
        }

        debug!(
            "Configuring pin {}: mode={:?}, pull={:?}, initial={:?}",
            pin, mode, pull, initial
        );
        transport.configure(pin, mode, pull, initial)?;
        pins[index] = Some(PinState {
            mode,
            pull,
            tracker: Arc::new(EdgeEventTracker::new(pin)),
        });
        Ok(())
    }

    /// Drives an output pin.
    pub fn output(&self, pin: u8, level: GpioLevel) -> Result<()> {
        self.require_mode(pin, PinMode::Output)?;
        trace!("GPIO write pin {} = {:?}", pin, level);
        self.transport().write(pin, level)
    }

    /// Reads an input pin.
    pub fn input(&self, pin: u8) -> Result<GpioLevel> {
        self.require_mode(pin, PinMode::Input)?;
        let level = self.transport().read(pin)?;
        trace!("GPIO read pin {} = {:?}", pin, level);
        Ok(level)
    }

    /// Reads several input pins, in the order given.
    pub fn input_many(&self, pins: &[u8]) -> Result<Vec<GpioLevel>> {
        pins.iter().map(|&pin| self.input(pin)).collect()
    }

    /// Arms edge detection on an input pin.
    ///
    /// With a callback every matching edge is handed to it; without one the
    /// edge is kept for [`GpioController::has_edge_occurred`]. Re-arming an
    /// armed pin replaces its edge and callback.
    pub fn enable_edge_detection(&self, pin: u8, edge: Edge, callback: Option<EdgeCallback>) -> Result<()> {
        self.arm_pin(pin, edge, callback).map(|_| ())
    }

    /// Arms `pin` and returns the tracker's arm generation.
    fn arm_pin(&self, pin: u8, edge: Edge, callback: Option<EdgeCallback>) -> Result<u64> {
        let pins = self.pins_mut();
        let tracker = self.tracker_in_mode_locked(&pins, pin, PinMode::Input)?;
        debug!(
            "Arming pin {} for {:?} edges (callback: {})",
            pin,
            edge,
            callback.is_some()
        );
        let generation = tracker.arm(edge, callback);
        let result = self
            .transport()
            .arm_edge(pin, edge, EdgeNotifier::new(Arc::clone(&tracker)));
        match result {
            Ok(()) => Ok(generation),
            Err(e) => {
                tracker.disarm();
                Err(e)
            }
        }
    }

    fn tracker_in_mode_locked(
        &self,
        pins: &[Option<PinState>],
        pin: u8,
        expected: PinMode,
    ) -> Result<Arc<EdgeEventTracker>> {
        let index = self.check_pin(pin)?;
        match &pins[index] {
            Some(state) if state.mode == expected => Ok(Arc::clone(&state.tracker)),
            other => Err(Error::Mode {
                pin,
                expected,
                actual: other.as_ref().map_or(PinMode::Unconfigured, |s| s.mode),
            }),
        }
    }

    /// Disarms edge detection, dropping pending state and callback.
    ///
    /// Any [`GpioController::wait_for_edge`] in progress on the pin returns
    /// [`Error::EdgeWaitCancelled`]. Disarming an unarmed pin is a no-op.
    pub fn disable_edge_detection(&self, pin: u8) -> Result<()> {
        self.disarm_pin(pin, None)
    }

    /// Disarms `pin`; with `only_generation` set, only if nobody re-armed it
    /// since that arming.
    fn disarm_pin(&self, pin: u8, only_generation: Option<u64>) -> Result<()> {
        let index = self.check_pin(pin)?;
        let pins = self.pins_mut();
        let Some(state) = &pins[index] else {
            return Ok(());
        };
        match (state.tracker.armed_generation(), only_generation) {
            (None, _) => return Ok(()),
            (Some(current), Some(expected)) if current != expected => {
                debug!("Pin {} re-armed during wait, leaving it armed", pin);
                return Ok(());
            }
            _ => {}
        }
        debug!("Disarming pin {}", pin);
        let result = self.transport().disarm_edge(pin);
        state.tracker.disarm();
        result
    }

    /// Attaches or replaces the callback of an armed pin, keeping its edge.
    pub fn set_event_callback(&self, pin: u8, callback: EdgeCallback) -> Result<()> {
        let tracker = self.tracker_in_mode(pin, PinMode::Input)?;
        tracker.set_callback(callback)
    }

    /// Services the backend once without blocking so polled platforms feed
    /// their trackers. Returns the number of transitions reported.
    pub fn poll_events(&self) -> Result<usize> {
        match self.delivery {
            EdgeDelivery::Native => Ok(0),
            EdgeDelivery::Polled => self.transport().service_interrupts(Duration::ZERO),
        }
    }

    /// Read-and-clear: true at most once per edge recorded since the last
    /// call. Edges between calls collapse into one; use a callback to count.
    pub fn has_edge_occurred(&self, pin: u8) -> Result<bool> {
        let tracker = self.tracker_in_mode(pin, PinMode::Input)?;
        self.poll_events()?;
        Ok(tracker.take_pending())
    }

    /// Blocks until an `edge` occurs on `pin`, the timeout elapses, or edge
    /// detection on the pin is disabled from elsewhere.
    ///
    /// An unarmed pin is armed for `edge` for the duration of the wait. A
    /// pending edge recorded before the call satisfies the wait immediately.
    /// `None` uses [`GpioConfig::default_wait_timeout`].
    pub fn wait_for_edge(&self, pin: u8, edge: Edge, timeout: Option<Duration>) -> Result<()> {
        let timeout = timeout.unwrap_or(self.config.default_wait_timeout);
        let tracker = self.tracker_in_mode(pin, PinMode::Input)?;

        let temporary = match tracker.armed_edge() {
            None => Some(self.arm_pin(pin, edge, None)?),
            Some(armed) if armed == edge => None,
            Some(armed) => {
                return Err(Error::EdgeConflict {
                    pin,
                    armed,
                    requested: edge,
                })
            }
        };

        debug!("Waiting up to {:?} for {:?} edge on pin {}", timeout, edge, pin);
        let token = tracker.wait_token();
        let deadline = Instant::now() + timeout;
        let outcome = loop {
            if self.delivery == EdgeDelivery::Polled {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if let Err(e) = self
                    .transport()
                    .service_interrupts(remaining.min(self.config.poll_interval))
                {
                    break Err(e);
                }
            }
            let slice = match self.delivery {
                EdgeDelivery::Native => self.config.poll_interval,
                // The service call above already waited.
                EdgeDelivery::Polled => Duration::ZERO,
            };
            match tracker.wait_slice(token, deadline, slice) {
                WaitStatus::Edge => break Ok(()),
                WaitStatus::Cancelled => break Err(Error::EdgeWaitCancelled { pin }),
                WaitStatus::TimedOut => break Err(Error::EdgeWaitTimeout { pin, timeout }),
                WaitStatus::Idle => continue,
            }
        };

        if let Some(generation) = temporary {
            if !matches!(outcome, Err(Error::EdgeWaitCancelled { .. })) {
                self.disarm_pin(pin, Some(generation))?;
            }
        }
        outcome
    }
}

impl<T: GpioTransport> std::fmt::Debug for GpioController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpioController")
            .field("pin_count", &self.pin_count)
            .field("delivery", &self.delivery)
            .field("config", &self.config)
            .finish()
    }
}
