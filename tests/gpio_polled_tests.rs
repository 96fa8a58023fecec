//! Edge handling on a backend that only reports edges when serviced.

use sensorbus::{
    Edge, EdgeCallback, EdgeDelivery, EdgeEvent, EdgeNotifier, Error, GpioConfig, GpioController, GpioLevel,
    GpioPull, GpioTransport, PinMode, Result, Transition,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const PIN_COUNT: u8 = 4;

#[derive(Default)]
struct PolledState {
    levels: HashMap<u8, GpioLevel>,
    armed: HashMap<u8, (Edge, EdgeNotifier)>,
    queued: VecDeque<(u8, Transition)>,
    services: usize,
}

/// Backend whose edges sit in a queue until `service_interrupts` runs,
/// like an interrupt report waiting on a USB endpoint.
#[derive(Clone, Default)]
struct PolledPins {
    state: Arc<Mutex<PolledState>>,
}

impl PolledPins {
    fn queue_edge(&self, pin: u8, transition: Transition) {
        self.state.lock().unwrap().queued.push_back((pin, transition));
    }

    fn services(&self) -> usize {
        self.state.lock().unwrap().services
    }

    fn drain(&self) -> Vec<((u8, Transition), Option<(Edge, EdgeNotifier)>)> {
        let mut state = self.state.lock().unwrap();
        state.services += 1;
        let queued: Vec<_> = state.queued.drain(..).collect();
        queued
            .into_iter()
            .map(|(pin, t)| ((pin, t), state.armed.get(&pin).cloned()))
            .collect()
    }
}

impl GpioTransport for PolledPins {
    fn pin_count(&self) -> u8 {
        PIN_COUNT
    }

    fn configure(&mut self, pin: u8, _mode: PinMode, _pull: GpioPull, initial: GpioLevel) -> Result<()> {
        self.state.lock().unwrap().levels.insert(pin, initial);
        Ok(())
    }

    fn read(&mut self, pin: u8) -> Result<GpioLevel> {
        Ok(self.state.lock().unwrap().levels.get(&pin).copied().unwrap_or(GpioLevel::Low))
    }

    fn write(&mut self, pin: u8, level: GpioLevel) -> Result<()> {
        self.state.lock().unwrap().levels.insert(pin, level);
        Ok(())
    }

    fn arm_edge(&mut self, pin: u8, edge: Edge, notifier: EdgeNotifier) -> Result<()> {
        self.state.lock().unwrap().armed.insert(pin, (edge, notifier));
        Ok(())
    }

    fn disarm_edge(&mut self, pin: u8) -> Result<()> {
        self.state.lock().unwrap().armed.remove(&pin);
        Ok(())
    }

    fn delivery(&self) -> EdgeDelivery {
        EdgeDelivery::Polled
    }

    fn service_interrupts(&mut self, timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        loop {
            let mut reported = 0;
            for ((_, transition), armed) in self.drain() {
                if let Some((edge, notifier)) = armed {
                    if edge.matches(transition) && notifier.notify(transition) {
                        reported += 1;
                    }
                }
            }
            if reported > 0 || Instant::now() >= deadline {
                return Ok(reported);
            }
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn setup() -> (PolledPins, Arc<GpioController<PolledPins>>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let pins = PolledPins::default();
    let config = GpioConfig::default().with_poll_interval(Duration::from_millis(5));
    let gpio = Arc::new(GpioController::with_config(pins.clone(), config));
    for pin in 0..PIN_COUNT {
        gpio.setup_pin(pin, PinMode::Input, GpioPull::None, GpioLevel::Low)
            .unwrap();
    }
    (pins, gpio)
}

#[test]
fn test_edge_seen_only_after_servicing() {
    let (pins, gpio) = setup();
    gpio.enable_edge_detection(0, Edge::Rising, None).unwrap();
    pins.queue_edge(0, Transition::Rising);

    let before = pins.services();
    assert!(gpio.has_edge_occurred(0).unwrap());
    assert!(pins.services() > before);
    assert!(!gpio.has_edge_occurred(0).unwrap());
}

#[test]
fn test_queued_edges_collapse() {
    let (pins, gpio) = setup();
    gpio.enable_edge_detection(1, Edge::Both, None).unwrap();
    pins.queue_edge(1, Transition::Rising);
    pins.queue_edge(1, Transition::Falling);
    pins.queue_edge(1, Transition::Rising);

    assert_eq!(gpio.poll_events().unwrap(), 3);
    assert!(gpio.has_edge_occurred(1).unwrap());
    assert!(!gpio.has_edge_occurred(1).unwrap());
}

#[test]
fn test_non_matching_edge_ignored() {
    let (pins, gpio) = setup();
    gpio.enable_edge_detection(2, Edge::Falling, None).unwrap();
    pins.queue_edge(2, Transition::Rising);
    assert_eq!(gpio.poll_events().unwrap(), 0);
    assert!(!gpio.has_edge_occurred(2).unwrap());
}

#[test]
fn test_callback_fires_from_poll_events() {
    let (pins, gpio) = setup();
    let count = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&count);
    let callback: EdgeCallback = Arc::new(move |event: EdgeEvent| {
        assert_eq!(event.pin, 3);
        counter.fetch_add(1, Ordering::SeqCst);
    });
    gpio.enable_edge_detection(3, Edge::Both, Some(callback)).unwrap();
    pins.queue_edge(3, Transition::Rising);
    pins.queue_edge(3, Transition::Falling);

    // Nothing is delivered until the backend is serviced.
    assert_eq!(count.load(Ordering::SeqCst), 0);
    assert_eq!(gpio.poll_events().unwrap(), 2);
    assert_eq!(count.load(Ordering::SeqCst), 2);
    assert!(!gpio.has_edge_occurred(3).unwrap());
}

#[test]
fn test_poll_events_does_not_block() {
    let (_pins, gpio) = setup();
    gpio.enable_edge_detection(0, Edge::Both, None).unwrap();
    let start = Instant::now();
    assert_eq!(gpio.poll_events().unwrap(), 0);
    assert!(start.elapsed() < Duration::from_millis(50));
}

#[test]
fn test_wait_services_backend_until_edge() {
    let (pins, gpio) = setup();
    gpio.enable_edge_detection(0, Edge::Rising, None).unwrap();

    let driver = pins.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        driver.queue_edge(0, Transition::Rising);
    });
    gpio.wait_for_edge(0, Edge::Rising, Some(Duration::from_secs(2)))
        .unwrap();
    handle.join().unwrap();
}

#[test]
fn test_wait_arms_and_disarms_on_polled_backend() {
    let (pins, gpio) = setup();
    let driver = pins.clone();
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        driver.queue_edge(1, Transition::Falling);
    });
    gpio.wait_for_edge(1, Edge::Falling, Some(Duration::from_secs(2)))
        .unwrap();
    handle.join().unwrap();
    assert!(!pins.state.lock().unwrap().armed.contains_key(&1));
}

#[test]
fn test_polled_wait_times_out_within_bound() {
    let (_pins, gpio) = setup();
    gpio.enable_edge_detection(2, Edge::Both, None).unwrap();
    let start = Instant::now();
    let result = gpio.wait_for_edge(2, Edge::Both, Some(Duration::from_millis(100)));
    let elapsed = start.elapsed();
    assert!(matches!(result, Err(Error::EdgeWaitTimeout { pin: 2, .. })));
    assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
    assert!(elapsed < Duration::from_millis(150), "{elapsed:?}");
}

#[test]
fn test_polled_wait_cancelled_by_disable() {
    let (_pins, gpio) = setup();
    gpio.enable_edge_detection(3, Edge::Rising, None).unwrap();

    let canceller = Arc::clone(&gpio);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(30));
        canceller.disable_edge_detection(3).unwrap();
    });
    let start = Instant::now();
    let result = gpio.wait_for_edge(3, Edge::Rising, Some(Duration::from_secs(5)));
    handle.join().unwrap();
    assert!(matches!(result, Err(Error::EdgeWaitCancelled { pin: 3 })));
    assert!(start.elapsed() < Duration::from_secs(1));
}
