use super::{MeasurementKind, MeasurementMeta, SensorDriver};
use crate::error::Result;
use crate::gpio::{Edge, GpioController, GpioLevel, GpioPull, PinMode};
use crate::interrupt::{EdgeCallback, EdgeEvent};
use crate::transport::GpioTransport;
use log::{debug, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

const SENSOR: &str = "switch";

/// Push button between a GPIO and ground.
///
/// The pin is set up as a pulled-up input and every falling edge counts as
/// a press. Presses are counted from an edge callback, so none collapse
/// between two calls to [`SensorDriver::data`].
pub struct Switch<T: GpioTransport> {
    controller: Arc<GpioController<T>>,
    pin: u8,
    name: String,
    presses: Arc<AtomicU64>,
    reported: u64,
}

impl<T: GpioTransport> Switch<T> {
    pub fn new(controller: Arc<GpioController<T>>, pin: u8) -> Result<Self> {
        Self::with_name(controller, pin, format!("gpio-switch-{}", pin))
    }

    pub fn with_name(controller: Arc<GpioController<T>>, pin: u8, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        controller.setup_pin(pin, PinMode::Input, GpioPull::Up, GpioLevel::High)?;

        let presses = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&presses);
        let callback: EdgeCallback = Arc::new(move |_: EdgeEvent| {
            counter.fetch_add(1, Ordering::Relaxed);
        });
        controller.enable_edge_detection(pin, Edge::Falling, Some(callback))?;
        debug!("{}: counting presses on pin {}", name, pin);

        Ok(Self {
            controller,
            pin,
            name,
            presses,
            reported: 0,
        })
    }

    pub fn pin(&self) -> u8 {
        self.pin
    }

    /// True while the button is held down.
    pub fn is_pressed(&self) -> Result<bool> {
        Ok(self.controller.input(self.pin)? == GpioLevel::Low)
    }

    /// Presses seen since the switch was created.
    pub fn press_count(&self) -> Result<u64> {
        self.controller.poll_events()?;
        Ok(self.presses.load(Ordering::Relaxed))
    }
}

impl<T: GpioTransport> SensorDriver for Switch<T> {
    fn name(&self) -> &str {
        &self.name
    }

    fn data(&mut self) -> Vec<(String, f64)> {
        let count = match self.press_count() {
            Ok(count) => count,
            Err(e) => {
                warn!("{}: servicing edge events failed: {}", self.name, e);
                self.presses.load(Ordering::Relaxed)
            }
        };
        let delta = count - self.reported;
        self.reported = count;
        vec![
            (format!("{}.press_count", self.name), count as f64),
            (format!("{}.press_delta", self.name), delta as f64),
        ]
    }

    fn meta_data(&self) -> BTreeMap<&'static str, MeasurementMeta> {
        let meta = |kind| MeasurementMeta {
            kind,
            unit: "",
            precision: 1.0,
            range_low: Some(0.0),
            range_high: None,
            sensor: SENSOR,
        };
        BTreeMap::from([
            ("press_count", meta(MeasurementKind::Counter)),
            ("press_delta", meta(MeasurementKind::Delta)),
        ])
    }
}

impl<T: GpioTransport> Drop for Switch<T> {
    fn drop(&mut self) {
        if let Err(e) = self.controller.disable_edge_detection(self.pin) {
            warn!("{}: failed to disarm pin {}: {}", self.name, self.pin, e);
        }
    }
}

impl<T: GpioTransport> std::fmt::Debug for Switch<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Switch")
            .field("name", &self.name)
            .field("pin", &self.pin)
            .field("presses", &self.presses.load(Ordering::Relaxed))
            .finish()
    }
}
