//! Sensor drivers built on the bus interfaces.
//!
//! A driver reports named readings through [`SensorDriver::data`] and
//! describes each of them once through [`SensorDriver::meta_data`]. Reading
//! names are `"<sensor name>.<measurement>"`; meta data is keyed by the
//! measurement part alone.

mod htu21d;
mod switch;

pub use htu21d::{Htu21d, Htu21dConfig, HTU21D_ADDRESS};
pub use switch::Switch;

use std::collections::BTreeMap;

/// How consecutive values of a measurement relate to each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasurementKind {
    /// Instantaneous value.
    Gauge,
    /// Monotonic total since the driver started.
    Counter,
    /// Change since the previous report.
    Delta,
}

/// Static description of one measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementMeta {
    pub kind: MeasurementKind,
    pub unit: &'static str,
    pub precision: f64,
    pub range_low: Option<f64>,
    pub range_high: Option<f64>,
    /// Driver that produces the measurement.
    pub sensor: &'static str,
}

/// A device that produces named readings.
pub trait SensorDriver {
    /// Instance name, used as the prefix of every reading.
    fn name(&self) -> &str;

    /// Takes a fresh set of readings.
    ///
    /// A measurement whose read fails is left out rather than failing the
    /// whole set; the failure is logged.
    fn data(&mut self) -> Vec<(String, f64)>;

    fn meta_data(&self) -> BTreeMap<&'static str, MeasurementMeta>;
}
