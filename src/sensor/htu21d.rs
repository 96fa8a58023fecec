use super::{MeasurementKind, MeasurementMeta, SensorDriver};
use crate::error::{Error, Result};
use crate::i2c::I2cInterface;
use crate::transport::I2cTransport;
use log::{debug, trace, warn};
use std::collections::BTreeMap;
use std::thread;
use std::time::Duration;

/// Fixed bus address of the HTU21D.
pub const HTU21D_ADDRESS: u8 = 0x40;

const CMD_TRIGGER_TEMPERATURE: u8 = 0xE3;
const CMD_TRIGGER_HUMIDITY: u8 = 0xE5;
const CMD_WRITE_USER_REGISTER: u8 = 0xE6;
const CMD_READ_USER_REGISTER: u8 = 0xE7;
const CMD_SOFT_RESET: u8 = 0xFE;

/// Datasheet limit for the sensor to come back after a soft reset.
const SOFT_RESET_DELAY: Duration = Duration::from_millis(15);

// Magnus-type coefficients for partial pressure (mmHg) and dew point.
const DEW_A: f64 = 8.1332;
const DEW_B: f64 = 1762.39;
const DEW_C: f64 = 235.66;

const SENSOR: &str = "htu21d";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Htu21dConfig {
    pub name: String,
    pub address: u8,
    /// Extra attempts after a checksum mismatch. Other bus errors are never
    /// retried.
    pub checksum_retries: u8,
}

impl Default for Htu21dConfig {
    fn default() -> Self {
        Self {
            name: SENSOR.to_string(),
            address: HTU21D_ADDRESS,
            checksum_retries: 2,
        }
    }
}

impl Htu21dConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_checksum_retries(mut self, retries: u8) -> Self {
        self.checksum_retries = retries;
        self
    }
}

/// HTU21D temperature and relative humidity sensor.
///
/// Measurements use hold-master mode: the trigger command is the register
/// of a three byte checked read.
#[derive(Debug)]
pub struct Htu21d<T: I2cTransport> {
    i2c: I2cInterface<T>,
    config: Htu21dConfig,
}

impl<T: I2cTransport> Htu21d<T> {
    pub fn new(i2c: I2cInterface<T>) -> Self {
        Self::with_config(i2c, Htu21dConfig::default())
    }

    pub fn with_config(i2c: I2cInterface<T>, config: Htu21dConfig) -> Self {
        Self { i2c, config }
    }

    pub fn config(&self) -> &Htu21dConfig {
        &self.config
    }

    /// Gives the bus back.
    pub fn release(self) -> I2cInterface<T> {
        self.i2c
    }

    fn read_raw(&mut self, command: u8) -> Result<u16> {
        let mut attempt = 0;
        loop {
            match self.i2c.read_crc_checked_block(self.config.address, command) {
                Err(e @ Error::Checksum { .. }) if attempt < self.config.checksum_retries => {
                    attempt += 1;
                    warn!(
                        "{}: {} (retry {}/{})",
                        self.config.name, e, attempt, self.config.checksum_retries
                    );
                }
                other => return other,
            }
        }
    }

    /// Raw temperature word, status bits cleared.
    pub fn raw_temperature(&mut self) -> Result<u16> {
        let raw = self.read_raw(CMD_TRIGGER_TEMPERATURE)?;
        debug!("Raw temp 0x{:04X} ({})", raw, raw);
        Ok(raw)
    }

    /// Raw relative humidity word, status bits cleared.
    pub fn raw_humidity(&mut self) -> Result<u16> {
        let raw = self.read_raw(CMD_TRIGGER_HUMIDITY)?;
        debug!("Raw relative humidity 0x{:04X} ({})", raw, raw);
        Ok(raw)
    }

    /// Temperature in degrees Celsius.
    pub fn temperature(&mut self) -> Result<f64> {
        self.raw_temperature().map(temperature_from_raw)
    }

    /// Relative humidity in percent.
    pub fn humidity(&mut self) -> Result<f64> {
        self.raw_humidity().map(humidity_from_raw)
    }

    /// Dew point in degrees Celsius, from one temperature and one humidity
    /// reading.
    ///
    /// Fails with [`Error::ArgumentOutOfRange`] when the humidity reading
    /// has no dew point (zero or below).
    pub fn dew_point(&mut self) -> Result<f64> {
        let temperature = self.temperature()?;
        let humidity = self.humidity()?;
        let dew = dew_point(temperature, humidity);
        if dew.is_finite() {
            Ok(dew)
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "no dew point at {:.2} C, {:.2} % RH",
                temperature, humidity
            )))
        }
    }

    pub fn read_user_register(&mut self) -> Result<u8> {
        self.i2c
            .read_register_unsigned_byte(self.config.address, CMD_READ_USER_REGISTER)
    }

    pub fn write_user_register(&mut self, value: u8) -> Result<()> {
        debug!("{}: user register <- 0x{:02X}", self.config.name, value);
        self.i2c
            .write_register_byte(self.config.address, CMD_WRITE_USER_REGISTER, value.into())
    }

    /// Reboots the sensor and waits for it to come back.
    pub fn soft_reset(&mut self) -> Result<()> {
        debug!("{}: soft reset", self.config.name);
        self.i2c
            .write_raw_byte(self.config.address, CMD_SOFT_RESET.into())?;
        thread::sleep(SOFT_RESET_DELAY);
        Ok(())
    }
}

pub(crate) fn temperature_from_raw(raw: u16) -> f64 {
    f64::from(raw) / 65536.0 * 175.72 - 46.85
}

pub(crate) fn humidity_from_raw(raw: u16) -> f64 {
    f64::from(raw) / 65536.0 * 125.0 - 6.0
}

/// Partial pressure of water vapour in mmHg at `temperature`.
pub(crate) fn partial_pressure(temperature: f64) -> f64 {
    10f64.powf(DEW_A - DEW_B / (temperature + DEW_C))
}

/// NaN when `humidity` is not positive.
pub(crate) fn dew_point(temperature: f64, humidity: f64) -> f64 {
    if humidity <= 0.0 {
        return f64::NAN;
    }
    let den = (humidity * partial_pressure(temperature) / 100.0).log10() - DEW_A;
    -(DEW_B / den + DEW_C)
}

impl<T: I2cTransport> SensorDriver for Htu21d<T> {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn data(&mut self) -> Vec<(String, f64)> {
        let name = self.config.name.clone();
        let mut values = Vec::with_capacity(3);
        let temperature = self
            .temperature()
            .map_err(|e| warn!("{}: temperature read failed: {}", name, e))
            .ok();
        let humidity = self
            .humidity()
            .map_err(|e| warn!("{}: humidity read failed: {}", name, e))
            .ok();

        if let Some(t) = temperature {
            values.push((format!("{}.temperature", name), t));
        }
        if let Some(rh) = humidity {
            values.push((format!("{}.humidity", name), rh));
        }
        if let (Some(t), Some(rh)) = (temperature, humidity) {
            let dew = dew_point(t, rh);
            if dew.is_finite() {
                values.push((format!("{}.dew_point_temperature", name), dew));
            } else {
                debug!("{}: no dew point at {:.2} % RH", name, rh);
            }
        }
        trace!("{}: {:?}", name, values);
        values
    }

    fn meta_data(&self) -> BTreeMap<&'static str, MeasurementMeta> {
        let gauge = |unit, precision, low, high| MeasurementMeta {
            kind: MeasurementKind::Gauge,
            unit,
            precision,
            range_low: Some(low),
            range_high: Some(high),
            sensor: SENSOR,
        };
        BTreeMap::from([
            ("temperature", gauge("C", 0.25, -40.0, 125.0)),
            ("humidity", gauge("RH", 5.0, 0.0, 100.0)),
            ("dew_point_temperature", gauge("C", 0.25, 0.0, 100.0)),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_conversions() {
        assert_abs_diff_eq!(temperature_from_raw(0x4E84), 7.0436, epsilon = 1e-3);
        assert_abs_diff_eq!(temperature_from_raw(0), -46.85, epsilon = 1e-9);
        assert_abs_diff_eq!(humidity_from_raw(0), -6.0, epsilon = 1e-9);
        assert_abs_diff_eq!(humidity_from_raw(0x8000), 56.5, epsilon = 1e-9);
    }

    #[test]
    fn test_dew_point_at_saturation_equals_temperature() {
        for t in [-10.0, 0.0, 21.5, 40.0] {
            assert_abs_diff_eq!(dew_point(t, 100.0), t, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_dew_point_below_temperature() {
        let dew = dew_point(25.0, 50.0);
        assert!(dew < 25.0);
        // Reference value for 25 C / 50 % RH is about 13.9 C.
        assert_abs_diff_eq!(dew, 13.9, epsilon = 0.3);
    }

    #[test]
    fn test_dew_point_undefined_without_humidity() {
        assert!(!dew_point(20.0, 0.0).is_finite());
        assert!(!dew_point(20.0, -6.0).is_finite());
        assert!(dew_point(20.0, 0.1).is_finite());
    }
}
