//! Sensor drivers on the simulated bus.

use approx::assert_abs_diff_eq;
use sensorbus::sensor::{Htu21d, Htu21dConfig, MeasurementKind, SensorDriver, Switch, HTU21D_ADDRESS};
use sensorbus::sim::{SimFault, SimulatedBus};
use sensorbus::{Error, GpioController, GpioLevel, I2cInterface, PinMode};
use std::sync::Arc;

fn htu21d(bus: &SimulatedBus) -> Htu21d<SimulatedBus> {
    let _ = env_logger::builder().is_test(true).try_init();
    Htu21d::new(I2cInterface::new(bus.clone()))
}

fn values(data: &[(String, f64)]) -> Vec<&str> {
    data.iter().map(|(name, _)| name.as_str()).collect()
}

#[test]
fn test_htu21d_readings() {
    let bus = SimulatedBus::new();
    bus.set_registers(HTU21D_ADDRESS, 0xE3, &[0x4E, 0x85, 0x6B]);
    // Raw 0x8000 gives 56.5 % RH.
    let crc = sensorbus::crc::checksum(0x80, 0x02);
    bus.set_registers(HTU21D_ADDRESS, 0xE5, &[0x80, 0x02, crc]);
    let mut sensor = htu21d(&bus);

    assert_eq!(sensor.raw_temperature().unwrap(), 0x4E84);
    assert_abs_diff_eq!(sensor.temperature().unwrap(), 7.0436, epsilon = 1e-3);
    assert_abs_diff_eq!(sensor.humidity().unwrap(), 56.5, epsilon = 1e-9);

    let data = sensor.data();
    assert_eq!(
        values(&data),
        vec!["htu21d.temperature", "htu21d.humidity", "htu21d.dew_point_temperature"]
    );
    let dew = data[2].1;
    assert!(dew < data[0].1);
    assert_abs_diff_eq!(dew, sensor.dew_point().unwrap(), epsilon = 1e-9);
}

#[test]
fn test_htu21d_checksum_retry() {
    let bus = SimulatedBus::new();
    bus.set_registers(HTU21D_ADDRESS, 0xE3, &[0x4E, 0x85, 0x00]);
    let mut sensor = htu21d(&bus);
    assert!(matches!(sensor.temperature(), Err(Error::Checksum { .. })));
    // First attempt plus two retries.
    assert_eq!(bus.transactions().len(), 3);

    bus.clear_transactions();
    let mut strict = Htu21d::with_config(
        I2cInterface::new(bus.clone()),
        Htu21dConfig::default().with_checksum_retries(0),
    );
    assert!(strict.temperature().is_err());
    assert_eq!(bus.transactions().len(), 1);
}

#[test]
fn test_htu21d_bus_errors_not_retried() {
    let bus = SimulatedBus::new();
    bus.set_registers(HTU21D_ADDRESS, 0xE3, &[0x4E, 0x85, 0x6B]);
    bus.inject_i2c_fault(HTU21D_ADDRESS, SimFault::Nack);
    let mut sensor = htu21d(&bus);
    assert!(sensor.temperature().unwrap_err().is_bus_error());
    assert!(bus.transactions().is_empty());
}

#[test]
fn test_htu21d_failed_channel_is_omitted() {
    let bus = SimulatedBus::new();
    bus.set_registers(HTU21D_ADDRESS, 0xE3, &[0x4E, 0x85, 0x6B]);
    bus.set_registers(HTU21D_ADDRESS, 0xE5, &[0x80, 0x02, 0x00]);
    let mut sensor = Htu21d::with_config(
        I2cInterface::new(bus.clone()),
        Htu21dConfig::default().with_name("attic"),
    );
    let data = sensor.data();
    assert_eq!(values(&data), vec!["attic.temperature"]);
    assert_eq!(sensor.name(), "attic");
}

#[test]
fn test_htu21d_dew_point_skipped_without_humidity() {
    let bus = SimulatedBus::new();
    bus.set_registers(HTU21D_ADDRESS, 0xE3, &[0x4E, 0x85, 0x6B]);
    // Raw 0 reads as -6 % RH.
    bus.set_registers(HTU21D_ADDRESS, 0xE5, &[0x00, 0x00, 0x00]);
    let mut sensor = htu21d(&bus);

    let data = sensor.data();
    assert_eq!(values(&data), vec!["htu21d.temperature", "htu21d.humidity"]);
    assert!(data.iter().all(|(_, value)| value.is_finite()));
    assert!(matches!(sensor.dew_point(), Err(Error::ArgumentOutOfRange(_))));
}

#[test]
fn test_htu21d_user_register_and_reset() {
    let bus = SimulatedBus::new();
    bus.set_register(HTU21D_ADDRESS, 0xE7, 0x02);
    let mut sensor = htu21d(&bus);
    assert_eq!(sensor.read_user_register().unwrap(), 0x02);
    sensor.write_user_register(0x83).unwrap();
    assert_eq!(bus.register(HTU21D_ADDRESS, 0xE6), Some(0x83));
    sensor.soft_reset().unwrap();
    let last = bus.transactions().pop().unwrap();
    assert_eq!(last.write, vec![0xFE]);
}

#[test]
fn test_htu21d_meta_data() {
    let bus = SimulatedBus::new();
    let sensor = htu21d(&bus);
    let meta = sensor.meta_data();
    assert_eq!(meta.len(), 3);
    let temperature = &meta["temperature"];
    assert_eq!(temperature.kind, MeasurementKind::Gauge);
    assert_eq!(temperature.unit, "C");
    assert_eq!(temperature.range_low, Some(-40.0));
    assert_eq!(temperature.range_high, Some(125.0));
    assert_eq!(meta["humidity"].sensor, "htu21d");
}

#[test]
fn test_switch_counts_presses() {
    let _ = env_logger::builder().is_test(true).try_init();
    let bus = SimulatedBus::with_pin_count(8);
    let gpio = Arc::new(GpioController::new(bus.clone()));
    let mut switch = Switch::new(Arc::clone(&gpio), 3).unwrap();

    assert_eq!(gpio.pin_mode(3).unwrap(), PinMode::Input);
    // Pulled up while released.
    assert_eq!(bus.pin_level(3), Some(GpioLevel::High));
    assert!(!switch.is_pressed().unwrap());

    bus.pulse(3).unwrap();
    bus.pulse(3).unwrap();
    let data = switch.data();
    assert_eq!(data[0], ("gpio-switch-3.press_count".to_string(), 2.0));
    assert_eq!(data[1], ("gpio-switch-3.press_delta".to_string(), 2.0));

    bus.pulse(3).unwrap();
    let data = switch.data();
    assert_eq!(data[0].1, 3.0);
    assert_eq!(data[1].1, 1.0);

    bus.set_input_level(3, GpioLevel::Low).unwrap();
    assert!(switch.is_pressed().unwrap());

    let meta = switch.meta_data();
    assert_eq!(meta["press_count"].kind, MeasurementKind::Counter);
    assert_eq!(meta["press_delta"].kind, MeasurementKind::Delta);
    assert_eq!(meta["press_delta"].range_high, None);
}

#[test]
fn test_switch_disarms_on_drop() {
    let bus = SimulatedBus::with_pin_count(8);
    let gpio = Arc::new(GpioController::new(bus.clone()));
    let switch = Switch::with_name(Arc::clone(&gpio), 2, "door").unwrap();
    assert_eq!(switch.name(), "door");
    drop(switch);
    assert!(!bus.set_input_level(2, GpioLevel::Low).unwrap());
}
