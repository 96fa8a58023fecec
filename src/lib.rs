//! # sensorbus
//!
//! Register-level I²C access and edge-detecting GPIO for environmental
//! sensor drivers, on interchangeable bus backends.
//!
//! ## Features
//!
//! *   I²C register interface ([`I2cInterface`]):
//!     *   Raw byte, register byte/word and block reads and writes.
//!     *   Signed and unsigned interpretation, selectable word byte order.
//!     *   CRC-8 checked reads for humidity/temperature sensors
//!         (`read_crc_checked_block`, see [`crc`]).
//!     *   Bus scanning (`scan`, `scan_with_progress`).
//! *   GPIO ([`GpioController`]):
//!     *   Pin setup (input/output/alternate, pull-up/pull-down).
//!     *   Single pin and multi pin reads, output writes.
//!     *   Edge detection (rising/falling/both) with either a read-and-clear
//!         flag (`has_edge_occurred`) or a callback per edge.
//!     *   Bounded blocking waits (`wait_for_edge`) that can be cancelled by
//!         disarming the pin from another thread.
//! *   Backends ([`transport`]):
//!     *   [`sim::SimulatedBus`]: in-memory register files and pins, for
//!         driver development and tests.
//!     *   [`xr2280x`]: MaxLinear/Exar XR22800/1/2/4 USB bridges through
//!         `hidapi` (feature `xr2280x`, on by default).
//! *   Sensor drivers ([`sensor`]): HTU21D humidity/temperature sensor and
//!     a GPIO push button counter.
//!
//! ## Backends and edge delivery
//!
//! Some platforms push edge notifications from their own context
//! ([`EdgeDelivery::Native`]); others only discover edges when asked
//! ([`EdgeDelivery::Polled`]). [`GpioController`] hides the difference:
//! `has_edge_occurred` and `wait_for_edge` service a polled backend
//! themselves, and [`GpioController::poll_events`] does so on demand for
//! callback users.
//!
//! ## Basic Usage
//!
//! ```
//! use sensorbus::{
//!     sim::SimulatedBus, Edge, GpioController, GpioLevel, GpioPull, I2cInterface, PinMode, Result,
//! };
//! use std::time::Duration;
//!
//! fn main() -> Result<()> {
//!     let bus = SimulatedBus::new();
//!     bus.set_registers(0x48, 0x00, &[0x12, 0x34]);
//!
//!     let mut i2c = I2cInterface::new(bus.clone());
//!     assert_eq!(i2c.read_register_unsigned_word(0x48, 0x00, false)?, 0x1234);
//!
//!     let gpio = GpioController::new(bus.clone());
//!     gpio.setup_pin(4, PinMode::Input, GpioPull::Down, GpioLevel::Low)?;
//!     gpio.enable_edge_detection(4, Edge::Rising, None)?;
//!     bus.set_input_level(4, GpioLevel::High)?;
//!     assert!(gpio.has_edge_occurred(4)?);
//!     assert!(!gpio.has_edge_occurred(4)?);
//!
//!     // Nothing is driving the pin any more: the wait runs out.
//!     assert!(gpio
//!         .wait_for_edge(4, Edge::Rising, Some(Duration::from_millis(20)))
//!         .is_err());
//!     Ok(())
//! }
//! ```
//!
//! ## Hardware Setup Notes
//!
//! *   **I²C Pull-up Resistors:** Required externally (e.g., 4.7kΩ to 3.3V).
//! *   **Linux udev Rules:** the XR2280x HID interfaces need user access:
//!     ```udev
//!     SUBSYSTEM=="hidraw", ATTRS{idVendor}=="04e2", ATTRS{idProduct}=="1100", MODE="0666", GROUP="plugdev"
//!     SUBSYSTEM=="hidraw", ATTRS{idVendor}=="04e2", ATTRS{idProduct}=="1200", MODE="0666", GROUP="plugdev"
//!     ```
//!
//! ## License
//!
//! This project is licensed under the WTFPL.

mod error;

pub mod crc;
pub mod gpio;
pub mod i2c;
pub mod interrupt;
pub mod sensor;
pub mod sim;
pub mod transport;
#[cfg(feature = "xr2280x")]
pub mod xr2280x;

pub use error::{Error, Result};
pub use gpio::{Edge, GpioConfig, GpioController, GpioLevel, GpioPull, PinMode, Transition};
pub use i2c::{I2cAddress, I2cInterface};
pub use interrupt::{EdgeCallback, EdgeEvent, EdgeEventTracker};
pub use transport::{EdgeDelivery, EdgeNotifier, GpioTransport, I2cTransport};
