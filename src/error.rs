use crate::gpio::{Edge, PinMode};
use crate::i2c::I2cAddress;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while talking to sensors over I2C or GPIO.
///
/// Bus-level failures keep their specific cause; use [`Error::is_bus_error`]
/// to treat them as one class. The core never retries: every error is
/// surfaced to the caller as soon as it happens.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the underlying HID API layer.
    #[cfg(feature = "xr2280x")]
    #[error("HID API error: {0}")]
    Hid(#[from] hidapi::HidError),
    /// No bridge device was found.
    #[error("Device not found")]
    DeviceNotFound,
    /// General I/O error during device communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Invalid or malformed report received from a bus controller.
    #[error("Invalid report received or unexpected size ({0} bytes)")]
    InvalidReport(usize),
    /// Transaction failed at the controller level for a reason not covered below.
    #[error("Bus error at I2C address {address}: {message}")]
    Bus {
        /// The I2C address being accessed.
        address: I2cAddress,
        /// Controller-specific detail.
        message: String,
    },
    /// I2C slave device responded with NACK (not acknowledged).
    #[error("No device acknowledged at I2C address {address} (NACK)")]
    I2cNack {
        /// The I2C address that sent the NACK.
        address: I2cAddress,
    },
    /// I2C bus arbitration was lost during transaction.
    #[error("I2C arbitration lost at address {address}")]
    I2cArbitrationLost {
        /// The I2C address being accessed when arbitration was lost.
        address: I2cAddress,
    },
    /// I2C bus timeout occurred during transaction.
    #[error("I2C timeout at address {address}: device did not respond within the timeout period")]
    I2cTimeout {
        /// The I2C address being accessed when timeout occurred.
        address: I2cAddress,
    },
    /// Controller rejected the transaction parameters.
    #[error("I2C request error at address {address}: invalid parameters sent to bus controller")]
    I2cRequestError {
        /// The I2C address being accessed when the error occurred.
        address: I2cAddress,
    },
    /// Controller reported an unrecognised status.
    #[error("I2C unknown error at address {address} (status 0x{flags:02X})")]
    I2cUnknownError {
        /// The I2C address being accessed when the error occurred.
        address: I2cAddress,
        /// Raw status flags reported by the controller.
        flags: u8,
    },
    /// CRC check failed on a checksummed block read.
    #[error(
        "Checksum mismatch reading register 0x{register:02X} at I2C address {address}: data {data:02X?}, checksum 0x{checksum:02X}"
    )]
    Checksum {
        /// The I2C address that was read.
        address: I2cAddress,
        /// The register (or command) that was read.
        register: u8,
        /// The two data bytes as received.
        data: [u8; 2],
        /// The checksum byte as received.
        checksum: u8,
    },
    /// GPIO pin number is outside the platform's valid range.
    #[error("GPIO pin {pin} out of range (platform has {count} pins)")]
    InvalidPin {
        /// The invalid pin number that was specified.
        pin: u8,
        /// Number of pins the platform exposes.
        count: u8,
    },
    /// GPIO pin is not configured in the mode the operation requires.
    #[error("GPIO pin {pin} is configured as {actual:?}, operation requires {expected:?}")]
    Mode {
        /// The pin that was used.
        pin: u8,
        /// Mode the operation requires.
        expected: PinMode,
        /// Mode the pin is currently configured with.
        actual: PinMode,
    },
    /// An operation that needs armed edge detection was used on an unarmed pin.
    #[error("Edge detection is not enabled on GPIO pin {pin}")]
    EdgeNotArmed {
        /// The pin that was used.
        pin: u8,
    },
    /// A wait requested a different edge than the one the pin is armed for.
    #[error("GPIO pin {pin} is armed for {armed:?} edges, cannot wait for {requested:?}")]
    EdgeConflict {
        /// The pin that was used.
        pin: u8,
        /// Edge the pin is currently armed for.
        armed: Edge,
        /// Edge the caller asked to wait for.
        requested: Edge,
    },
    /// No edge arrived before the deadline.
    #[error("Timed out after {timeout:?} waiting for an edge on GPIO pin {pin}")]
    EdgeWaitTimeout {
        /// The pin that was waited on.
        pin: u8,
        /// The timeout that elapsed.
        timeout: Duration,
    },
    /// Edge detection was disabled while a wait was in progress.
    #[error("Wait for an edge on GPIO pin {pin} was cancelled")]
    EdgeWaitCancelled {
        /// The pin that was waited on.
        pin: u8,
    },
    /// HID feature report operation failed.
    #[cfg(feature = "xr2280x")]
    #[error("Feature report error while accessing register 0x{reg_addr:04X}")]
    FeatureReportError {
        /// The register address that was being accessed.
        reg_addr: u16,
    },
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// Requested operation exceeds device or protocol limits.
    #[error("Requested operation size is too large (max {max}, got {actual})")]
    OperationTooLarge {
        /// Maximum allowed size for this operation.
        max: usize,
        /// Actual size requested.
        actual: usize,
    },
    /// Feature is not supported by this platform or chip model.
    #[error("Feature not supported: {0}")]
    UnsupportedFeature(String),
    /// Failed to parse a GPIO interrupt report from the controller.
    #[error("GPIO interrupt report parsing failed: {0}")]
    InterruptParseError(String),
}

impl Error {
    /// Returns true if the transaction failed at the hardware or driver level.
    pub fn is_bus_error(&self) -> bool {
        match self {
            #[cfg(feature = "xr2280x")]
            Error::Hid(_) | Error::FeatureReportError { .. } => true,
            Error::Io(_)
            | Error::InvalidReport(_)
            | Error::Bus { .. }
            | Error::I2cNack { .. }
            | Error::I2cArbitrationLost { .. }
            | Error::I2cTimeout { .. }
            | Error::I2cRequestError { .. }
            | Error::I2cUnknownError { .. } => true,
            _ => false,
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(feature = "xr2280x")]
pub(crate) fn unsupported_gpio_group1(pin: u8) -> Error {
    Error::UnsupportedFeature(format!(
        "GPIO pin {} is in group 1 (pins 8-31), which requires XR22802/XR22804",
        pin
    ))
}
