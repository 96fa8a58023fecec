//! Platform seam: the raw bus operations every backend must provide.
//!
//! A backend is picked when the interface is constructed (as the type
//! parameter of [`crate::I2cInterface`] / [`crate::GpioController`]).
//! Transports are not internally synchronised; the interfaces built on top
//! of them provide the locking the crate needs.

use crate::error::{Error, Result};
use crate::gpio::{Edge, GpioLevel, GpioPull, PinMode, Transition};
use crate::i2c::I2cAddress;
use crate::interrupt::EdgeEventTracker;
use std::sync::Arc;
use std::time::Duration;

/// Maximum number of data bytes moved by a single block transfer.
pub const MAX_BLOCK_LEN: usize = 32;

/// Raw I2C transactions.
///
/// Only [`I2cTransport::transfer`] is required. The SMBus-style helpers are
/// built on it and can be overridden by controllers with native support.
pub trait I2cTransport {
    /// Writes `write` then reads `read.len()` bytes in one transaction.
    /// Either side may be empty; both empty is an address probe.
    fn transfer(&mut self, address: I2cAddress, write: &[u8], read: &mut [u8]) -> Result<()>;

    /// Checks whether a device acknowledges `address`.
    fn probe(&mut self, address: I2cAddress) -> Result<()> {
        self.transfer(address, &[], &mut [])
    }

    fn write_byte(&mut self, address: I2cAddress, value: u8) -> Result<()> {
        self.transfer(address, &[value], &mut [])
    }

    fn write_byte_data(&mut self, address: I2cAddress, register: u8, value: u8) -> Result<()> {
        self.transfer(address, &[register, value], &mut [])
    }

    /// Word data goes out low byte first.
    fn write_word_data(&mut self, address: I2cAddress, register: u8, value: u16) -> Result<()> {
        let [lo, hi] = value.to_le_bytes();
        self.transfer(address, &[register, lo, hi], &mut [])
    }

    /// The register byte shares the [`MAX_BLOCK_LEN`] payload with the data,
    /// so at most 31 data bytes fit.
    fn write_block_data(&mut self, address: I2cAddress, register: u8, data: &[u8]) -> Result<()> {
        if data.len() > MAX_BLOCK_LEN - 1 {
            return Err(Error::OperationTooLarge {
                max: MAX_BLOCK_LEN - 1,
                actual: data.len(),
            });
        }
        let mut buf = Vec::with_capacity(data.len() + 1);
        buf.push(register);
        buf.extend_from_slice(data);
        self.transfer(address, &buf, &mut [])
    }

    fn read_byte(&mut self, address: I2cAddress) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.transfer(address, &[], &mut buf)?;
        Ok(buf[0])
    }

    fn read_byte_data(&mut self, address: I2cAddress, register: u8) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.transfer(address, &[register], &mut buf)?;
        Ok(buf[0])
    }

    /// Word data arrives low byte first.
    fn read_word_data(&mut self, address: I2cAddress, register: u8) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.transfer(address, &[register], &mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    fn read_block_data(&mut self, address: I2cAddress, register: u8, buffer: &mut [u8]) -> Result<()> {
        if buffer.len() > MAX_BLOCK_LEN {
            return Err(Error::OperationTooLarge {
                max: MAX_BLOCK_LEN,
                actual: buffer.len(),
            });
        }
        self.transfer(address, &[register], buffer)
    }
}

/// How a GPIO backend hands edges to the trackers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeDelivery {
    /// The platform calls [`EdgeNotifier::notify`] from its own context.
    Native,
    /// Edges are discovered only inside [`GpioTransport::service_interrupts`].
    Polled,
}

/// Handle through which a backend reports an observed transition on an
/// armed pin.
#[derive(Clone)]
pub struct EdgeNotifier {
    tracker: Arc<EdgeEventTracker>,
}

impl EdgeNotifier {
    pub(crate) fn new(tracker: Arc<EdgeEventTracker>) -> Self {
        Self { tracker }
    }

    /// Pin this notifier belongs to.
    pub fn pin(&self) -> u8 {
        self.tracker.pin()
    }

    /// Reports a transition. Returns true if it matched the armed edge.
    pub fn notify(&self, transition: Transition) -> bool {
        self.tracker.record(transition)
    }
}

impl std::fmt::Debug for EdgeNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EdgeNotifier")
            .field("pin", &self.tracker.pin())
            .finish()
    }
}

/// Discrete pin access: the `{configure, read, write, arm_edge}` capability set.
pub trait GpioTransport {
    /// Number of pins addressable on this platform (valid pins are `0..count`).
    fn pin_count(&self) -> u8;

    fn configure(&mut self, pin: u8, mode: PinMode, pull: GpioPull, initial: GpioLevel) -> Result<()>;

    fn read(&mut self, pin: u8) -> Result<GpioLevel>;

    fn write(&mut self, pin: u8, level: GpioLevel) -> Result<()>;

    /// Starts reporting `edge` transitions on `pin` to `notifier`.
    fn arm_edge(&mut self, pin: u8, edge: Edge, notifier: EdgeNotifier) -> Result<()>;

    fn disarm_edge(&mut self, pin: u8) -> Result<()>;

    fn delivery(&self) -> EdgeDelivery;

    /// Collects pending edge events, waiting at most `timeout`, and feeds them
    /// to the armed notifiers. Returns the number of transitions reported.
    /// Native-delivery platforms have nothing to do here.
    fn service_interrupts(&mut self, _timeout: Duration) -> Result<usize> {
        Ok(0)
    }
}
