//! Register-level I2C access.

use crate::crc;
use crate::error::{Error, Result};
use crate::transport::{I2cTransport, MAX_BLOCK_LEN};
use log::{debug, trace, warn};
use std::fmt;

/// Represents a 7-bit or 10-bit I2C slave address.
/// Use `I2cAddress::new_7bit(addr)` or `I2cAddress::new_10bit(addr)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum I2cAddress {
    /// Standard 7-bit address (0x00 - 0x7F).
    Bit7(u8),
    /// Extended 10-bit address (0x0000 - 0x03FF).
    Bit10(u16),
}

impl I2cAddress {
    /// Creates a 7-bit address, checking validity (0-127).
    pub fn new_7bit(addr: u8) -> Result<Self> {
        if addr <= 0x7F {
            Ok(I2cAddress::Bit7(addr))
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "7-bit I2C address must be 0-127, got 0x{:02X}",
                addr
            )))
        }
    }

    /// Creates a 10-bit address, checking validity (0-1023).
    pub fn new_10bit(addr: u16) -> Result<Self> {
        if addr <= 0x03FF {
            Ok(I2cAddress::Bit10(addr))
        } else {
            Err(Error::ArgumentOutOfRange(format!(
                "10-bit I2C address must be 0-1023, got 0x{:04X}",
                addr
            )))
        }
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            I2cAddress::Bit7(a) => write!(f, "0x{:02X}", a),
            I2cAddress::Bit10(a) => write!(f, "10-bit 0x{:03X}", a),
        }
    }
}

/// Typed register reads and writes on top of an [`I2cTransport`].
///
/// Every operation is a single bus transaction issued in call order and
/// logged at `trace` level. Nothing is retried; on error no value is
/// returned. Methods take `&mut self`: put the interface behind a `Mutex`
/// to share one bus between threads.
///
/// ```
/// use sensorbus::{I2cInterface, sim::SimulatedBus};
///
/// # fn main() -> sensorbus::Result<()> {
/// let bus = SimulatedBus::new();
/// bus.attach_i2c_device(0x48);
/// let mut i2c = I2cInterface::new(bus);
/// i2c.write_register_byte(0x48, 0x01, 0xF0)?;
/// assert_eq!(i2c.read_register_signed_byte(0x48, 0x01)?, -16);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct I2cInterface<T: I2cTransport> {
    transport: T,
}

impl<T: I2cTransport> I2cInterface<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    /// Writes `value & 0xFF` to the device with no register framing.
    pub fn write_raw_byte(&mut self, address: u8, value: u32) -> Result<()> {
        let addr = I2cAddress::new_7bit(address)?;
        let value = (value & 0xFF) as u8;
        trace!("I2C {} write raw 0x{:02X}", addr, value);
        self.transport.write_byte(addr, value)
    }

    /// Writes `value & 0xFF` to `register`.
    pub fn write_register_byte(&mut self, address: u8, register: u8, value: u32) -> Result<()> {
        let addr = I2cAddress::new_7bit(address)?;
        let value = (value & 0xFF) as u8;
        trace!("I2C {} reg 0x{:02X} write u8 0x{:02X}", addr, register, value);
        self.transport.write_byte_data(addr, register, value)
    }

    /// Writes `value & 0xFFFF` to `register` in native bus order (low byte first).
    pub fn write_register_word(&mut self, address: u8, register: u8, value: u32) -> Result<()> {
        let addr = I2cAddress::new_7bit(address)?;
        let value = (value & 0xFFFF) as u16;
        trace!("I2C {} reg 0x{:02X} write u16 0x{:04X}", addr, register, value);
        self.transport.write_word_data(addr, register, value)
    }

    /// Writes `data` starting at `register`.
    ///
    /// At most 31 data bytes fit next to the register byte; more fail with
    /// [`Error::OperationTooLarge`]. A failed block write leaves the device in an unknown state; it is not
    /// retried.
    pub fn write_register_block(&mut self, address: u8, register: u8, data: &[u8]) -> Result<()> {
        let addr = I2cAddress::new_7bit(address)?;
        trace!("I2C {} reg 0x{:02X} write block {:02X?}", addr, register, data);
        self.transport.write_block_data(addr, register, data)
    }

    /// Reads one byte with no register framing.
    pub fn read_raw_byte(&mut self, address: u8) -> Result<u8> {
        let addr = I2cAddress::new_7bit(address)?;
        let value = self.transport.read_byte(addr)?;
        trace!("I2C {} read raw 0x{:02X}", addr, value);
        Ok(value)
    }

    pub fn read_register_unsigned_byte(&mut self, address: u8, register: u8) -> Result<u8> {
        let addr = I2cAddress::new_7bit(address)?;
        let value = self.transport.read_byte_data(addr, register)?;
        trace!("I2C {} reg 0x{:02X} read u8 0x{:02X}", addr, register, value);
        Ok(value)
    }

    /// Reads a byte and interprets it as two's complement.
    pub fn read_register_signed_byte(&mut self, address: u8, register: u8) -> Result<i8> {
        let value = self.read_register_unsigned_byte(address, register)? as i8;
        trace!("I2C 0x{:02X} reg 0x{:02X} read i8 {}", address, register, value);
        Ok(value)
    }

    /// Reads a 16-bit register.
    ///
    /// The bus delivers the low byte first; with `little_endian == false`
    /// the two bytes are swapped so a big-endian register reads correctly.
    pub fn read_register_unsigned_word(&mut self, address: u8, register: u8, little_endian: bool) -> Result<u16> {
        let addr = I2cAddress::new_7bit(address)?;
        let raw = self.transport.read_word_data(addr, register)?;
        let value = if little_endian { raw } else { raw.swap_bytes() };
        trace!(
            "I2C {} reg 0x{:02X} read u16 0x{:04X} ({})",
            addr,
            register,
            value,
            if little_endian { "LE" } else { "BE" }
        );
        Ok(value)
    }

    /// Reads a 16-bit register and interprets it as two's complement.
    pub fn read_register_signed_word(&mut self, address: u8, register: u8, little_endian: bool) -> Result<i16> {
        let value = self.read_register_unsigned_word(address, register, little_endian)? as i16;
        trace!("I2C 0x{:02X} reg 0x{:02X} read i16 {}", address, register, value);
        Ok(value)
    }

    /// Reads `length` consecutive bytes starting at `register`.
    pub fn read_register_block(&mut self, address: u8, register: u8, length: usize) -> Result<Vec<u8>> {
        let addr = I2cAddress::new_7bit(address)?;
        if length > MAX_BLOCK_LEN {
            return Err(Error::OperationTooLarge {
                max: MAX_BLOCK_LEN,
                actual: length,
            });
        }
        let mut buffer = vec![0u8; length];
        self.transport.read_block_data(addr, register, &mut buffer)?;
        trace!(
            "I2C {} reg 0x{:02X} read block of {}: {:02X?}",
            addr,
            register,
            length,
            buffer
        );
        Ok(buffer)
    }

    /// Reads two data bytes plus a CRC-8 byte from `register` and validates
    /// them.
    ///
    /// Returns the big-endian 16-bit reading with its two low status bits
    /// cleared, or [`Error::Checksum`] if the CRC does not match.
    pub fn read_crc_checked_block(&mut self, address: u8, register: u8) -> Result<u16> {
        let block = self.read_register_block(address, register, 3)?;
        let (msb, lsb, checksum) = (block[0], block[1], block[2]);
        if !crc::crc_check(msb, lsb, checksum) {
            warn!(
                "CRC mismatch at 0x{:02X} reg 0x{:02X}: data {:02X} {:02X}, checksum 0x{:02X}",
                address, register, msb, lsb, checksum
            );
            return Err(Error::Checksum {
                address: I2cAddress::new_7bit(address)?,
                register,
                data: [msb, lsb],
                checksum,
            });
        }
        let value = u16::from_be_bytes([msb, lsb]) & 0xFFFC;
        trace!("I2C 0x{:02X} reg 0x{:02X} read checked 0x{:04X}", address, register, value);
        Ok(value)
    }

    /// Probes every 7-bit address in `start..=end` and returns the ones that
    /// acknowledged.
    pub fn scan(&mut self, start: u8, end: u8) -> Result<Vec<u8>> {
        self.scan_with_progress(start, end, |_, _, _, _| {})
    }

    /// Like [`I2cInterface::scan`], calling `progress(addr, found, index, total)`
    /// after each address.
    pub fn scan_with_progress<F>(&mut self, start: u8, end: u8, mut progress: F) -> Result<Vec<u8>>
    where
        F: FnMut(u8, bool, usize, usize),
    {
        if start > end {
            return Err(Error::ArgumentOutOfRange(format!(
                "scan range 0x{:02X}..=0x{:02X} is empty",
                start, end
            )));
        }
        let end_addr = I2cAddress::new_7bit(end)?;
        debug!("Scanning I2C addresses 0x{:02X}..={}", start, end_addr);

        let total = (end - start) as usize + 1;
        let mut found_devices = Vec::new();
        for (idx, addr_7bit) in (start..=end).enumerate() {
            let address = I2cAddress::Bit7(addr_7bit);
            let found = match self.transport.probe(address) {
                Ok(()) => {
                    found_devices.push(addr_7bit);
                    true
                }
                Err(Error::I2cNack { .. }) | Err(Error::I2cTimeout { .. }) => false,
                Err(e) => {
                    debug!("Error scanning address 0x{:02X}: {}", addr_7bit, e);
                    false
                }
            };
            progress(addr_7bit, found, idx, total);
        }
        Ok(found_devices)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i2c_address_creation() {
        assert_eq!(I2cAddress::new_7bit(0x40).unwrap(), I2cAddress::Bit7(0x40));
        assert!(I2cAddress::new_7bit(0x80).is_err());
        assert_eq!(I2cAddress::new_10bit(0x3FF).unwrap(), I2cAddress::Bit10(0x3FF));
        assert!(I2cAddress::new_10bit(0x400).is_err());
    }

    #[test]
    fn test_i2c_address_display() {
        assert_eq!(I2cAddress::Bit7(0x40).to_string(), "0x40");
        assert_eq!(I2cAddress::Bit10(0x150).to_string(), "10-bit 0x150");
    }
}
