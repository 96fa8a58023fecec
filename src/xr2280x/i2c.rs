use super::{consts, write_hid_register};
use crate::error::{Error, Result};
use crate::i2c::I2cAddress;
use crate::transport::I2cTransport;
use hidapi::HidDevice;
use log::{debug, trace, warn};

/// Default I2C timeout in milliseconds.
pub const DEFAULT_I2C_TIMEOUT_MS: i32 = 500;

/// I2C side of an XR2280x bridge.
#[derive(Debug)]
pub struct Xr2280xI2c {
    device: HidDevice,
    timeout_ms: i32,
}

impl Xr2280xI2c {
    pub(crate) fn new(device: HidDevice) -> Self {
        Self {
            device,
            timeout_ms: DEFAULT_I2C_TIMEOUT_MS,
        }
    }

    /// How long each transaction waits for the bridge's status report.
    pub fn with_timeout_ms(mut self, timeout_ms: i32) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    /// Sets the I2C bus speed (approximated). Max supported is 400 kHz.
    pub fn set_speed_khz(&self, speed_khz: u32) -> Result<()> {
        if speed_khz == 0 || speed_khz > 400 {
            return Err(Error::ArgumentOutOfRange(format!(
                "I2C speed {} kHz out of range (1-400)",
                speed_khz
            )));
        }
        // SCL timing is counted in 60 MHz clock cycles.
        let total_cycles = 60_000 / speed_khz;
        let low_cycles = total_cycles / 2;
        let high_cycles = total_cycles - low_cycles;
        let (min_low, min_high) = if speed_khz <= 100 { (252, 240) } else { (78, 36) };
        let scl_low = low_cycles.max(min_low) as u16;
        let scl_high = high_cycles.max(min_high) as u16;
        debug!(
            "Setting I2C speed ~{}kHz: SCL_LOW=0x{:04X}, SCL_HIGH=0x{:04X}",
            speed_khz, scl_low, scl_high
        );
        write_hid_register(&self.device, consts::i2c::REG_SCL_LOW, scl_low)?;
        write_hid_register(&self.device, consts::i2c::REG_SCL_HIGH, scl_high)
    }

    fn check_status(address: I2cAddress, flags: u8) -> Result<()> {
        use consts::i2c::in_flags;
        if flags & in_flags::REQUEST_ERROR != 0 {
            Err(Error::I2cRequestError { address })
        } else if flags & in_flags::NAK_RECEIVED != 0 {
            Err(Error::I2cNack { address })
        } else if flags & in_flags::ARBITRATION_LOST != 0 {
            Err(Error::I2cArbitrationLost { address })
        } else if flags & in_flags::TIMEOUT != 0 {
            Err(Error::I2cTimeout { address })
        } else if flags & 0x0F != 0 {
            Err(Error::I2cUnknownError { address, flags })
        } else {
            Ok(())
        }
    }
}

/// Builds the OUT report for one transaction.
fn encode_out_report(address: I2cAddress, write: &[u8], read_len: usize) -> Result<Vec<u8>> {
    let max = consts::i2c::REPORT_MAX_DATA_SIZE;
    // A 10-bit address spends one data byte on its low half.
    let overhead = usize::from(matches!(address, I2cAddress::Bit10(_)));
    if write.len() + overhead > max {
        return Err(Error::OperationTooLarge {
            max: max - overhead,
            actual: write.len(),
        });
    }
    if read_len > max {
        return Err(Error::OperationTooLarge {
            max,
            actual: read_len,
        });
    }

    let mut out = vec![0u8; consts::i2c::OUT_REPORT_WRITE_BUF_SIZE];
    out[0] = consts::i2c::out_flags::START_BIT | consts::i2c::out_flags::STOP_BIT;
    out[2] = read_len as u8;
    let data_start = match address {
        // 7-bit address sits in bits 7:1, bit 0 is R/W.
        I2cAddress::Bit7(addr) => {
            out[3] = addr << 1;
            4
        }
        // 11110xx0 followed by the low address byte.
        I2cAddress::Bit10(addr) => {
            out[3] = 0xF0 | ((((addr >> 8) & 0x03) as u8) << 1);
            out[4] = (addr & 0xFF) as u8;
            5
        }
    };
    out[1] = (write.len() + overhead) as u8;
    out[data_start..data_start + write.len()].copy_from_slice(write);
    Ok(out)
}

impl I2cTransport for Xr2280xI2c {
    fn transfer(&mut self, address: I2cAddress, write: &[u8], read: &mut [u8]) -> Result<()> {
        let out_buf = encode_out_report(address, write, read.len())?;
        debug!(
            "I2C transfer to {}: write {} bytes, read {} bytes",
            address,
            write.len(),
            read.len()
        );
        trace!("I2C OUT buffer: {:02X?}", &out_buf);

        let written = self.device.write(&out_buf)?;
        if written != out_buf.len() {
            warn!("Partial write: sent {} of {} bytes", written, out_buf.len());
            return Err(Error::Bus {
                address,
                message: format!("partial HID write, sent {} of {} bytes", written, out_buf.len()),
            });
        }

        // The bridge answers every transaction with a status report.
        let mut in_buf = [0u8; consts::i2c::IN_REPORT_READ_BUF_SIZE];
        let received = self.device.read_timeout(&mut in_buf, self.timeout_ms)?;
        trace!("I2C IN buffer: {:02X?}", &in_buf[..received]);
        if received == 0 {
            return Err(Error::I2cTimeout { address });
        }
        decode_in_report(address, &in_buf[..received], read)
    }
}

/// Checks the status of an IN report and copies the read data into `read`.
fn decode_in_report(address: I2cAddress, report: &[u8], read: &mut [u8]) -> Result<()> {
    if report.len() < 4 {
        return Err(Error::InvalidReport(report.len()));
    }
    Xr2280xI2c::check_status(address, report[0])?;
    if read.is_empty() {
        return Ok(());
    }

    let reported = report[2] as usize;
    if reported != read.len() {
        warn!(
            "I2C read length mismatch: expected {}, got {}",
            read.len(),
            reported
        );
        // Never hand back a partially filled buffer.
        return Err(Error::Bus {
            address,
            message: format!("read {} of {} bytes", reported, read.len()),
        });
    }
    let data = &report[4..];
    if data.len() < read.len() {
        return Err(Error::InvalidReport(report.len()));
    }
    read.copy_from_slice(&data[..read.len()]);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_7bit_report_layout() {
        let out = encode_out_report(I2cAddress::Bit7(0x40), &[0xE3], 3).unwrap();
        assert_eq!(&out[..5], &[0x03, 1, 3, 0x80, 0xE3]);
        assert_eq!(out.len(), consts::i2c::OUT_REPORT_WRITE_BUF_SIZE);
    }

    #[test]
    fn test_10bit_report_layout() {
        // (address, first byte, second byte)
        let cases = [
            (0x000, 0xF0, 0x00),
            (0x150, 0xF2, 0x50),
            (0x2A5, 0xF4, 0xA5),
            (0x3FF, 0xF6, 0xFF),
        ];
        for (addr, first, second) in cases {
            let out = encode_out_report(I2cAddress::Bit10(addr), &[0xAA], 0).unwrap();
            assert_eq!(out[1], 2, "0x{addr:03X}: write size includes low address byte");
            assert_eq!(out[3], first, "0x{addr:03X}");
            assert_eq!(out[4], second, "0x{addr:03X}");
            assert_eq!(out[5], 0xAA, "0x{addr:03X}");
            assert_eq!(out[3] & 0xF9, 0xF0, "0x{addr:03X}: 11110xx0 pattern");
        }
    }

    #[test]
    fn test_oversized_transfers_rejected() {
        let data = [0u8; 33];
        assert!(matches!(
            encode_out_report(I2cAddress::Bit7(0x10), &data, 0),
            Err(Error::OperationTooLarge { max: 32, actual: 33 })
        ));
        assert!(matches!(
            encode_out_report(I2cAddress::Bit10(0x10), &data[..32], 0),
            Err(Error::OperationTooLarge { max: 31, actual: 32 })
        ));
        assert!(matches!(
            encode_out_report(I2cAddress::Bit7(0x10), &[], 33),
            Err(Error::OperationTooLarge { max: 32, actual: 33 })
        ));
    }

    #[test]
    fn test_in_report_decoding() {
        let address = I2cAddress::Bit7(0x40);
        let mut read = [0u8; 2];
        decode_in_report(address, &[0x00, 0, 2, 0, 0x12, 0x34], &mut read).unwrap();
        assert_eq!(read, [0x12, 0x34]);

        // The bridge returned fewer bytes than asked for.
        let mut read = [0u8; 3];
        let err = decode_in_report(address, &[0x00, 0, 1, 0, 0x12], &mut read).unwrap_err();
        assert!(matches!(err, Error::Bus { .. }), "{err:?}");
        assert!(err.is_bus_error());
        assert_eq!(read, [0, 0, 0]);

        assert!(matches!(
            decode_in_report(address, &[0x00, 0], &mut read),
            Err(Error::InvalidReport(2))
        ));
    }
}
