//! CRC-8 protection for 16-bit sensor readings.
//!
//! Humidity/temperature sensors in the HTU21D family append a checksum byte
//! to every 2-byte reading. The checksum is CRC-8 with polynomial
//! x^8 + x^5 + x^4 + 1 (0x31), zero initial value, no reflection.

use crc::{Algorithm, Crc};

/// Polynomial 0x131 aligned to bit 23 of the 24-bit remainder.
pub const CRC_DIVISOR: u32 = 0x98_8000;

const CRC_8_HTU21D: Algorithm<u8> = Algorithm {
    width: 8,
    poly: 0x31,
    init: 0x00,
    refin: false,
    refout: false,
    xorout: 0x00,
    check: 0xA2,
    residue: 0x00,
};

const CRC: Crc<u8> = Crc::<u8>::new(&CRC_8_HTU21D);

/// Computes the checksum byte a sensor would send after `msb`, `lsb`.
pub fn checksum(msb: u8, lsb: u8) -> u8 {
    CRC.checksum(&[msb, lsb])
}

/// Verifies a 2-byte reading against its trailing checksum byte.
///
/// Long division of the 24-bit word `msb:lsb:crc` by [`CRC_DIVISOR`]; the
/// block is valid iff the remainder is zero.
pub fn crc_check(msb: u8, lsb: u8, crc: u8) -> bool {
    let mut remainder = (u32::from(msb) << 16) | (u32::from(lsb) << 8) | u32::from(crc);
    let mut divisor = CRC_DIVISOR;
    for bit in (8..24).rev() {
        if remainder & (1 << bit) != 0 {
            remainder ^= divisor;
        }
        divisor >>= 1;
    }
    remainder == 0
}
