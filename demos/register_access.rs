use sensorbus::sensor::{Htu21d, SensorDriver, HTU21D_ADDRESS};
use sensorbus::sim::SimulatedBus;
use sensorbus::{crc, I2cInterface, Result};

fn main() -> Result<()> {
    env_logger::init();
    let bus = SimulatedBus::new();
    // An accelerometer-like device with a signed big-endian register at 0x32.
    bus.set_registers(0x1D, 0x32, &[0xFF, 0x38]);
    // An HTU21D answering 0x4E85 for temperature and 0x7C80 for humidity.
    bus.set_registers(HTU21D_ADDRESS, 0xE3, &[0x4E, 0x85, crc::checksum(0x4E, 0x85)]);
    bus.set_registers(HTU21D_ADDRESS, 0xE5, &[0x7C, 0x80, crc::checksum(0x7C, 0x80)]);

    let mut i2c = I2cInterface::new(bus.clone());

    println!("Scanning I2C bus (7-bit addresses 0x08 to 0x77)...");
    let found = i2c.scan(0x08, 0x77)?;
    println!(
        "Found: {:?}",
        found
            .iter()
            .map(|a| format!("0x{:02X}", a))
            .collect::<Vec<_>>()
    );

    let axis = i2c.read_register_signed_word(0x1D, 0x32, false)?;
    println!("Signed big-endian word at 0x1D/0x32: {}", axis);

    let raw = i2c.read_crc_checked_block(HTU21D_ADDRESS, 0xE3)?;
    println!("Checked HTU21D temperature word: 0x{:04X}", raw);

    let mut sensor = Htu21d::new(i2c);
    for (name, value) in sensor.data() {
        println!("{:<32} {:8.2}", name, value);
    }

    println!("\nBus log:");
    for t in bus.transactions() {
        println!("  0x{:02X} write {:02X?} read {:02X?}", t.address, t.write, t.read);
    }
    Ok(())
}
