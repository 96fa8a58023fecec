use hidapi::HidApi;
use sensorbus::sensor::{Htu21d, SensorDriver, Switch};
use sensorbus::xr2280x::Xr2280x;
use sensorbus::{Error, GpioController, I2cInterface, Result};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn main() -> Result<()> {
    env_logger::init();
    let hid_api = HidApi::new()?;
    println!("Opening first XR2280x device...");
    let device = match Xr2280x::open_first(&hid_api) {
        Ok(dev) => dev,
        Err(e) => {
            eprintln!("Error opening device: {}", e);
            eprintln!(
                "Ensure device is connected and permissions are set (e.g., udev rules on Linux)."
            );
            return Err(e);
        }
    };
    println!("Device opened ({} GPIOs).", device.gpio_count());

    let (i2c, gpio) = device.split();
    let i2c = i2c.ok_or(Error::DeviceNotFound)?;
    i2c.set_speed_khz(100)?;
    let mut htu21d = Htu21d::new(I2cInterface::new(i2c));
    htu21d.soft_reset()?;

    // Optional push button on E0, if the EDGE interface is present.
    let mut button = match gpio {
        Some(gpio) => Some(Switch::new(Arc::new(GpioController::new(gpio)), 0)?),
        None => None,
    };

    for _ in 0..10 {
        let mut readings = htu21d.data();
        if let Some(button) = button.as_mut() {
            readings.extend(button.data());
        }
        for (name, value) in readings {
            println!("{:<32} {:8.2}", name, value);
        }
        println!();
        thread::sleep(Duration::from_secs(1));
    }
    Ok(())
}
