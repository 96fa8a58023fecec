//! MaxLinear/Exar XR2280x USB bridge backend.
//!
//! The XR22800/1/2/4 expose I2C and GPIO ("EDGE") as two separate USB HID
//! interfaces. [`Xr2280x`] opens both and [`Xr2280x::split`] hands each one
//! out as an independent transport, so the I2C and GPIO sides can be locked
//! separately. GPIO edges arrive as HID interrupt reports and are therefore
//! delivered by polling ([`crate::transport::EdgeDelivery::Polled`]).

pub mod consts;
mod gpio;
mod i2c;

pub use gpio::{GpioPin, Xr2280xGpio};
pub use i2c::Xr2280xI2c;

use crate::error::{Error, Result};
use hidapi::{HidApi, HidDevice};
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::ffi::CString;

/// One HID interface of a discovered bridge.
#[derive(Debug, Clone)]
pub struct InterfaceInfo {
    pub pid: u16,
    pub path: CString,
    pub interface_number: i32,
}

/// A discovered bridge, with its HID interfaces grouped by serial number.
#[derive(Debug, Clone)]
pub struct XrDeviceInfo {
    pub vid: u16,
    pub serial_number: Option<String>,
    pub product_string: Option<String>,
    pub i2c_interface: Option<InterfaceInfo>,
    pub edge_interface: Option<InterfaceInfo>,
}

impl XrDeviceInfo {
    fn assign(&mut self, interface: InterfaceInfo) {
        if interface.pid == consts::XR2280X_I2C_PID {
            self.i2c_interface = Some(interface);
        } else if interface.pid == consts::XR2280X_EDGE_PID {
            self.edge_interface = Some(interface);
        }
    }
}

/// Finds all XR2280x bridges, ordered by serial number (unnamed ones last).
pub fn find_all(hid_api: &HidApi) -> Vec<XrDeviceInfo> {
    let mut by_serial: HashMap<String, XrDeviceInfo> = HashMap::new();
    let mut without_serial = Vec::new();

    for info in hid_api.device_list().filter(|info| {
        info.vendor_id() == consts::EXAR_VID
            && (info.product_id() == consts::XR2280X_I2C_PID
                || info.product_id() == consts::XR2280X_EDGE_PID)
    }) {
        debug!(
            "Found XR2280x interface: PID={:04X}, Path={:?}, SN={:?}",
            info.product_id(),
            info.path(),
            info.serial_number()
        );
        let interface = InterfaceInfo {
            pid: info.product_id(),
            path: info.path().to_owned(),
            interface_number: info.interface_number(),
        };
        let serial = info.serial_number().map(str::to_string);
        let blank = || XrDeviceInfo {
            vid: info.vendor_id(),
            serial_number: serial.clone(),
            product_string: info.product_string().map(str::to_string),
            i2c_interface: None,
            edge_interface: None,
        };
        match &serial {
            Some(sn) => by_serial.entry(sn.clone()).or_insert_with(blank).assign(interface),
            None => {
                let mut device = blank();
                device.assign(interface);
                without_serial.push(device);
            }
        }
    }

    let mut devices: Vec<XrDeviceInfo> = by_serial.into_values().collect();
    devices.sort_by(|a, b| a.serial_number.cmp(&b.serial_number));
    devices.extend(without_serial);
    devices
}

/// Finds the first bridge. Ambiguous if several are attached.
pub fn find_first(hid_api: &HidApi) -> Result<XrDeviceInfo> {
    find_all(hid_api)
        .into_iter()
        .next()
        .ok_or(Error::DeviceNotFound)
}

/// An opened bridge.
#[derive(Debug)]
pub struct Xr2280x {
    i2c_device: Option<HidDevice>,
    edge_device: Option<HidDevice>,
    gpio_count: u8,
}

impl Xr2280x {
    /// Opens whichever of the bridge's interfaces are present.
    pub fn open(hid_api: &HidApi, info: &XrDeviceInfo) -> Result<Self> {
        let open = |interface: &Option<InterfaceInfo>| -> Result<Option<HidDevice>> {
            interface
                .as_ref()
                .map(|i| hid_api.open_path(&i.path).map_err(Error::Hid))
                .transpose()
        };
        let i2c_device = open(&info.i2c_interface)?;
        let edge_device = open(&info.edge_interface)?;
        if i2c_device.is_none() && edge_device.is_none() {
            return Err(Error::DeviceNotFound);
        }

        let gpio_count = match &edge_device {
            // Group 1 registers only answer on XR22802/4.
            Some(device) => match read_hid_register(device, consts::edge::REG_FUNC_SEL.1) {
                Ok(_) => 32,
                Err(Error::FeatureReportError { .. }) => 8,
                Err(e) => {
                    warn!("Error during capability detection: {}", e);
                    return Err(e);
                }
            },
            None => 0,
        };
        debug!(
            "Opened XR2280x (SN {:?}): i2c={}, edge={}, {} GPIOs",
            info.serial_number,
            i2c_device.is_some(),
            edge_device.is_some(),
            gpio_count
        );

        Ok(Self {
            i2c_device,
            edge_device,
            gpio_count,
        })
    }

    /// Opens the first bridge found.
    pub fn open_first(hid_api: &HidApi) -> Result<Self> {
        let info = find_first(hid_api)?;
        Self::open(hid_api, &info)
    }

    /// Number of GPIOs reachable over HID (8 on XR22800/1, 32 on XR22802/4).
    pub fn gpio_count(&self) -> u8 {
        self.gpio_count
    }

    /// Separates the bridge into its I2C and GPIO transports.
    pub fn split(self) -> (Option<Xr2280xI2c>, Option<Xr2280xGpio>) {
        let gpio_count = self.gpio_count;
        (
            self.i2c_device.map(Xr2280xI2c::new),
            self.edge_device.map(|d| Xr2280xGpio::new(d, gpio_count)),
        )
    }
}

pub(crate) fn write_hid_register(device: &HidDevice, reg_addr: u16, value: u16) -> Result<()> {
    let [reg_lo, reg_hi] = reg_addr.to_le_bytes();
    let [val_lo, val_hi] = value.to_le_bytes();
    let buf = [
        consts::REPORT_ID_WRITE_HID_REGISTER,
        reg_lo,
        reg_hi,
        val_lo,
        val_hi,
    ];
    trace!("Write reg 0x{:04X} = 0x{:04X}", reg_addr, value);
    device.send_feature_report(&buf).map_err(|e| {
        trace!("send_feature_report error: {}", e);
        Error::FeatureReportError { reg_addr }
    })
}

pub(crate) fn read_hid_register(device: &HidDevice, reg_addr: u16) -> Result<u16> {
    let [reg_lo, reg_hi] = reg_addr.to_le_bytes();
    device
        .send_feature_report(&[consts::REPORT_ID_SET_HID_READ_ADDRESS, reg_lo, reg_hi])
        .map_err(|e| {
            trace!("send_feature_report error: {}", e);
            Error::FeatureReportError { reg_addr }
        })?;

    let mut buf = [0u8; 3];
    buf[0] = consts::REPORT_ID_READ_HID_REGISTER;
    match device.get_feature_report(&mut buf) {
        Ok(len) if len == buf.len() && buf[0] == consts::REPORT_ID_READ_HID_REGISTER => {
            let value = u16::from_le_bytes([buf[1], buf[2]]);
            trace!("Read reg 0x{:04X} = 0x{:04X}", reg_addr, value);
            Ok(value)
        }
        Ok(len) => {
            warn!(
                "get_feature_report for reg 0x{:04X} returned {} bytes, report ID 0x{:02X}",
                reg_addr, len, buf[0]
            );
            Err(Error::FeatureReportError { reg_addr })
        }
        Err(e) => {
            trace!("get_feature_report error: {}", e);
            Err(Error::FeatureReportError { reg_addr })
        }
    }
}

/// Read-modify-write of the bits in `mask`; skips the write if nothing changes.
pub(crate) fn update_hid_register(device: &HidDevice, reg_addr: u16, mask: u16, set: bool) -> Result<()> {
    let current = read_hid_register(device, reg_addr)?;
    let new = if set { current | mask } else { current & !mask };
    if new != current {
        write_hid_register(device, reg_addr, new)?;
    } else {
        trace!("Reg 0x{:04X} already 0x{:04X}", reg_addr, current);
    }
    Ok(())
}
