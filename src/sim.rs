//! In-memory bus backend.
//!
//! `SimulatedBus` stands in for real hardware when developing drivers and in
//! tests. It is a cheap handle: clones share the same simulated devices and
//! pins, so a test can keep one clone to inject pin levels or inspect
//! register contents while an interface owns another.
//!
//! I2C devices are 256-byte register files with an auto-incrementing
//! pointer. The first written byte of a transaction sets the pointer, any
//! further bytes are stored from there, and reads continue from the pointer.
//! GPIO edges are delivered natively: [`SimulatedBus::set_input_level`]
//! notifies the armed tracker from the calling thread.

use crate::error::{Error, Result};
use crate::gpio::{Edge, GpioLevel, GpioPull, PinMode, Transition};
use crate::i2c::I2cAddress;
use crate::transport::{EdgeDelivery, EdgeNotifier, GpioTransport, I2cTransport};
use log::trace;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Default number of simulated GPIO pins.
pub const DEFAULT_PIN_COUNT: u8 = 32;

/// Failure to inject into the next transaction addressed to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimFault {
    Nack,
    ArbitrationLost,
    Timeout,
}

/// One completed I2C transaction, as seen on the simulated wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cTransaction {
    pub address: u8,
    pub write: Vec<u8>,
    pub read: Vec<u8>,
}

struct SimDevice {
    registers: [u8; 256],
    pointer: u8,
    faults: VecDeque<SimFault>,
}

impl SimDevice {
    fn new() -> Self {
        Self {
            registers: [0; 256],
            pointer: 0,
            faults: VecDeque::new(),
        }
    }
}

struct SimPin {
    mode: PinMode,
    pull: GpioPull,
    level: GpioLevel,
    armed: Option<(Edge, EdgeNotifier)>,
}

impl SimPin {
    fn new() -> Self {
        Self {
            mode: PinMode::Unconfigured,
            pull: GpioPull::None,
            level: GpioLevel::Low,
            armed: None,
        }
    }
}

struct SimState {
    devices: HashMap<u8, SimDevice>,
    pins: Vec<SimPin>,
    transactions: Vec<I2cTransaction>,
}

#[derive(Clone)]
pub struct SimulatedBus {
    state: Arc<Mutex<SimState>>,
}

impl Default for SimulatedBus {
    fn default() -> Self {
        Self::new()
    }
}

impl SimulatedBus {
    pub fn new() -> Self {
        Self::with_pin_count(DEFAULT_PIN_COUNT)
    }

    pub fn with_pin_count(pin_count: u8) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                devices: HashMap::new(),
                pins: (0..pin_count).map(|_| SimPin::new()).collect(),
                transactions: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // --- I2C side ---

    /// Makes a device acknowledge at `address`, with all registers zeroed.
    pub fn attach_i2c_device(&self, address: u8) {
        self.lock()
            .devices
            .entry(address)
            .or_insert_with(SimDevice::new);
    }

    pub fn detach_i2c_device(&self, address: u8) {
        self.lock().devices.remove(&address);
    }

    /// Stores `data` into consecutive registers starting at `register`,
    /// attaching the device if needed.
    pub fn set_registers(&self, address: u8, register: u8, data: &[u8]) {
        let mut state = self.lock();
        let device = state
            .devices
            .entry(address)
            .or_insert_with(SimDevice::new);
        let mut reg = register;
        for &byte in data {
            device.registers[reg as usize] = byte;
            reg = reg.wrapping_add(1);
        }
    }

    pub fn set_register(&self, address: u8, register: u8, value: u8) {
        self.set_registers(address, register, &[value]);
    }

    /// Current content of a register, or `None` if no device is attached.
    pub fn register(&self, address: u8, register: u8) -> Option<u8> {
        self.lock()
            .devices
            .get(&address)
            .map(|d| d.registers[register as usize])
    }

    /// Makes the next transaction to `address` fail with `fault`.
    pub fn inject_i2c_fault(&self, address: u8, fault: SimFault) {
        if let Some(device) = self.lock().devices.get_mut(&address) {
            device.faults.push_back(fault);
        }
    }

    /// Every successful transaction so far, in issue order.
    pub fn transactions(&self) -> Vec<I2cTransaction> {
        self.lock().transactions.clone()
    }

    pub fn clear_transactions(&self) {
        self.lock().transactions.clear();
    }

    // --- GPIO side ---

    /// Level the simulated pin currently sits at.
    pub fn pin_level(&self, pin: u8) -> Option<GpioLevel> {
        self.lock().pins.get(pin as usize).map(|p| p.level)
    }

    /// Mode the backend was last told to use for `pin`.
    pub fn pin_mode(&self, pin: u8) -> Option<PinMode> {
        self.lock().pins.get(pin as usize).map(|p| p.mode)
    }

    /// Drives `pin` from outside, as an attached circuit would.
    ///
    /// If the level changes and the pin is armed for that direction, the
    /// tracker is notified before this returns. Returns whether an edge was
    /// delivered.
    pub fn set_input_level(&self, pin: u8, level: GpioLevel) -> Result<bool> {
        let notify = {
            let mut state = self.lock();
            let count = state.pins.len() as u8;
            let sim_pin = state
                .pins
                .get_mut(pin as usize)
                .ok_or(Error::InvalidPin { pin, count })?;
            let transition = Transition::between(sim_pin.level, level);
            sim_pin.level = level;
            match (transition, &sim_pin.armed) {
                (Some(t), Some((edge, notifier))) if edge.matches(t) => Some((t, notifier.clone())),
                _ => None,
            }
        };
        trace!("Simulated pin {} driven {:?}", pin, level);
        // Notify outside the lock so callbacks may inspect the bus.
        Ok(match notify {
            Some((transition, notifier)) => notifier.notify(transition),
            None => false,
        })
    }

    /// Drives `pin` to the opposite level and back.
    pub fn pulse(&self, pin: u8) -> Result<()> {
        let current = self.pin_level(pin).ok_or_else(|| Error::InvalidPin {
            pin,
            count: self.pin_count(),
        })?;
        let other = GpioLevel::from(!current.is_high());
        self.set_input_level(pin, other)?;
        self.set_input_level(pin, current)?;
        Ok(())
    }

    fn with_pin<R>(&self, pin: u8, f: impl FnOnce(&mut SimPin) -> R) -> Result<R> {
        let mut state = self.lock();
        let count = state.pins.len() as u8;
        state
            .pins
            .get_mut(pin as usize)
            .map(f)
            .ok_or(Error::InvalidPin { pin, count })
    }
}

impl I2cTransport for SimulatedBus {
    fn transfer(&mut self, address: I2cAddress, write: &[u8], read: &mut [u8]) -> Result<()> {
        let addr = match address {
            I2cAddress::Bit7(a) => a,
            I2cAddress::Bit10(_) => {
                return Err(Error::UnsupportedFeature(
                    "simulated bus only supports 7-bit addresses".to_string(),
                ))
            }
        };
        let mut state = self.lock();
        let device = state
            .devices
            .get_mut(&addr)
            .ok_or(Error::I2cNack { address })?;
        if let Some(fault) = device.faults.pop_front() {
            return Err(match fault {
                SimFault::Nack => Error::I2cNack { address },
                SimFault::ArbitrationLost => Error::I2cArbitrationLost { address },
                SimFault::Timeout => Error::I2cTimeout { address },
            });
        }

        if let Some((&pointer, data)) = write.split_first() {
            device.pointer = pointer;
            for &byte in data {
                device.registers[device.pointer as usize] = byte;
                device.pointer = device.pointer.wrapping_add(1);
            }
        }
        for byte in read.iter_mut() {
            *byte = device.registers[device.pointer as usize];
            device.pointer = device.pointer.wrapping_add(1);
        }

        state.transactions.push(I2cTransaction {
            address: addr,
            write: write.to_vec(),
            read: read.to_vec(),
        });
        Ok(())
    }
}

impl GpioTransport for SimulatedBus {
    fn pin_count(&self) -> u8 {
        self.lock().pins.len() as u8
    }

    fn configure(&mut self, pin: u8, mode: PinMode, pull: GpioPull, initial: GpioLevel) -> Result<()> {
        self.with_pin(pin, |p| {
            p.mode = mode;
            p.pull = pull;
            p.armed = None;
            match (mode, pull) {
                (PinMode::Output, _) => p.level = initial,
                (PinMode::Input, GpioPull::Up) => p.level = GpioLevel::High,
                (PinMode::Input, GpioPull::Down) => p.level = GpioLevel::Low,
                _ => {}
            }
        })
    }

    fn read(&mut self, pin: u8) -> Result<GpioLevel> {
        self.with_pin(pin, |p| p.level)
    }

    fn write(&mut self, pin: u8, level: GpioLevel) -> Result<()> {
        self.with_pin(pin, |p| p.level = level)
    }

    fn arm_edge(&mut self, pin: u8, edge: Edge, notifier: EdgeNotifier) -> Result<()> {
        self.with_pin(pin, |p| p.armed = Some((edge, notifier)))
    }

    fn disarm_edge(&mut self, pin: u8) -> Result<()> {
        self.with_pin(pin, |p| p.armed = None)
    }

    fn delivery(&self) -> EdgeDelivery {
        EdgeDelivery::Native
    }
}

impl std::fmt::Debug for SimulatedBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        let mut devices: Vec<_> = state.devices.keys().copied().collect();
        devices.sort_unstable();
        f.debug_struct("SimulatedBus")
            .field("devices", &devices)
            .field("pins", &state.pins.len())
            .field("transactions", &state.transactions.len())
            .finish()
    }
}
