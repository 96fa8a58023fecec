use super::consts::edge::{self, RegPair};
use super::{read_hid_register, update_hid_register, write_hid_register};
use crate::error::{self, Error, Result};
use crate::gpio::{Edge, GpioLevel, GpioPull, PinMode, Transition};
use crate::transport::{EdgeDelivery, EdgeNotifier, GpioTransport};
use hidapi::HidDevice;
use log::{debug, trace};
use std::time::Duration;

/// A bridge GPIO number (0-31), split into register group and bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin(u8);

impl GpioPin {
    /// Creates a new GpioPin, returning an error if the number is out of range (0-31).
    pub fn new(pin_num: u8) -> Result<Self> {
        if pin_num <= 31 {
            Ok(GpioPin(pin_num))
        } else {
            Err(Error::InvalidPin {
                pin: pin_num,
                count: 32,
            })
        }
    }

    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Register group (0 for pins 0-15, 1 for 16-31).
    #[inline]
    pub fn group_index(&self) -> u8 {
        self.0 / 16
    }

    /// Bit mask within the group's registers.
    #[inline]
    pub fn mask(&self) -> u16 {
        1u16 << (self.0 % 16)
    }

    #[inline]
    fn reg(&self, pair: RegPair) -> u16 {
        if self.group_index() == 0 {
            pair.0
        } else {
            pair.1
        }
    }
}

/// GPIO (EDGE) side of an XR2280x bridge.
///
/// Edge interrupts are configured in the bridge and reported through HID
/// interrupt reports carrying the current pin states. The report format is
/// undocumented; it is read here as two little-endian 16-bit state words
/// (group 0, group 1), and edges are derived by comparing each armed pin
/// against its last known level.
#[derive(Debug)]
pub struct Xr2280xGpio {
    device: HidDevice,
    gpio_count: u8,
    armed: Vec<Option<(Edge, EdgeNotifier)>>,
    last_state: u32,
}

impl Xr2280xGpio {
    pub(crate) fn new(device: HidDevice, gpio_count: u8) -> Self {
        Self {
            device,
            gpio_count,
            armed: (0..gpio_count).map(|_| None).collect(),
            last_state: 0,
        }
    }

    fn pin(&self, pin: u8) -> Result<GpioPin> {
        let gpio = GpioPin::new(pin)?;
        if pin >= self.gpio_count {
            return Err(error::unsupported_gpio_group1(pin));
        }
        Ok(gpio)
    }

    fn set_pull(&self, pin: GpioPin, pull: GpioPull) -> Result<()> {
        let mask = pin.mask();
        let (up, down) = match pull {
            GpioPull::Up => (true, false),
            GpioPull::Down => (false, true),
            GpioPull::None => (false, false),
        };
        // Clear the opposite pull first so both are never on together.
        if up {
            update_hid_register(&self.device, pin.reg(edge::REG_PULL_DOWN), mask, false)?;
            update_hid_register(&self.device, pin.reg(edge::REG_PULL_UP), mask, true)
        } else {
            update_hid_register(&self.device, pin.reg(edge::REG_PULL_UP), mask, false)?;
            update_hid_register(&self.device, pin.reg(edge::REG_PULL_DOWN), mask, down)
        }
    }

    fn read_state(&self) -> Result<u32> {
        let group0 = read_hid_register(&self.device, edge::REG_STATE.0)?;
        let group1 = if self.gpio_count > 16 {
            read_hid_register(&self.device, edge::REG_STATE.1)?
        } else {
            0
        };
        Ok(u32::from(group0) | (u32::from(group1) << 16))
    }

    /// Splits an interrupt report into the 32-bit pin state word.
    fn parse_interrupt_report(data: &[u8]) -> Result<u32> {
        if data.len() < 4 {
            return Err(Error::InterruptParseError(format!(
                "Report too short ({} bytes), expected at least 4",
                data.len()
            )));
        }
        let group0 = u16::from_le_bytes([data[0], data[1]]);
        let group1 = u16::from_le_bytes([data[2], data[3]]);
        Ok(u32::from(group0) | (u32::from(group1) << 16))
    }

    /// Compares `state` with the last known state and notifies armed pins.
    fn dispatch(&mut self, state: u32) -> usize {
        let previous = std::mem::replace(&mut self.last_state, state);
        let mut delivered = 0;
        for (pin, transition) in changed_pins(previous, state) {
            let Some(Some((edge, notifier))) = self.armed.get(usize::from(pin)) else {
                continue;
            };
            if edge.matches(transition) && notifier.notify(transition) {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Pins whose bit differs between two state words, with the direction.
fn changed_pins(previous: u32, current: u32) -> impl Iterator<Item = (u8, Transition)> {
    let changed = previous ^ current;
    (0..32u8).filter_map(move |pin| {
        let bit = 1u32 << pin;
        if changed & bit == 0 {
            None
        } else if current & bit != 0 {
            Some((pin, Transition::Rising))
        } else {
            Some((pin, Transition::Falling))
        }
    })
}

/// Takes `pin`'s bit from `current`, keeping the rest of `last`.
fn rebase_pin(last: u32, current: u32, pin: u8) -> u32 {
    let bit = 1u32 << pin;
    (last & !bit) | (current & bit)
}

impl GpioTransport for Xr2280xGpio {
    fn pin_count(&self) -> u8 {
        self.gpio_count
    }

    fn configure(&mut self, pin: u8, mode: PinMode, pull: GpioPull, initial: GpioLevel) -> Result<()> {
        let gpio = self.pin(pin)?;
        let mask = gpio.mask();
        debug!(
            "Configuring XR2280x pin {}: {:?}, pull {:?}",
            pin, mode, pull
        );
        self.disarm_edge(pin)?;

        if mode == PinMode::Alternate {
            // Hand the pin back to its UART/GPIO function.
            return update_hid_register(&self.device, gpio.reg(edge::REG_FUNC_SEL), mask, false);
        }
        update_hid_register(&self.device, gpio.reg(edge::REG_FUNC_SEL), mask, true)?;
        self.set_pull(gpio, pull)?;
        if mode == PinMode::Output {
            // Latch the level before enabling the driver to avoid a glitch.
            self.write(pin, initial)?;
        }
        update_hid_register(
            &self.device,
            gpio.reg(edge::REG_DIR),
            mask,
            mode == PinMode::Output,
        )
    }

    fn read(&mut self, pin: u8) -> Result<GpioLevel> {
        let gpio = self.pin(pin)?;
        let value = read_hid_register(&self.device, gpio.reg(edge::REG_STATE))?;
        Ok(GpioLevel::from(value & gpio.mask() != 0))
    }

    fn write(&mut self, pin: u8, level: GpioLevel) -> Result<()> {
        let gpio = self.pin(pin)?;
        let reg = match level {
            GpioLevel::High => gpio.reg(edge::REG_SET),
            GpioLevel::Low => gpio.reg(edge::REG_CLEAR),
        };
        trace!("Writing 0x{:04X} to reg 0x{:04X}", gpio.mask(), reg);
        write_hid_register(&self.device, reg, gpio.mask())
    }

    fn arm_edge(&mut self, pin: u8, edge_kind: Edge, notifier: EdgeNotifier) -> Result<()> {
        let gpio = self.pin(pin)?;
        let mask = gpio.mask();
        let rising = matches!(edge_kind, Edge::Rising | Edge::Both);
        let falling = matches!(edge_kind, Edge::Falling | Edge::Both);
        debug!(
            "Configuring interrupt for pin {}: pos_edge={}, neg_edge={}",
            pin, rising, falling
        );
        update_hid_register(&self.device, gpio.reg(edge::REG_INTR_POS_EDGE), mask, rising)?;
        update_hid_register(&self.device, gpio.reg(edge::REG_INTR_NEG_EDGE), mask, falling)?;
        update_hid_register(&self.device, gpio.reg(edge::REG_INTR_MASK), mask, true)?;

        // Seed this pin's baseline so the first report is not a false edge.
        // Other armed pins keep theirs, or their pending changes would vanish.
        self.last_state = rebase_pin(self.last_state, self.read_state()?, pin);
        self.armed[pin as usize] = Some((edge_kind, notifier));
        Ok(())
    }

    fn disarm_edge(&mut self, pin: u8) -> Result<()> {
        let gpio = self.pin(pin)?;
        if self.armed[pin as usize].take().is_some() {
            update_hid_register(&self.device, gpio.reg(edge::REG_INTR_MASK), gpio.mask(), false)?;
        }
        Ok(())
    }

    fn delivery(&self) -> EdgeDelivery {
        EdgeDelivery::Polled
    }

    fn service_interrupts(&mut self, timeout: Duration) -> Result<usize> {
        if self.armed.iter().all(Option::is_none) {
            return Ok(0);
        }
        let timeout_ms = i32::try_from(timeout.as_millis()).unwrap_or(i32::MAX);
        let mut buf = [0u8; edge::INTERRUPT_REPORT_SIZE];
        let mut delivered = 0;
        let mut wait = timeout_ms;
        loop {
            let received = self.device.read_timeout(&mut buf, wait)?;
            if received == 0 {
                break;
            }
            trace!("GPIO interrupt report: {:02X?}", &buf[..received]);
            let state = Self::parse_interrupt_report(&buf[..received])?;
            delivered += self.dispatch(state);
            // Drain anything else already queued without blocking again.
            wait = 0;
        }
        Ok(delivered)
    }
}
