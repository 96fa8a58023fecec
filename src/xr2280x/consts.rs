//! Register addresses and report layouts of the XR2280x HID interfaces.

/// Exar Corporation vendor ID for XR2280x devices.
pub const EXAR_VID: u16 = 0x04E2;
/// Product ID of the I2C interface (common for XR22800/1/2/4).
pub const XR2280X_I2C_PID: u16 = 0x1100;
/// Product ID of the EDGE (GPIO/interrupt) interface (common for XR22800/1/2/4).
pub const XR2280X_EDGE_PID: u16 = 0x1200;

// Feature reports (control transfer)
pub const REPORT_ID_WRITE_HID_REGISTER: u8 = 0x3C;
pub const REPORT_ID_SET_HID_READ_ADDRESS: u8 = 0x4B;
pub const REPORT_ID_READ_HID_REGISTER: u8 = 0x5A;

pub mod i2c {
    pub const REPORT_MAX_DATA_SIZE: usize = 32;
    // Flags(1) + WrSize(1) + RdSize(1) + SlaveAddr(1) + Data(32)
    pub const OUT_REPORT_WRITE_BUF_SIZE: usize = 36;
    // Flags(1) + WrSize(1) + RdSize(1) + Reserved(1) + Data(32)
    pub const IN_REPORT_READ_BUF_SIZE: usize = 36;

    pub const REG_SCL_LOW: u16 = 0x0341;
    pub const REG_SCL_HIGH: u16 = 0x0342;

    pub mod out_flags {
        pub const START_BIT: u8 = 1 << 0;
        pub const STOP_BIT: u8 = 1 << 1;
    }

    pub mod in_flags {
        pub const REQUEST_ERROR: u8 = 1 << 0;
        pub const NAK_RECEIVED: u8 = 1 << 1;
        pub const ARBITRATION_LOST: u8 = 1 << 2;
        pub const TIMEOUT: u8 = 1 << 3;
    }
}

/// EDGE registers. Each exists once per 16-pin group; group 1 (pins 16-31)
/// is only present on XR22802/4.
pub mod edge {
    /// `(group 0, group 1)` register pair.
    pub type RegPair = (u16, u16);

    pub const REG_FUNC_SEL: RegPair = (0x03C0, 0x03CC);
    pub const REG_DIR: RegPair = (0x03C1, 0x03CD);
    pub const REG_SET: RegPair = (0x03C2, 0x03CE);
    pub const REG_CLEAR: RegPair = (0x03C3, 0x03CF);
    pub const REG_STATE: RegPair = (0x03C4, 0x03D0);
    pub const REG_PULL_UP: RegPair = (0x03C7, 0x03D3);
    pub const REG_PULL_DOWN: RegPair = (0x03C8, 0x03D4);
    pub const REG_INTR_MASK: RegPair = (0x03C9, 0x03D5);
    pub const REG_INTR_POS_EDGE: RegPair = (0x03CA, 0x03D6);
    pub const REG_INTR_NEG_EDGE: RegPair = (0x03CB, 0x03D7);

    /// Size of the buffer used to read interrupt reports.
    pub const INTERRUPT_REPORT_SIZE: usize = 64;
}
