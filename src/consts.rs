//! Internal constants, command opcodes, and bit definitions.

use std::time::Duration;

/// WCH (Nanjing QinHeng) vendor ID.
pub const WCH_VID: u16 = 0x1A86;

/// CH347 mode 1 (SPI + I2C + UART).
pub const CH347_MODE1_PID: u16 = 0x55DB;
/// CH347 mode 3 (JTAG + I2C + UART).
pub const CH347_MODE3_PID: u16 = 0x55DD;

/// USB interface number carrying the I2C/SPI/GPIO command stream.
pub const CH347_BRIDGE_INTERFACE: u8 = 2;

/// Timeout applied to each bulk OUT and bulk IN operation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(1000);

/// Size of the session's input and output scratch buffers.
pub const SEG_SIZE: usize = 512;

// --- I2C command stream ---
pub mod i2c {
    /// Leading byte of every I2C command packet.
    pub const CMD_STREAM: u8 = 0xAA;

    // Sub-commands
    pub const STM_END: u8 = 0x00;
    pub const STM_START: u8 = 0x74;
    pub const STM_STOP: u8 = 0x75;
    pub const STM_OUT: u8 = 0x80;
    pub const STM_IN: u8 = 0xC0;
    pub const STM_SET: u8 = 0x60;

    /// Largest length that fits the 6-bit length field of OUT/IN.
    pub const MAX_SUBCOMMAND_LEN: usize = 0x3F;
    /// Data bytes per write packet; one slot is reserved for the address byte.
    pub const MAX_WRITE_CHUNK: usize = MAX_SUBCOMMAND_LEN - 1;
    /// Data bytes per read packet.
    pub const MAX_READ_CHUNK: usize = MAX_SUBCOMMAND_LEN;

    /// Reply byte reporting that the addressed device acknowledged.
    pub const ACK: u8 = 1;
}

// --- GPIO frame ---
pub mod gpio {
    pub const NUM_PINS: usize = 8;

    /// Fixed header of every GPIO frame: command, pin count, reserved.
    pub const FRAME_HEADER: [u8; 3] = [0xCC, 0x08, 0x00];
    pub const FRAME_LEN: usize = FRAME_HEADER.len() + NUM_PINS;

    // Outgoing control byte
    pub mod ctrl {
        /// Apply this pin's request on this round-trip.
        pub const ENABLE: u8 = 0xC0;
        /// Requested direction is output.
        pub const OUTPUT: u8 = 0x30;
        /// Requested output level is high.
        pub const HIGH: u8 = 0x08;
    }

    // Incoming status byte
    pub mod status {
        pub const OUTPUT: u8 = 0x80;
        pub const HIGH: u8 = 0x40;
    }

    /// Pin wired to SCL on the mode 3 variant.
    pub const SCL_PIN: u8 = 3;
}
