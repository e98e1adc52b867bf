//! Command packet framing for the I2C command stream.
//!
//! A packet is the stream marker `0xAA` followed by sub-commands and closed
//! by the END marker. OUT and IN carry their length in the low 6 bits of the
//! opcode, so no single sub-command moves more than 63 bytes. All framing
//! limits are checked here, in one place.

use crate::consts::{i2c, SEG_SIZE};
use crate::error::{Error, Result};
use std::fmt;

/// I2C bus clock speeds supported by the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum I2cSpeed {
    /// 20 kHz.
    Low = 0,
    /// 100 kHz.
    #[default]
    Standard = 1,
    /// 400 kHz.
    Fast = 2,
    /// 750 kHz.
    High = 3,
}

impl I2cSpeed {
    /// Nominal bus clock in kHz.
    pub fn khz(self) -> u32 {
        match self {
            I2cSpeed::Low => 20,
            I2cSpeed::Standard => 100,
            I2cSpeed::Fast => 400,
            I2cSpeed::High => 750,
        }
    }
}

impl fmt::Display for I2cSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} kHz", self.khz())
    }
}

/// ORs a sub-command length into its opcode, rejecting lengths wider than 6 bits.
pub(crate) fn opcode_with_len(opcode: u8, len: usize) -> Result<u8> {
    if len > i2c::MAX_SUBCOMMAND_LEN {
        return Err(Error::OperationTooLarge {
            max: i2c::MAX_SUBCOMMAND_LEN,
            actual: len,
        });
    }
    Ok(opcode | len as u8)
}

/// A command packet under construction, backed by a fixed scratch buffer.
#[derive(Clone)]
pub struct CommandPacket {
    buf: [u8; SEG_SIZE],
    len: usize,
}

impl Default for CommandPacket {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CommandPacket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandPacket({:02X?})", self.as_bytes())
    }
}

impl CommandPacket {
    /// An empty packet that already holds the stream marker.
    pub fn new() -> Self {
        let mut packet = Self {
            buf: [0; SEG_SIZE],
            len: 0,
        };
        packet.reset();
        packet
    }

    /// Discards the current contents and starts a new packet.
    pub fn reset(&mut self) {
        self.buf[0] = i2c::CMD_STREAM;
        self.len = 1;
    }

    /// The encoded bytes so far.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn push(&mut self, bytes: &[u8]) -> Result<()> {
        self.push_sub(bytes, &[])
    }

    // Appends a sub-command header and its payload, or nothing if it does not fit.
    fn push_sub(&mut self, header: &[u8], data: &[u8]) -> Result<()> {
        let end = self.len + header.len() + data.len();
        if end > SEG_SIZE {
            return Err(Error::OperationTooLarge {
                max: SEG_SIZE,
                actual: end,
            });
        }
        let data_start = self.len + header.len();
        self.buf[self.len..data_start].copy_from_slice(header);
        self.buf[data_start..end].copy_from_slice(data);
        self.len = end;
        Ok(())
    }

    /// START condition.
    pub fn start(&mut self) -> Result<()> {
        self.push(&[i2c::STM_START])
    }

    /// STOP condition.
    pub fn stop(&mut self) -> Result<()> {
        self.push(&[i2c::STM_STOP])
    }

    /// END marker; closes the packet.
    pub fn end(&mut self) -> Result<()> {
        self.push(&[i2c::STM_END])
    }

    /// OUT sub-command clocking `data` onto the bus.
    pub fn out(&mut self, data: &[u8]) -> Result<()> {
        let opcode = opcode_with_len(i2c::STM_OUT, data.len())?;
        self.push_sub(&[opcode], data)
    }

    /// OUT sub-command sending an address byte followed by `data`.
    pub fn out_addressed(&mut self, address_byte: u8, data: &[u8]) -> Result<()> {
        let opcode = opcode_with_len(i2c::STM_OUT, data.len() + 1)?;
        self.push_sub(&[opcode, address_byte], data)
    }

    /// IN sub-command reading `count` bytes, each acknowledged by the bridge.
    pub fn read(&mut self, count: usize) -> Result<()> {
        let opcode = opcode_with_len(i2c::STM_IN, count)?;
        self.push(&[opcode])
    }

    /// IN sub-command reading the final byte of a transfer (NACKed by the bridge).
    pub fn read_last(&mut self) -> Result<()> {
        self.push(&[i2c::STM_IN])
    }

    /// SET sub-command selecting the bus speed.
    pub fn set_speed(&mut self, speed: I2cSpeed) -> Result<()> {
        self.push(&[i2c::STM_SET | speed as u8])
    }
}
