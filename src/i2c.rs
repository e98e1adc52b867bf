//! I2C communication functionality for the CH347.
//!
//! Transfers are framed as command packets. Writes go out in chunks of at
//! most 62 data bytes (the first packet also carries the address byte inside
//! the same 63-byte OUT sub-command); only the first packet carries START and
//! only the last one STOP. Reads are split into chunks of at most 63 bytes,
//! each its own START/address/IN.../STOP transaction.

use crate::consts::i2c::{ACK, MAX_READ_CHUNK, MAX_WRITE_CHUNK};
use crate::device::{Ch347, Shared};
use crate::error::{Error, ErrorClass, Result};
use crate::transport::{exchange, BulkTransport};
use log::{debug, trace, warn};
use std::fmt;

/// Represents a 7-bit or 10-bit I2C slave address.
/// Use `I2cAddress::new_7bit(addr)` or `I2cAddress::new_10bit(addr)`.
///
/// The bridge only speaks 7-bit addressing; 10-bit addresses exist so that
/// callers can express them and get a clean rejection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum I2cAddress {
    /// Standard 7-bit address (0x00 - 0x7F).
    Bit7(u8),
    /// Extended 10-bit address (0x0000 - 0x03FF).
    Bit10(u16),
}

impl I2cAddress {
    /// Creates a 7-bit address, checking validity (0-127).
    pub fn new_7bit(addr: u8) -> Result<Self> {
        if addr <= 0x7F {
            Ok(I2cAddress::Bit7(addr))
        } else {
            Err(Error::ArgumentOutOfRange(
                "7-bit I2C address must be 0-127".to_string(),
            ))
        }
    }

    /// Creates a 10-bit address, checking validity (0-1023).
    pub fn new_10bit(addr: u16) -> Result<Self> {
        if addr <= 0x03FF {
            Ok(I2cAddress::Bit10(addr))
        } else {
            Err(Error::InvalidI2c10BitAddress(addr))
        }
    }

    /// The 7-bit address, or an error for anything the bridge cannot address.
    pub fn seven_bit(self) -> Result<u8> {
        match self {
            I2cAddress::Bit7(addr) if addr <= 0x7F => Ok(addr),
            I2cAddress::Bit7(_) => Err(Error::ArgumentOutOfRange(
                "7-bit I2C address must be 0-127".to_string(),
            )),
            I2cAddress::Bit10(addr) => Err(Error::TenBitAddressUnsupported(addr)),
        }
    }
}

impl fmt::Display for I2cAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            I2cAddress::Bit7(a) => write!(f, "7-bit 0x{:02X}", a),
            I2cAddress::Bit10(a) => write!(f, "10-bit 0x{:03X}", a),
        }
    }
}

/// One logical message of an [`Ch347::i2c_xfer`] batch.
#[derive(Debug)]
pub enum I2cMessage<'a> {
    /// Fill `buffer` from the device.
    Read {
        address: I2cAddress,
        buffer: &'a mut [u8],
    },
    /// Send `data` to the device.
    Write { address: I2cAddress, data: &'a [u8] },
}

impl<'a> I2cMessage<'a> {
    pub fn read(address: I2cAddress, buffer: &'a mut [u8]) -> Self {
        I2cMessage::Read { address, buffer }
    }

    pub fn write(address: I2cAddress, data: &'a [u8]) -> Self {
        I2cMessage::Write { address, data }
    }

    pub fn address(&self) -> I2cAddress {
        match self {
            I2cMessage::Read { address, .. } | I2cMessage::Write { address, .. } => *address,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            I2cMessage::Read { buffer, .. } => buffer.len(),
            I2cMessage::Write { data, .. } => data.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every reply byte of a write packet must be the ACK marker.
fn check_write_reply(address: I2cAddress, reply: &[u8]) -> Result<()> {
    if reply.is_empty() {
        return Err(Error::InvalidReply {
            expected: 1,
            actual: 0,
        });
    }
    if let Some(pos) = reply.iter().position(|&b| b != ACK) {
        debug!("I2C write to {} not acknowledged at reply byte {}", address, pos);
        return Err(Error::I2cNack { address });
    }
    Ok(())
}

/// A read reply is the ACK marker followed by exactly `len` data bytes.
fn check_read_reply(address: I2cAddress, reply: &[u8], len: usize) -> Result<()> {
    match reply.first() {
        None => Err(Error::InvalidReply {
            expected: len + 1,
            actual: 0,
        }),
        Some(&status) if status != ACK => Err(Error::I2cNack { address }),
        Some(_) if reply.len() != len + 1 => {
            warn!(
                "I2C read from {}: expected {} reply bytes, got {}",
                address,
                len + 1,
                reply.len()
            );
            Err(Error::InvalidReply {
                expected: len + 1,
                actual: reply.len(),
            })
        }
        Some(_) => Ok(()),
    }
}

impl<T: BulkTransport> Ch347<T> {
    // --- I2C Methods ---

    /// Writes `data` to the device at `address`.
    ///
    /// Long writes are split over several packets; the session lock is
    /// released between packets. The first NACK or transport error aborts the
    /// write. An empty `data` still addresses the device (START, address,
    /// STOP), which is how [`Ch347::i2c_probe`] works.
    pub fn i2c_write(&self, address: I2cAddress, data: &[u8]) -> Result<()> {
        let addr = address.seven_bit()?;
        debug!("I2C write to {}: {} bytes", address, data.len());

        let mut remaining = data;
        let mut first = true;
        loop {
            let (chunk, rest) = remaining.split_at(remaining.len().min(MAX_WRITE_CHUNK));
            {
                let mut guard = self.lock();
                let Shared {
                    transport,
                    ibuf,
                    obuf,
                    ..
                } = &mut *guard;

                obuf.reset();
                if first {
                    obuf.start()?;
                    obuf.out_addressed(addr << 1, chunk)?;
                } else {
                    obuf.out(chunk)?;
                }
                if rest.is_empty() {
                    obuf.stop()?;
                }
                obuf.end()?;

                let received = exchange(
                    transport,
                    self.endpoints,
                    obuf.as_bytes(),
                    &mut ibuf[..],
                    self.config.timeout,
                )?;
                check_write_reply(address, &ibuf[..received])?;
            }
            trace!(
                "I2C write to {}: sent {} bytes, {} left",
                address,
                chunk.len(),
                rest.len()
            );

            first = false;
            remaining = rest;
            if remaining.is_empty() {
                return Ok(());
            }
        }
    }

    /// Fills `buffer` from the device at `address`.
    ///
    /// Each chunk is copied into `buffer` only after its reply validated, so
    /// on error the bytes of the failing chunk are left untouched.
    pub fn i2c_read(&self, address: I2cAddress, buffer: &mut [u8]) -> Result<()> {
        let addr = address.seven_bit()?;
        debug!("I2C read from {}: {} bytes", address, buffer.len());

        for chunk in buffer.chunks_mut(MAX_READ_CHUNK) {
            let len = chunk.len();
            let mut guard = self.lock();
            let Shared {
                transport,
                ibuf,
                obuf,
                ..
            } = &mut *guard;

            obuf.reset();
            obuf.start()?;
            obuf.out(&[(addr << 1) | 1])?;
            if len > 1 {
                obuf.read(len - 1)?;
            }
            obuf.read_last()?;
            obuf.stop()?;
            obuf.end()?;

            let received = exchange(
                transport,
                self.endpoints,
                obuf.as_bytes(),
                &mut ibuf[..],
                self.config.timeout,
            )?;
            let reply = &ibuf[..received];
            check_read_reply(address, reply, len)?;
            chunk.copy_from_slice(&reply[1..=len]);
        }
        Ok(())
    }

    /// Runs a batch of messages strictly in order and returns how many were
    /// processed.
    ///
    /// The batch is checked up front: an empty batch or any 10-bit address is
    /// rejected before anything goes out on the bus. Execution stops at the
    /// first failing message; nothing is retried.
    pub fn i2c_xfer(&self, messages: &mut [I2cMessage<'_>]) -> Result<usize> {
        if messages.is_empty() {
            return Err(Error::ArgumentOutOfRange(
                "I2C transfer needs at least one message".to_string(),
            ));
        }
        for msg in messages.iter() {
            if let Err(e) = msg.address().seven_bit() {
                warn!("Rejecting I2C transfer: {}", e);
                return Err(e);
            }
        }

        for msg in messages.iter_mut() {
            match msg {
                I2cMessage::Read { address, buffer } => self.i2c_read(*address, buffer)?,
                I2cMessage::Write { address, data } => self.i2c_write(*address, data)?,
            }
        }
        Ok(messages.len())
    }

    /// Performs a 7-bit I2C write operation.
    pub fn i2c_write_7bit(&self, slave_addr: u8, data: &[u8]) -> Result<()> {
        self.i2c_write(I2cAddress::new_7bit(slave_addr)?, data)
    }

    /// Performs a 7-bit I2C read operation.
    pub fn i2c_read_7bit(&self, slave_addr: u8, buffer: &mut [u8]) -> Result<()> {
        self.i2c_read(I2cAddress::new_7bit(slave_addr)?, buffer)
    }

    /// Performs a 7-bit I2C write followed by a read.
    ///
    /// The command stream ends every message with STOP, so this is two
    /// transactions rather than a repeated-START combined transfer.
    pub fn i2c_write_read_7bit(
        &self,
        slave_addr: u8,
        write_data: &[u8],
        read_buffer: &mut [u8],
    ) -> Result<()> {
        let addr = I2cAddress::new_7bit(slave_addr)?;
        self.i2c_xfer(&mut [
            I2cMessage::write(addr, write_data),
            I2cMessage::read(addr, read_buffer),
        ])?;
        Ok(())
    }

    /// Checks whether a device acknowledges `slave_addr`.
    pub fn i2c_probe(&self, slave_addr: u8) -> Result<bool> {
        match self.i2c_write_7bit(slave_addr, &[]) {
            Ok(()) => Ok(true),
            Err(Error::I2cNack { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Scans `start_addr..=end_addr` and returns the addresses that acknowledged.
    ///
    /// Malformed replies for a single address are logged and skipped;
    /// transport errors abort the scan.
    pub fn i2c_scan(&self, start_addr: u8, end_addr: u8) -> Result<Vec<u8>> {
        if start_addr > end_addr || end_addr > 0x7F {
            return Err(Error::ArgumentOutOfRange(format!(
                "I2C scan range 0x{:02X}..=0x{:02X} is not within 0x00..=0x7F",
                start_addr, end_addr
            )));
        }

        let mut found_devices = Vec::new();
        for addr in start_addr..=end_addr {
            match self.i2c_probe(addr) {
                Ok(true) => found_devices.push(addr),
                Ok(false) => {}
                Err(e) if e.class() == ErrorClass::Protocol => {
                    debug!("Error scanning address 0x{:02X}: {}", addr, e);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(found_devices)
    }

    /// Scans the standard address range (0x08 to 0x77), skipping the
    /// reserved addresses at both ends.
    pub fn i2c_scan_default(&self) -> Result<Vec<u8>> {
        self.i2c_scan(0x08, 0x77)
    }
}
