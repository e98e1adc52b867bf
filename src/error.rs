use crate::i2c::I2cAddress;
use std::io;
use thiserror::Error;

/// Errors that can occur when using a CH347 bridge.
///
/// Every variant belongs to one of the classes reported by [`Error::class`],
/// which is what callers sitting on top of the bus abstraction care about.
#[derive(Error, Debug)]
pub enum Error {
    /// Error from the `nusb` layer (opening endpoints, claiming interfaces).
    #[error("USB error: {0}")]
    Usb(nusb::Error),
    /// A bulk transfer completed with an error status.
    #[error("USB bulk transfer on endpoint 0x{endpoint:02X} failed: {source}")]
    Transfer {
        /// Endpoint address the transfer was issued on.
        endpoint: u8,
        #[source]
        source: nusb::transfer::TransferError,
    },
    /// A bulk transfer did not complete within the configured timeout.
    #[error("USB bulk transfer on endpoint 0x{endpoint:02X} timed out after {timeout_ms} ms")]
    Timeout {
        /// Endpoint address the transfer was issued on.
        endpoint: u8,
        /// Timeout that expired.
        timeout_ms: u64,
    },
    /// The bridge accepted fewer bytes than the command packet holds.
    #[error("Incomplete bulk write: sent {actual} of {expected} bytes")]
    ShortWrite {
        /// Packet length.
        expected: usize,
        /// Bytes actually written.
        actual: usize,
    },
    /// General I/O error reported by a transport implementation.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Reply length does not match what the command packet asked for.
    #[error("Invalid reply from bridge (expected {expected} bytes, got {actual})")]
    InvalidReply {
        /// Length the framing requires.
        expected: usize,
        /// Length actually received.
        actual: usize,
    },
    /// I2C slave device responded with NACK (not acknowledged).
    #[error("No device found at I2C address {address}: Device did not acknowledge (NACK)")]
    I2cNack {
        /// The I2C address that sent the NACK.
        address: I2cAddress,
    },
    /// The command stream has no 10-bit addressing.
    #[error("10-bit I2C addresses are not supported (got 0x{0:03X})")]
    TenBitAddressUnsupported(u16),
    /// Invalid 10-bit I2C address specified.
    #[error("Invalid I2C 10-bit address: {0:04X}")]
    InvalidI2c10BitAddress(u16),
    /// Function argument is outside the valid range.
    #[error("Argument out of range: {0}")]
    ArgumentOutOfRange(String),
    /// GPIO pin number is outside the valid range for this device.
    #[error("GPIO pin {pin} argument out of range (0-7): {message}")]
    PinArgumentOutOfRange {
        /// The invalid pin number that was specified.
        pin: u8,
        /// Detailed error message explaining the constraint.
        message: String,
    },
    /// A command packet would not fit its framing limits.
    #[error("Requested operation size is too large (max {max}, got {actual})")]
    OperationTooLarge {
        /// Maximum allowed size for this operation.
        max: usize,
        /// Actual size requested.
        actual: usize,
    },
    /// The bus registration facility refused an adapter or chip.
    #[error("Bus registration failed: {0}")]
    Registration(String),
}

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transport failure or timeout on send/receive.
    Io,
    /// Reply framing did not match the request.
    Protocol,
    /// The addressed I2C device did not acknowledge.
    Nack,
    /// Rejected before any USB traffic.
    InvalidArgument,
    /// The bus registration facility failed.
    Registration,
}

impl Error {
    /// Returns the class this error belongs to.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Usb(_)
            | Error::Transfer { .. }
            | Error::Timeout { .. }
            | Error::ShortWrite { .. }
            | Error::Io(_) => ErrorClass::Io,
            Error::InvalidReply { .. } => ErrorClass::Protocol,
            Error::I2cNack { .. } => ErrorClass::Nack,
            Error::TenBitAddressUnsupported(_)
            | Error::InvalidI2c10BitAddress(_)
            | Error::ArgumentOutOfRange(_)
            | Error::PinArgumentOutOfRange { .. }
            | Error::OperationTooLarge { .. } => ErrorClass::InvalidArgument,
            Error::Registration(_) => ErrorClass::Registration,
        }
    }

    /// True for errors a bus layer reports as a timeout (transport timeouts and NACKs).
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout { .. } | Error::I2cNack { .. })
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Io(e) => e.kind(),
            Error::Timeout { .. } | Error::I2cNack { .. } => io::ErrorKind::TimedOut,
            _ => match err.class() {
                ErrorClass::Io | ErrorClass::Registration => io::ErrorKind::Other,
                ErrorClass::Protocol => io::ErrorKind::InvalidData,
                ErrorClass::Nack => io::ErrorKind::TimedOut,
                ErrorClass::InvalidArgument => io::ErrorKind::InvalidInput,
            },
        };
        io::Error::new(kind, err)
    }
}

/// Result type alias for CH347 operations.
pub type Result<T> = std::result::Result<T, Error>;

pub(crate) fn pin_out_of_range(pin: u8) -> Error {
    Error::PinArgumentOutOfRange {
        pin,
        message: "Pin number must be 0-7".to_string(),
    }
}
