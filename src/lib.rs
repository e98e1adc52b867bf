//! # ch347-usb
//!
//! A Rust crate for controlling the I²C and GPIO functions of the WCH CH347
//! USB bridge chip through its vendor bulk-transfer command stream.
//!
//! This crate uses the `nusb` crate for USB bulk transfers.
//!
//! ## Features
//!
//! *   I²C communication:
//!     *   Speed setting (`i2c_set_speed`, 20/100/400/750 kHz).
//!     *   7-bit addressing (10-bit addresses are rejected).
//!     *   Reads and writes of any length, split into 63-byte command packets.
//!     *   Batched transfers (`i2c_xfer`), convenience wrappers
//!         (`i2c_write_7bit`, `i2c_read_7bit`, `i2c_write_read_7bit`).
//!     *   Probing and bus scanning (`i2c_probe`, `i2c_scan`).
//! *   GPIO control (pins 0-7):
//!     *   Strongly-typed `GpioPin` struct.
//!     *   Single pin and masked reads (`gpio_read`, `gpio_read_all`).
//!     *   Single pin and masked writes (`gpio_write`, `gpio_write_multiple`).
//!     *   Setting/getting pin direction.
//! *   Attach-time init sequence and bus registration (`Ch347::open`,
//!     `init`, `teardown`).
//!
//! ## Chip Support & Limitations
//!
//! *   **Modes:** CH347 mode 1 (PID `0x55DB`) and mode 3 (PID `0x55DD`), bridge
//!     interface 2. On mode 3 the init sequence forces SCL (GPIO 3) high.
//! *   **GPIO:** The protocol has no per-pin addressing. Every GPIO call is one
//!     full 8-pin round-trip; batch pins with the masked variants.
//! *   **GPIO writes are fire-and-forget:** `gpio_write`/`gpio_write_multiple`
//!     return nothing, failures are only logged. Read back if you need to know.
//! *   **No SPI/JTAG.**
//!
//! Device enumeration is left to the application: claim the bridge interface
//! with `nusb` and hand it to [`NusbTransport`].
//!
//! ## Basic Usage
//!
//! ```no_run
//! use ch347_usb::{
//!     gpio::{GpioLevel, GpioPin},
//!     Ch347, Ch347Config, DeviceIdentity, Endpoints, Error, LocalRegistry, NusbTransport,
//!     Result, CH347_BRIDGE_INTERFACE, WCH_VID,
//! };
//! use nusb::MaybeFuture;
//!
//! fn main() -> Result<()> {
//!     let info = nusb::list_devices()
//!         .wait()
//!         .map_err(Error::Usb)?
//!         .find(|d| d.vendor_id() == WCH_VID && d.product_id() == 0x55DB)
//!         .ok_or_else(|| Error::ArgumentOutOfRange("no CH347 connected".into()))?;
//!     let device = info.open().wait().map_err(Error::Usb)?;
//!     let interface = device
//!         .detach_and_claim_interface(CH347_BRIDGE_INTERFACE)
//!         .wait()
//!         .map_err(Error::Usb)?;
//!
//!     let mut registry = LocalRegistry::new();
//!     let bridge = Ch347::open(
//!         NusbTransport::new(interface),
//!         Endpoints::CH347_DEFAULT,
//!         DeviceIdentity::new(info.product_id()),
//!         Ch347Config::default(),
//!         &mut registry,
//!     )?;
//!
//!     let mut id = [0u8; 2];
//!     bridge.i2c_write_read_7bit(0x50, &[0x00], &mut id)?;
//!
//!     let led = GpioPin::new(4)?;
//!     bridge.gpio_set_direction_output(led, GpioLevel::High)?;
//!     bridge.gpio_write(led, GpioLevel::Low);
//!     Ok(())
//! }
//! ```
//!
//! ## License
//!
//! This project is licensed under the WTFPL.

mod consts;
mod error;
mod packet;
mod transport;

pub mod bus;
pub mod device;
pub mod gpio; // Keep gpio public for its enums/structs
pub mod i2c; // Keep i2c public for its enums/structs

pub use bus::{BusHandle, BusRegistry, GpioChipInfo, I2cAdapterInfo, LocalRegistry};
pub use device::{Ch347, Ch347Config, DeviceIdentity, Variant};
pub use error::{Error, ErrorClass, Result};
pub use gpio::{GpioDirection, GpioLevel, GpioPin, GpioState};
pub use i2c::{I2cAddress, I2cMessage};
pub use packet::{CommandPacket, I2cSpeed};
pub use transport::{BulkTransport, Endpoints, NusbTransport};
// Re-export only essential public constants
pub use consts::{
    CH347_BRIDGE_INTERFACE, CH347_MODE1_PID, CH347_MODE3_PID, DEFAULT_TIMEOUT, SEG_SIZE, WCH_VID,
};

/// Wire-level constants of the command stream, for tooling and tests.
pub mod protocol {
    pub use crate::consts::gpio::{ctrl, status, FRAME_HEADER, FRAME_LEN};
    pub use crate::consts::i2c::{
        ACK, CMD_STREAM, MAX_READ_CHUNK, MAX_SUBCOMMAND_LEN, MAX_WRITE_CHUNK, STM_END, STM_IN,
        STM_OUT, STM_SET, STM_START, STM_STOP,
    };
}
