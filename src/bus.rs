//! Bus registration facility.
//!
//! A session announces its I2C adapter and GPIO chip to whatever bus
//! subsystem hosts it (a HAL, a daemon, a test harness) through
//! [`BusRegistry`], and withdraws them again on teardown.

use crate::consts::gpio::NUM_PINS;
use crate::error::{Error, Result};
use log::debug;

/// Opaque handle returned by a registry, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BusHandle(pub u64);

/// Transfer kinds an I2C adapter handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum I2cOperation {
    Read,
    Write,
}

/// Capability descriptor of an I2C adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I2cAdapterInfo {
    pub name: String,
    pub operations: &'static [I2cOperation],
    /// Plain I2C messages are supported.
    pub plain_i2c: bool,
    /// SMBus transactions can be emulated on top of plain I2C messages.
    pub smbus_emulation: bool,
    pub ten_bit_addressing: bool,
}

impl I2cAdapterInfo {
    pub(crate) fn ch347(bus_number: u8, device_address: u8) -> Self {
        Self {
            name: format!(
                "CH347 I2C USB bus {:03} device {:03}",
                bus_number, device_address
            ),
            operations: &[I2cOperation::Read, I2cOperation::Write],
            plain_i2c: true,
            smbus_emulation: true,
            ten_bit_addressing: false,
        }
    }
}

/// Operations a GPIO chip offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioOperation {
    Get,
    Set,
    GetMultiple,
    SetMultiple,
    DirectionGet,
    DirectionInput,
    DirectionOutput,
}

/// Capability descriptor of a GPIO chip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpioChipInfo {
    pub label: &'static str,
    pub line_count: u8,
    /// Every operation blocks on a USB round-trip.
    pub can_sleep: bool,
    pub operations: &'static [GpioOperation],
}

impl GpioChipInfo {
    pub(crate) fn ch347() -> Self {
        Self {
            label: "ch347",
            line_count: NUM_PINS as u8,
            can_sleep: true,
            operations: &[
                GpioOperation::Get,
                GpioOperation::Set,
                GpioOperation::GetMultiple,
                GpioOperation::SetMultiple,
                GpioOperation::DirectionGet,
                GpioOperation::DirectionInput,
                GpioOperation::DirectionOutput,
            ],
        }
    }
}

/// Where sessions register their buses.
pub trait BusRegistry {
    fn register_i2c(&mut self, adapter: &I2cAdapterInfo) -> Result<BusHandle>;
    fn register_gpio(&mut self, chip: &GpioChipInfo) -> Result<BusHandle>;
    fn unregister(&mut self, handle: BusHandle);
}

/// In-process registry for sessions used directly, without a host bus subsystem.
#[derive(Debug, Default)]
pub struct LocalRegistry {
    next_handle: u64,
    active: Vec<(BusHandle, String)>,
}

impl LocalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of the currently registered buses, in registration order.
    pub fn active(&self) -> impl Iterator<Item = &str> {
        self.active.iter().map(|(_, name)| name.as_str())
    }

    fn insert(&mut self, name: String) -> BusHandle {
        let handle = BusHandle(self.next_handle);
        self.next_handle += 1;
        debug!("Registering {} as {:?}", name, handle);
        self.active.push((handle, name));
        handle
    }
}

impl BusRegistry for LocalRegistry {
    fn register_i2c(&mut self, adapter: &I2cAdapterInfo) -> Result<BusHandle> {
        if self.active.iter().any(|(_, name)| *name == adapter.name) {
            return Err(Error::Registration(format!(
                "I2C adapter '{}' is already registered",
                adapter.name
            )));
        }
        Ok(self.insert(adapter.name.clone()))
    }

    fn register_gpio(&mut self, chip: &GpioChipInfo) -> Result<BusHandle> {
        Ok(self.insert(chip.label.to_string()))
    }

    fn unregister(&mut self, handle: BusHandle) {
        self.active.retain(|(h, _)| *h != handle);
    }
}
