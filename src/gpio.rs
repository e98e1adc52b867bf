//! GPIO functionality for the CH347.
//!
//! The bridge has no per-pin addressing: every operation pushes a complete
//! 8-pin frame and gets the complete 8-pin status back, so each call below
//! costs exactly one USB round-trip regardless of how many pins it touches.
//! Use the `_multiple`/`_all` variants to batch pins.

use crate::consts::gpio::{ctrl, status, FRAME_HEADER, FRAME_LEN, NUM_PINS};
use crate::device::Ch347;
use crate::error::{self, Error, Result};
use crate::transport::{exchange, BulkTransport};
use log::{debug, trace, warn};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioDirection {
    Input,
    Output,
}
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioLevel {
    Low,
    High,
}

impl From<bool> for GpioLevel {
    fn from(high: bool) -> Self {
        if high {
            GpioLevel::High
        } else {
            GpioLevel::Low
        }
    }
}

/// Represents a valid GPIO Pin number (0-7).
/// Use `GpioPin::new(num)` to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpioPin(pub(crate) u8); // crate-private so callers go through `new`

impl GpioPin {
    /// Creates a new GpioPin, returning an error if the number is out of range (0-7).
    pub fn new(pin_num: u8) -> Result<Self> {
        if (pin_num as usize) < NUM_PINS {
            Ok(GpioPin(pin_num))
        } else {
            Err(error::pin_out_of_range(pin_num))
        }
    }

    /// Returns the underlying pin number (0-7).
    #[inline]
    pub fn number(&self) -> u8 {
        self.0
    }

    /// Returns the bit mask (1 << number) used by the masked operations.
    #[inline]
    pub fn mask(&self) -> u8 {
        1u8 << self.0
    }

    /// All eight pins in order.
    pub fn all() -> impl Iterator<Item = GpioPin> {
        (0..NUM_PINS as u8).map(GpioPin)
    }

    #[inline]
    fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Outgoing per-pin control byte.
///
/// Bits 7-6 are the apply flags, bits 5-4 request output direction and bit 3
/// requests a high level. A pin whose apply flags are clear is left alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinControl(u8);

impl PinControl {
    /// Leave the pin unchanged.
    pub const UNCHANGED: PinControl = PinControl(0);

    /// Request `direction` and `level` for the pin on this round-trip.
    pub fn apply(direction: GpioDirection, level: GpioLevel) -> Self {
        let mut bits = ctrl::ENABLE;
        if direction == GpioDirection::Output {
            bits |= ctrl::OUTPUT;
        }
        if level == GpioLevel::High {
            bits |= ctrl::HIGH;
        }
        PinControl(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn is_applied(self) -> bool {
        self.0 & ctrl::ENABLE == ctrl::ENABLE
    }

    pub fn requested_direction(self) -> GpioDirection {
        if self.0 & ctrl::OUTPUT != 0 {
            GpioDirection::Output
        } else {
            GpioDirection::Input
        }
    }

    pub fn requested_level(self) -> GpioLevel {
        GpioLevel::from(self.0 & ctrl::HIGH != 0)
    }
}

/// Incoming per-pin status byte: bit 7 is the direction, bit 6 the level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PinStatus(u8);

impl PinStatus {
    pub fn from_bits(bits: u8) -> Self {
        PinStatus(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn direction(self) -> GpioDirection {
        if self.0 & status::OUTPUT != 0 {
            GpioDirection::Output
        } else {
            GpioDirection::Input
        }
    }

    pub fn level(self) -> GpioLevel {
        GpioLevel::from(self.0 & status::HIGH != 0)
    }
}

/// Outgoing GPIO frame: the fixed header plus one control byte per pin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpioFrame {
    pins: [PinControl; NUM_PINS],
}

impl GpioFrame {
    /// A frame that changes nothing; the device just reports its state.
    pub fn cleared() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.pins = [PinControl::UNCHANGED; NUM_PINS];
    }

    pub fn set(&mut self, pin: GpioPin, control: PinControl) {
        self.pins[pin.index()] = control;
    }

    pub fn pin(&self, pin: GpioPin) -> PinControl {
        self.pins[pin.index()]
    }

    /// Wire encoding. The header bytes are always the same.
    pub fn to_bytes(&self) -> [u8; FRAME_LEN] {
        let mut bytes = [0u8; FRAME_LEN];
        bytes[..FRAME_HEADER.len()].copy_from_slice(&FRAME_HEADER);
        for (dst, control) in bytes[FRAME_HEADER.len()..].iter_mut().zip(self.pins) {
            *dst = control.bits();
        }
        bytes
    }
}

/// Last known direction and level of every pin, as reported by the device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GpioState {
    pins: [PinStatus; NUM_PINS],
}

impl GpioState {
    /// Parses a status reply. Anything but a complete frame is rejected.
    pub fn from_reply(reply: &[u8]) -> Result<Self> {
        if reply.len() != FRAME_LEN {
            return Err(Error::InvalidReply {
                expected: FRAME_LEN,
                actual: reply.len(),
            });
        }
        if reply[..FRAME_HEADER.len()] != FRAME_HEADER {
            warn!(
                "GPIO reply carries unexpected header {:02X?}",
                &reply[..FRAME_HEADER.len()]
            );
        }
        let mut pins = [PinStatus::default(); NUM_PINS];
        for (pin, &bits) in pins.iter_mut().zip(&reply[FRAME_HEADER.len()..]) {
            *pin = PinStatus::from_bits(bits);
        }
        Ok(Self { pins })
    }

    pub fn pin(&self, pin: GpioPin) -> PinStatus {
        self.pins[pin.index()]
    }

    pub fn level(&self, pin: GpioPin) -> GpioLevel {
        self.pin(pin).level()
    }

    pub fn direction(&self, pin: GpioPin) -> GpioDirection {
        self.pin(pin).direction()
    }

    /// Bit `n` set when pin `n` reads high.
    pub fn levels(&self) -> u8 {
        GpioPin::all()
            .filter(|&pin| self.level(pin) == GpioLevel::High)
            .fold(0, |acc, pin| acc | pin.mask())
    }

    /// Bit `n` set when pin `n` is an output.
    pub fn outputs(&self) -> u8 {
        GpioPin::all()
            .filter(|&pin| self.direction(pin) == GpioDirection::Output)
            .fold(0, |acc, pin| acc | pin.mask())
    }
}

impl fmt::Display for GpioState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, pin) in GpioPin::all().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            let dir = match self.direction(pin) {
                GpioDirection::Output => "out",
                GpioDirection::Input => "in",
            };
            let value = match self.level(pin) {
                GpioLevel::High => 1,
                GpioLevel::Low => 0,
            };
            write!(f, "pin[{}]({}):{}", pin.number(), dir, value)?;
        }
        Ok(())
    }
}

impl<T: BulkTransport> Ch347<T> {
    /// One GPIO round-trip under the session lock.
    ///
    /// `build` fills the (cleared) outgoing frame from the cached state; the
    /// cache is replaced by the reply only when a complete frame comes back.
    pub(crate) fn gpio_transfer<F>(&self, build: F) -> Result<GpioState>
    where
        F: FnOnce(&GpioState, &mut GpioFrame),
    {
        let mut guard = self.lock();
        let shared = &mut *guard;
        shared.gpio_obuf.clear();
        build(&shared.gpio_state, &mut shared.gpio_obuf);
        let out = shared.gpio_obuf.to_bytes();
        let received = exchange(
            &mut shared.transport,
            self.endpoints,
            &out,
            &mut shared.gpio_ibuf,
            self.config.timeout,
        )?;
        let state = GpioState::from_reply(&shared.gpio_ibuf[..received])?;
        trace!("GPIO state: {}", state);
        shared.gpio_state = state;
        Ok(state)
    }

    /// Last known pin state, without any USB traffic.
    pub fn gpio_state(&self) -> GpioState {
        self.lock().gpio_state
    }

    /// Queries the device for the state of all pins without changing any.
    pub fn gpio_read_state(&self) -> Result<GpioState> {
        self.gpio_transfer(|_, _| {})
    }

    /// Reads the current level of a single pin.
    pub fn gpio_read(&self, pin: GpioPin) -> Result<GpioLevel> {
        let level = self.gpio_read_state()?.level(pin);
        trace!("Read GPIO pin {}: {:?}", pin.number(), level);
        Ok(level)
    }

    /// Reads the levels of the pins selected by `mask` in one round-trip.
    /// Bit `n` of the result is set when pin `n` is selected and high.
    pub fn gpio_read_all(&self, mask: u8) -> Result<u8> {
        let levels = self.gpio_read_state()?.levels() & mask;
        trace!("Read GPIO mask 0x{:02X}: 0x{:02X}", mask, levels);
        Ok(levels)
    }

    /// Reads the configured direction of a single pin.
    pub fn gpio_get_direction(&self, pin: GpioPin) -> Result<GpioDirection> {
        Ok(self.gpio_read_state()?.direction(pin))
    }

    /// Drives a pin to `level`, keeping its last known direction.
    ///
    /// This is fire-and-forget: the bridge offers no per-write status, so a
    /// transport failure is only logged. Read the pin back if confirmation is
    /// needed.
    pub fn gpio_write(&self, pin: GpioPin, level: GpioLevel) {
        debug!("Setting GPIO pin {} {:?}", pin.number(), level);
        let result = self.gpio_transfer(|state, frame| {
            frame.set(pin, PinControl::apply(state.direction(pin), level));
        });
        if let Err(e) = result {
            warn!("GPIO write to pin {} not confirmed: {}", pin.number(), e);
        }
    }

    /// Drives every pin selected by `mask` that is currently an output to the
    /// level of the matching bit in `levels`, in one round-trip. Input pins in
    /// `mask` are skipped.
    ///
    /// Fire-and-forget like [`Ch347::gpio_write`].
    pub fn gpio_write_multiple(&self, mask: u8, levels: u8) {
        debug!(
            "Setting GPIO mask 0x{:02X}: levels=0x{:02X}",
            mask, levels
        );
        let result = self.gpio_transfer(|state, frame| {
            for pin in GpioPin::all() {
                if mask & pin.mask() == 0 || state.direction(pin) != GpioDirection::Output {
                    continue;
                }
                let level = GpioLevel::from(levels & pin.mask() != 0);
                frame.set(pin, PinControl::apply(GpioDirection::Output, level));
            }
        });
        if let Err(e) = result {
            warn!("GPIO write to mask 0x{:02X} not confirmed: {}", mask, e);
        }
    }

    /// Configures a pin as input, carrying over its last known level.
    pub fn gpio_set_direction_input(&self, pin: GpioPin) -> Result<()> {
        debug!("Setting GPIO pin {} direction: Input", pin.number());
        self.gpio_transfer(|state, frame| {
            frame.set(pin, PinControl::apply(GpioDirection::Input, state.level(pin)));
        })?;
        Ok(())
    }

    /// Configures a pin as output driving `level`.
    pub fn gpio_set_direction_output(&self, pin: GpioPin, level: GpioLevel) -> Result<()> {
        debug!(
            "Setting GPIO pin {} direction: Output ({:?})",
            pin.number(),
            level
        );
        self.gpio_transfer(|_, frame| {
            frame.set(pin, PinControl::apply(GpioDirection::Output, level));
        })?;
        Ok(())
    }
}
