//! Session handling for one CH347 bridge: scratch buffers, the session lock,
//! bus speed setup and bus registration.

use crate::bus::{BusHandle, BusRegistry, GpioChipInfo, I2cAdapterInfo};
use crate::consts::{self, SEG_SIZE};
use crate::error::Result;
use crate::gpio::{GpioDirection, GpioFrame, GpioLevel, GpioPin, GpioState, PinControl};
use crate::packet::{CommandPacket, I2cSpeed};
use crate::transport::{exchange, BulkTransport, Endpoints, NusbTransport};
use log::{debug, trace, warn};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// CH347 hardware variants, told apart by USB product ID.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variant {
    /// Mode 1: SPI + I2C + UART.
    Mode1,
    /// Mode 3: JTAG + I2C + UART.
    Mode3,
}

impl Variant {
    pub fn from_product_id(pid: u16) -> Option<Self> {
        match pid {
            consts::CH347_MODE1_PID => Some(Variant::Mode1),
            consts::CH347_MODE3_PID => Some(Variant::Mode3),
            _ => None,
        }
    }

    pub fn product_id(self) -> u16 {
        match self {
            Variant::Mode1 => consts::CH347_MODE1_PID,
            Variant::Mode3 => consts::CH347_MODE3_PID,
        }
    }

    /// Mode 3 leaves SCL undriven after reset; the bus is only idle once
    /// the SCL pin is forced to output-high.
    pub fn needs_scl_release(self) -> bool {
        self == Variant::Mode3
    }
}

/// Identifies the physical device a session talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// USB product ID.
    pub product_id: u16,
    /// USB bus number (used in the adapter name only).
    pub bus_number: u8,
    /// USB device address (used in the adapter name only).
    pub device_address: u8,
}

impl DeviceIdentity {
    pub fn new(product_id: u16) -> Self {
        Self {
            product_id,
            bus_number: 0,
            device_address: 0,
        }
    }

    pub fn with_location(mut self, bus_number: u8, device_address: u8) -> Self {
        self.bus_number = bus_number;
        self.device_address = device_address;
        self
    }

    pub fn variant(&self) -> Option<Variant> {
        Variant::from_product_id(self.product_id)
    }
}

/// Session configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ch347Config {
    /// Timeout for each bulk OUT and bulk IN operation.
    pub timeout: Duration,
    /// Bus speed programmed at init.
    pub i2c_speed: I2cSpeed,
}

impl Default for Ch347Config {
    fn default() -> Self {
        Self {
            timeout: consts::DEFAULT_TIMEOUT,
            i2c_speed: I2cSpeed::Standard,
        }
    }
}

impl Ch347Config {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_i2c_speed(mut self, speed: I2cSpeed) -> Self {
        self.i2c_speed = speed;
        self
    }
}

/// State guarded by the session lock: the transport and every scratch buffer
/// an exchange overwrites.
pub(crate) struct Shared<T> {
    pub(crate) transport: T,
    pub(crate) ibuf: [u8; SEG_SIZE],
    pub(crate) obuf: CommandPacket,
    pub(crate) gpio_ibuf: [u8; consts::gpio::FRAME_LEN],
    pub(crate) gpio_obuf: GpioFrame,
    pub(crate) gpio_state: GpioState,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    i2c: BusHandle,
    gpio: BusHandle,
}

/// A session with one CH347 bridge.
///
/// All operations take `&self`; each USB exchange holds the session lock for
/// its whole duration, so the handle can be shared between threads
/// (`T: Send`). Multi-packet I2C transfers take the lock once per packet and
/// may therefore interleave with other transfers at packet boundaries.
pub struct Ch347<T: BulkTransport = NusbTransport> {
    shared: Mutex<Shared<T>>,
    pub(crate) endpoints: Endpoints,
    pub(crate) config: Ch347Config,
    identity: DeviceIdentity,
    registration: Option<Registration>,
}

impl<T: BulkTransport> std::fmt::Debug for Ch347<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ch347")
            .field("identity", &self.identity)
            .field("endpoints", &self.endpoints)
            .field("config", &self.config)
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

impl<T: BulkTransport> Ch347<T> {
    /// Creates a session without touching the device. Call [`Ch347::init`]
    /// before handing it to a bus subsystem, or use [`Ch347::open`].
    pub fn new(
        transport: T,
        endpoints: Endpoints,
        identity: DeviceIdentity,
        config: Ch347Config,
    ) -> Self {
        debug!(
            "Creating CH347 session: PID={:04X}, variant={:?}, endpoints={:?}",
            identity.product_id,
            identity.variant(),
            endpoints
        );
        Self {
            shared: Mutex::new(Shared {
                transport,
                ibuf: [0; SEG_SIZE],
                obuf: CommandPacket::new(),
                gpio_ibuf: [0; consts::gpio::FRAME_LEN],
                gpio_obuf: GpioFrame::cleared(),
                gpio_state: GpioState::default(),
            }),
            endpoints,
            config,
            identity,
            registration: None,
        }
    }

    /// Creates and initializes a session. On failure nothing stays registered.
    pub fn open(
        transport: T,
        endpoints: Endpoints,
        identity: DeviceIdentity,
        config: Ch347Config,
        registry: &mut dyn BusRegistry,
    ) -> Result<Self> {
        let mut session = Self::new(transport, endpoints, identity, config);
        session.init(registry)?;
        Ok(session)
    }

    // The scratch buffers are rewritten by every exchange, so a panic in a
    // previous holder leaves nothing to recover.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Shared<T>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn identity(&self) -> DeviceIdentity {
        self.identity
    }

    pub fn config(&self) -> Ch347Config {
        self.config
    }

    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    pub fn is_initialized(&self) -> bool {
        self.registration.is_some()
    }

    /// Descriptor of the I2C adapter this session registers.
    pub fn i2c_adapter_info(&self) -> I2cAdapterInfo {
        I2cAdapterInfo::ch347(self.identity.bus_number, self.identity.device_address)
    }

    /// Sends one command packet and reads no reply.
    fn send_command(&self, command: &[u8]) -> Result<()> {
        let mut guard = self.lock();
        exchange(
            &mut guard.transport,
            self.endpoints,
            command,
            &mut [],
            self.config.timeout,
        )?;
        Ok(())
    }

    /// Programs the I2C bus clock.
    pub fn i2c_set_speed(&self, speed: I2cSpeed) -> Result<()> {
        debug!("Setting I2C speed: {}", speed);
        let mut command = CommandPacket::new();
        command.set_speed(speed)?;
        command.end()?;
        self.send_command(command.as_bytes())
    }

    /// Forces the SCL pin to output-high. The reply refreshes the pin mirror.
    fn release_scl(&self) -> Result<()> {
        debug!("Forcing SCL (GPIO {}) high", consts::gpio::SCL_PIN);
        let scl = GpioPin(consts::gpio::SCL_PIN);
        self.gpio_transfer(|_, frame| {
            frame.set(scl, PinControl::apply(GpioDirection::Output, GpioLevel::High));
        })?;
        Ok(())
    }

    /// Attach-time sequence: bus speed, SCL release on mode 3, then
    /// registration of the I2C adapter and the GPIO chip.
    ///
    /// Any failure aborts init and leaves nothing registered. Calling `init`
    /// on an initialized session does nothing.
    pub fn init(&mut self, registry: &mut dyn BusRegistry) -> Result<()> {
        if self.is_initialized() {
            trace!("CH347 session already initialized");
            return Ok(());
        }

        self.i2c_set_speed(self.config.i2c_speed).inspect_err(|e| {
            warn!("Cannot set I2C speed: {}", e);
        })?;

        if self.identity.variant().is_some_and(Variant::needs_scl_release) {
            self.release_scl().inspect_err(|e| {
                warn!("Cannot force SCL high: {}", e);
            })?;
        }

        let i2c = registry.register_i2c(&self.i2c_adapter_info())?;
        debug!("Registered I2C adapter {:?}", i2c);

        if let Err(e) = self.gpio_read_state() {
            warn!("Initial GPIO state query failed: {}", e);
        }

        let gpio = match registry.register_gpio(&GpioChipInfo::ch347()) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Could not add GPIO: {}", e);
                registry.unregister(i2c);
                return Err(e);
            }
        };
        debug!("Registered GPIO chip {:?}", gpio);

        self.registration = Some(Registration { i2c, gpio });
        Ok(())
    }

    /// Unregisters what [`Ch347::init`] registered. Does nothing on a session
    /// that was never successfully initialized.
    pub fn teardown(&mut self, registry: &mut dyn BusRegistry) {
        if let Some(registration) = self.registration.take() {
            debug!("Tearing down CH347 session");
            registry.unregister(registration.gpio);
            registry.unregister(registration.i2c);
        }
    }
}
