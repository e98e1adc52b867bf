// Shared fixtures for the integration tests: an in-memory CH347 that speaks
// the I2C command stream and the GPIO frame protocol, plus a registry that
// records what a session registers.
#![allow(dead_code)]

use ch347_usb::{
    protocol, BulkTransport, BusHandle, BusRegistry, Ch347, Ch347Config, DeviceIdentity,
    Endpoints, Error, GpioChipInfo, I2cAdapterInfo, Result, CH347_MODE1_PID,
};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, Once};
use std::time::Duration;

static INIT_LOGGER: Once = Once::new();

pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::builder().is_test(true).try_init();
    });
}

/// One decoded sub-command of a command packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sub {
    Start,
    Stop,
    Out(Vec<u8>),
    /// Number of bytes clocked in (an IN with a zero length field reads one).
    In(usize),
    Set(u8),
    End,
}

/// Decodes a command packet (without the leading stream marker check).
pub fn parse_packet(packet: &[u8]) -> Vec<Sub> {
    assert_eq!(packet[0], protocol::CMD_STREAM, "missing stream marker");
    let mut subs = Vec::new();
    let mut i = 1;
    while i < packet.len() {
        let op = packet[i];
        i += 1;
        match op {
            protocol::STM_END => subs.push(Sub::End),
            protocol::STM_START => subs.push(Sub::Start),
            protocol::STM_STOP => subs.push(Sub::Stop),
            op if op & 0xC0 == protocol::STM_OUT => {
                let n = (op & 0x3F) as usize;
                subs.push(Sub::Out(packet[i..i + n].to_vec()));
                i += n;
            }
            op if op & 0xC0 == protocol::STM_IN => {
                subs.push(Sub::In(((op & 0x3F) as usize).max(1)));
            }
            op if op & 0xE0 == protocol::STM_SET => subs.push(Sub::Set(op & 0x1F)),
            op => panic!("unknown sub-command 0x{:02X} in {:02X?}", op, packet),
        }
    }
    subs
}

/// An emulated I2C target: written bytes are queued and read back in order.
#[derive(Debug, Default)]
pub struct I2cTarget {
    pub fifo: VecDeque<u8>,
    /// Data bytes after this many queued bytes are NACKed.
    pub capacity: Option<usize>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EmulatedPin {
    pub output: bool,
    pub high: bool,
}

type SendFilter = Box<dyn FnMut(usize, &[u8]) -> bool + Send>;

#[derive(Default)]
pub struct BridgeState {
    pub targets: HashMap<u8, I2cTarget>,
    pub pins: [EmulatedPin; 8],
    pub speed: Option<u8>,
    /// Every packet handed to `send`, in order.
    pub sent: Vec<Vec<u8>>,
    /// Replies produced by the emulation and not yet read.
    pending: VecDeque<Vec<u8>>,
    /// Replies returned instead of the emulated ones.
    pub injected: VecDeque<Vec<u8>>,
    /// Sends for which this returns true fail with an I/O error.
    pub fail_send: Option<SendFilter>,
    /// Number of upcoming `recv` calls that time out.
    pub fail_recv: usize,
    /// Report one byte less than was sent.
    pub short_write: bool,
    pub recv_calls: usize,
    // Target selected by the last START + address byte, with its R/W bit.
    selected: Option<(u8, bool)>,
    expect_address: bool,
}

impl BridgeState {
    fn run_i2c(&mut self, packet: &[u8]) -> Option<Vec<u8>> {
        let mut reply = Vec::new();
        let mut transaction = false;
        for sub in parse_packet(packet) {
            match sub {
                Sub::End => break,
                Sub::Set(speed) => self.speed = Some(speed),
                Sub::Start => {
                    transaction = true;
                    self.selected = None;
                    self.expect_address = true;
                }
                Sub::Stop => {
                    self.selected = None;
                    self.expect_address = false;
                }
                Sub::Out(bytes) => {
                    transaction = true;
                    for b in bytes {
                        reply.push(self.clock_out(b));
                    }
                }
                Sub::In(n) => {
                    transaction = true;
                    for _ in 0..n {
                        reply.push(self.clock_in());
                    }
                }
            }
        }
        transaction.then_some(reply)
    }

    fn clock_out(&mut self, byte: u8) -> u8 {
        if self.expect_address {
            self.expect_address = false;
            let addr = byte >> 1;
            let present = self.targets.contains_key(&addr);
            self.selected = present.then_some((addr, byte & 1 == 1));
            return present as u8;
        }
        match self.selected {
            Some((addr, false)) => {
                let Some(target) = self.targets.get_mut(&addr) else {
                    return 0;
                };
                if target.capacity.is_some_and(|cap| target.fifo.len() >= cap) {
                    return 0;
                }
                target.fifo.push_back(byte);
                protocol::ACK
            }
            _ => 0,
        }
    }

    fn clock_in(&mut self) -> u8 {
        match self.selected {
            Some((addr, true)) => self
                .targets
                .get_mut(&addr)
                .and_then(|t| t.fifo.pop_front())
                .unwrap_or(0xFF),
            _ => 0xFF,
        }
    }

    fn run_gpio(&mut self, frame: &[u8]) -> Vec<u8> {
        for (pin, &control) in self.pins.iter_mut().zip(&frame[3..]) {
            if control & protocol::ctrl::ENABLE != protocol::ctrl::ENABLE {
                continue;
            }
            pin.output = control & protocol::ctrl::OUTPUT != 0;
            pin.high = control & protocol::ctrl::HIGH != 0;
        }
        let mut reply = protocol::FRAME_HEADER.to_vec();
        reply.extend(self.pins.iter().map(|pin| {
            let mut bits = 0;
            if pin.output {
                bits |= protocol::status::OUTPUT;
            }
            if pin.high {
                bits |= protocol::status::HIGH;
            }
            bits
        }));
        reply
    }

    /// All GPIO frames sent so far.
    pub fn gpio_frames(&self) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|p| p.first() == Some(&protocol::FRAME_HEADER[0]))
            .cloned()
            .collect()
    }

    /// All I2C command packets sent so far.
    pub fn i2c_packets(&self) -> Vec<Vec<u8>> {
        self.sent
            .iter()
            .filter(|p| p.first() == Some(&protocol::CMD_STREAM))
            .cloned()
            .collect()
    }

    /// Levels the pins would read as a mask, bit n for pin n.
    pub fn pin_levels(&self) -> u8 {
        self.pins
            .iter()
            .enumerate()
            .filter(|(_, p)| p.high)
            .fold(0, |acc, (i, _)| acc | 1 << i)
    }
}

/// A cloneable handle to one emulated bridge.
#[derive(Clone, Default)]
pub struct MockBridge {
    state: Arc<Mutex<BridgeState>>,
}

impl MockBridge {
    pub fn new() -> Self {
        Self::default()
    }

    /// A bridge with an echo target at `addr`.
    pub fn with_target(addr: u8) -> Self {
        let bridge = Self::new();
        bridge.state().targets.insert(addr, I2cTarget::default());
        bridge
    }

    pub fn state(&self) -> MutexGuard<'_, BridgeState> {
        self.state.lock().unwrap()
    }

    pub fn clear_log(&self) {
        self.state().sent.clear();
    }
}

impl BulkTransport for MockBridge {
    fn send(&mut self, endpoint: u8, data: &[u8], _timeout: Duration) -> Result<usize> {
        assert_eq!(endpoint, Endpoints::CH347_DEFAULT.bulk_out);
        let mut state = self.state();
        let index = state.sent.len();
        state.sent.push(data.to_vec());

        if let Some(filter) = state.fail_send.as_mut() {
            if filter(index, data) {
                return Err(Error::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "emulated send failure",
                )));
            }
        }

        let reply = match data.first() {
            Some(&protocol::CMD_STREAM) => state.run_i2c(data),
            Some(&b) if b == protocol::FRAME_HEADER[0] => Some(state.run_gpio(data)),
            _ => None,
        };
        if let Some(reply) = reply {
            state.pending.push_back(reply);
        }

        if state.short_write {
            Ok(data.len() - 1)
        } else {
            Ok(data.len())
        }
    }

    fn recv(&mut self, endpoint: u8, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        assert_eq!(endpoint, Endpoints::CH347_DEFAULT.bulk_in);
        let mut state = self.state();
        state.recv_calls += 1;

        let emulated = state.pending.pop_front();
        if state.fail_recv > 0 {
            state.fail_recv -= 1;
            return Err(Error::Timeout {
                endpoint,
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        let reply = match state.injected.pop_front().or(emulated) {
            Some(reply) => reply,
            None => {
                return Err(Error::Timeout {
                    endpoint,
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
        };
        let n = reply.len().min(buf.len());
        buf[..n].copy_from_slice(&reply[..n]);
        Ok(n)
    }
}

/// A mode 1 session over `bridge`, not initialized.
pub fn session(bridge: &MockBridge) -> Ch347<MockBridge> {
    session_for(bridge, CH347_MODE1_PID)
}

pub fn session_for(bridge: &MockBridge, product_id: u16) -> Ch347<MockBridge> {
    init_logger();
    Ch347::new(
        bridge.clone(),
        Endpoints::CH347_DEFAULT,
        DeviceIdentity::new(product_id).with_location(1, 4),
        Ch347Config::default(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    RegisterI2c(String),
    RegisterGpio(&'static str),
    Unregister(BusHandle),
}

/// Registry that logs every call and can be told to refuse registrations.
#[derive(Debug, Default)]
pub struct RecordingRegistry {
    pub events: Vec<RegistryEvent>,
    pub fail_i2c: bool,
    pub fail_gpio: bool,
    pub active: Vec<BusHandle>,
    pub next: u64,
}

impl RecordingRegistry {
    fn handle(&mut self) -> BusHandle {
        self.next += 1;
        let handle = BusHandle(self.next);
        self.active.push(handle);
        handle
    }
}

impl BusRegistry for RecordingRegistry {
    fn register_i2c(&mut self, adapter: &I2cAdapterInfo) -> Result<BusHandle> {
        self.events
            .push(RegistryEvent::RegisterI2c(adapter.name.clone()));
        if self.fail_i2c {
            return Err(Error::Registration("i2c adapter refused".to_string()));
        }
        Ok(self.handle())
    }

    fn register_gpio(&mut self, chip: &GpioChipInfo) -> Result<BusHandle> {
        self.events.push(RegistryEvent::RegisterGpio(chip.label));
        if self.fail_gpio {
            return Err(Error::Registration("gpio chip refused".to_string()));
        }
        Ok(self.handle())
    }

    fn unregister(&mut self, handle: BusHandle) {
        self.events.push(RegistryEvent::Unregister(handle));
        self.active.retain(|h| *h != handle);
    }
}
