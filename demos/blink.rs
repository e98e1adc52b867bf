use ch347_usb::{
    gpio::{GpioLevel, GpioPin},
    Ch347, Ch347Config, DeviceIdentity, Endpoints, Error, LocalRegistry, NusbTransport, Result,
    CH347_BRIDGE_INTERFACE, CH347_MODE1_PID, WCH_VID,
};
use nusb::MaybeFuture;
use std::{thread, time::Duration};

// GPIO 3 doubles as SCL on mode 3 parts, so stay away from it
const BLINK_PIN_NUM: u8 = 4;

fn main() -> Result<()> {
    env_logger::init();

    println!("Opening first CH347 (mode 1) device...");
    let info = nusb::list_devices()
        .wait()
        .map_err(Error::Usb)?
        .find(|d| d.vendor_id() == WCH_VID && d.product_id() == CH347_MODE1_PID)
        .ok_or_else(|| Error::ArgumentOutOfRange("no CH347 in mode 1 found".into()))?;
    let device = info.open().wait().map_err(Error::Usb)?;
    let interface = device
        .detach_and_claim_interface(CH347_BRIDGE_INTERFACE)
        .wait()
        .map_err(Error::Usb)?;

    let mut registry = LocalRegistry::new();
    let bridge = Ch347::open(
        NusbTransport::new(interface),
        Endpoints::CH347_DEFAULT,
        DeviceIdentity::new(info.product_id()),
        Ch347Config::default(),
        &mut registry,
    )?;
    println!("Device opened.");
    println!("GPIO state: {}", bridge.gpio_state());

    let blink_pin = GpioPin::new(BLINK_PIN_NUM)?;
    println!("Configuring pin {} for blinking...", blink_pin.number());
    bridge.gpio_set_direction_output(blink_pin, GpioLevel::Low)?;

    println!("Blinking pin {} (Press Ctrl+C to stop)", blink_pin.number());
    loop {
        bridge.gpio_write(blink_pin, GpioLevel::High);
        thread::sleep(Duration::from_millis(250));
        bridge.gpio_write(blink_pin, GpioLevel::Low);
        thread::sleep(Duration::from_millis(250));
    }
}
