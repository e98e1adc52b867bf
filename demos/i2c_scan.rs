use ch347_usb::{
    Ch347, Ch347Config, DeviceIdentity, Endpoints, Error, I2cSpeed, LocalRegistry, NusbTransport,
    Result, CH347_BRIDGE_INTERFACE, CH347_MODE1_PID, CH347_MODE3_PID, WCH_VID,
};
use nusb::MaybeFuture;

fn main() -> Result<()> {
    env_logger::init();

    println!("Opening first CH347 device...");
    let info = nusb::list_devices()
        .wait()
        .map_err(Error::Usb)?
        .find(|d| {
            d.vendor_id() == WCH_VID
                && matches!(d.product_id(), CH347_MODE1_PID | CH347_MODE3_PID)
        })
        .ok_or_else(|| Error::ArgumentOutOfRange("no CH347 in mode 1 or 3 found".into()))?;
    let device = info.open().wait().map_err(Error::Usb)?;
    let interface = device
        .detach_and_claim_interface(CH347_BRIDGE_INTERFACE)
        .wait()
        .map_err(Error::Usb)?;

    let mut registry = LocalRegistry::new();
    let mut bridge = Ch347::open(
        NusbTransport::new(interface),
        Endpoints::CH347_DEFAULT,
        DeviceIdentity::new(info.product_id()).with_location(info.busnum(), info.device_address()),
        Ch347Config::default().with_i2c_speed(I2cSpeed::Standard),
        &mut registry,
    )?;
    println!("Device opened: {}", bridge.i2c_adapter_info().name);

    println!("Scanning I2C bus (0x08 - 0x77)...");
    let found_devices = bridge.i2c_scan_default()?;

    if found_devices.is_empty() {
        println!("No devices found.");
    } else {
        print!("Found devices at addresses:");
        for addr in found_devices {
            print!(" 0x{:02X}", addr);
        }
        println!();
    }

    bridge.teardown(&mut registry);
    Ok(())
}
