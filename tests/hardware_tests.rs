// tests/hardware_tests.rs
//
// Run with a CH347 attached: cargo test --test hardware_tests -- --ignored
// An EEPROM (24Cxx) at 0x50 is assumed for the I2C tests.
use ch347_usb::{
    Ch347, Ch347Config, DeviceIdentity, Endpoints, GpioDirection, GpioLevel, GpioPin,
    LocalRegistry, NusbTransport, Result, CH347_BRIDGE_INTERFACE, CH347_MODE1_PID,
    CH347_MODE3_PID, WCH_VID,
};
use nusb::MaybeFuture;
use std::{thread, time::Duration};

const EEPROM_ADDR: u8 = 0x50;

// Helper to open the first device, panics on failure for test simplicity
fn open_test_device(registry: &mut LocalRegistry) -> Ch347 {
    let info = nusb::list_devices()
        .wait()
        .expect("Failed to list USB devices")
        .find(|d| {
            d.vendor_id() == WCH_VID
                && matches!(d.product_id(), CH347_MODE1_PID | CH347_MODE3_PID)
        })
        .expect("No CH347 in mode 1 or 3 connected");
    let device = info.open().wait().expect("Failed to open CH347");
    let interface = device
        .detach_and_claim_interface(CH347_BRIDGE_INTERFACE)
        .wait()
        .expect("Failed to claim bridge interface. Are permissions set?");

    Ch347::open(
        NusbTransport::new(interface),
        Endpoints::CH347_DEFAULT,
        DeviceIdentity::new(info.product_id())
            .with_location(info.busnum(), info.device_address()),
        Ch347Config::default(),
        registry,
    )
    .expect("CH347 init failed")
}

#[test]
#[ignore] // Ignore by default, requires hardware
fn test_gpio_output_readback() -> Result<()> {
    let mut registry = LocalRegistry::new();
    let device = open_test_device(&mut registry);
    let pin = GpioPin::new(4)?;

    println!("Testing GPIO Output Readback on pin {}", pin.number());
    device.gpio_set_direction_output(pin, GpioLevel::Low)?;
    assert_eq!(device.gpio_get_direction(pin)?, GpioDirection::Output);

    device.gpio_write(pin, GpioLevel::High);
    thread::sleep(Duration::from_millis(5)); // Allow state to settle
    assert_eq!(device.gpio_read(pin)?, GpioLevel::High, "Pin should read HIGH");

    device.gpio_write(pin, GpioLevel::Low);
    thread::sleep(Duration::from_millis(5));
    assert_eq!(device.gpio_read(pin)?, GpioLevel::Low, "Pin should read LOW");

    device.gpio_set_direction_input(pin)?;
    println!("{}", device.gpio_state());
    Ok(())
}

#[test]
#[ignore]
fn test_i2c_scan() -> Result<()> {
    let mut registry = LocalRegistry::new();
    let device = open_test_device(&mut registry);

    let found = device.i2c_scan_default()?;
    println!("Found devices: {:02X?}", found);
    assert!(found.contains(&EEPROM_ADDR), "EEPROM did not acknowledge");
    Ok(())
}

#[test]
#[ignore]
fn test_i2c_eeprom_page_round_trip() -> Result<()> {
    let mut registry = LocalRegistry::new();
    let device = open_test_device(&mut registry);

    let page: Vec<u8> = (0..16u8).map(|i| i ^ 0xA5).collect();
    let mut write = vec![0x00];
    write.extend_from_slice(&page);
    device.i2c_write_7bit(EEPROM_ADDR, &write)?;
    thread::sleep(Duration::from_millis(10)); // write cycle

    // 80 bytes spans two read packets
    let mut readback = [0u8; 80];
    device.i2c_write_read_7bit(EEPROM_ADDR, &[0x00], &mut readback)?;
    assert_eq!(&readback[..16], &page[..]);
    Ok(())
}

#[test]
#[ignore]
fn test_i2c_absent_device_nacks() -> Result<()> {
    let mut registry = LocalRegistry::new();
    let device = open_test_device(&mut registry);

    let mut buf = [0xEEu8; 4];
    let err = device.i2c_read_7bit(0x7E, &mut buf).unwrap_err();
    assert!(err.is_timeout(), "expected NACK, got {err}");
    assert_eq!(buf, [0xEE; 4]);
    Ok(())
}
