//! BLE GATT constants for the Wallbox UART-emulation service
//!
//! The charger exposes a single service with two characteristics: the host
//! writes request frames to RX and the charger answers through notifications
//! on TX. Names follow the charger's point of view.

use uuid::Uuid;

/// BLE Service UUID: 331a36f5-2459-45ea-9d95-6142f0c4b307
pub const SERVICE_UUID: Uuid = Uuid::from_u128(0x331a36f5_2459_45ea_9d95_6142f0c4b307);

/// UART RX Characteristic UUID (write, host -> charger)
pub const RX_CHAR_UUID: Uuid = Uuid::from_u128(0xa9da6040_0823_4995_94ec_9ce41ca28833);

/// UART TX Characteristic UUID (notify, charger -> host)
pub const TX_CHAR_UUID: Uuid = Uuid::from_u128(0xa73e9a10_628f_4494_a099_12efaf72258f);

/// Returns true if an advertised local name looks like a Wallbox charger
/// ("WB" followed by the serial number digits).
pub fn is_charger_name(name: &str) -> bool {
    match name.strip_prefix("WB") {
        Some(rest) => rest.chars().next().is_some_and(|c| c.is_ascii_digit()),
        None => false,
    }
}
