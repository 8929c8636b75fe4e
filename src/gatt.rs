use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use btleplug::api::bleuuid::uuid_from_u16;
use btleplug::api::{Central as _, Manager as _, Peripheral as _};
use btleplug::platform::{Manager, Peripheral};
use log::debug;
use uuid::Uuid;

/// Battery Service, assigned number 0x180F.
pub const BATTERY_SERVICE_UUID: Uuid = uuid_from_u16(0x180F);
/// Battery Level characteristic, assigned number 0x2A19. Single byte,
/// unsigned percentage.
pub const BATTERY_LEVEL_UUID: Uuid = uuid_from_u16(0x2A19);

/// Outcome of one battery probe. A device without the battery service
/// is a routine result, not an error, so every failure mode collapses
/// into `Unavailable` with its reason.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BatteryRead {
    Level(u8),
    Unavailable(Unavailable),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Unavailable {
    DeviceGone,
    ConnectFailed,
    DiscoveryFailed,
    NoBatteryService,
    ReadFailed,
    BadValue,
    Timeout,
}

impl fmt::Display for Unavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Unavailable::DeviceGone => "device no longer known to the adapter",
            Unavailable::ConnectFailed => "connection failed",
            Unavailable::DiscoveryFailed => "service discovery failed",
            Unavailable::NoBatteryService => "no battery service",
            Unavailable::ReadFailed => "characteristic read failed",
            Unavailable::BadValue => "malformed battery value",
            Unavailable::Timeout => "timed out",
        };
        f.write_str(reason)
    }
}

/// Reads one device's battery level. Implemented over GATT by
/// [`GattProbe`]; tests substitute their own probe.
pub trait BatteryProbe {
    async fn read_battery_level(&self, address: &str, timeout: Duration) -> BatteryRead;
}

pub struct GattProbe {
    manager: Arc<Manager>,
}

impl GattProbe {
    pub fn new(manager: Arc<Manager>) -> Self {
        GattProbe { manager }
    }

    async fn peripheral_for(&self, address: &str) -> Option<Peripheral> {
        let adapter = self.manager.adapters().await.ok()?.into_iter().next()?;
        let peripherals = adapter.peripherals().await.ok()?;
        peripherals
            .into_iter()
            .find(|p| p.address().to_string().eq_ignore_ascii_case(address))
    }
}

impl BatteryProbe for GattProbe {
    async fn read_battery_level(&self, address: &str, timeout: Duration) -> BatteryRead {
        let Some(peripheral) = self.peripheral_for(address).await else {
            return BatteryRead::Unavailable(Unavailable::DeviceGone);
        };

        let outcome = match tokio::time::timeout(timeout, read_once(&peripheral)).await {
            Ok(outcome) => outcome,
            Err(_) => BatteryRead::Unavailable(Unavailable::Timeout),
        };

        // The connection must be released on every exit path, timeout
        // included.
        if let Err(err) = peripheral.disconnect().await {
            debug!("disconnect from {address} failed: {err}");
        }

        if let BatteryRead::Unavailable(reason) = outcome {
            debug!("no battery reading from {address}: {reason}");
        }
        outcome
    }
}

async fn read_once(peripheral: &Peripheral) -> BatteryRead {
    if peripheral.connect().await.is_err() {
        return BatteryRead::Unavailable(Unavailable::ConnectFailed);
    }
    if peripheral.discover_services().await.is_err() {
        return BatteryRead::Unavailable(Unavailable::DiscoveryFailed);
    }

    let characteristic = peripheral
        .services()
        .into_iter()
        .filter(|service| service.uuid == BATTERY_SERVICE_UUID)
        .flat_map(|service| service.characteristics)
        .find(|characteristic| characteristic.uuid == BATTERY_LEVEL_UUID);
    let Some(characteristic) = characteristic else {
        return BatteryRead::Unavailable(Unavailable::NoBatteryService);
    };

    match peripheral.read(&characteristic).await {
        Ok(raw) => match parse_battery_value(&raw) {
            Some(level) => BatteryRead::Level(level),
            None => BatteryRead::Unavailable(Unavailable::BadValue),
        },
        Err(_) => BatteryRead::Unavailable(Unavailable::ReadFailed),
    }
}

/// First byte of the read, accepted only inside the 0..=100 percentage
/// range. Anything else is a malformed response.
fn parse_battery_value(raw: &[u8]) -> Option<u8> {
    match raw.first() {
        Some(&level) if level <= 100 => Some(level),
        _ => None,
    }
}
