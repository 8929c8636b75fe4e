use std::time::Duration;

use mac_address::MacAddress;
use serde_derive::Deserialize;

const DEFAULT_SCAN_TIMEOUT_SECONDS: u64 = 6;
const DEFAULT_INTERCYCLE_DELAY_SECONDS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECONDS: u64 = 5;

#[derive(Deserialize, Debug, Default, Clone)]
pub struct AppConfig {
    pub scan: Option<ScanConfig>,
    pub classic: Option<ClassicConfig>,
    pub devices: Option<Vec<KnownDevice>>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ScanConfig {
    pub scan_timeout_seconds: Option<u64>,
    pub intercycle_delay_seconds: Option<u64>,
    pub read_timeout_seconds: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
pub struct ClassicConfig {
    pub enabled: Option<bool>,
}

/// A device the user has named up front. Used to label advertisements
/// that carry no local name.
#[derive(Deserialize, Debug, Clone)]
pub struct KnownDevice {
    pub address: MacAddress,
    pub name: String,
}

impl AppConfig {
    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(
            self.scan
                .as_ref()
                .and_then(|s| s.scan_timeout_seconds)
                .unwrap_or(DEFAULT_SCAN_TIMEOUT_SECONDS),
        )
    }

    pub fn intercycle_delay(&self) -> Duration {
        Duration::from_secs(
            self.scan
                .as_ref()
                .and_then(|s| s.intercycle_delay_seconds)
                .unwrap_or(DEFAULT_INTERCYCLE_DELAY_SECONDS),
        )
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(
            self.scan
                .as_ref()
                .and_then(|s| s.read_timeout_seconds)
                .unwrap_or(DEFAULT_READ_TIMEOUT_SECONDS),
        )
    }

    pub fn classic_enabled(&self) -> bool {
        self.classic
            .as_ref()
            .and_then(|c| c.enabled)
            .unwrap_or(true)
    }

    pub fn alias_for(&self, address: &str) -> Option<String> {
        self.devices
            .as_ref()?
            .iter()
            .find(|d| d.address.to_string().eq_ignore_ascii_case(address))
            .map(|d| d.name.clone())
    }
}
