use std::time::Duration;

use log::debug;
use tokio::process::Command;

use crate::models::ClassicDevice;

const TOOL_TIMEOUT: Duration = Duration::from_secs(5);

/// Best-effort source of classically-paired devices and the
/// system-reported battery level. Unavailable tooling yields empty
/// results, never a cycle failure.
pub trait ClassicSource {
    async fn enumerate(&self) -> Vec<ClassicDevice>;
    async fn system_battery_level(&self) -> Option<u8>;
}

/// Queries `bluetoothctl` for paired devices and `upower` for a system
/// battery percentage.
pub struct PlatformClassicSource {
    enabled: bool,
}

impl PlatformClassicSource {
    pub fn new(enabled: bool) -> Self {
        PlatformClassicSource { enabled }
    }
}

impl ClassicSource for PlatformClassicSource {
    async fn enumerate(&self) -> Vec<ClassicDevice> {
        if !self.enabled {
            return Vec::new();
        }
        // Older bluetoothctl releases spell this `paired-devices`.
        let listing = match run_tool("bluetoothctl", &["devices", "Paired"]).await {
            Some(listing) => listing,
            None => match run_tool("bluetoothctl", &["paired-devices"]).await {
                Some(listing) => listing,
                None => return Vec::new(),
            },
        };
        let controllers = match run_tool("bluetoothctl", &["list"]).await {
            Some(out) => parse_controller_addresses(&out),
            None => Vec::new(),
        };
        parse_paired_devices(&listing, &controllers)
    }

    async fn system_battery_level(&self) -> Option<u8> {
        if !self.enabled {
            return None;
        }
        let dump = run_tool("upower", &["--dump"]).await?;
        parse_upower_percentage(&dump)
    }
}

async fn run_tool(program: &str, args: &[&str]) -> Option<String> {
    let output = match tokio::time::timeout(
        TOOL_TIMEOUT,
        Command::new(program).args(args).output(),
    )
    .await
    {
        Ok(Ok(output)) => output,
        Ok(Err(err)) => {
            debug!("{program} unavailable: {err}");
            return None;
        }
        Err(_) => {
            debug!("{program} timed out");
            return None;
        }
    };
    if !output.status.success() {
        debug!("{program} exited with {}", output.status);
        return None;
    }
    String::from_utf8(output.stdout).ok()
}

/// Lines look like `Device AA:BB:CC:DD:EE:FF Some Device Name`. The
/// host's own controllers are never candidate peripherals and are
/// filtered out by address.
fn parse_paired_devices(listing: &str, controllers: &[String]) -> Vec<ClassicDevice> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, ' ');
            if parts.next()? != "Device" {
                return None;
            }
            let address = parts.next()?.to_string();
            if controllers.iter().any(|c| c.eq_ignore_ascii_case(&address)) {
                return None;
            }
            let name = parts
                .next()
                .map(|n| n.trim().to_string())
                .filter(|n| !n.is_empty());
            Some(ClassicDevice {
                address,
                name,
                status: Some("Paired".to_string()),
            })
        })
        .collect()
}

/// Lines look like `Controller AA:BB:CC:DD:EE:FF hostname [default]`.
fn parse_controller_addresses(listing: &str) -> Vec<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.trim().splitn(3, ' ');
            if parts.next()? != "Controller" {
                return None;
            }
            parts.next().map(str::to_string)
        })
        .collect()
}

fn parse_upower_percentage(dump: &str) -> Option<u8> {
    for line in dump.lines() {
        if let Some(rest) = line.trim().strip_prefix("percentage:") {
            let value = rest.trim().trim_end_matches('%');
            if let Ok(level) = value.parse::<f64>() {
                if (0.0..=100.0).contains(&level) {
                    return Some(level.round() as u8);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_paired_devices() {
        let listing = "Device AA:BB:CC:DD:EE:FF JBL Flip 5\nDevice 11:22:33:44:55:66 Keyboard\n";
        let devices = parse_paired_devices(listing, &[]);
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(devices[0].name.as_deref(), Some("JBL Flip 5"));
        assert_eq!(devices[0].status.as_deref(), Some("Paired"));
    }

    #[test]
    fn test_parse_paired_devices_excludes_controllers() {
        let listing = "Device AA:BB:CC:DD:EE:FF Speaker\nDevice 00:11:22:33:44:55 hci0\n";
        let controllers = vec!["00:11:22:33:44:55".to_string()];
        let devices = parse_paired_devices(listing, &controllers);
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].address, "AA:BB:CC:DD:EE:FF");
    }

    #[test]
    fn test_parse_paired_devices_ignores_noise() {
        let listing = "Agent registered\nDevice AA:BB:CC:DD:EE:FF\n\n";
        let devices = parse_paired_devices(listing, &[]);
        assert_eq!(devices.len(), 1);
        assert!(devices[0].name.is_none());
    }

    #[test]
    fn test_parse_controller_addresses() {
        let listing = "Controller 00:11:22:33:44:55 thinkpad [default]\n";
        assert_eq!(
            parse_controller_addresses(listing),
            vec!["00:11:22:33:44:55".to_string()]
        );
    }

    #[test]
    fn test_parse_upower_percentage() {
        let dump = "Device: /org/freedesktop/UPower/devices/battery_BAT0\n  battery\n    percentage:          87%\n";
        assert_eq!(parse_upower_percentage(dump), Some(87));
    }

    #[test]
    fn test_parse_upower_percentage_missing() {
        assert_eq!(parse_upower_percentage("Device: line-power_AC\n"), None);
    }

    #[test]
    fn test_parse_upower_percentage_out_of_range() {
        assert_eq!(parse_upower_percentage("percentage: 240%\n"), None);
    }
}
