use std::collections::HashMap;

use crate::config::AppConfig;
use crate::gatt::BatteryRead;
use crate::models::{Advertisement, ClassicDevice, DeviceInfo, DeviceKind, UNKNOWN_NAME};

pub type DeviceRegistry = HashMap<String, DeviceInfo>;
pub type BatteryRegistry = HashMap<String, u8>;

/// Folds one cycle's inputs into the two registries. Low-energy
/// results are processed first; a classic entry sharing an address
/// overwrites the identity wholesale, and a system battery value
/// overwrites (never merges with) a reading recorded on the
/// low-energy path.
pub fn merge_cycle(
    low_energy: &[(Advertisement, BatteryRead)],
    classic: &[ClassicDevice],
    system_level: Option<u8>,
    config: &AppConfig,
) -> (DeviceRegistry, BatteryRegistry) {
    let mut devices = DeviceRegistry::new();
    let mut batteries = BatteryRegistry::new();

    for (advertisement, read) in low_energy {
        if advertisement.address.is_empty() {
            continue;
        }
        let address = advertisement.address.clone();
        devices.insert(
            address.clone(),
            DeviceInfo {
                address: address.clone(),
                name: display_name(advertisement.name.as_deref(), &address, config),
                kind: DeviceKind::LowEnergy,
                signal_strength: advertisement.signal_strength,
                status: None,
            },
        );
        if let BatteryRead::Level(level) = read {
            batteries.insert(address, *level);
        }
    }

    for device in classic {
        if device.address.is_empty() {
            continue;
        }
        let address = device.address.clone();
        devices.insert(
            address.clone(),
            DeviceInfo {
                address: address.clone(),
                name: display_name(device.name.as_deref(), &address, config),
                kind: DeviceKind::Classic,
                signal_strength: None,
                status: device.status.clone(),
            },
        );
        if let Some(level) = system_level {
            batteries.insert(address, level);
        }
    }

    debug_assert!(batteries.keys().all(|key| devices.contains_key(key)));
    (devices, batteries)
}

fn display_name(reported: Option<&str>, address: &str, config: &AppConfig) -> String {
    match reported {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => config
            .alias_for(address)
            .unwrap_or_else(|| UNKNOWN_NAME.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gatt::Unavailable;

    fn advertisement(address: &str, name: Option<&str>) -> Advertisement {
        Advertisement {
            address: address.to_string(),
            name: name.map(str::to_string),
            signal_strength: Some(-60),
        }
    }

    fn classic_device(address: &str, name: &str) -> ClassicDevice {
        ClassicDevice {
            address: address.to_string(),
            name: Some(name.to_string()),
            status: Some("Paired".to_string()),
        }
    }

    #[test]
    fn test_low_energy_device_with_battery() {
        let low_energy = vec![(
            advertisement("AA:BB:CC:DD:EE:FF", Some("Headphones X")),
            BatteryRead::Level(75),
        )];
        let (devices, batteries) =
            merge_cycle(&low_energy, &[], None, &AppConfig::default());

        let info = &devices["AA:BB:CC:DD:EE:FF"];
        assert_eq!(info.name, "Headphones X");
        assert_eq!(info.kind, DeviceKind::LowEnergy);
        assert_eq!(batteries["AA:BB:CC:DD:EE:FF"], 75);
    }

    #[test]
    fn test_unsupported_device_has_no_battery_entry() {
        let low_energy = vec![(
            advertisement("AA:BB:CC:DD:EE:FF", Some("Mouse")),
            BatteryRead::Unavailable(Unavailable::NoBatteryService),
        )];
        let (devices, batteries) =
            merge_cycle(&low_energy, &[], None, &AppConfig::default());

        assert!(devices.contains_key("AA:BB:CC:DD:EE:FF"));
        assert!(batteries.is_empty());
    }

    #[test]
    fn test_empty_addresses_are_skipped() {
        let low_energy = vec![(advertisement("", Some("Ghost")), BatteryRead::Level(50))];
        let classic = vec![ClassicDevice {
            address: String::new(),
            name: Some("Ghost".to_string()),
            status: None,
        }];
        let (devices, batteries) =
            merge_cycle(&low_energy, &classic, Some(40), &AppConfig::default());

        assert!(devices.is_empty());
        assert!(batteries.is_empty());
    }

    #[test]
    fn test_missing_name_falls_back_to_sentinel() {
        let low_energy = vec![(
            advertisement("AA:BB:CC:DD:EE:FF", None),
            BatteryRead::Unavailable(Unavailable::ConnectFailed),
        )];
        let (devices, _) = merge_cycle(&low_energy, &[], None, &AppConfig::default());
        assert_eq!(devices["AA:BB:CC:DD:EE:FF"].name, UNKNOWN_NAME);
    }

    #[test]
    fn test_missing_name_uses_configured_alias() {
        let config: AppConfig = toml::de::from_str(
            r#"
            [[devices]]
            address = "AA:BB:CC:DD:EE:FF"
            name = "Headphones X"
        "#,
        )
        .unwrap();
        let low_energy = vec![(
            advertisement("AA:BB:CC:DD:EE:FF", None),
            BatteryRead::Level(20),
        )];
        let (devices, _) = merge_cycle(&low_energy, &[], None, &config);
        assert_eq!(devices["AA:BB:CC:DD:EE:FF"].name, "Headphones X");
    }

    #[test]
    fn test_classic_entry_overwrites_low_energy_identity() {
        let address = "AA:BB:CC:DD:EE:FF";
        let low_energy = vec![(
            advertisement(address, Some("LE Name")),
            BatteryRead::Level(40),
        )];
        let classic = vec![classic_device(address, "Paired Name")];
        let (devices, batteries) =
            merge_cycle(&low_energy, &classic, Some(90), &AppConfig::default());

        let info = &devices[address];
        assert_eq!(info.kind, DeviceKind::Classic);
        assert_eq!(info.name, "Paired Name");
        assert_eq!(info.status.as_deref(), Some("Paired"));
        assert_eq!(info.signal_strength, None);
        // The auxiliary reading replaces the low-energy one outright.
        assert_eq!(batteries[address], 90);
    }

    #[test]
    fn test_prior_battery_reading_survives_without_system_level() {
        let address = "AA:BB:CC:DD:EE:FF";
        let low_energy = vec![(
            advertisement(address, Some("LE Name")),
            BatteryRead::Level(40),
        )];
        let classic = vec![classic_device(address, "Paired Name")];
        let (devices, batteries) =
            merge_cycle(&low_energy, &classic, None, &AppConfig::default());

        assert_eq!(devices[address].kind, DeviceKind::Classic);
        assert_eq!(batteries[address], 40);
    }

    #[test]
    fn test_battery_keys_are_subset_of_device_keys() {
        let low_energy = vec![
            (advertisement("AA:BB:CC:DD:EE:01", Some("A")), BatteryRead::Level(10)),
            (
                advertisement("AA:BB:CC:DD:EE:02", Some("B")),
                BatteryRead::Unavailable(Unavailable::Timeout),
            ),
        ];
        let classic = vec![classic_device("AA:BB:CC:DD:EE:03", "C")];
        let (devices, batteries) =
            merge_cycle(&low_energy, &classic, Some(55), &AppConfig::default());

        assert!(batteries.keys().all(|key| devices.contains_key(key)));
        assert_eq!(devices.len(), 3);
        assert_eq!(batteries.len(), 2);
    }
}
