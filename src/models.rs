use std::collections::HashMap;

use serde_derive::Serialize;

/// Display name used when a device advertises no local name and no
/// alias is configured for its address.
pub const UNKNOWN_NAME: &str = "Unknown";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum DeviceKind {
    LowEnergy,
    Classic,
}

/// One advertising device as seen by a single scan pass. Only the
/// address is guaranteed; name and signal strength are best-effort.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advertisement {
    pub address: String,
    pub name: Option<String>,
    pub signal_strength: Option<i16>,
}

/// A classically-paired device reported by the auxiliary platform
/// source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassicDevice {
    pub address: String,
    pub name: Option<String>,
    pub status: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    pub address: String,
    pub name: String,
    pub kind: DeviceKind,
    pub signal_strength: Option<i16>,
    pub status: Option<String>,
}

/// The state published after each scan cycle. `devices` holds every
/// device seen in the cycle; `batteries` holds percentages for the
/// subset that produced a reading. Keys of `batteries` are always a
/// subset of keys of `devices`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct Snapshot {
    pub devices: HashMap<String, DeviceInfo>,
    pub batteries: HashMap<String, u8>,
    pub cycle: u64,
    pub last_error: Option<String>,
    pub running: bool,
}
