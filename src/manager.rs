use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{debug, error, info};
use tokio::sync::Notify;

use crate::classic::ClassicSource;
use crate::config::AppConfig;
use crate::gatt::BatteryProbe;
use crate::models::Snapshot;
use crate::registry::{self, BatteryRegistry, DeviceRegistry};
use crate::scanner::Discovery;

struct Shared {
    snapshot: Mutex<Snapshot>,
    running: AtomicBool,
    wake: Notify,
}

/// Consumer-side view of the engine. Cheap to clone; safe to use while
/// a cycle is in flight.
#[derive(Clone)]
pub struct MonitorHandle {
    shared: Arc<Shared>,
}

impl MonitorHandle {
    /// The most recently published state. Always a complete cycle's
    /// registries, never a partial merge.
    pub fn snapshot(&self) -> Snapshot {
        self.shared
            .snapshot
            .lock()
            .expect("snapshot lock poisoned")
            .clone()
    }

    /// Clears both registries right away; the next cycle repopulates
    /// them from scratch. The cycle counter is left alone.
    pub fn request_manual_refresh(&self) {
        let mut snapshot = self
            .shared
            .snapshot
            .lock()
            .expect("snapshot lock poisoned");
        snapshot.devices.clear();
        snapshot.batteries.clear();
        info!("manual refresh: registries cleared");
    }

    /// Asks the scan loop to stop after the current cycle. Wakes the
    /// inter-cycle sleep; an in-flight device read finishes naturally.
    pub fn request_stop(&self) {
        self.shared.running.store(false, Ordering::SeqCst);
        self.shared.wake.notify_waiters();
    }
}

/// The scan scheduler: discovery, auxiliary enumeration, per-device
/// battery reads, registry publish, fixed cooling delay, repeat. Sole
/// writer of the published registries.
pub struct Monitor<D, P, C> {
    discovery: D,
    probe: P,
    classic: C,
    config: AppConfig,
    shared: Arc<Shared>,
}

impl<D, P, C> Monitor<D, P, C>
where
    D: Discovery,
    P: BatteryProbe,
    C: ClassicSource,
{
    pub fn new(discovery: D, probe: P, classic: C, config: AppConfig) -> Self {
        Monitor {
            discovery,
            probe,
            classic,
            config,
            shared: Arc::new(Shared {
                snapshot: Mutex::new(Snapshot {
                    running: true,
                    ..Snapshot::default()
                }),
                running: AtomicBool::new(true),
                wake: Notify::new(),
            }),
        }
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub async fn run(self) {
        info!("scan loop started");
        while self.shared.running.load(Ordering::SeqCst) {
            match self.run_cycle().await {
                Ok((devices, batteries)) => {
                    info!(
                        "cycle complete: {} devices, {} with battery",
                        devices.len(),
                        batteries.len()
                    );
                    self.publish(Some((devices, batteries)), None);
                }
                Err(err) => {
                    error!("scan cycle failed: {err:#}");
                    self.publish(None, Some(format!("{err:#}")));
                }
            }

            if !self.shared.running.load(Ordering::SeqCst) {
                break;
            }
            // Same cadence whether the cycle succeeded or failed; a
            // stop request wakes the sleep early.
            tokio::select! {
                _ = tokio::time::sleep(self.config.intercycle_delay()) => {}
                _ = self.shared.wake.notified() => {}
            }
        }

        self.shared
            .snapshot
            .lock()
            .expect("snapshot lock poisoned")
            .running = false;
        info!("scan loop stopped");
    }

    async fn run_cycle(&self) -> anyhow::Result<(DeviceRegistry, BatteryRegistry)> {
        let advertised = self.discovery.scan(self.config.scan_timeout()).await?;
        debug!("cycle saw {} advertising devices", advertised.len());

        let classic = self.classic.enumerate().await;
        let system_level = if classic.is_empty() {
            None
        } else {
            self.classic.system_battery_level().await
        };

        // Sequential reads: one device failing to answer must not
        // abort the rest, and the radio is never asked to do two
        // things at once.
        let mut low_energy = Vec::with_capacity(advertised.len());
        for advertisement in advertised {
            if advertisement.address.is_empty() {
                continue;
            }
            let read = self
                .probe
                .read_battery_level(&advertisement.address, self.config.read_timeout())
                .await;
            low_energy.push((advertisement, read));
        }

        Ok(registry::merge_cycle(
            &low_energy,
            &classic,
            system_level,
            &self.config,
        ))
    }

    /// Publishes one cycle's outcome. A successful cycle swaps in the
    /// freshly built registries and clears the last error; a failed
    /// cycle leaves the prior registries readable and records the
    /// error. The counter advances either way.
    fn publish(&self, registries: Option<(DeviceRegistry, BatteryRegistry)>, error: Option<String>) {
        let mut snapshot = self
            .shared
            .snapshot
            .lock()
            .expect("snapshot lock poisoned");
        if let Some((devices, batteries)) = registries {
            snapshot.devices = devices;
            snapshot.batteries = batteries;
        }
        snapshot.last_error = error;
        snapshot.cycle += 1;
    }
}
