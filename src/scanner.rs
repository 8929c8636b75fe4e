use std::sync::Arc;
use std::time::Duration;

use btleplug::api::{Central as _, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::Manager;
use futures::StreamExt as _;
use log::{debug, warn};
use thiserror::Error;

use crate::models::Advertisement;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("no bluetooth adapter available")]
    NoAdapter,
    #[error("bluetooth scan failed: {0}")]
    Bluetooth(#[from] btleplug::Error),
}

/// One bounded radio scan pass. Implemented against the real adapter
/// by [`BleScanner`]; tests substitute their own source.
pub trait Discovery {
    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>, ScanError>;
}

pub struct BleScanner {
    manager: Arc<Manager>,
}

impl BleScanner {
    pub fn new(manager: Arc<Manager>) -> Self {
        BleScanner { manager }
    }
}

impl Discovery for BleScanner {
    async fn scan(&self, timeout: Duration) -> Result<Vec<Advertisement>, ScanError> {
        // The adapter is looked up fresh on every pass so a scan that
        // failed while the adapter was down starts working again once
        // it returns.
        let adapter = self
            .manager
            .adapters()
            .await?
            .into_iter()
            .next()
            .ok_or(ScanError::NoAdapter)?;

        let mut events = adapter.events().await?;
        adapter.start_scan(ScanFilter::default()).await?;

        let deadline = tokio::time::sleep(timeout);
        tokio::pin!(deadline);
        loop {
            tokio::select! {
                _ = &mut deadline => break,
                event = events.next() => match event {
                    Some(CentralEvent::DeviceDiscovered(id)) => {
                        debug!("discovered {:?}", id);
                    }
                    Some(_) => {}
                    None => {
                        debug!("adapter event stream closed");
                        break;
                    }
                },
            }
        }

        if let Err(err) = adapter.stop_scan().await {
            warn!("failed to stop scan: {err}");
        }

        let mut found = Vec::new();
        for peripheral in adapter.peripherals().await? {
            let address = peripheral.address().to_string();
            let properties = peripheral.properties().await.ok().flatten();
            found.push(Advertisement {
                address,
                name: properties.as_ref().and_then(|p| p.local_name.clone()),
                signal_strength: properties.as_ref().and_then(|p| p.rssi),
            });
        }
        debug!("scan pass finished with {} devices", found.len());
        Ok(found)
    }
}
