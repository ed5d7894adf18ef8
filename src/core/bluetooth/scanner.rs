use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use bluest::{Adapter, Device};
use futures_util::StreamExt;
use log::{debug, info};
use uuid::Uuid;

use crate::core::bluetooth::constants::{ADVERTISED_NAME_FRAGMENT, UUID_THERMOMETER_SERVICE};
use crate::core::bluetooth::types::MacAddress;

/// A thermometer seen nearby
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredDevice {
    pub address: MacAddress,
    pub name: String,
}

/// True if the advertised services or name identify a Genial T31.
pub fn is_genial_t31(name: Option<&str>, services: &[Uuid]) -> bool {
    services.contains(&UUID_THERMOMETER_SERVICE)
        || name.is_some_and(|name| name.contains(ADVERTISED_NAME_FRAGMENT))
}

/// Resolves a MAC address to a connectable `bluest` device.
///
/// Devices seen during a scan are remembered so later lookups can skip the scan.
pub struct BluetoothScanner {
    adapter: Adapter,
    devices: Arc<Mutex<HashMap<MacAddress, Device>>>,
    scan_timeout: Duration,
}

impl BluetoothScanner {
    pub fn new(adapter: Adapter, scan_timeout: Duration) -> Self {
        Self {
            adapter,
            devices: Arc::new(Mutex::new(HashMap::new())),
            scan_timeout,
        }
    }

    /// Looks among remembered and currently connected devices.
    pub async fn find_known(&self, address: &MacAddress) -> Result<Option<Device>> {
        if let Some(device) = self.remembered(address) {
            debug!("Device {} found in cache", address);
            return Ok(Some(device));
        }

        info!("Checking connected devices for {}", address);
        for device in self.adapter.connected_devices().await? {
            if Self::device_address(&device) == Some(*address) {
                self.remember(*address, device.clone());
                return Ok(Some(device));
            }
        }
        Ok(None)
    }

    /// Listens to advertisements until the device shows up or the scan times out.
    pub async fn scan_for(&self, address: &MacAddress) -> Result<Option<Device>> {
        info!("Scanning up to {:?} for {}", self.scan_timeout, address);
        let mut scan_stream = self.adapter.scan(&[]).await?;

        let found = tokio::time::timeout(self.scan_timeout, async {
            while let Some(discovered_device) = scan_stream.next().await {
                let device = discovered_device.device;
                debug!("Found device - Device: {:?}, RSSI: {:?}", device, discovered_device.rssi);

                if let Some(seen) = Self::device_address(&device) {
                    self.remember(seen, device.clone());
                    if seen == *address {
                        return Some(device);
                    }
                }
            }
            info!("Bluetooth scan stream has ended.");
            None
        })
        .await;

        match found {
            Ok(device) => Ok(device),
            Err(_) => {
                info!("Scan for {} timed out", address);
                Ok(None)
            }
        }
    }

    /// Lists thermometers that are connected or advertise within `timeout`.
    pub async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        let mut found: HashMap<MacAddress, String> = HashMap::new();

        for device in self.adapter.connected_devices().await? {
            let name = device.name().ok();
            if !is_genial_t31(name.as_deref(), &[]) {
                continue;
            }
            if let Some(address) = Self::device_address(&device) {
                self.remember(address, device.clone());
                found.insert(address, name.unwrap_or_else(|| "Unknown".to_string()));
            }
        }

        info!("Discovering thermometers for {:?}", timeout);
        let mut scan_stream = self.adapter.scan(&[]).await?;
        let scan = tokio::time::timeout(timeout, async {
            while let Some(discovered_device) = scan_stream.next().await {
                let device = discovered_device.device;
                let name = discovered_device
                    .adv_data
                    .local_name
                    .or_else(|| device.name().ok());
                if !is_genial_t31(name.as_deref(), &discovered_device.adv_data.services) {
                    continue;
                }
                let Some(address) = Self::device_address(&device) else {
                    debug!("Thermometer {:?} has no usable address", device);
                    continue;
                };
                if !found.contains_key(&address) {
                    info!("Found thermometer {}", address);
                }
                self.remember(address, device.clone());
                found.insert(address, name.unwrap_or_else(|| "Unknown".to_string()));
            }
            info!("Bluetooth scan stream has ended.");
        })
        .await;
        if scan.is_err() {
            debug!("Discovery window closed");
        }

        let mut devices: Vec<DiscoveredDevice> = found
            .into_iter()
            .map(|(address, name)| DiscoveredDevice { address, name })
            .collect();
        devices.sort_by_key(|device| device.address.octets());
        Ok(devices)
    }

    fn remembered(&self, address: &MacAddress) -> Option<Device> {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(address)
            .cloned()
    }

    fn remember(&self, address: MacAddress, device: Device) {
        self.devices
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(address, device);
    }

    fn device_address(device: &Device) -> Option<MacAddress> {
        MacAddress::find_in(&device.id().to_string())
    }
}
