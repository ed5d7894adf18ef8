//! Bluetooth manager for the Genial T31 bridge
//! This module wires the `bluest` adapter, scanner and connection manager into a
//! [`BleTransport`].

use std::time::Duration;

use anyhow::Result;
use bluest::{Adapter, Device};
use log::info;

use crate::config::TimingConfig;
use crate::core::bluetooth::connection::{BluestLink, ConnectionManager};
use crate::core::bluetooth::scanner::{BluetoothScanner, DiscoveredDevice};
use crate::core::bluetooth::transport::BleTransport;
use crate::core::bluetooth::types::{LinkEvents, MacAddress};
use crate::error::BridgeError;

/// Manages Bluetooth operations on the default adapter
pub struct BluetoothManager {
    scanner: BluetoothScanner,
    connection_manager: ConnectionManager,
}

impl BluetoothManager {
    /// Opens the default adapter and waits for it to become available.
    pub async fn new(timing: &TimingConfig) -> Result<Self> {
        let adapter = Adapter::default().await.ok_or(BridgeError::NoAdapter)?;
        adapter.wait_available().await?;
        info!("Bluetooth adapter is available.");

        Ok(Self {
            scanner: BluetoothScanner::new(adapter.clone(), timing.scan_timeout()),
            connection_manager: ConnectionManager::new(adapter, timing.connect_retry_delay()),
        })
    }

    /// Lists nearby thermometers, see [`BluetoothScanner::discover`].
    pub async fn discover(&self, timeout: Duration) -> Result<Vec<DiscoveredDevice>> {
        self.scanner.discover(timeout).await
    }
}

#[async_trait::async_trait]
impl BleTransport for BluetoothManager {
    type Device = Device;
    type Link = BluestLink;

    async fn device_from_address(&self, address: &MacAddress) -> Result<Option<Device>> {
        self.scanner.find_known(address).await
    }

    async fn device_from_scan(&self, address: &MacAddress) -> Result<Option<Device>> {
        self.scanner.scan_for(address).await
    }

    async fn establish_connection(
        &self,
        device: &Device,
        max_attempts: u32,
        events: LinkEvents,
    ) -> Result<BluestLink> {
        self.connection_manager
            .connect_with_retry(device, max_attempts, events)
            .await
    }
}
