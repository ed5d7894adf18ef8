//! Bluetooth connection handling for the Genial T31
//! This module connects to the thermometer, locates its characteristics, and exposes the
//! result as a [`BleLink`].

use anyhow::{Result, anyhow};
use bluest::{Adapter, Characteristic, ConnectionEvent, Device};
use futures_util::StreamExt;
use log::{debug, info, warn};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::commands::CommandSender;
use crate::core::bluetooth::constants::{
    UUID_RX_NOTIFY_CHAR, UUID_THERMOMETER_SERVICE, UUID_TX_WRITE_CHAR,
};
use crate::core::bluetooth::notification::NotificationHandler;
use crate::core::bluetooth::transport::BleLink;
use crate::core::bluetooth::types::LinkEvents;
use crate::error::BridgeError;

/// Connection manager for the thermometer
#[derive(Clone)]
pub struct ConnectionManager {
    adapter: Adapter,
    retry_delay: Duration,
}

impl ConnectionManager {
    pub fn new(adapter: Adapter, retry_delay: Duration) -> Self {
        Self { adapter, retry_delay }
    }

    /// Connect to the device with retry mechanism
    pub async fn connect_with_retry(
        &self,
        device: &Device,
        max_attempts: u32,
        events: LinkEvents,
    ) -> Result<BluestLink> {
        let max_attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=max_attempts {
            match self.try_connect(device, events.clone()).await {
                Ok(link) => {
                    info!("Successfully connected to device");
                    return Ok(link);
                }
                Err(e) => {
                    warn!("Connection attempt {} failed: {}", attempt, e);
                    last_error = Some(e);

                    if attempt < max_attempts {
                        info!("Retrying connection in {:?}...", self.retry_delay);
                        tokio::time::sleep(self.retry_delay).await;
                    }
                }
            }
        }

        // A connect that got through but found no usable service would stay open otherwise.
        if device.is_connected().await {
            if let Err(e) = self.adapter.disconnect_device(device).await {
                debug!("Cleanup disconnect failed: {}", e);
            }
        }

        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to connect after {} attempts", max_attempts)))
    }

    /// Try to connect to the device once
    async fn try_connect(&self, device: &Device, events: LinkEvents) -> Result<BluestLink> {
        let name = device.name().unwrap_or_else(|_| "Unknown".to_string());
        info!("Device details - ID: {}, Name: {:?}", device.id(), name);

        if !device.is_connected().await {
            info!("Initiating connection to {}...", device.id());
            self.adapter.connect_device(device).await?;
        }

        info!("Connection successful, discovering services...");
        let services = device.services().await?;
        let service = services
            .iter()
            .find(|s| s.uuid() == UUID_THERMOMETER_SERVICE)
            .ok_or_else(|| {
                for service in &services {
                    debug!("Available service: {}", service.uuid());
                }
                BridgeError::ServiceNotFound(UUID_THERMOMETER_SERVICE)
            })?
            .clone();

        let mut notify_char = None;
        let mut write_char = None;
        for characteristic in service.characteristics().await? {
            let uuid = characteristic.uuid();
            if uuid == UUID_RX_NOTIFY_CHAR {
                debug!("Found notification characteristic: {}", uuid);
                notify_char = Some(characteristic);
            } else if uuid == UUID_TX_WRITE_CHAR {
                debug!("Found write characteristic: {}", uuid);
                write_char = Some(characteristic);
            }
        }
        let notify_char =
            notify_char.ok_or(BridgeError::CharacteristicNotFound(UUID_RX_NOTIFY_CHAR))?;
        let write_char =
            write_char.ok_or(BridgeError::CharacteristicNotFound(UUID_TX_WRITE_CHAR))?;

        let connection_watch = self.watch_connection(device.clone(), events.clone());
        Ok(BluestLink {
            adapter: self.adapter.clone(),
            device: device.clone(),
            notify_char,
            write_char,
            events,
            notifications: NotificationHandler::new(),
            connection_watch,
        })
    }

    /// Reports the link dropping through `events` until the returned token is cancelled.
    fn watch_connection(&self, device: Device, events: LinkEvents) -> CancellationToken {
        let cancel = CancellationToken::new();
        let cancel_for_task = cancel.clone();
        let adapter = self.adapter.clone();

        tokio::spawn(async move {
            let mut connection_events = match adapter.device_connection_events(&device).await {
                Ok(stream) => stream,
                Err(e) => {
                    warn!("Cannot watch connection state of {}: {}", device.id(), e);
                    return;
                }
            };

            loop {
                tokio::select! {
                    _ = cancel_for_task.cancelled() => break,
                    event = connection_events.next() => match event {
                        Some(ConnectionEvent::Disconnected) => {
                            warn!("Device {} dropped the connection", device.id());
                            events.disconnected();
                            break;
                        }
                        Some(_) => {}
                        None => break,
                    },
                }
            }
        });

        cancel
    }
}

/// An open link to the thermometer
pub struct BluestLink {
    adapter: Adapter,
    device: Device,
    notify_char: Characteristic,
    write_char: Characteristic,
    events: LinkEvents,
    notifications: NotificationHandler,
    connection_watch: CancellationToken,
}

#[async_trait::async_trait]
impl CommandSender for BluestLink {
    async fn send_packet(&self, packet: &[u8]) -> Result<()> {
        debug!("Writing {:02X?} to {}", packet, self.write_char.uuid());
        self.write_char.write(packet).await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl BleLink for BluestLink {
    async fn is_connected(&self) -> bool {
        self.device.is_connected().await
    }

    async fn start_notify(&mut self) -> Result<()> {
        self.notifications
            .start(self.notify_char.clone(), self.events.clone())
            .await
    }

    async fn stop_notify(&mut self) -> Result<()> {
        self.notifications.stop().await;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        // Our own disconnect is not a link loss.
        self.connection_watch.cancel();
        self.notifications.stop().await;

        if self.device.is_connected().await {
            info!("Disconnecting from device {}", self.device.id());
            self.adapter.disconnect_device(&self.device).await?;
            info!("Successfully disconnected");
        } else {
            info!("Device {} not connected", self.device.id());
        }
        Ok(())
    }
}

impl Drop for BluestLink {
    fn drop(&mut self) {
        self.connection_watch.cancel();
    }
}
