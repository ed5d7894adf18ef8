//! Transport capabilities the connection session depends on
//! The session only talks to these traits, so the `bluest` backend and the test mock are
//! interchangeable.

use anyhow::Result;

use crate::core::bluetooth::commands::CommandSender;
use crate::core::bluetooth::types::{LinkEvents, MacAddress};

/// Device resolution and connection establishment.
#[async_trait::async_trait]
pub trait BleTransport: Send + Sync {
    /// A connectable device handle
    type Device: Send + Sync;
    /// An open link to a device
    type Link: BleLink;

    /// Looks the address up among devices the platform already knows about.
    async fn device_from_address(&self, address: &MacAddress) -> Result<Option<Self::Device>>;

    /// Looks the address up in scan results.
    async fn device_from_scan(&self, address: &MacAddress) -> Result<Option<Self::Device>>;

    /// Opens a link, trying at most `max_attempts` times.
    /// Frames and link loss for this link are reported through `events`.
    async fn establish_connection(
        &self,
        device: &Self::Device,
        max_attempts: u32,
        events: LinkEvents,
    ) -> Result<Self::Link>;
}

/// An open link. Writes go through [`CommandSender::send_packet`].
#[async_trait::async_trait]
pub trait BleLink: CommandSender {
    async fn is_connected(&self) -> bool;

    /// Starts delivering frames from the notify characteristic.
    async fn start_notify(&mut self) -> Result<()>;

    async fn stop_notify(&mut self) -> Result<()>;

    async fn disconnect(&mut self) -> Result<()>;
}
