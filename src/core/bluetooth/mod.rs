//! Bluetooth functionality for the Genial T31 bridge
//! This module handles device resolution, connecting, the handshake, and receiving
//! frames from the thermometer.

mod commands;
mod connection;
mod constants;
mod manager;
/// In-memory transport for tests, not part of the public API.
#[doc(hidden)]
pub mod mock;
mod notification;
mod scanner;
mod transport;
mod types;

// Re-export types that should be publicly accessible
pub use commands::{CommandExecutor, CommandSender};
pub use connection::{BluestLink, ConnectionManager};
pub use constants::*; // Re-export all constants
pub use manager::BluetoothManager;
pub use notification::NotificationHandler;
pub use scanner::{BluetoothScanner, DiscoveredDevice, is_genial_t31};
pub use transport::{BleLink, BleTransport};
pub use types::{ConnectionStatus, DeviceIdentity, LinkEvent, LinkEvents, MacAddress};
