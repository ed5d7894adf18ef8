//! Constants used throughout the bridge
//! This module contains the GATT layout of the Genial T31, its device metadata,
//! and the default timing values of the connection supervisor.

use uuid::Uuid;

/// Display name used when the configuration does not provide one
pub const DEFAULT_DEVICE_NAME: &str = "Genial T31 Thermometer";

/// Name fragment the thermometer advertises with
pub const ADVERTISED_NAME_FRAGMENT: &str = "Genial-T31";

/// Device metadata reported to consumers
pub const DEVICE_MANUFACTURER: &str = "Genial";
pub const DEVICE_MODEL: &str = "T31";
pub const DEVICE_SW_VERSION: &str = "1.0";

/// The UUID of the thermometer service (Health Thermometer)
pub const UUID_THERMOMETER_SERVICE: Uuid = Uuid::from_u128(0x00001809_0000_1000_8000_00805f9b34fb);

/// The UUID of the characteristic the device sends its frames on
pub const UUID_RX_NOTIFY_CHAR: Uuid = Uuid::from_u128(0x0000fff1_0000_1000_8000_00805f9b34fb);

/// The UUID of the characteristic the handshake packets are written to
pub const UUID_TX_WRITE_CHAR: Uuid = Uuid::from_u128(0x0000fff2_0000_1000_8000_00805f9b34fb);

/// Seconds without any frame before the data stream is considered stale
pub const DATA_TIMEOUT_SECS: u64 = 45;

/// Minimum seconds between two reconnect attempts
pub const RECONNECT_INTERVAL_SECS: u64 = 60;

/// Seconds between two supervisor ticks
pub const UPDATE_INTERVAL_SECS: u64 = 30;

/// Delay between enabling notifications and sending the handshake
pub const SETTLE_DELAY_MS: u64 = 500;

/// Delay after each handshake packet
pub const PACKET_DELAY_MS: u64 = 1000;

/// Maximum number of connection attempts inside a single connect
pub const MAX_CONNECT_ATTEMPTS: u32 = 2;

/// Delay between connection attempts in milliseconds
pub const CONNECT_RETRY_DELAY_MS: u64 = 1000;

/// How long the scan fallback listens for advertisements
pub const DEFAULT_SCAN_DURATION_SECS: u64 = 10;
