//! Genial T31 bridge library
//! Keeps a Genial T31 BLE thermometer connected and publishes its temperature and
//! battery readings.

// Module declarations
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod state;
pub mod utils;

pub use config::AppConfig;
pub use core::bluetooth::{BluetoothManager, DeviceIdentity, MacAddress};
pub use core::{DeviceSnapshot, Reading, Sensor, SensorKind, Session, Supervisor};
pub use error::BridgeError;
pub use state::BridgeHandle;
