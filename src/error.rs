//! Error types for the bridge
//! Transport plumbing returns `anyhow::Result`; these are the domain failures that get
//! wrapped into it.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level failures raised by the bluetooth layer and the configuration.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum BridgeError {
    #[error("invalid MAC address: {0:?}")]
    InvalidMacAddress(String),

    #[error("no Bluetooth adapter found")]
    NoAdapter,

    #[error("device {0} not found")]
    DeviceNotFound(String),

    #[error("GATT service not found: {0}")]
    ServiceNotFound(Uuid),

    #[error("GATT characteristic not found: {0}")]
    CharacteristicNotFound(Uuid),

    #[error("link to {0} is not connected")]
    NotConnected(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::InvalidMacAddress("zz:00".to_string());
        assert_eq!(err.to_string(), "invalid MAC address: \"zz:00\"");

        let err = BridgeError::DeviceNotFound("A4:C1:38:00:11:22".to_string());
        assert_eq!(err.to_string(), "device A4:C1:38:00:11:22 not found");

        let err = BridgeError::CharacteristicNotFound(Uuid::from_u128(
            0x0000fff1_0000_1000_8000_00805f9b34fb,
        ));
        assert_eq!(
            err.to_string(),
            "GATT characteristic not found: 0000fff1-0000-1000-8000-00805f9b34fb"
        );
    }
}
