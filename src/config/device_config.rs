use serde::{Deserialize, Serialize};

use crate::core::bluetooth::{DEFAULT_DEVICE_NAME, DeviceIdentity, MacAddress};
use crate::error::BridgeError;

/// Which thermometer to talk to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// MAC address as typed by the user; separators are optional.
    pub mac_address: String,
    /// Name shown next to the readings
    pub name: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        DeviceConfig {
            mac_address: String::new(),
            name: DEFAULT_DEVICE_NAME.to_string(),
        }
    }
}

impl DeviceConfig {
    /// Parses the configured MAC address into its canonical form.
    pub fn validate(&self) -> Result<MacAddress, BridgeError> {
        self.mac_address.parse()
    }

    /// Builds the identity of the device. Fails if the MAC address is invalid.
    pub fn identity(&self) -> Result<DeviceIdentity, BridgeError> {
        let address = self.validate()?;
        let name = match self.name.trim() {
            "" => DEFAULT_DEVICE_NAME,
            name => name,
        };
        Ok(DeviceIdentity::new(address, name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_normalizes_address() {
        let config = DeviceConfig {
            mac_address: " a4-c1-38-0b-5e-7f ".to_string(),
            name: "Kids room".to_string(),
        };
        let identity = config.identity().unwrap();
        assert_eq!(identity.address.to_string(), "A4:C1:38:0B:5E:7F");
        assert_eq!(identity.name, "Kids room");
    }

    #[test]
    fn test_blank_name_falls_back_to_default() {
        let config = DeviceConfig {
            mac_address: "A4C1380B5E7F".to_string(),
            name: "  ".to_string(),
        };
        assert_eq!(config.identity().unwrap().name, DEFAULT_DEVICE_NAME);
    }

    #[test]
    fn test_validate_rejects_malformed_address() {
        let config = DeviceConfig {
            mac_address: "A4:C1:38:0B:5E".to_string(),
            ..DeviceConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DeviceConfig {
            mac_address: "A4_C1_38_0B_5E_7F".to_string(),
            ..DeviceConfig::default()
        };
        assert_eq!(
            config.validate(),
            Err(BridgeError::InvalidMacAddress("A4_C1_38_0B_5E_7F".to_string()))
        );

        let config = DeviceConfig {
            mac_address: "a4c1.380b.5e7f".to_string(),
            ..DeviceConfig::default()
        };
        assert_eq!(
            config.validate().unwrap(),
            MacAddress::new([0xA4, 0xC1, 0x38, 0x0B, 0x5E, 0x7F])
        );
    }

    #[test]
    fn test_missing_address_is_rejected() {
        let err = DeviceConfig::default().identity().unwrap_err();
        assert_eq!(err, BridgeError::InvalidMacAddress(String::new()));
    }
}
