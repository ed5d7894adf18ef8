//! The two sensors derived from a [`DeviceSnapshot`]
//! Describes how the readings should be presented: unit, icon, availability and the extra
//! attributes shown next to the value.

use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::core::bluetooth::{
    DEVICE_MANUFACTURER, DEVICE_MODEL, DEVICE_SW_VERSION, DeviceIdentity,
};
use crate::core::supervisor::DeviceSnapshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorKind {
    Temperature,
    Battery,
}

impl SensorKind {
    pub const ALL: [SensorKind; 2] = [SensorKind::Temperature, SensorKind::Battery];

    pub fn key(&self) -> &'static str {
        match self {
            Self::Temperature => "temperature",
            Self::Battery => "battery",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            Self::Temperature => "°C",
            Self::Battery => "%",
        }
    }

    pub fn icon(&self) -> &'static str {
        match self {
            Self::Temperature => "mdi:thermometer",
            Self::Battery => "mdi:battery",
        }
    }

    /// Device class and state class share the key for both sensors.
    pub fn device_class(&self) -> &'static str {
        self.key()
    }

    pub fn state_class(&self) -> &'static str {
        "measurement"
    }
}

/// Static metadata of the physical device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceInfo {
    pub identifier: String,
    pub name: String,
    pub manufacturer: &'static str,
    pub model: &'static str,
    pub sw_version: &'static str,
}

impl DeviceInfo {
    pub fn new(identity: &DeviceIdentity) -> Self {
        Self {
            identifier: identity.address.to_string(),
            name: identity.name.clone(),
            manufacturer: DEVICE_MANUFACTURER,
            model: DEVICE_MODEL,
            sw_version: DEVICE_SW_VERSION,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sensor {
    pub kind: SensorKind,
    pub unique_id: String,
    pub device: DeviceInfo,
}

impl Sensor {
    pub fn new(kind: SensorKind, identity: &DeviceIdentity) -> Self {
        Self {
            kind,
            unique_id: format!("{}_{}", identity.address, kind.key()),
            device: DeviceInfo::new(identity),
        }
    }

    /// Both sensors of a device.
    pub fn all(identity: &DeviceIdentity) -> Vec<Sensor> {
        SensorKind::ALL
            .iter()
            .map(|kind| Sensor::new(*kind, identity))
            .collect()
    }

    pub fn native_value(&self, snapshot: &DeviceSnapshot) -> Option<f64> {
        match self.kind {
            SensorKind::Temperature => snapshot.temperature,
            SensorKind::Battery => snapshot.battery.map(f64::from),
        }
    }

    /// Temperature needs a value as well; battery only needs the link.
    pub fn available(&self, snapshot: &DeviceSnapshot) -> bool {
        match self.kind {
            SensorKind::Temperature => snapshot.connected && snapshot.temperature.is_some(),
            SensorKind::Battery => snapshot.connected,
        }
    }

    pub fn extra_state_attributes(&self, snapshot: &DeviceSnapshot) -> Map<String, Value> {
        let mut attrs = Map::new();

        if let Some(last) = snapshot.last_update {
            attrs.insert("last_update".to_string(), json!(last.to_rfc3339()));
        }
        if let Some(last) = snapshot.last_data_received {
            attrs.insert("last_data_received".to_string(), json!(last.to_rfc3339()));
        }
        if snapshot.data_timeout_seconds.is_finite() && snapshot.data_timeout_seconds > 0.0 {
            let rounded = (snapshot.data_timeout_seconds * 10.0).round() / 10.0;
            attrs.insert("data_timeout_seconds".to_string(), json!(rounded));
        }
        attrs.insert("connected".to_string(), json!(snapshot.connected));
        attrs.insert("mac_address".to_string(), json!(self.device.identifier));
        attrs
    }

    /// One-line rendering, `unavailable` when the value should not be trusted.
    pub fn render(&self, snapshot: &DeviceSnapshot) -> String {
        match self.native_value(snapshot) {
            Some(value) if self.available(snapshot) => {
                let (key, unit) = (self.kind.key(), self.kind.unit());
                match self.kind {
                    SensorKind::Temperature => format!("{}: {:.2} {}", key, value, unit),
                    SensorKind::Battery => format!("{}: {} {}", key, value, unit),
                }
            }
            _ => format!("{}: unavailable", self.kind.key()),
        }
    }
}
