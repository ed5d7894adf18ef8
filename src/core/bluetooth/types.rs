//! Defines shared data structures for the Bluetooth module.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use log::trace;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::error::BridgeError;

static MAC_IN_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"([0-9A-Fa-f]{2}[:_-]){5}([0-9A-Fa-f]{2})").expect("MAC pattern is valid")
});

/// A 48-bit Bluetooth device address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    pub fn new(octets: [u8; 6]) -> Self {
        Self(octets)
    }

    pub fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Finds the last MAC-looking token inside a platform device id string.
    pub fn find_in(device_id_str: &str) -> Option<Self> {
        MAC_IN_ID
            .find_iter(device_id_str)
            .last()
            .and_then(|m| m.as_str().replace('_', ":").parse().ok())
    }
}

impl FromStr for MacAddress {
    type Err = BridgeError;

    /// Accepts 12 hex digits, optionally separated by `:`, `-` or `.`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();

        if digits.len() != 12 || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(BridgeError::InvalidMacAddress(s.to_string()));
        }

        let mut octets = [0u8; 6];
        for (i, octet) in octets.iter_mut().enumerate() {
            *octet = u8::from_str_radix(&digits[i * 2..i * 2 + 2], 16)
                .map_err(|_| BridgeError::InvalidMacAddress(s.to_string()))?;
        }
        Ok(Self(octets))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl Serialize for MacAddress {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for MacAddress {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// The device a session talks to. Fixed for the lifetime of the session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceIdentity {
    pub address: MacAddress,
    pub name: String,
}

impl DeviceIdentity {
    pub fn new(address: MacAddress, name: impl Into<String>) -> Self {
        Self {
            address,
            name: name.into(),
        }
    }
}

/// Connection status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectionStatus {
    Disconnected,
    /// Only held while `connect()` runs.
    Connecting,
    Connected,
}

/// Something the transport observed on a link.
#[derive(Debug, Clone, PartialEq)]
pub enum LinkEvent {
    /// A frame arrived on the notify characteristic.
    Notification { generation: u64, data: Vec<u8> },
    /// The link dropped without us asking for it.
    Disconnected { generation: u64 },
}

impl LinkEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Notification { generation, .. } | Self::Disconnected { generation } => {
                *generation
            }
        }
    }
}

/// Sending half of the event handoff, tagged with the generation of the link it belongs to.
#[derive(Debug, Clone)]
pub struct LinkEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<LinkEvent>,
}

impl LinkEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<LinkEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn notification(&self, data: Vec<u8>) {
        let event = LinkEvent::Notification {
            generation: self.generation,
            data,
        };
        if self.tx.send(event).is_err() {
            trace!("Event receiver gone, dropping frame");
        }
    }

    pub fn disconnected(&self) {
        let event = LinkEvent::Disconnected {
            generation: self.generation,
        };
        if self.tx.send(event).is_err() {
            trace!("Event receiver gone, dropping disconnect event");
        }
    }
}
