use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::bluetooth::{
    CONNECT_RETRY_DELAY_MS, DATA_TIMEOUT_SECS, DEFAULT_SCAN_DURATION_SECS, MAX_CONNECT_ATTEMPTS,
    PACKET_DELAY_MS, RECONNECT_INTERVAL_SECS, SETTLE_DELAY_MS, UPDATE_INTERVAL_SECS,
};

/// Timeouts and delays of the connection supervisor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Seconds without a frame before the data counts as stale.
    pub data_timeout_secs: u64,
    /// Minimum seconds between two reconnect attempts.
    pub reconnect_interval_secs: u64,
    /// Seconds between two supervisor ticks.
    pub update_interval_secs: u64,
    /// Pause between subscribing and the first handshake packet.
    pub settle_delay_ms: u64,
    /// Pause after every handshake packet.
    pub packet_delay_ms: u64,
    /// Connection attempts inside a single connect.
    pub connect_attempts: u32,
    /// Pause between those attempts.
    pub connect_retry_delay_ms: u64,
    /// How long the scan fallback listens before giving up.
    pub scan_timeout_secs: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        TimingConfig {
            data_timeout_secs: DATA_TIMEOUT_SECS,
            reconnect_interval_secs: RECONNECT_INTERVAL_SECS,
            update_interval_secs: UPDATE_INTERVAL_SECS,
            settle_delay_ms: SETTLE_DELAY_MS,
            packet_delay_ms: PACKET_DELAY_MS,
            connect_attempts: MAX_CONNECT_ATTEMPTS,
            connect_retry_delay_ms: CONNECT_RETRY_DELAY_MS,
            scan_timeout_secs: DEFAULT_SCAN_DURATION_SECS,
        }
    }
}

impl TimingConfig {
    pub fn data_timeout(&self) -> Duration {
        Duration::from_secs(self.data_timeout_secs)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs(self.reconnect_interval_secs)
    }

    /// Never zero, `tokio::time::interval` rejects that.
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs.max(1))
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn packet_delay(&self) -> Duration {
        Duration::from_millis(self.packet_delay_ms)
    }

    pub fn connect_retry_delay(&self) -> Duration {
        Duration::from_millis(self.connect_retry_delay_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_secs(self.scan_timeout_secs)
    }
}
