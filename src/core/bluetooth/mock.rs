//! In-memory transport for tests and dry runs.
//!
//! A [`MockTransport`] is cheap to clone; every clone and every link it opens share the
//! same state, so a test can keep one clone to steer the device while the session owns
//! another.

use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Result, anyhow};

use crate::core::bluetooth::commands::CommandSender;
use crate::core::bluetooth::transport::{BleLink, BleTransport};
use crate::core::bluetooth::types::{LinkEvents, MacAddress};
use crate::error::BridgeError;

#[derive(Debug, Default)]
struct MockState {
    known: bool,
    in_scan: bool,
    fail_connect: bool,
    fail_notify: bool,
    failing_writes: Vec<usize>,
    connected: bool,
    notifying: bool,
    written: Vec<Vec<u8>>,
    connect_calls: usize,
    disconnect_calls: usize,
    events: Option<LinkEvents>,
}

#[derive(Debug, Clone)]
pub struct MockDevice {
    pub address: MacAddress,
}

#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// A transport that cannot see the device yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// A transport that resolves the device through direct lookup.
    pub fn with_known_device() -> Self {
        let transport = Self::new();
        transport.set_known(true);
        transport
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_known(&self, known: bool) {
        self.state().known = known;
    }

    pub fn set_in_scan(&self, in_scan: bool) {
        self.state().in_scan = in_scan;
    }

    pub fn set_fail_connect(&self, fail: bool) {
        self.state().fail_connect = fail;
    }

    pub fn set_fail_notify(&self, fail: bool) {
        self.state().fail_notify = fail;
    }

    /// Makes the `index`-th write (0-based, counted over the transport's lifetime) fail.
    pub fn fail_write(&self, index: usize) {
        self.state().failing_writes.push(index);
    }

    pub fn written(&self) -> Vec<Vec<u8>> {
        self.state().written.clone()
    }

    pub fn connect_calls(&self) -> usize {
        self.state().connect_calls
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state().disconnect_calls
    }

    pub fn is_link_connected(&self) -> bool {
        self.state().connected
    }

    pub fn is_notifying(&self) -> bool {
        self.state().notifying
    }

    /// Delivers a frame as the device would. Returns false if nobody is subscribed.
    pub fn push_frame(&self, data: &[u8]) -> bool {
        let state = self.state();
        match (&state.events, state.notifying) {
            (Some(events), true) => {
                events.notification(data.to_vec());
                true
            }
            _ => false,
        }
    }

    /// Drops the link from the device side.
    pub fn drop_link(&self) {
        let mut state = self.state();
        state.connected = false;
        state.notifying = false;
        if let Some(events) = &state.events {
            events.disconnected();
        }
    }
}

#[async_trait::async_trait]
impl BleTransport for MockTransport {
    type Device = MockDevice;
    type Link = MockLink;

    async fn device_from_address(&self, address: &MacAddress) -> Result<Option<MockDevice>> {
        Ok(self.state().known.then_some(MockDevice { address: *address }))
    }

    async fn device_from_scan(&self, address: &MacAddress) -> Result<Option<MockDevice>> {
        Ok(self.state().in_scan.then_some(MockDevice { address: *address }))
    }

    async fn establish_connection(
        &self,
        device: &MockDevice,
        max_attempts: u32,
        events: LinkEvents,
    ) -> Result<MockLink> {
        let mut state = self.state();
        state.connect_calls += 1;
        if state.fail_connect {
            return Err(anyhow!(
                "Failed to connect to {} after {} attempts",
                device.address,
                max_attempts
            ));
        }

        state.connected = true;
        state.notifying = false;
        state.events = Some(events);
        Ok(MockLink {
            address: device.address,
            state: self.state.clone(),
        })
    }
}

#[derive(Debug)]
pub struct MockLink {
    address: MacAddress,
    state: Arc<Mutex<MockState>>,
}

impl MockLink {
    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl CommandSender for MockLink {
    async fn send_packet(&self, packet: &[u8]) -> Result<()> {
        let mut state = self.state();
        if !state.connected {
            return Err(BridgeError::NotConnected(self.address.to_string()).into());
        }
        let index = state.written.len();
        state.written.push(packet.to_vec());
        if state.failing_writes.contains(&index) {
            return Err(anyhow!("write {} rejected", index));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl BleLink for MockLink {
    async fn is_connected(&self) -> bool {
        self.state().connected
    }

    async fn start_notify(&mut self) -> Result<()> {
        let mut state = self.state();
        if state.fail_notify {
            return Err(anyhow!("notify subscription rejected"));
        }
        state.notifying = true;
        Ok(())
    }

    async fn stop_notify(&mut self) -> Result<()> {
        self.state().notifying = false;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<()> {
        let mut state = self.state();
        state.disconnect_calls += 1;
        state.connected = false;
        state.notifying = false;
        Ok(())
    }
}
