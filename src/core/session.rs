//! Connection session for one Genial T31
//! Owns the link to the device, runs the connect and handshake sequence, and keeps the
//! latest decoded readings together with the liveness timestamps.
//!
//! Frames and link loss reach the session as [`LinkEvent`]s over a channel. Whoever owns
//! the session drains that channel and calls [`Session::handle_event`], so all mutation
//! happens from one place.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::Duration;

use anyhow::{Result, anyhow};
use chrono::{DateTime, Local};
use log::{debug, error, info, warn};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep};

use crate::config::TimingConfig;
use crate::core::bluetooth::{
    BleLink, BleTransport, CommandExecutor, ConnectionStatus, DeviceIdentity, LinkEvent,
    LinkEvents,
};
use crate::core::codec::{self, Reading};
use crate::error::BridgeError;

/// Called after every handled frame
pub type DataCallback = Box<dyn Fn() + Send + Sync>;

pub struct Session<T: BleTransport> {
    transport: T,
    identity: DeviceIdentity,
    timing: TimingConfig,
    events_tx: mpsc::UnboundedSender<LinkEvent>,
    link: Option<T::Link>,
    /// Generation of the current (or last) link; events tagged otherwise are stale.
    generation: u64,
    status: ConnectionStatus,
    notification_enabled: bool,
    temperature: Option<f64>,
    battery: Option<u8>,
    connected_at: Option<Instant>,
    last_notification: Option<Instant>,
    last_data_received: Option<DateTime<Local>>,
    last_update: Option<DateTime<Local>>,
    data_callback: Option<DataCallback>,
}

impl<T: BleTransport> Session<T> {
    /// Creates a disconnected session. The receiver yields the events of every link
    /// this session opens.
    pub fn new(
        transport: T,
        identity: DeviceIdentity,
        timing: TimingConfig,
    ) -> (Self, mpsc::UnboundedReceiver<LinkEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let session = Self {
            transport,
            identity,
            timing,
            events_tx,
            link: None,
            generation: 0,
            status: ConnectionStatus::Disconnected,
            notification_enabled: false,
            temperature: None,
            battery: None,
            connected_at: None,
            last_notification: None,
            last_data_received: None,
            last_update: None,
            data_callback: None,
        };
        (session, events_rx)
    }

    /// Connects, subscribes and sends the handshake. Never fails loudly: any problem is
    /// logged and reported as `false`, leaving the session disconnected.
    pub async fn connect(&mut self) -> bool {
        info!("Connecting to {} ({})", self.identity.name, self.identity.address);

        if self.link.is_some() {
            self.release_link().await;
        }

        let device = match self.resolve_device().await {
            Ok(device) => device,
            Err(e) => {
                error!("{}, tried direct lookup and scan", e);
                return false;
            }
        };

        self.status = ConnectionStatus::Connecting;
        match self.open_link(&device).await {
            Ok(link) => {
                let now = Instant::now();
                self.link = Some(link);
                self.status = ConnectionStatus::Connected;
                self.connected_at = Some(now);
                // Seeded so a fresh link is not immediately stale.
                self.touch_notification_time(now);
                info!("Connected to {}", self.identity.address);
                true
            }
            Err(e) => {
                error!("Connection to {} failed: {}", self.identity.address, e);
                self.status = ConnectionStatus::Disconnected;
                self.notification_enabled = false;
                false
            }
        }
    }

    /// Tears the link down. Safe to call any number of times; errors are swallowed.
    pub async fn disconnect(&mut self) {
        if self.link.is_some() {
            info!("Disconnecting from {}", self.identity.address);
        }
        self.release_link().await;
    }

    /// Routes an event from the transport to the matching handler.
    pub fn handle_event(&mut self, event: LinkEvent) {
        if event.generation() != self.generation || self.link.is_none() {
            debug!(
                "Ignoring event from released link (generation {}, current {})",
                event.generation(),
                self.generation
            );
            return;
        }

        match event {
            LinkEvent::Notification { data, .. } => self.on_notification(&data),
            LinkEvent::Disconnected { .. } => self.on_disconnect_event(),
        }
    }

    /// Records a frame from the device and updates the matching reading.
    pub fn on_notification(&mut self, raw: &[u8]) {
        let now = Instant::now();
        self.touch_notification_time(now);

        match codec::decode(raw) {
            Some(Reading::Temperature(celsius)) => {
                debug!("Temperature: {:.2} °C", celsius);
                self.temperature = Some(celsius);
            }
            Some(Reading::Battery(percent)) => {
                debug!("Battery: {}%", percent);
                self.battery = Some(percent);
            }
            None => debug!("Ignoring frame of {} bytes: {:02X?}", raw.len(), raw),
        }
        self.last_update = Some(Local::now());

        if let Some(callback) = &self.data_callback {
            if catch_unwind(AssertUnwindSafe(|| callback())).is_err() {
                error!("Data callback panicked while handling a frame");
            }
        }
    }

    /// The link dropped on its own. Reconnecting is left to the supervisor.
    pub fn on_disconnect_event(&mut self) {
        warn!("{} disconnected", self.identity.address);
        self.status = ConnectionStatus::Disconnected;
        self.notification_enabled = false;
    }

    /// True if no frame was ever received or the last one is older than `timeout`.
    pub fn is_data_stale(&self, now: Instant, timeout: Duration) -> bool {
        match self.last_notification {
            None => true,
            Some(last) => now.saturating_duration_since(last) > timeout,
        }
    }

    /// The link is up and frames keep arriving.
    pub async fn effectively_connected(&self) -> bool {
        self.effectively_connected_at(Instant::now()).await
    }

    pub async fn effectively_connected_at(&self, now: Instant) -> bool {
        let link_up = match &self.link {
            Some(link) => link.is_connected().await,
            None => false,
        };
        link_up && !self.is_data_stale(now, self.timing.data_timeout())
    }

    pub fn set_data_callback(&mut self, callback: DataCallback) {
        self.data_callback = Some(callback);
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn timing(&self) -> &TimingConfig {
        &self.timing
    }

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn temperature(&self) -> Option<f64> {
        self.temperature
    }

    pub fn battery(&self) -> Option<u8> {
        self.battery
    }

    pub fn connected_at(&self) -> Option<Instant> {
        self.connected_at
    }

    pub fn last_notification_time(&self) -> Option<Instant> {
        self.last_notification
    }

    /// Wall-clock time of the last frame (or of the last successful connect).
    pub fn last_data_received(&self) -> Option<DateTime<Local>> {
        self.last_data_received
    }

    /// Wall-clock time of the last handled frame.
    pub fn last_update(&self) -> Option<DateTime<Local>> {
        self.last_update
    }

    /// Seconds since the last frame, infinite if none was ever received.
    pub fn seconds_since_last_notification(&self, now: Instant) -> f64 {
        self.last_notification
            .map(|last| now.saturating_duration_since(last).as_secs_f64())
            .unwrap_or(f64::INFINITY)
    }

    async fn resolve_device(&self) -> Result<T::Device, BridgeError> {
        let address = &self.identity.address;

        match self.transport.device_from_address(address).await {
            Ok(Some(device)) => {
                debug!("Device {} found via direct lookup", address);
                return Ok(device);
            }
            Ok(None) => debug!("Device {} not known yet, checking scan results", address),
            Err(e) => warn!("Direct lookup of {} failed: {}", address, e),
        }

        match self.transport.device_from_scan(address).await {
            Ok(Some(device)) => {
                debug!("Device {} found in scan results", address);
                return Ok(device);
            }
            Ok(None) => {}
            Err(e) => warn!("Scanning for {} failed: {}", address, e),
        }
        Err(BridgeError::DeviceNotFound(address.to_string()))
    }

    async fn open_link(&mut self, device: &T::Device) -> Result<T::Link> {
        self.generation += 1;
        let events = LinkEvents::new(self.generation, self.events_tx.clone());

        let mut link = self
            .transport
            .establish_connection(device, self.timing.connect_attempts, events)
            .await?;

        if let Err(e) = self.prepare_link(&mut link).await {
            // Do not leave a half-open link behind.
            if let Err(close_err) = link.disconnect().await {
                debug!("Closing half-open link failed: {}", close_err);
            }
            return Err(e);
        }
        Ok(link)
    }

    async fn prepare_link(&mut self, link: &mut T::Link) -> Result<()> {
        if !link.is_connected().await {
            return Err(anyhow!(BridgeError::NotConnected(self.identity.address.to_string())));
        }

        link.start_notify().await?;
        self.notification_enabled = true;

        sleep(self.timing.settle_delay()).await;

        if !link.is_connected().await {
            return Err(anyhow!(BridgeError::NotConnected(self.identity.address.to_string())));
        }
        CommandExecutor::new(&*link)
            .send_handshake(codec::handshake_packets(), self.timing.packet_delay())
            .await;
        Ok(())
    }

    async fn release_link(&mut self) {
        if let Some(mut link) = self.link.take() {
            let connected = link.is_connected().await;
            if self.notification_enabled && connected {
                if let Err(e) = link.stop_notify().await {
                    debug!("Stopping notifications failed: {}", e);
                }
            }
            if connected {
                if let Err(e) = link.disconnect().await {
                    debug!("Closing link failed: {}", e);
                }
            }
        }
        self.notification_enabled = false;
        self.status = ConnectionStatus::Disconnected;
    }

    fn touch_notification_time(&mut self, now: Instant) {
        self.last_notification = Some(match self.last_notification {
            Some(last) if last > now => last,
            _ => now,
        });
        self.last_data_received = Some(Local::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::bluetooth::MacAddress;
    use crate::core::bluetooth::mock::MockTransport;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TEMPERATURE_FRAME: [u8; 13] = [
        0xA6, 0x0A, 0x31, 0x08, 0x34, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x6A,
    ];
    const BATTERY_FRAME: [u8; 9] = [0xA6, 0x06, 0x33, 0x00, 0x01, 0x00, 0xE6, 0x00, 0x6A];

    fn identity() -> DeviceIdentity {
        DeviceIdentity::new(MacAddress::new([0xA4, 0xC1, 0x38, 0x0B, 0x5E, 0x7F]), "Nursery")
    }

    fn session(
        transport: &MockTransport,
    ) -> (Session<MockTransport>, mpsc::UnboundedReceiver<LinkEvent>) {
        Session::new(transport.clone(), identity(), TimingConfig::default())
    }

    fn drain(session: &mut Session<MockTransport>, rx: &mut mpsc::UnboundedReceiver<LinkEvent>) {
        while let Ok(event) = rx.try_recv() {
            session.handle_event(event);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_sends_handshake() {
        let transport = MockTransport::with_known_device();
        let (mut session, _rx) = session(&transport);

        assert!(session.connect().await);
        assert_eq!(session.status(), ConnectionStatus::Connected);
        assert!(transport.is_notifying());
        let expected: Vec<Vec<u8>> =
            codec::handshake_packets().iter().map(|p| p.to_vec()).collect();
        assert_eq!(transport.written(), expected);
        assert!(session.effectively_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_falls_back_to_scan() {
        let transport = MockTransport::new();
        transport.set_in_scan(true);
        let (mut session, _rx) = session(&transport);

        assert!(session.connect().await);
        assert_eq!(transport.connect_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_without_device_has_no_side_effects() {
        let transport = MockTransport::new();
        let (mut session, _rx) = session(&transport);

        assert!(!session.connect().await);
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert_eq!(transport.connect_calls(), 0);
        assert!(session.last_notification_time().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_device_reports_not_found() {
        let transport = MockTransport::new();
        let (session, _rx) = session(&transport);

        let err = session.resolve_device().await.unwrap_err();
        assert_eq!(err, BridgeError::DeviceNotFound("A4:C1:38:0B:5E:7F".to_string()));

        transport.set_in_scan(true);
        assert!(session.resolve_device().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_subscription_closes_link() {
        let transport = MockTransport::with_known_device();
        transport.set_fail_notify(true);
        let (mut session, _rx) = session(&transport);

        assert!(!session.connect().await);
        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(!transport.is_link_connected());
        assert!(!session.effectively_connected().await);
        assert!(session.is_data_stale(Instant::now(), session.timing().data_timeout()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_handshake_write_is_skipped() {
        let transport = MockTransport::with_known_device();
        transport.fail_write(2);
        let (mut session, _rx) = session(&transport);

        assert!(session.connect().await);
        assert_eq!(transport.written().len(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_staleness_follows_notifications() {
        let transport = MockTransport::with_known_device();
        let (mut session, mut rx) = session(&transport);
        let timeout = Duration::from_secs(45);

        assert!(session.is_data_stale(Instant::now(), timeout));
        assert_eq!(session.seconds_since_last_notification(Instant::now()), f64::INFINITY);

        assert!(session.connect().await);
        assert!(!session.is_data_stale(Instant::now(), timeout));

        tokio::time::advance(Duration::from_secs(46)).await;
        assert!(session.is_data_stale(Instant::now(), timeout));
        assert!(!session.effectively_connected().await);

        assert!(transport.push_frame(&TEMPERATURE_FRAME));
        drain(&mut session, &mut rx);
        assert!(!session.is_data_stale(Instant::now(), timeout));
        assert!(session.effectively_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_notifications_update_readings() {
        let transport = MockTransport::with_known_device();
        let (mut session, mut rx) = session(&transport);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        session.set_data_callback(Box::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(session.connect().await);

        transport.push_frame(&TEMPERATURE_FRAME);
        transport.push_frame(&BATTERY_FRAME);
        drain(&mut session, &mut rx);

        assert_eq!(session.temperature(), Some(21.0));
        assert_eq!(session.battery(), Some(66));
        assert!(session.last_update().is_some());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_frames_keep_readings() {
        let transport = MockTransport::with_known_device();
        let (mut session, _rx) = session(&transport);
        session.on_notification(&TEMPERATURE_FRAME);

        let mut out_of_range = TEMPERATURE_FRAME;
        out_of_range[3..5].copy_from_slice(&1500u16.to_be_bytes());
        session.on_notification(&out_of_range);
        session.on_notification(&[0xA6, 0x01, 0x02, 0x03, 0x6A]);
        session.on_notification(&[0u8; 20]);

        assert_eq!(session.temperature(), Some(21.0));
        assert_eq!(session.battery(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_callback_is_contained() {
        let transport = MockTransport::with_known_device();
        let (mut session, _rx) = session(&transport);
        fn faulty_consumer() {
            panic!("consumer bug");
        }
        session.set_data_callback(Box::new(faulty_consumer));

        session.on_notification(&BATTERY_FRAME);
        assert_eq!(session.battery(), Some(66));
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_event_marks_disconnected() {
        let transport = MockTransport::with_known_device();
        let (mut session, mut rx) = session(&transport);
        assert!(session.connect().await);

        transport.drop_link();
        drain(&mut session, &mut rx);

        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(!session.effectively_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_events_from_released_link_are_ignored() {
        let transport = MockTransport::with_known_device();
        let (mut session, mut rx) = session(&transport);
        assert!(session.connect().await);
        let stale = LinkEvent::Disconnected {
            generation: session.generation,
        };

        assert!(session.connect().await);
        session.handle_event(stale);
        drain(&mut session, &mut rx);

        assert_eq!(session.status(), ConnectionStatus::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disconnect_is_idempotent() {
        let transport = MockTransport::with_known_device();
        let (mut session, _rx) = session(&transport);

        session.disconnect().await;
        assert_eq!(session.status(), ConnectionStatus::Disconnected);

        assert!(session.connect().await);
        session.disconnect().await;
        session.disconnect().await;

        assert_eq!(session.status(), ConnectionStatus::Disconnected);
        assert!(!transport.is_link_connected());
        assert!(!transport.is_notifying());
        assert_eq!(transport.disconnect_calls(), 1);
    }
}
