//! Polling supervisor
//! Periodically checks the session, reconnects when the data stream went quiet or the link
//! dropped, and republishes the readings.
//!
//! The supervisor owns the [`Session`] and is the only writer to it. Link events, host
//! commands and ticks are all handled from the single loop in [`Supervisor::run`].

use std::panic::{AssertUnwindSafe, catch_unwind};

use chrono::{DateTime, Local};
use futures_util::FutureExt;
use log::{debug, error, info};
use serde::Serialize;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::config::TimingConfig;
use crate::core::bluetooth::{BleTransport, DeviceIdentity, LinkEvent};
use crate::core::session::Session;

/// What consumers get to see of the device
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceSnapshot {
    /// Temperature in °C
    pub temperature: Option<f64>,
    /// Battery level in percent
    pub battery: Option<u8>,
    /// Link up and frames arriving
    pub connected: bool,
    pub last_data_received: Option<DateTime<Local>>,
    /// When the last frame was handled
    pub last_update: Option<DateTime<Local>>,
    /// Seconds since the last frame; infinite before the first one
    pub data_timeout_seconds: f64,
}

impl Default for DeviceSnapshot {
    fn default() -> Self {
        Self {
            temperature: None,
            battery: None,
            connected: false,
            last_data_received: None,
            last_update: None,
            data_timeout_seconds: f64::INFINITY,
        }
    }
}

/// Called with every published snapshot
pub type SnapshotListener = Box<dyn Fn(&DeviceSnapshot) + Send + Sync>;

/// Requests from the host, answered once handled inside the loop
#[derive(Debug)]
pub enum SupervisorCommand {
    Connect(oneshot::Sender<bool>),
    Disconnect(oneshot::Sender<()>),
    Refresh(oneshot::Sender<DeviceSnapshot>),
}

pub struct Supervisor<T: BleTransport> {
    session: Session<T>,
    events: mpsc::UnboundedReceiver<LinkEvent>,
    last_connection_attempt: Option<Instant>,
    snapshot: DeviceSnapshot,
    publisher: watch::Sender<DeviceSnapshot>,
    listener: Option<SnapshotListener>,
}

impl<T: BleTransport> Supervisor<T> {
    pub fn new(transport: T, identity: DeviceIdentity, timing: TimingConfig) -> Self {
        let (session, events) = Session::new(transport, identity, timing);
        Self::from_session(session, events)
    }

    /// Wraps an existing session together with the receiver of its link events.
    pub fn from_session(session: Session<T>, events: mpsc::UnboundedReceiver<LinkEvent>) -> Self {
        let (publisher, _) = watch::channel(DeviceSnapshot::default());
        Self {
            session,
            events,
            last_connection_attempt: None,
            snapshot: DeviceSnapshot::default(),
            publisher,
            listener: None,
        }
    }

    pub fn set_listener(&mut self, listener: SnapshotListener) {
        self.listener = Some(listener);
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.publisher.subscribe()
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn snapshot(&self) -> &DeviceSnapshot {
        &self.snapshot
    }

    pub fn last_connection_attempt(&self) -> Option<Instant> {
        self.last_connection_attempt
    }

    /// One pass of the health check.
    pub async fn tick(&mut self, now: Instant) -> DeviceSnapshot {
        let data_timeout = self.session.timing().data_timeout();

        if self.session.is_data_stale(now, data_timeout) {
            let waited = self.session.seconds_since_last_notification(now);
            debug!("Data timeout: {:.1} s since last frame", waited);
            self.snapshot.connected = false;
            self.snapshot.data_timeout_seconds = waited;

            if self.reconnect_due(now) {
                info!("Attempting reconnect to {}", self.session.identity().address);
                self.session.disconnect().await;
                self.session.connect().await;
                self.last_connection_attempt = Some(now);
            }

            self.publish();
            return self.snapshot.clone();
        }

        if !self.session.effectively_connected_at(now).await {
            debug!("{} is not connected", self.session.identity().address);
            if self.reconnect_due(now) {
                self.session.connect().await;
                self.last_connection_attempt = Some(now);
            }
        }

        self.publish_current(now).await;
        self.snapshot.clone()
    }

    /// Routes one link event into the session and republishes.
    pub async fn handle_event(&mut self, event: LinkEvent, now: Instant) {
        self.session.handle_event(event);
        self.publish_current(now).await;
    }

    /// Handles every link event already queued. For hosts that call [`Self::tick`] from
    /// their own scheduler instead of using [`Self::run`].
    pub async fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(event) = self.events.try_recv() {
            self.session.handle_event(event);
            handled += 1;
        }
        if handled > 0 {
            self.publish_current(Instant::now()).await;
        }
        handled
    }

    /// Connects on behalf of the host unless the device is already up.
    pub async fn connect(&mut self, now: Instant) -> bool {
        if self.session.effectively_connected_at(now).await {
            return true;
        }

        let connected = self.session.connect().await;
        self.last_connection_attempt = Some(now);
        self.publish_current(now).await;
        connected
    }

    pub async fn disconnect(&mut self, now: Instant) {
        self.session.disconnect().await;
        self.publish_current(now).await;
    }

    /// Runs until `cancel` fires, then releases the link.
    pub async fn run(
        mut self,
        mut commands: mpsc::Receiver<SupervisorCommand>,
        cancel: CancellationToken,
    ) {
        let mut interval = tokio::time::interval(self.session.timing().update_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            "Supervisor for {} started, checking every {:?}",
            self.session.identity().address,
            self.session.timing().update_interval()
        );

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                Some(event) = self.events.recv() => {
                    self.handle_event(event, Instant::now()).await;
                }
                Some(command) = commands.recv() => {
                    self.handle_command(command).await;
                }
                _ = interval.tick() => {
                    self.guarded_tick(Instant::now()).await;
                }
            }
        }

        info!("Supervisor for {} stopping", self.session.identity().address);
        self.session.disconnect().await;
        self.snapshot.connected = false;
        self.publish();
    }

    async fn handle_command(&mut self, command: SupervisorCommand) {
        match command {
            SupervisorCommand::Connect(reply) => {
                let connected = self.connect(Instant::now()).await;
                let _ = reply.send(connected);
            }
            SupervisorCommand::Disconnect(reply) => {
                self.disconnect(Instant::now()).await;
                let _ = reply.send(());
            }
            SupervisorCommand::Refresh(reply) => {
                self.guarded_tick(Instant::now()).await;
                let _ = reply.send(self.snapshot.clone());
            }
        }
    }

    /// A tick that panics must not take the loop down with it.
    async fn guarded_tick(&mut self, now: Instant) {
        if AssertUnwindSafe(self.tick(now)).catch_unwind().await.is_err() {
            error!("Supervisor tick failed, marking device as disconnected");
            self.snapshot.connected = false;
            self.publish();
        }
    }

    fn reconnect_due(&self, now: Instant) -> bool {
        let interval = self.session.timing().reconnect_interval();
        self.last_connection_attempt
            .is_none_or(|last| now.saturating_duration_since(last) > interval)
    }

    async fn publish_current(&mut self, now: Instant) {
        self.snapshot = DeviceSnapshot {
            temperature: self.session.temperature(),
            battery: self.session.battery(),
            connected: self.session.effectively_connected_at(now).await,
            last_data_received: self.session.last_data_received(),
            last_update: self.session.last_update(),
            data_timeout_seconds: self.session.seconds_since_last_notification(now),
        };
        self.publish();
    }

    fn publish(&self) {
        self.publisher.send_replace(self.snapshot.clone());
        if let Some(listener) = &self.listener {
            if catch_unwind(AssertUnwindSafe(|| listener(&self.snapshot))).is_err() {
                error!("Snapshot listener panicked");
            }
        }
    }
}
