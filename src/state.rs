//! Host-facing handle
//! Runs the supervisor on its own task and lets the host talk to it through commands.

use log::{error, info, warn};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::BleTransport;
use crate::core::supervisor::{DeviceSnapshot, Supervisor, SupervisorCommand};

const COMMAND_QUEUE_SIZE: usize = 16;

/// Handle to a running supervisor
pub struct BridgeHandle {
    commands: mpsc::Sender<SupervisorCommand>,
    snapshots: watch::Receiver<DeviceSnapshot>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl BridgeHandle {
    /// Starts the supervisor loop. Its first tick runs right away.
    pub fn spawn<T>(supervisor: Supervisor<T>) -> Self
    where
        T: BleTransport + 'static,
    {
        let (commands, commands_rx) = mpsc::channel(COMMAND_QUEUE_SIZE);
        let snapshots = supervisor.subscribe();
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervisor.run(commands_rx, cancel.clone()));

        info!("Bridge started");
        Self {
            commands,
            snapshots,
            cancel,
            task: Some(task),
        }
    }

    /// Connects unless already connected. False if the attempt failed or the loop is gone.
    pub async fn connect(&self) -> bool {
        self.request(SupervisorCommand::Connect).await.unwrap_or(false)
    }

    pub async fn disconnect(&self) {
        self.request(SupervisorCommand::Disconnect).await;
    }

    /// Runs a supervisor tick now and returns what it published.
    pub async fn refresh(&self) -> Option<DeviceSnapshot> {
        self.request(SupervisorCommand::Refresh).await
    }

    /// The latest published snapshot
    pub fn snapshot(&self) -> DeviceSnapshot {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviceSnapshot> {
        self.snapshots.clone()
    }

    /// Stops the loop and waits until the link is released.
    pub async fn shutdown(mut self) {
        info!("Shutting down bridge");
        self.cancel.cancel();

        if let Some(task) = self.task.take() {
            match task.await {
                Ok(()) => info!("Supervisor task finished."),
                Err(e) if e.is_cancelled() => info!("Supervisor task was cancelled."),
                Err(e) => error!("Supervisor task finished with an unexpected join error: {:?}", e),
            }
        }
    }

    async fn request<R>(
        &self,
        make_command: impl FnOnce(oneshot::Sender<R>) -> SupervisorCommand,
    ) -> Option<R> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.commands.send(make_command(reply_tx)).await.is_err() {
            warn!("Supervisor is not running, command dropped");
            return None;
        }
        reply_rx.await.ok()
    }
}

impl Drop for BridgeHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
