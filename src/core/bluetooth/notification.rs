//! Notification handling for the Genial T31
//! This module subscribes to the RX characteristic and forwards every frame into the
//! session's event channel.

use anyhow::{Result, anyhow};
use bluest::Characteristic;
use futures_util::StreamExt;
use log::{debug, error, info};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::core::bluetooth::types::LinkEvents;

/// Owns the task that pumps the notify stream
#[derive(Default)]
pub struct NotificationHandler {
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

impl NotificationHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes and returns once the subscription is confirmed.
    pub async fn start(&mut self, notify_char: Characteristic, events: LinkEvents) -> Result<()> {
        self.stop().await;
        info!("Subscribing to notifications...");

        let cancel = CancellationToken::new();
        let (ready_tx, ready_rx) = oneshot::channel();
        let cancel_for_task = cancel.clone();
        let task = tokio::spawn(async move {
            Self::process_notifications(notify_char, events, cancel_for_task, ready_tx).await;
        });
        self.cancel = Some(cancel);
        self.task = Some(task);

        match ready_rx.await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => {
                self.stop().await;
                Err(e)
            }
            Err(_) => {
                self.stop().await;
                Err(anyhow!("Notification task ended before subscribing"))
            }
        }
    }

    /// Unsubscribes by ending the pump task. Idempotent.
    pub async fn stop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    error!("Notification task finished with an unexpected join error: {:?}", e);
                }
            }
        }
    }

    async fn process_notifications(
        notify_char: Characteristic,
        events: LinkEvents,
        cancel: CancellationToken,
        ready: oneshot::Sender<Result<()>>,
    ) {
        let mut notification_stream = match notify_char.notify().await {
            Ok(stream) => {
                let _ = ready.send(Ok(()));
                stream
            }
            Err(e) => {
                error!("Failed to subscribe to notifications: {}", e);
                let _ = ready.send(Err(e.into()));
                return;
            }
        };
        info!("Listening for notifications on {}...", notify_char.uuid());

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                next = notification_stream.next() => match next {
                    Some(Ok(value)) => {
                        debug!("Received frame: {:02X?}", value);
                        events.notification(value);
                    }
                    Some(Err(e)) => {
                        error!("Error in notification stream: {}", e);
                        break;
                    }
                    None => break,
                },
            }
        }

        info!("Notification stream ended");
    }
}

impl Drop for NotificationHandler {
    fn drop(&mut self) {
        if let Some(cancel) = &self.cancel {
            cancel.cancel();
        }
    }
}
