//! Handshake transmission for the Genial T31
//! The device only starts reporting after a fixed sequence of packets is written to its
//! TX characteristic.

use anyhow::Result;
use log::{debug, error, info};
use std::time::Duration;
use tokio::time::sleep;

/// Command sender trait
#[async_trait::async_trait]
pub trait CommandSender: Send + Sync {
    /// Write one packet to the device
    async fn send_packet(&self, packet: &[u8]) -> Result<()>;
}

/// Sends packet sequences through a [`CommandSender`]
pub struct CommandExecutor<'a, T: CommandSender + ?Sized> {
    command_sender: &'a T,
}

impl<'a, T: CommandSender + ?Sized> CommandExecutor<'a, T> {
    /// Create a new CommandExecutor
    pub fn new(command_sender: &'a T) -> Self {
        Self { command_sender }
    }

    /// Sends every packet in order, waiting `delay` after each one.
    /// A failed write is logged and skipped. Returns how many packets went out.
    pub async fn send_handshake(&self, packets: &[&[u8]], delay: Duration) -> usize {
        info!("Sending {} handshake packets", packets.len());
        let mut sent = 0;

        for (i, packet) in packets.iter().enumerate() {
            match self.command_sender.send_packet(packet).await {
                Ok(()) => {
                    debug!("Handshake packet {} sent: {:02X?}", i + 1, packet);
                    sent += 1;
                }
                Err(e) => error!("Failed to send handshake packet {}: {}", i + 1, e),
            }
            sleep(delay).await;
        }

        info!("Handshake finished, {}/{} packets sent", sent, packets.len());
        sent
    }
}
