//! Best-effort UDP status feed
//!
//! Drains the control loop's status channel and sends every message as one
//! length-prefixed JSON datagram. Send failures are logged and dropped;
//! nothing here can slow the control loop down.

use super::messages::StatusMessage;
use super::wire::encode_frame;
use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError};
use parking_lot::Mutex;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Address of the connected command client, if any
pub type ClientRegistry = Arc<Mutex<Option<SocketAddr>>>;

const POLL: Duration = Duration::from_millis(100);
/// Log every Nth send failure after the first
const SEND_ERROR_LOG_EVERY: u64 = 50;

pub struct StatusPublisher {
    socket: UdpSocket,
    messages: Receiver<StatusMessage>,
    /// Fixed destination; overrides the client registry
    target: Option<SocketAddr>,
    clients: ClientRegistry,
    running: Arc<AtomicBool>,
    send_errors: u64,
    sent: u64,
}

impl StatusPublisher {
    pub fn new(
        messages: Receiver<StatusMessage>,
        target: Option<SocketAddr>,
        clients: ClientRegistry,
        running: Arc<AtomicBool>,
    ) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        Ok(Self {
            socket,
            messages,
            target,
            clients,
            running,
            send_errors: 0,
            sent: 0,
        })
    }

    /// Resolve a `host:port` status target
    pub fn resolve_target(target: &str) -> Result<SocketAddr> {
        target
            .to_socket_addrs()?
            .next()
            .ok_or_else(|| Error::Config(format!("status target '{}' did not resolve", target)))
    }

    pub fn run(&mut self) -> Result<()> {
        log::info!(
            "Status publisher started (target: {})",
            self.target
                .map(|t| t.to_string())
                .unwrap_or_else(|| "command client".to_string())
        );
        while self.running.load(Ordering::Relaxed) {
            match self.messages.recv_timeout(POLL) {
                Ok(message) => self.publish(&message),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        log::info!("Status publisher stopped ({} datagrams sent)", self.sent);
        Ok(())
    }

    fn publish(&mut self, message: &StatusMessage) {
        let Some(addr) = self.target.or(*self.clients.lock()) else {
            return;
        };
        let frame = match encode_frame(message) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Failed to encode {} message: {}", message.kind(), e);
                return;
            }
        };
        match self.socket.send_to(&frame, addr) {
            Ok(_) => self.sent += 1,
            Err(e) => {
                self.send_errors += 1;
                if self.send_errors == 1 || self.send_errors % SEND_ERROR_LOG_EVERY == 0 {
                    log::warn!(
                        "Status send to {} failed ({} failures): {}",
                        addr,
                        self.send_errors,
                        e
                    );
                }
            }
        }
    }
}
