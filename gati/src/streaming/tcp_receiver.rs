//! TCP command listener
//!
//! Each frame is one [`CommandRecord`]; each is answered with one [`Ack`]
//! frame. One client at a time, so two operators cannot issue conflicting
//! commands. The connected client's address is registered for the status
//! feed when no fixed status target is configured.
//!
//! ```text
//! 1. Client connects to the command port
//! 2. Listener spawns a connection thread, registers the client
//! 3. Frames are validated through the CommandHandle and acked
//! 4. On disconnect the registration is cleared
//! ```

use super::messages::Ack;
use super::udp_publisher::ClientRegistry;
use super::wire::{FrameReader, write_frame};
use crate::error::{Error, Result};
use crate::orchestrator::{CommandHandle, CommandRecord};
use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

/// Lets the connection thread notice shutdown
const READ_TIMEOUT: Duration = Duration::from_millis(500);
const ACCEPT_POLL: Duration = Duration::from_millis(50);

pub struct CommandListener {
    listener: TcpListener,
    handle: CommandHandle,
    running: Arc<AtomicBool>,
    clients: ClientRegistry,
    status_port: u16,
    max_frame: usize,
}

impl CommandListener {
    pub fn bind(
        addr: &str,
        handle: CommandHandle,
        running: Arc<AtomicBool>,
        clients: ClientRegistry,
        status_port: u16,
        max_frame: usize,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        listener.set_nonblocking(true)?;
        Ok(Self {
            listener,
            handle,
            running,
            clients,
            status_port,
            max_frame,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept loop; returns once `running` is cleared
    pub fn run(self) -> Result<()> {
        log::info!("Command listener on {}", self.local_addr()?);
        let busy = Arc::new(AtomicBool::new(false));

        while self.running.load(Ordering::Relaxed) {
            let (stream, addr) = match self.listener.accept() {
                Ok(conn) => conn,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
                Err(e) => {
                    log::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL);
                    continue;
                }
            };

            if busy.swap(true, Ordering::AcqRel) {
                log::warn!("Rejecting command client {}: another client is connected", addr);
                let _ = stream.shutdown(Shutdown::Both);
                continue;
            }

            let status_addr = SocketAddr::new(addr.ip(), self.status_port);
            *self.clients.lock() = Some(status_addr);
            log::info!("Command client connected: {} (status -> {})", addr, status_addr);

            let mut session = Session {
                handle: self.handle.clone(),
                running: Arc::clone(&self.running),
                reader: FrameReader::new(self.max_frame),
            };
            let clients = Arc::clone(&self.clients);
            let busy_flag = Arc::clone(&busy);
            let spawned = thread::Builder::new()
                .name("cmd-conn".to_string())
                .spawn(move || {
                    if let Err(e) = session.serve(stream) {
                        log::warn!("Command connection {} ended: {}", addr, e);
                    }
                    *clients.lock() = None;
                    busy_flag.store(false, Ordering::Release);
                });
            if let Err(e) = spawned {
                log::error!("Failed to spawn connection thread: {}", e);
                *self.clients.lock() = None;
                busy.store(false, Ordering::Release);
            }
        }

        log::info!("Command listener stopped");
        Ok(())
    }
}

struct Session {
    handle: CommandHandle,
    running: Arc<AtomicBool>,
    reader: FrameReader,
}

impl Session {
    fn serve(&mut self, mut stream: TcpStream) -> Result<()> {
        stream.set_nonblocking(false)?;
        if let Err(e) = stream.set_read_timeout(Some(READ_TIMEOUT)) {
            log::warn!("Failed to set read timeout: {}", e);
        }

        let result = loop {
            if !self.running.load(Ordering::Relaxed) {
                break Ok(());
            }
            match self.reader.read_frame(&mut stream) {
                Ok(Some(payload)) => {
                    let ack = self.handle_frame(&payload);
                    if let Err(e) = write_frame(&mut stream, &ack) {
                        break Err(e);
                    }
                }
                Ok(None) => {}
                Err(Error::Io(e))
                    if matches!(
                        e.kind(),
                        ErrorKind::UnexpectedEof | ErrorKind::ConnectionReset
                    ) =>
                {
                    log::info!("Command client disconnected");
                    break Ok(());
                }
                Err(e) => break Err(e),
            }
        };

        let _ = stream.shutdown(Shutdown::Both);
        result
    }

    fn handle_frame(&self, payload: &[u8]) -> Ack {
        let record: CommandRecord = match serde_json::from_slice(payload) {
            Ok(record) => record,
            Err(e) => {
                let reason = format!("malformed command: {}", e);
                self.handle.report_rejection("unknown", &reason);
                return Ack::rejected(reason);
            }
        };
        log::debug!("Command received: {:?}", record);
        match self.handle.submit(&record) {
            Ok(()) => Ack::accepted(),
            Err(e) => Ack::rejected(e.to_string()),
        }
    }
}
