//! In-memory transport for tests and the simulated platform

use super::Transport;
use crate::error::{Error, Result};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Cloneable mock; clones share the same buffers so a test can keep a
/// handle while the adapter owns another.
#[derive(Clone, Default)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
}

#[derive(Default)]
struct MockTransportInner {
    read_buffer: VecDeque<u8>,
    fail_connect: bool,
    connected: bool,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport whose `connect()` always fails
    pub fn failing() -> Self {
        let t = Self::new();
        t.inner.lock().fail_connect = true;
        t
    }

    /// Inject data to be read
    pub fn inject_read(&self, data: &[u8]) {
        self.inner.lock().read_buffer.extend(data);
    }

    pub fn is_connected(&self) -> bool {
        self.inner.lock().connected
    }
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.fail_connect {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "mock device absent",
            )));
        }
        inner.connected = true;
        Ok(())
    }

    fn read(&mut self, buffer: &mut [u8]) -> Result<usize> {
        let mut inner = self.inner.lock();
        let n = inner.read_buffer.len().min(buffer.len());
        for (slot, byte) in buffer.iter_mut().zip(inner.read_buffer.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn disconnect(&mut self) {
        self.inner.lock().connected = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_injected_bytes_are_read_in_order() {
        let handle = MockTransport::new();
        let mut t = handle.clone();
        handle.inject_read(b"abcdef");
        let mut buf = [0u8; 4];
        assert_eq!(t.read(&mut buf).unwrap(), 4);
        assert_eq!(&buf, b"abcd");
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"ef");
    }

    #[test]
    fn test_failing_connect() {
        let mut t = MockTransport::failing();
        assert!(t.connect().is_err());
        assert!(!t.is_connected());
    }

    #[test]
    fn test_read_after_drain_returns_zero() {
        let handle = MockTransport::new();
        let mut t = handle.clone();
        handle.inject_read(b"ok");
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).unwrap(), 2);
        assert_eq!(t.read(&mut buf).unwrap(), 0);
    }
}
