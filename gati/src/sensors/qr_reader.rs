//! Line-oriented serial QR/barcode scanner adapter
//!
//! The scanner emits one payload per line (`\n`, optional `\r`). Partial
//! lines wait in the ring for more bytes; garbled or overlong lines are
//! dropped without raising.

use super::{AdapterCore, AdapterState, HealthReport, RingBuffer, Sensor};
use crate::config::QrReaderConfig;
use crate::core::types::{SampleValue, SensorSample, SensorSource};
use crate::error::{Result, SensorError};
use crate::transport::Transport;

const RING_CAPACITY: usize = 512;
const READ_CHUNK: usize = 64;
/// Reads per poll; bounds time spent draining a chatty scanner
const MAX_READS_PER_POLL: usize = 8;

pub struct QrReader {
    transport: Box<dyn Transport>,
    core: AdapterCore,
    ring: RingBuffer<RING_CAPACITY>,
    max_frame: usize,
}

impl QrReader {
    pub fn new(transport: Box<dyn Transport>, config: &QrReaderConfig) -> Self {
        Self {
            transport,
            core: AdapterCore::new(SensorSource::QrReader),
            ring: RingBuffer::new(),
            // Room for the longest payload plus `\r\n`
            max_frame: config.max_frame.clamp(1, RING_CAPACITY - 2),
        }
    }

    /// Most recent complete, well-formed payload since the last call
    pub fn read_payload(&mut self) -> Option<String> {
        match self.sample() {
            Ok(SensorSample {
                value: SampleValue::Text(payload),
                ..
            }) => Some(payload),
            _ => None,
        }
    }

    fn fill(&mut self) -> std::result::Result<(), SensorError> {
        let mut chunk = [0u8; READ_CHUNK];
        for _ in 0..MAX_READS_PER_POLL {
            let n = self
                .transport
                .read(&mut chunk)
                .map_err(|e| SensorError::Read(e.to_string()))?;
            if n == 0 {
                break;
            }
            if self.ring.extend(&chunk[..n]) > 0 {
                log::debug!("QR reader ring full, bytes dropped");
            }
        }
        Ok(())
    }

    fn next_line(&mut self) -> Option<String> {
        let mut latest = None;
        loop {
            let Some(idx) = self.ring.find(b'\n') else {
                // No terminator and no room left for one: the line is overlong
                if self.ring.is_full() || self.ring.len() > self.max_frame + 1 {
                    log::debug!("QR reader discarding {} unterminated bytes", self.ring.len());
                    self.ring.clear();
                }
                break;
            };
            let max_frame = self.max_frame;
            let line = self.ring.copy_out(0, idx).and_then(|mut bytes| {
                if bytes.last() == Some(&b'\r') {
                    bytes.pop();
                }
                (bytes.len() <= max_frame).then_some(bytes)
            });
            self.ring.advance(idx + 1);
            if let Some(payload) = line.and_then(clean_line) {
                latest = Some(payload);
            }
        }
        latest
    }
}

/// Accept printable UTF-8 only
fn clean_line(bytes: Vec<u8>) -> Option<String> {
    let text = String::from_utf8(bytes).ok()?;
    let text = text.trim();
    if text.is_empty() || text.chars().any(char::is_control) {
        return None;
    }
    Some(text.to_string())
}

impl Sensor for QrReader {
    fn source(&self) -> SensorSource {
        SensorSource::QrReader
    }

    fn open(&mut self) -> Result<()> {
        let transport = &mut self.transport;
        self.core.open_with(|| transport.connect())
    }

    fn sample(&mut self) -> std::result::Result<SensorSample, SensorError> {
        self.core.ensure_ready()?;
        let filled = self.fill();
        self.core.record(filled)?;
        self.next_line()
            .map(|p| SensorSample::new(SensorSource::QrReader, SampleValue::Text(p)))
            .ok_or(SensorError::NoData)
    }

    fn release(&mut self) {
        if self.core.release() {
            self.transport.disconnect();
            self.ring.clear();
        }
    }

    fn state(&self) -> AdapterState {
        self.core.state()
    }

    fn health(&self) -> HealthReport {
        self.core.report()
    }
}
