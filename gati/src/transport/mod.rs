//! Byte transport for serial peripherals (the external QR scanner).

use crate::error::Result;

mod mock;
mod serial;

pub use mock::MockTransport;
pub use serial::SerialTransport;

/// Transport trait for device communication
pub trait Transport: Send {
    /// Open the underlying device. Called once by the owning adapter.
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    /// Read data into buffer, returns number of bytes read (0 on timeout)
    fn read(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Release the device. Must be safe to call more than once.
    fn disconnect(&mut self) {}
}
