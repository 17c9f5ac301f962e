//! Device implementations

pub mod sim;

use crate::config::GatiConfig;
use crate::context::HardwareContext;
use crate::transport::SerialTransport;

/// Build the hardware context for this configuration.
///
/// The legged platform, camera and analog probes are simulated; a configured
/// `sensors.qr_reader.port` attaches the real serial scanner.
pub fn create_context(config: &GatiConfig) -> (HardwareContext, sim::SimHandles) {
    let (context, handles) = sim::build_context(config);
    let context = match &config.sensors.qr_reader.port {
        Some(port) => {
            log::info!("QR scanner on {} @ {} baud", port, config.sensors.qr_reader.baud);
            context.with_qr_transport(Box::new(SerialTransport::new(
                port.clone(),
                config.sensors.qr_reader.baud,
            )))
        }
        None => context,
    };
    (context, handles)
}
