//! Command and status ports

pub mod messages;
pub mod tcp_receiver;
pub mod udp_publisher;
pub mod wire;

pub use messages::{Ack, StatusMessage};
pub use tcp_receiver::CommandListener;
pub use udp_publisher::{ClientRegistry, StatusPublisher};
pub use wire::{FrameReader, encode_frame, write_frame};
