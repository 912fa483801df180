//! Datagram transport between the headset and the engine relay.
//!
//! Sending goes through the [`Transport`] trait. Receiving is decoupled from
//! the transport: implementations push raw datagrams into an
//! [`InboundSender`], and the controller drains the matching
//! [`InboundReceiver`] on its own thread.

pub mod mock;
pub mod queue;
pub mod udp;

pub use mock::{RecordingTransport, SentPackets};
pub use queue::{inbound_queue, InboundReceiver, InboundSender, OverflowPolicy};
pub use udp::UdpTransport;

use thiserror::Error;

/// Errors from the transport layer
#[derive(Error, Debug)]
pub enum TransportError {
    /// Low-level socket failure
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The send did not complete within the configured write timeout
    #[error("Timeout sending datagram")]
    Timeout,

    /// An address from configuration could not be resolved
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
}

/// Outbound half of a datagram link.
pub trait Transport {
    /// Send one complete datagram.
    ///
    /// Must not block longer than the transport's configured timeout.
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError>;
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        (**self).send(packet)
    }
}
