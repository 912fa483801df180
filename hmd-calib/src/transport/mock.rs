//! In-memory transport that records every packet it is asked to send.

use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use tracing::trace;

use super::{Transport, TransportError};

/// Shared view of the packets a [`RecordingTransport`] has sent.
#[derive(Debug, Clone, Default)]
pub struct SentPackets(Arc<Mutex<Vec<Bytes>>>);

impl SentPackets {
    /// Copy of every packet sent so far, in order
    pub fn packets(&self) -> Vec<Bytes> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove and return every packet sent so far
    pub fn take(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.0.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

/// Transport that keeps sent packets in memory.
///
/// Used for dry runs and tests. Can be switched into a failing mode to
/// exercise send error paths.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    sent: SentPackets,
    fail_sends: bool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle for inspecting sent packets after the transport is moved away
    pub fn sent(&self) -> SentPackets {
        self.sent.clone()
    }

    /// Make every following send fail with [`TransportError::Timeout`]
    pub fn set_fail_sends(&mut self, fail: bool) {
        self.fail_sends = fail;
    }
}

impl Transport for RecordingTransport {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends {
            return Err(TransportError::Timeout);
        }
        trace!("Recording {} byte packet", packet.len());
        self.sent
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Bytes::copy_from_slice(packet));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_in_order() {
        let mut transport = RecordingTransport::new();
        let sent = transport.sent();

        transport.send(&[90, 1]).unwrap();
        transport.send(&[90, 0]).unwrap();

        assert_eq!(sent.len(), 2);
        assert_eq!(sent.packets()[0].as_ref(), &[90, 1]);
        assert_eq!(sent.take().len(), 2);
        assert!(sent.is_empty());
    }

    #[test]
    fn test_failing_sends_record_nothing() {
        let mut transport = RecordingTransport::new();
        transport.set_fail_sends(true);
        assert!(matches!(
            transport.send(&[90, 0]),
            Err(TransportError::Timeout)
        ));
        assert!(transport.sent().is_empty());
    }
}
