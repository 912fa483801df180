//! UDP transport to the engine relay.

use std::io::ErrorKind;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use super::queue::InboundSender;
use super::{Transport, TransportError};
use crate::config::ConnectionConfig;

/// How often the reader thread wakes up to check for shutdown
const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Largest datagram the reader accepts
const MAX_DATAGRAM_SIZE: usize = 65_507;

/// UDP socket bound locally, sending to a fixed remote.
///
/// A background thread receives datagrams from any peer and pushes them into
/// the inbound queue. Dropping the transport stops and joins that thread.
pub struct UdpTransport {
    socket: UdpSocket,
    remote: SocketAddr,
    shutdown: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

fn resolve(addr: &str) -> Result<SocketAddr, TransportError> {
    addr.to_socket_addrs()
        .map_err(|e| TransportError::InvalidAddress(format!("{addr}: {e}")))?
        .next()
        .ok_or_else(|| TransportError::InvalidAddress(addr.to_string()))
}

impl UdpTransport {
    /// Bind the local socket and start the reader thread.
    ///
    /// # Errors
    /// [`TransportError::InvalidAddress`] if either address does not resolve,
    /// [`TransportError::Io`] if the socket cannot be bound or configured.
    pub fn bind(config: &ConnectionConfig, inbound: InboundSender) -> Result<Self, TransportError> {
        let local = resolve(&config.bind_addr)?;
        let remote = resolve(&config.remote_addr)?;

        let socket = UdpSocket::bind(local)?;
        socket.set_write_timeout(Some(config.send_timeout()))?;

        let reader_socket = socket.try_clone()?;
        reader_socket.set_read_timeout(Some(READ_POLL_INTERVAL))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let reader = thread::Builder::new()
            .name("hmd-udp-reader".to_string())
            .spawn(move || reader_loop(reader_socket, inbound, shutdown_clone))?;

        info!("UDP transport bound to {} sending to {remote}", socket.local_addr()?);

        Ok(Self {
            socket,
            remote,
            shutdown,
            reader: Some(reader),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.socket.local_addr()?)
    }

    pub fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, packet: &[u8]) -> Result<(), TransportError> {
        match self.socket.send_to(packet, self.remote) {
            Ok(sent) if sent == packet.len() => {
                trace!("Sent {sent} bytes to {}", self.remote);
                Ok(())
            }
            Ok(sent) => Err(TransportError::Io(std::io::Error::new(
                ErrorKind::WriteZero,
                format!("short send: {sent} of {} bytes", packet.len()),
            ))),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {
                Err(TransportError::Timeout)
            }
            Err(e) => Err(TransportError::Io(e)),
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.reader.take() {
            if handle.join().is_err() {
                warn!("UDP reader thread panicked");
            }
        }
    }
}

fn reader_loop(socket: UdpSocket, inbound: InboundSender, shutdown: Arc<AtomicBool>) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv_from(&mut buf) {
            Ok((len, from)) => {
                trace!("Received {len} bytes from {from}");
                inbound.push(Bytes::copy_from_slice(&buf[..len]));
            }
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            // ICMP port unreachable from an earlier send surfaces here on some platforms
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                debug!("Relay unreachable: {e}");
            }
            Err(e) => {
                warn!("UDP receive failed: {e}");
                thread::sleep(READ_POLL_INTERVAL);
            }
        }
    }
    debug!("UDP reader thread exiting");
}
