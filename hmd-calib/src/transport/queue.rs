//! Bounded single-producer / single-consumer queue for inbound datagrams.
//!
//! The network reader thread is the producer and the controller tick is the
//! consumer. When the consumer falls behind the queue fills up and the
//! [`OverflowPolicy`] decides which datagram is lost.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// What to discard when a datagram arrives at a full queue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Evict the oldest queued datagram to make room
    #[default]
    DropOldest,
    /// Discard the incoming datagram
    DropNewest,
}

/// Producer end of the inbound queue
#[derive(Debug, Clone)]
pub struct InboundSender {
    tx: Sender<Bytes>,
    // Held so the producer can evict from the front of a full queue
    evict: Receiver<Bytes>,
    policy: OverflowPolicy,
    dropped: Arc<AtomicU64>,
}

/// Consumer end of the inbound queue
#[derive(Debug)]
pub struct InboundReceiver {
    rx: Receiver<Bytes>,
    dropped: Arc<AtomicU64>,
}

/// Create a queue holding at most `capacity` datagrams (minimum 1).
pub fn inbound_queue(capacity: usize, policy: OverflowPolicy) -> (InboundSender, InboundReceiver) {
    let (tx, rx) = bounded(capacity.max(1));
    let dropped = Arc::new(AtomicU64::new(0));
    (
        InboundSender {
            tx,
            evict: rx.clone(),
            policy,
            dropped: dropped.clone(),
        },
        InboundReceiver { rx, dropped },
    )
}

impl InboundSender {
    /// Queue a datagram without blocking.
    ///
    /// Returns false if a datagram was dropped to apply the overflow policy.
    pub fn push(&self, packet: Bytes) -> bool {
        let packet = match self.tx.try_send(packet) {
            Ok(()) => return true,
            Err(TrySendError::Disconnected(_)) => return false,
            Err(TrySendError::Full(packet)) => packet,
        };

        match self.policy {
            OverflowPolicy::DropNewest => {
                self.record_drop("newest");
                false
            }
            OverflowPolicy::DropOldest => {
                if self.evict.try_recv().is_ok() {
                    self.record_drop("oldest");
                }
                match self.tx.try_send(packet) {
                    Ok(()) => false,
                    Err(_) => {
                        self.record_drop("newest");
                        false
                    }
                }
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn record_drop(&self, which: &str) {
        let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
        warn!("Inbound queue full, dropped {which} datagram ({total} dropped so far)");
    }
}

impl InboundReceiver {
    /// Take every queued datagram without blocking, oldest first.
    pub fn drain(&self) -> Vec<Bytes> {
        self.rx.try_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Datagrams lost to overflow since the queue was created
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
