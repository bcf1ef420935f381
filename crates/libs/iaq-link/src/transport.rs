//! Boundary to the mesh messaging stack.

use std::net::SocketAddrV6;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::address::MeshLocalPrefix;
use crate::error::TransportError;
use crate::message::Message;

/// Metadata the transport attaches to an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageInfo {
    pub peer: SocketAddrV6,
}

/// Outcome of one confirmable exchange, delivered to the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    pub peer: SocketAddrV6,
    pub message_id: u16,
    pub result: Result<(), TransportError>,
}

/// A message the transport refused to take, handed back to the caller.
#[derive(Debug, thiserror::Error)]
#[error("transport refused message: {error}")]
pub struct Rejected {
    pub error: TransportError,
    pub message: Message,
}

impl Rejected {
    pub fn new(error: TransportError, message: Message) -> Self {
        Self { error, message }
    }
}

/// Sink for asynchronous delivery confirmations.
///
/// Invoked from the transport's own processing, never from inside
/// [`Transport::send_request`]. Implementations must not block.
pub trait DeliveryObserver: Send + Sync {
    fn on_delivery(&self, report: &DeliveryReport);
}

impl<F> DeliveryObserver for F
where
    F: Fn(&DeliveryReport) + Send + Sync,
{
    fn on_delivery(&self, report: &DeliveryReport) {
        self(report)
    }
}

/// Message allocation and exchange primitives of the messaging stack.
///
/// Messages come from a bounded pool. Every allocated message is either
/// handed over by a successful send or returned with
/// [`Transport::free_message`].
pub trait Transport {
    fn allocate_message(&mut self) -> Result<Message, TransportError>;

    fn free_message(&mut self, message: Message);

    fn mesh_local_prefix(&self) -> MeshLocalPrefix;

    /// Submit a request. For confirmable messages `observer` is told the
    /// outcome once the exchange completes or times out.
    fn send_request(
        &mut self,
        message: Message,
        peer: SocketAddrV6,
        observer: Arc<dyn DeliveryObserver>,
    ) -> Result<(), Rejected>;

    fn send_response(&mut self, message: Message, request: &MessageInfo) -> Result<(), Rejected>;
}

/// Confirmation counters, incremented once per completed exchange.
#[derive(Debug, Default)]
pub struct DeliveryStats {
    confirmed: AtomicU64,
    unconfirmed: AtomicU64,
}

impl DeliveryStats {
    pub fn confirmed(&self) -> u64 {
        self.confirmed.load(Ordering::Relaxed)
    }

    pub fn unconfirmed(&self) -> u64 {
        self.unconfirmed.load(Ordering::Relaxed)
    }
}

/// Default observer: log the outcome and count it.
#[derive(Debug, Default, Clone)]
pub struct LoggingObserver {
    stats: Arc<DeliveryStats>,
}

impl LoggingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> Arc<DeliveryStats> {
        Arc::clone(&self.stats)
    }
}

impl DeliveryObserver for LoggingObserver {
    fn on_delivery(&self, report: &DeliveryReport) {
        match report.result {
            Ok(()) => {
                self.stats.confirmed.fetch_add(1, Ordering::Relaxed);
                log::info!("delivery: confirmed by {} (mid={})", report.peer, report.message_id);
            }
            Err(err) => {
                self.stats.unconfirmed.fetch_add(1, Ordering::Relaxed);
                log::warn!(
                    "delivery: not confirmed by {} (mid={}): {}",
                    report.peer,
                    report.message_id,
                    err
                );
            }
        }
    }
}
