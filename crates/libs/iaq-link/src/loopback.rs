//! In-process mesh joining one sensor node to the collector.
//!
//! Requests and acknowledgements travel as encoded CoAP datagrams through
//! shared queues. Nothing moves until [`LoopbackMesh::pump`] runs, so
//! completion callbacks always fire outside the sender's call stack.

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddrV6;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::address::{
    collector_endpoint, InterfaceId, MeshLocalPrefix, COAP_DEFAULT_PORT, COLLECTOR_IID,
};
use crate::error::TransportError;
use crate::handler::{HandlerOutcome, RecordSink, RequestHandler};
use crate::message::{Message, MessageType};
use crate::transport::{DeliveryObserver, DeliveryReport, MessageInfo, Rejected, Transport};

/// Interface identifier the simulated sensor node uses.
pub const NODE_IID: InterfaceId = InterfaceId([0x02, 0, 0, 0, 0, 0, 0, 0x10]);

/// Encoded-size limit for every message the mesh hands out.
pub const DEFAULT_MESSAGE_CAPACITY: usize = 320;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Role {
    Node,
    Collector,
}

#[derive(Debug)]
struct Pool {
    size: usize,
    in_use: usize,
}

impl Pool {
    fn take(&mut self) -> Result<(), TransportError> {
        if self.in_use >= self.size {
            return Err(TransportError::NoBufs);
        }
        self.in_use += 1;
        Ok(())
    }

    fn give_back(&mut self) {
        self.in_use = self.in_use.saturating_sub(1);
    }
}

struct Datagram {
    from: SocketAddrV6,
    to: SocketAddrV6,
    bytes: Vec<u8>,
}

struct Pending {
    peer: SocketAddrV6,
    observer: Arc<dyn DeliveryObserver>,
}

/// Counters describing traffic across the mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopbackStats {
    pub submitted: usize,
    pub refused: usize,
    pub lost: usize,
    pub delivered: usize,
    pub acknowledged: usize,
    pub timed_out: usize,
}

struct MeshState {
    prefix: MeshLocalPrefix,
    message_capacity: usize,
    node_pool: Pool,
    collector_pool: Pool,
    next_message_id: u16,
    refuse_submissions: usize,
    lose_requests: usize,
    requests: VecDeque<Datagram>,
    responses: VecDeque<Datagram>,
    pending: HashMap<u16, Pending>,
    stats: LoopbackStats,
}

impl MeshState {
    fn node_addr(&self) -> SocketAddrV6 {
        collector_endpoint(&self.prefix, &NODE_IID, COAP_DEFAULT_PORT)
    }

    fn collector_addr(&self) -> SocketAddrV6 {
        collector_endpoint(&self.prefix, &COLLECTOR_IID, COAP_DEFAULT_PORT)
    }

    fn pool(&mut self, role: Role) -> &mut Pool {
        match role {
            Role::Node => &mut self.node_pool,
            Role::Collector => &mut self.collector_pool,
        }
    }
}

/// Summary of one [`LoopbackMesh::pump`] pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PumpReport {
    pub handled: Vec<HandlerOutcome>,
    pub undeliverable: usize,
    pub confirmed: usize,
    pub timed_out: usize,
}

/// Shared medium. Clone handles freely; all clones see the same mesh.
#[derive(Clone)]
pub struct LoopbackMesh {
    state: Arc<Mutex<MeshState>>,
}

impl LoopbackMesh {
    /// A mesh where each side may hold `pool_size` messages at once.
    pub fn new(prefix: MeshLocalPrefix, pool_size: usize) -> Self {
        Self::with_capacity(prefix, pool_size, DEFAULT_MESSAGE_CAPACITY)
    }

    pub fn with_capacity(
        prefix: MeshLocalPrefix,
        pool_size: usize,
        message_capacity: usize,
    ) -> Self {
        let state = MeshState {
            prefix,
            message_capacity,
            node_pool: Pool { size: pool_size, in_use: 0 },
            collector_pool: Pool { size: pool_size, in_use: 0 },
            next_message_id: 1,
            refuse_submissions: 0,
            lose_requests: 0,
            requests: VecDeque::new(),
            responses: VecDeque::new(),
            pending: HashMap::new(),
            stats: LoopbackStats::default(),
        };
        Self { state: Arc::new(Mutex::new(state)) }
    }

    fn lock(&self) -> MutexGuard<'_, MeshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Transport for the sensor node side.
    pub fn node(&self) -> LoopbackEndpoint {
        LoopbackEndpoint { mesh: self.clone(), role: Role::Node }
    }

    /// Transport for the collector side.
    pub fn collector(&self) -> LoopbackEndpoint {
        LoopbackEndpoint { mesh: self.clone(), role: Role::Collector }
    }

    /// Refuse the next `count` request submissions with `Busy`.
    pub fn refuse_next_submissions(&self, count: usize) {
        self.lock().refuse_submissions = count;
    }

    /// Accept but silently drop the next `count` requests.
    pub fn lose_next_requests(&self, count: usize) {
        self.lock().lose_requests = count;
    }

    /// Simulate the mesh re-forming under a new prefix.
    pub fn set_mesh_local_prefix(&self, prefix: MeshLocalPrefix) {
        log::info!("loopback: mesh-local prefix now {prefix}");
        self.lock().prefix = prefix;
    }

    pub fn collector_addr(&self) -> SocketAddrV6 {
        self.lock().collector_addr()
    }

    pub fn stats(&self) -> LoopbackStats {
        self.lock().stats
    }

    /// Messages currently held by the node and collector.
    pub fn messages_in_use(&self) -> (usize, usize) {
        let state = self.lock();
        (state.node_pool.in_use, state.collector_pool.in_use)
    }

    /// Deliver queued requests to `handler`, then route acknowledgements back
    /// to their observers. Confirmable requests still unanswered afterwards
    /// are reported as timed out.
    pub fn pump<S: RecordSink>(
        &self,
        handler: &mut RequestHandler<LoopbackEndpoint, S>,
    ) -> PumpReport {
        let mut report = PumpReport::default();

        let (requests, collector_addr) = {
            let mut state = self.lock();
            (state.requests.drain(..).collect::<Vec<_>>(), state.collector_addr())
        };
        for datagram in requests {
            if datagram.to != collector_addr {
                log::debug!("loopback: no route to {}", datagram.to);
                report.undeliverable += 1;
                continue;
            }
            let message = match Message::decode(&datagram.bytes) {
                Ok(message) => message,
                Err(err) => {
                    log::warn!("loopback: undecodable datagram from {}: {err}", datagram.from);
                    report.undeliverable += 1;
                    continue;
                }
            };
            if message.uri_path() != handler.resource_path() {
                log::debug!("loopback: no resource {:?}", message.uri_path());
                report.undeliverable += 1;
                continue;
            }
            self.lock().stats.delivered += 1;
            let outcome = handler.handle(&message, &MessageInfo { peer: datagram.from });
            report.handled.push(outcome);
        }

        let responses = self.lock().responses.drain(..).collect::<Vec<_>>();
        for datagram in responses {
            let Ok(message) = Message::decode(&datagram.bytes) else {
                continue;
            };
            let result = match message.message_type() {
                MessageType::Acknowledgement => Ok(()),
                MessageType::Reset => Err(TransportError::Reset),
                _ => continue,
            };
            let pending = {
                let mut state = self.lock();
                let pending = state.pending.remove(&message.message_id());
                if pending.is_some() && result.is_ok() {
                    state.stats.acknowledged += 1;
                }
                pending
            };
            if let Some(pending) = pending {
                pending.observer.on_delivery(&DeliveryReport {
                    peer: pending.peer,
                    message_id: message.message_id(),
                    result,
                });
                if result.is_ok() {
                    report.confirmed += 1;
                }
            }
        }

        let expired = {
            let mut state = self.lock();
            let expired = state.pending.drain().collect::<Vec<_>>();
            state.stats.timed_out += expired.len();
            expired
        };
        for (message_id, pending) in expired {
            report.timed_out += 1;
            pending.observer.on_delivery(&DeliveryReport {
                peer: pending.peer,
                message_id,
                result: Err(TransportError::ResponseTimeout),
            });
        }

        report
    }
}

/// One side's view of the mesh.
#[derive(Clone)]
pub struct LoopbackEndpoint {
    mesh: LoopbackMesh,
    role: Role,
}

impl LoopbackEndpoint {
    pub fn mesh(&self) -> &LoopbackMesh {
        &self.mesh
    }
}

impl Transport for LoopbackEndpoint {
    fn allocate_message(&mut self) -> Result<Message, TransportError> {
        let mut state = self.mesh.lock();
        state.pool(self.role).take()?;
        Ok(Message::with_capacity(state.message_capacity))
    }

    fn free_message(&mut self, message: Message) {
        drop(message);
        self.mesh.lock().pool(self.role).give_back();
    }

    fn mesh_local_prefix(&self) -> MeshLocalPrefix {
        self.mesh.lock().prefix
    }

    fn send_request(
        &mut self,
        mut message: Message,
        peer: SocketAddrV6,
        observer: Arc<dyn DeliveryObserver>,
    ) -> Result<(), Rejected> {
        let mut state = self.mesh.lock();
        if state.refuse_submissions > 0 {
            state.refuse_submissions -= 1;
            state.stats.refused += 1;
            return Err(Rejected::new(TransportError::Busy, message));
        }

        let message_id = state.next_message_id;
        state.next_message_id = state.next_message_id.wrapping_add(1).max(1);
        message.set_message_id(message_id);
        let bytes = message.encode();
        state.pool(self.role).give_back();
        state.stats.submitted += 1;

        if message.message_type() == MessageType::Confirmable {
            state.pending.insert(message_id, Pending { peer, observer });
        }
        if state.lose_requests > 0 {
            state.lose_requests -= 1;
            state.stats.lost += 1;
            log::debug!("loopback: lost request mid={message_id} to {peer}");
            return Ok(());
        }
        let from = match self.role {
            Role::Node => state.node_addr(),
            Role::Collector => state.collector_addr(),
        };
        state.requests.push_back(Datagram { from, to: peer, bytes });
        Ok(())
    }

    fn send_response(&mut self, message: Message, request: &MessageInfo) -> Result<(), Rejected> {
        let mut state = self.mesh.lock();
        let bytes = message.encode();
        state.pool(self.role).give_back();
        let from = state.collector_addr();
        state.responses.push_back(Datagram { from, to: request.peer, bytes });
        Ok(())
    }
}
