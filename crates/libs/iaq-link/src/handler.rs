//! Collector-side validation and acknowledgement of inbound records.

use serde::{Deserialize, Serialize};

use crate::client::STOREDATA_PATH;
use crate::error::TransportError;
use crate::message::{Code, Message, MessageType};
use crate::record::RECORD_CAPACITY;
use crate::transport::{MessageInfo, Rejected, Transport};

/// Payload buffer size. Accepted payloads are strictly shorter.
pub const PAYLOAD_CAPACITY: usize = RECORD_CAPACITY;

/// What the handler needs from an inbound request.
pub trait InboundRequest {
    fn message_type(&self) -> MessageType;
    fn code(&self) -> Code;
    fn message_id(&self) -> u16;
    fn token(&self) -> &[u8];
    /// Copy up to `buf.len()` payload bytes into `buf` and report the
    /// payload's full length.
    fn read_payload(&self, buf: &mut [u8]) -> Result<usize, TransportError>;
}

impl InboundRequest for Message {
    fn message_type(&self) -> MessageType {
        Message::message_type(self)
    }

    fn code(&self) -> Code {
        Message::code(self)
    }

    fn message_id(&self) -> u16 {
        Message::message_id(self)
    }

    fn token(&self) -> &[u8] {
        Message::token(self)
    }

    fn read_payload(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let payload = self.payload();
        let copied = payload.len().min(buf.len());
        buf[..copied].copy_from_slice(&payload[..copied]);
        Ok(payload.len())
    }
}

/// Receives every validated record.
pub trait RecordSink {
    fn on_record(&mut self, record: &str, info: &MessageInfo);
}

impl<F> RecordSink for F
where
    F: FnMut(&str, &MessageInfo),
{
    fn on_record(&mut self, record: &str, info: &MessageInfo) {
        self(record, info)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlerConfig {
    pub resource_path: String,
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self { resource_path: STOREDATA_PATH.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    UnsupportedType(MessageType),
    UnsupportedMethod(Code),
    PayloadUnreadable(TransportError),
    PayloadTooLong(usize),
    /// Payload is not UTF-8; records are JSON text.
    PayloadNotText,
}

/// Terminal state of one request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    Rejected(RejectReason),
    /// Valid non-confirmable request; no acknowledgement owed.
    Stored,
    Acknowledged,
    AckFailed(TransportError),
}

/// Stateless per-request handler for the record resource.
pub struct RequestHandler<T, S> {
    transport: T,
    sink: S,
    config: HandlerConfig,
}

impl<T: Transport, S: RecordSink> RequestHandler<T, S> {
    pub fn new(transport: T, sink: S, config: HandlerConfig) -> Self {
        Self { transport, sink, config }
    }

    pub fn resource_path(&self) -> &str {
        self.config.resource_path.trim_matches('/')
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_parts(self) -> (T, S) {
        (self.transport, self.sink)
    }

    /// Validate `request`, forward its record, and acknowledge if confirmable.
    pub fn handle<R: InboundRequest + ?Sized>(
        &mut self,
        request: &R,
        info: &MessageInfo,
    ) -> HandlerOutcome {
        let message_type = request.message_type();
        if !matches!(message_type, MessageType::Confirmable | MessageType::NonConfirmable) {
            log::debug!("handler: dropping {:?} message from {}", message_type, info.peer);
            return HandlerOutcome::Rejected(RejectReason::UnsupportedType(message_type));
        }

        let code = request.code();
        if code != Code::PUT {
            log::debug!("handler: dropping method {} from {}", code, info.peer);
            return HandlerOutcome::Rejected(RejectReason::UnsupportedMethod(code));
        }

        let mut buf = [0u8; PAYLOAD_CAPACITY];
        let len = match request.read_payload(&mut buf[..PAYLOAD_CAPACITY - 1]) {
            Ok(len) if len < PAYLOAD_CAPACITY => len,
            Ok(len) => {
                log::warn!("handler: received message too long ({len} bytes) from {}", info.peer);
                return HandlerOutcome::Rejected(RejectReason::PayloadTooLong(len));
            }
            Err(err) => {
                log::warn!("handler: unreadable payload from {}: {err}", info.peer);
                return HandlerOutcome::Rejected(RejectReason::PayloadUnreadable(err));
            }
        };

        let Ok(text) = core::str::from_utf8(&buf[..len]) else {
            log::warn!("handler: non-UTF-8 payload ({len} bytes) from {}", info.peer);
            return HandlerOutcome::Rejected(RejectReason::PayloadNotText);
        };
        log::info!("handler: record from {}: {}", info.peer, text);
        self.sink.on_record(text, info);

        if message_type == MessageType::NonConfirmable {
            return HandlerOutcome::Stored;
        }
        match self.send_ack(request, info) {
            Ok(()) => HandlerOutcome::Acknowledged,
            Err(err) => HandlerOutcome::AckFailed(err),
        }
    }

    fn send_ack<R: InboundRequest + ?Sized>(
        &mut self,
        request: &R,
        info: &MessageInfo,
    ) -> Result<(), TransportError> {
        let mut response = self.transport.allocate_message().map_err(|err| {
            log::error!("handler: failed to allocate message for response: {err}");
            err
        })?;

        response.init(MessageType::Acknowledgement, Code::CHANGED);
        response.set_message_id(request.message_id());
        if let Err(err) = response.set_token(request.token()) {
            self.transport.free_message(response);
            log::error!("handler: failed to build response: {err}");
            return Err(err);
        }

        match self.transport.send_response(response, info) {
            Ok(()) => Ok(()),
            Err(Rejected { error, message }) => {
                log::error!("handler: failed to send store data response: {error}");
                self.transport.free_message(message);
                Err(error)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::address::MeshLocalPrefix;
    use crate::transport::DeliveryObserver;
    use std::net::{Ipv6Addr, SocketAddrV6};
    use std::sync::Arc;

    /// Inbound request double that reports whatever length it is told to.
    struct FakeRequest {
        message_type: MessageType,
        code: Code,
        payload: Vec<u8>,
        reported_len: Option<Result<usize, TransportError>>,
    }

    impl FakeRequest {
        fn put(message_type: MessageType, payload: &[u8]) -> Self {
            Self { message_type, code: Code::PUT, payload: payload.to_vec(), reported_len: None }
        }
    }

    impl InboundRequest for FakeRequest {
        fn message_type(&self) -> MessageType {
            self.message_type
        }

        fn code(&self) -> Code {
            self.code
        }

        fn message_id(&self) -> u16 {
            0x0A0B
        }

        fn token(&self) -> &[u8] {
            &[0x5A]
        }

        fn read_payload(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
            let copied = self.payload.len().min(buf.len());
            buf[..copied].copy_from_slice(&self.payload[..copied]);
            self.reported_len.unwrap_or(Ok(self.payload.len()))
        }
    }

    #[derive(Default)]
    struct AckRecorder {
        pool_exhausted: bool,
        refuse_send: bool,
        responses: Vec<Message>,
        allocated: usize,
        freed: usize,
    }

    impl Transport for AckRecorder {
        fn allocate_message(&mut self) -> Result<Message, TransportError> {
            if self.pool_exhausted {
                return Err(TransportError::NoBufs);
            }
            self.allocated += 1;
            Ok(Message::with_capacity(64))
        }

        fn free_message(&mut self, _message: Message) {
            self.freed += 1;
        }

        fn mesh_local_prefix(&self) -> MeshLocalPrefix {
            MeshLocalPrefix([0xfd, 0, 0, 0, 0, 0, 0, 0])
        }

        fn send_request(
            &mut self,
            message: Message,
            _peer: SocketAddrV6,
            _observer: Arc<dyn DeliveryObserver>,
        ) -> Result<(), Rejected> {
            Err(Rejected::new(TransportError::InvalidState, message))
        }

        fn send_response(
            &mut self,
            message: Message,
            _request: &MessageInfo,
        ) -> Result<(), Rejected> {
            if self.refuse_send {
                return Err(Rejected::new(TransportError::Busy, message));
            }
            self.responses.push(message);
            Ok(())
        }
    }

    #[derive(Debug, Default, PartialEq)]
    struct Collected(Vec<String>);

    impl RecordSink for Collected {
        fn on_record(&mut self, record: &str, _info: &MessageInfo) {
            self.0.push(record.to_string());
        }
    }

    fn collecting(transport: AckRecorder) -> RequestHandler<AckRecorder, Collected> {
        RequestHandler::new(transport, Collected::default(), HandlerConfig::default())
    }

    fn info() -> MessageInfo {
        MessageInfo { peer: SocketAddrV6::new(Ipv6Addr::LOCALHOST, 5683, 0, 0) }
    }

    #[test]
    fn confirmable_request_is_forwarded_and_acknowledged_once() {
        let mut handler = collecting(AckRecorder::default());
        let request = FakeRequest::put(MessageType::Confirmable, br#"{"eco2":400,"tvoc":3}"#);
        assert_eq!(handler.handle(&request, &info()), HandlerOutcome::Acknowledged);
        assert_eq!(handler.sink().0, vec![r#"{"eco2":400,"tvoc":3}"#.to_string()]);

        let responses = &handler.transport().responses;
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].message_type(), MessageType::Acknowledgement);
        assert_eq!(responses[0].code(), Code::CHANGED);
        assert_eq!(responses[0].message_id(), 0x0A0B);
        assert_eq!(responses[0].token(), &[0x5A]);
        assert!(responses[0].payload().is_empty());
    }

    #[test]
    fn non_confirmable_request_is_forwarded_without_ack() {
        let mut handler = collecting(AckRecorder::default());
        let request = FakeRequest::put(MessageType::NonConfirmable, b"{}");
        assert_eq!(handler.handle(&request, &info()), HandlerOutcome::Stored);
        assert_eq!(handler.sink().0.len(), 1);
        assert!(handler.transport().responses.is_empty());
        assert_eq!(handler.transport().allocated, 0);
    }

    #[test]
    fn unsupported_method_is_dropped_silently() {
        let mut handler = collecting(AckRecorder::default());
        for code in [Code::GET, Code::POST, Code::DELETE] {
            let mut request = FakeRequest::put(MessageType::Confirmable, b"{}");
            request.code = code;
            assert_eq!(
                handler.handle(&request, &info()),
                HandlerOutcome::Rejected(RejectReason::UnsupportedMethod(code))
            );
        }
        assert!(handler.sink().0.is_empty());
        assert!(handler.transport().responses.is_empty());
    }

    #[test]
    fn ack_and_reset_messages_are_not_requests() {
        let mut handler = collecting(AckRecorder::default());
        for message_type in [MessageType::Acknowledgement, MessageType::Reset] {
            let request = FakeRequest::put(message_type, b"{}");
            assert_eq!(
                handler.handle(&request, &info()),
                HandlerOutcome::Rejected(RejectReason::UnsupportedType(message_type))
            );
        }
        assert!(handler.sink().0.is_empty());
    }

    #[test]
    fn payload_reported_at_capacity_is_rejected_not_truncated() {
        let mut handler = collecting(AckRecorder::default());
        let mut request = FakeRequest::put(MessageType::Confirmable, &[b'a'; 300]);
        request.reported_len = Some(Ok(PAYLOAD_CAPACITY));
        assert_eq!(
            handler.handle(&request, &info()),
            HandlerOutcome::Rejected(RejectReason::PayloadTooLong(PAYLOAD_CAPACITY))
        );
        assert!(handler.sink().0.is_empty());
        assert!(handler.transport().responses.is_empty());
    }

    #[test]
    fn oversized_message_payload_is_rejected() {
        let mut handler = collecting(AckRecorder::default());
        let mut message = Message::with_capacity(1024);
        message.init(MessageType::Confirmable, Code::PUT);
        message.set_payload_marker().expect("marker");
        message.append_payload(&[b'7'; PAYLOAD_CAPACITY]).expect("payload");
        assert_eq!(
            handler.handle(&message, &info()),
            HandlerOutcome::Rejected(RejectReason::PayloadTooLong(PAYLOAD_CAPACITY))
        );

        let mut largest = Message::with_capacity(1024);
        largest.init(MessageType::NonConfirmable, Code::PUT);
        largest.set_payload_marker().expect("marker");
        largest.append_payload(&[b'7'; PAYLOAD_CAPACITY - 1]).expect("payload");
        assert_eq!(handler.handle(&largest, &info()), HandlerOutcome::Stored);
        assert_eq!(handler.sink().0[0].len(), PAYLOAD_CAPACITY - 1);
    }

    #[test]
    fn non_utf8_payload_is_rejected_without_ack() {
        let mut handler = collecting(AckRecorder::default());
        let request = FakeRequest::put(MessageType::Confirmable, b"{\"error\":\"\xff\xfe\"}");
        assert_eq!(
            handler.handle(&request, &info()),
            HandlerOutcome::Rejected(RejectReason::PayloadNotText)
        );
        assert!(handler.sink().0.is_empty());
        assert_eq!(handler.transport().allocated, 0);
    }

    #[test]
    fn read_errors_reject_the_request() {
        let mut handler = collecting(AckRecorder::default());
        let mut request = FakeRequest::put(MessageType::Confirmable, b"{}");
        request.reported_len = Some(Err(TransportError::Parse));
        assert_eq!(
            handler.handle(&request, &info()),
            HandlerOutcome::Rejected(RejectReason::PayloadUnreadable(TransportError::Parse))
        );
        assert!(handler.sink().0.is_empty());
    }

    #[test]
    fn ack_allocation_failure_is_reported_not_retried() {
        let mut handler = collecting(AckRecorder { pool_exhausted: true, ..Default::default() });
        let request = FakeRequest::put(MessageType::Confirmable, b"{}");
        assert_eq!(
            handler.handle(&request, &info()),
            HandlerOutcome::AckFailed(TransportError::NoBufs)
        );
        assert_eq!(handler.sink().0.len(), 1);
    }

    #[test]
    fn refused_ack_frees_response() {
        let mut handler = collecting(AckRecorder { refuse_send: true, ..Default::default() });
        let request = FakeRequest::put(MessageType::Confirmable, b"{}");
        let outcome = handler.handle(&request, &info());
        assert_eq!(outcome, HandlerOutcome::AckFailed(TransportError::Busy));
        assert_eq!(handler.transport().allocated, 1);
        assert_eq!(handler.transport().freed, 1);
    }

    #[test]
    fn closure_sinks_receive_records() {
        let mut seen = 0usize;
        {
            let sink = |record: &str, _info: &MessageInfo| {
                assert_eq!(record, r#"{"co2":1}"#);
                seen += 1;
            };
            let mut handler =
                RequestHandler::new(AckRecorder::default(), sink, HandlerConfig::default());
            let request = FakeRequest::put(MessageType::NonConfirmable, br#"{"co2":1}"#);
            assert_eq!(handler.handle(&request, &info()), HandlerOutcome::Stored);
        }
        assert_eq!(seen, 1);
    }
}
