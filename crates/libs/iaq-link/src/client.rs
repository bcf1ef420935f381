//! Confirmable delivery of records to the collector.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::address::{collector_endpoint, InterfaceId, COAP_DEFAULT_PORT, COLLECTOR_IID};
use crate::error::{ConfigError, DeliveryError, TransportError};
use crate::message::{Code, ContentFormat, Message, MessageType};
use crate::record::Record;
use crate::transport::{DeliveryObserver, LoggingObserver, Rejected, Transport};

/// Upper bound on submission attempts per record.
pub const MAX_RETRIES: u8 = 5;

/// Resource the collector serves records on.
pub const STOREDATA_PATH: &str = "storedata";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub resource_path: String,
    pub content_format: ContentFormat,
    /// Submission attempts per record, `1..=MAX_RETRIES`.
    pub max_retries: u8,
    pub port: u16,
    pub confirmable: bool,
    pub collector_iid: InterfaceId,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            resource_path: STOREDATA_PATH.to_string(),
            content_format: ContentFormat::JSON,
            max_retries: MAX_RETRIES,
            port: COAP_DEFAULT_PORT,
            confirmable: true,
            collector_iid: COLLECTOR_IID,
        }
    }
}

impl DeliveryConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_retries == 0 || self.max_retries > MAX_RETRIES {
            return Err(ConfigError::RetryCeiling { got: self.max_retries, max: MAX_RETRIES });
        }
        if self.resource_path.trim_matches('/').is_empty() {
            return Err(ConfigError::EmptyResourcePath);
        }
        Ok(())
    }
}

/// Result of handing one record to the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The transport took the request. Confirmation arrives via the observer.
    Accepted { attempts: u8 },
    /// Every attempt was refused at submission.
    Exhausted { attempts: u8 },
}

impl SendOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SendOutcome::Accepted { .. })
    }

    pub fn attempts(&self) -> u8 {
        match self {
            SendOutcome::Accepted { attempts } | SendOutcome::Exhausted { attempts } => *attempts,
        }
    }
}

/// Sender side of the link: builds and submits one request per record.
///
/// Retries cover synchronous submission failures only. Lost or late
/// acknowledgements are reported to the observer and never resent.
pub struct DeliveryClient<T> {
    transport: T,
    config: DeliveryConfig,
    observer: Arc<dyn DeliveryObserver>,
}

impl<T: Transport> DeliveryClient<T> {
    pub fn new(transport: T, config: DeliveryConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { transport, config, observer: Arc::new(LoggingObserver::new()) })
    }

    pub fn with_observer(mut self, observer: Arc<dyn DeliveryObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Deliver one record. The record's bytes are copied into the request
    /// before this returns, so the caller may overwrite it immediately.
    pub fn send<const N: usize>(
        &mut self,
        record: &Record<N>,
    ) -> Result<SendOutcome, DeliveryError> {
        self.send_payload(record.as_bytes())
    }

    pub fn send_payload(&mut self, payload: &[u8]) -> Result<SendOutcome, DeliveryError> {
        let max = self.config.max_retries;
        let mut attempts = 0u8;

        while attempts < max {
            let mut message = self.transport.allocate_message().map_err(|err| {
                log::error!("delivery: failed to allocate message for request: {err}");
                DeliveryError::Allocation(err)
            })?;

            if let Err(err) = self.build_request(&mut message, payload) {
                log::error!("delivery: failed to build request: {err}");
                self.transport.free_message(message);
                return Err(DeliveryError::Build(err));
            }

            let prefix = self.transport.mesh_local_prefix();
            let peer = collector_endpoint(&prefix, &self.config.collector_iid, self.config.port);

            attempts += 1;
            match self.transport.send_request(message, peer, Arc::clone(&self.observer)) {
                Ok(()) => {
                    log::info!("delivery: request sent to {peer} (attempt {attempts}/{max})");
                    return Ok(SendOutcome::Accepted { attempts });
                }
                Err(Rejected { error, message }) => {
                    self.transport.free_message(message);
                    log::info!("delivery: send failed: {error}, retrying ({attempts}/{max})");
                }
            }
        }

        log::warn!("delivery: giving up after {attempts} attempts");
        Ok(SendOutcome::Exhausted { attempts })
    }

    fn build_request(&self, message: &mut Message, payload: &[u8]) -> Result<(), TransportError> {
        let message_type = if self.config.confirmable {
            MessageType::Confirmable
        } else {
            MessageType::NonConfirmable
        };
        message.init(message_type, Code::PUT);
        message.append_uri_path(&self.config.resource_path)?;
        message.append_content_format(self.config.content_format)?;
        message.set_payload_marker()?;
        message.append_payload(payload)
    }
}
