//! # iaq-link
//!
//! Indoor-air-quality telemetry link between a battery sensor node and a
//! collector on the same Thread mesh.
//!
//! The node samples its sensors, renders each sample as a compact JSON
//! record, and PUTs it to the collector's `storedata` resource over CoAP.
//! The collector stores each record it accepts and acknowledges
//! confirmable requests.
//!
//! ## Record format
//!
//! ```text
//! {"co2":450,"temp":"21.3","humi":"55.7"}          SCD41
//! {"eco2":612,"tvoc":31}                           CCS811
//! {"pm25":"3.05","pm10":"12.99","typ":"0.612345"}  SPS30
//! {"error":"SCD41 read failed: -5"}                any failed read
//! ```
//!
//! Records always fit a [`RECORD_CAPACITY`]-byte buffer. The collector is always
//! `<mesh-local prefix>::1` on port 5683.
//!
//! ## Example
//!
//! ```rust
//! use iaq_link::{encode, Reading, SensorValue};
//!
//! let record = encode(&Ok(Reading::scd41(
//!     SensorValue::integer(450),
//!     SensorValue::new(21, 300_000),
//!     SensorValue::new(55, 700_000),
//! )));
//! assert_eq!(record.as_str(), r#"{"co2":450,"temp":"21.3","humi":"55.7"}"#);
//! ```

pub mod address;
pub mod client;
pub mod error;
pub mod handler;
pub mod loopback;
pub mod message;
pub mod node;
pub mod record;
pub mod sensor;
pub mod transport;

pub use address::{
    collector_endpoint, resolve_collector_address, InterfaceId, MeshLocalPrefix,
    COAP_DEFAULT_PORT, COLLECTOR_IID,
};
pub use client::{DeliveryClient, DeliveryConfig, SendOutcome, MAX_RETRIES, STOREDATA_PATH};
pub use error::{ConfigError, DeliveryError, TransportError};
pub use handler::{
    HandlerConfig, HandlerOutcome, InboundRequest, RecordSink, RejectReason, RequestHandler,
};
pub use loopback::{LoopbackEndpoint, LoopbackMesh, PumpReport};
pub use message::{Code, ContentFormat, Message, MessageType, WireError};
pub use node::{CycleReport, Delivery, SensorNode};
pub use record::{encode, encode_sample, Encoded, Record, RECORD_CAPACITY};
pub use sensor::{
    Reading, Sample, SensorError, SensorKind, SensorSource, SensorStatus, SensorValue,
};
pub use transport::{
    DeliveryObserver, DeliveryReport, DeliveryStats, LoggingObserver, MessageInfo, Rejected,
    Transport,
};
