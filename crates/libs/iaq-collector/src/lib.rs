//! # iaq-collector
//!
//! Collector side of the IAQ telemetry link. Records accepted by the
//! [`iaq_link::RequestHandler`] are decoded into typed observations,
//! enriched with a humidex comfort index, and stored in SQLite.
//!
//! ```rust
//! use iaq_collector::{decode_record, ComfortLevel, Observation};
//!
//! let observation = decode_record(r#"{"co2":450,"temp":"21.3","humi":"55.7"}"#).unwrap();
//! let Observation::Climate { temperature, humidity, .. } = observation else {
//!     unreachable!()
//! };
//! assert_eq!(iaq_collector::assess(temperature, humidity).level, ComfortLevel::LittleDiscomfort);
//! ```

pub mod comfort;
pub mod decode;
pub mod sink;
pub mod storage;

pub use comfort::{assess, humidex, Comfort, ComfortLevel};
pub use decode::{decode_record, DecodeError, Observation};
pub use sink::{system_clock, SinkStats, StoringSink};
pub use storage::{NewReading, ReadingsStore, StoredReading};
