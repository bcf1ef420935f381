use std::time::{SystemTime, UNIX_EPOCH};

use iaq_link::{MessageInfo, RecordSink};

use crate::decode::{decode_record, Observation};
use crate::storage::{NewReading, ReadingsStore};

/// Seconds since the Unix epoch.
pub type Clock = fn() -> i64;

pub fn system_clock() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub stored: u64,
    pub undecodable: u64,
    pub store_failures: u64,
}

/// Record sink that decodes every accepted record and writes it to the
/// reading store. Records that fail to decode are kept as faults together
/// with their raw text.
pub struct StoringSink {
    store: ReadingsStore,
    clock: Clock,
    stats: SinkStats,
}

impl StoringSink {
    pub fn new(store: ReadingsStore) -> Self {
        Self::with_clock(store, system_clock)
    }

    pub fn with_clock(store: ReadingsStore, clock: Clock) -> Self {
        Self { store, clock, stats: SinkStats::default() }
    }

    pub fn store(&self) -> &ReadingsStore {
        &self.store
    }

    pub fn stats(&self) -> SinkStats {
        self.stats
    }

    pub fn into_store(self) -> ReadingsStore {
        self.store
    }
}

impl RecordSink for StoringSink {
    fn on_record(&mut self, record: &str, info: &MessageInfo) {
        let observation = match decode_record(record) {
            Ok(observation) => observation,
            Err(err) => {
                log::warn!("collector: undecodable record from {}: {err}", info.peer);
                self.stats.undecodable += 1;
                Observation::Fault { message: format!("undecodable record: {err}") }
            }
        };
        if let Observation::Fault { message } = &observation {
            log::warn!("collector: {} reports {message}", info.peer);
        }

        let peer = info.peer.to_string();
        let reading = NewReading {
            received_at: (self.clock)(),
            peer: &peer,
            observation: &observation,
            raw: record,
        };
        match self.store.insert(&reading) {
            Ok(id) => {
                self.stats.stored += 1;
                log::debug!("collector: stored reading #{id} from {peer}");
            }
            Err(err) => {
                self.stats.store_failures += 1;
                log::error!("collector: failed to store record from {peer}: {err}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv6Addr, SocketAddrV6};

    fn info() -> MessageInfo {
        let ip = Ipv6Addr::new(0xfdde, 0xad00, 0xbeef, 0, 0x200, 0, 0, 0x10);
        MessageInfo { peer: SocketAddrV6::new(ip, 5683, 0, 0) }
    }

    fn sink() -> StoringSink {
        StoringSink::with_clock(ReadingsStore::in_memory().expect("store"), || 1_700_000_000)
    }

    #[test]
    fn stores_decoded_records() {
        let mut sink = sink();
        sink.on_record(r#"{"eco2":612,"tvoc":31}"#, &info());

        let stored = sink.store().recent(1).expect("recent");
        assert_eq!(stored[0].observation, Observation::Voc { eco2: 612.0, tvoc: 31.0 });
        assert_eq!(stored[0].received_at, 1_700_000_000);
        assert_eq!(stored[0].peer, "[fdde:ad00:beef:0:200::10]:5683");
        assert_eq!(sink.stats(), SinkStats { stored: 1, undecodable: 0, store_failures: 0 });
    }

    #[test]
    fn undecodable_records_are_kept_as_faults() {
        let mut sink = sink();
        sink.on_record("{}", &info());

        let stored = sink.store().recent(1).expect("recent");
        assert!(stored[0].observation.is_fault());
        assert_eq!(stored[0].raw, "{}");
        assert_eq!(sink.stats().undecodable, 1);
        assert_eq!(sink.stats().stored, 1);
    }
}
