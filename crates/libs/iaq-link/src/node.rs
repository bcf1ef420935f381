//! Sensor node sampling cycle.

use crate::client::{DeliveryClient, SendOutcome};
use crate::error::DeliveryError;
use crate::record::{encode_sample, encode_unavailable, Encoded, Record};
use crate::sensor::{SensorKind, SensorSource, SensorStatus};
use crate::transport::Transport;

/// One record handed to the delivery client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub kind: SensorKind,
    pub encoded: Encoded,
    pub result: Result<SendOutcome, DeliveryError>,
}

impl Delivery {
    pub fn is_accepted(&self) -> bool {
        matches!(self.result, Ok(outcome) if outcome.is_accepted())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub deliveries: Vec<Delivery>,
}

impl CycleReport {
    pub fn accepted(&self) -> usize {
        self.deliveries.iter().filter(|delivery| delivery.is_accepted()).count()
    }

    pub fn failed(&self) -> usize {
        self.deliveries.len() - self.accepted()
    }
}

/// Samples the fitted sensors and forwards each record to the collector.
///
/// All records pass through one scratch [`Record`]; the client copies the
/// bytes out before the next sensor overwrites it.
pub struct SensorNode<S, T> {
    source: S,
    client: DeliveryClient<T>,
    scratch: Record,
    ready: Vec<SensorKind>,
    unavailable: Vec<(SensorKind, SensorStatus)>,
}

impl<S: SensorSource, T: Transport> SensorNode<S, T> {
    /// Probe each fitted sensor once. Kinds that are not ready are reported
    /// by [`SensorNode::report_unavailable`] and skipped by every cycle.
    pub fn new(source: S, client: DeliveryClient<T>, fitted: &[SensorKind]) -> Self {
        let mut ready = Vec::new();
        let mut unavailable = Vec::new();
        for &kind in fitted {
            match source.status(kind) {
                SensorStatus::Ready => ready.push(kind),
                status => {
                    log::warn!("node: {kind} unavailable ({status:?})");
                    unavailable.push((kind, status));
                }
            }
        }
        Self { source, client, scratch: Record::new(), ready, unavailable }
    }

    pub fn ready_sensors(&self) -> &[SensorKind] {
        &self.ready
    }

    pub fn unavailable_sensors(&self) -> &[(SensorKind, SensorStatus)] {
        &self.unavailable
    }

    pub fn client(&self) -> &DeliveryClient<T> {
        &self.client
    }

    pub fn client_mut(&mut self) -> &mut DeliveryClient<T> {
        &mut self.client
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    /// Send an error record for every sensor that failed its startup probe.
    pub fn report_unavailable(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        for index in 0..self.unavailable.len() {
            let (kind, status) = self.unavailable[index];
            let encoded = encode_unavailable(&mut self.scratch, kind, status);
            report.deliveries.push(self.deliver(kind, encoded));
        }
        report
    }

    /// Sample every ready sensor once and deliver the resulting records.
    pub fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        for index in 0..self.ready.len() {
            let kind = self.ready[index];
            let sample = self.source.sample(kind);
            let encoded = encode_sample(&mut self.scratch, &sample);
            report.deliveries.push(self.deliver(kind, encoded));
        }
        let failed = report.failed();
        if failed > 0 {
            log::warn!("node: {failed} of {} records not handed over", report.deliveries.len());
        }
        report
    }

    fn deliver(&mut self, kind: SensorKind, encoded: Encoded) -> Delivery {
        log::debug!("node: {kind} -> {}", self.scratch.as_str());
        let result = self.client.send(&self.scratch);
        if let Err(err) = &result {
            log::error!("node: {kind} record dropped: {err}");
        }
        Delivery { kind, encoded, result }
    }
}
