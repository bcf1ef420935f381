//! Node and collector wired together over the loopback mesh.

use iaq_collector::{ReadingsStore, StoringSink};
use iaq_link::{
    CycleReport, DeliveryClient, LoggingObserver, LoopbackEndpoint, LoopbackMesh, PumpReport,
    RequestHandler, SensorKind, SensorNode,
};
use std::sync::Arc;

use crate::config::{ConfigError, LinkdConfig};
use crate::simulated::SimulatedSensors;

/// Node-side and collector-side results of one sampling round.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoundReport {
    pub cycle: CycleReport,
    pub pump: PumpReport,
}

pub struct Simulation {
    mesh: LoopbackMesh,
    node: SensorNode<SimulatedSensors, LoopbackEndpoint>,
    collector: RequestHandler<LoopbackEndpoint, StoringSink>,
    observer: LoggingObserver,
}

impl Simulation {
    pub fn new(config: &LinkdConfig, store: ReadingsStore) -> Result<Self, ConfigError> {
        Self::with_sink(config, StoringSink::new(store))
    }

    pub fn with_sink(config: &LinkdConfig, sink: StoringSink) -> Result<Self, ConfigError> {
        config.validate()?;
        let mesh = LoopbackMesh::new(config.node.mesh_prefix()?, config.node.message_pool);
        let observer = LoggingObserver::new();
        let client = DeliveryClient::new(mesh.node(), config.delivery.clone())?
            .with_observer(Arc::new(observer.clone()));
        let sensors = SimulatedSensors::new(config.sensors.clone());
        let node = SensorNode::new(sensors, client, &SensorKind::ALL);
        let collector = RequestHandler::new(mesh.collector(), sink, config.handler.clone());
        Ok(Self { mesh, node, collector, observer })
    }

    /// Report sensors that failed their startup probe.
    pub fn start(&mut self) -> RoundReport {
        let cycle = self.node.report_unavailable();
        let pump = self.mesh.pump(&mut self.collector);
        RoundReport { cycle, pump }
    }

    /// One sampling cycle followed by collector processing.
    pub fn round(&mut self) -> RoundReport {
        let cycle = self.node.run_cycle();
        let pump = self.mesh.pump(&mut self.collector);
        log::info!(
            "node: cycle sent {}/{} records, {} handled, {} confirmed, {} timed out",
            cycle.accepted(),
            cycle.deliveries.len(),
            pump.handled.len(),
            pump.confirmed,
            pump.timed_out
        );
        RoundReport { cycle, pump }
    }

    pub fn mesh(&self) -> &LoopbackMesh {
        &self.mesh
    }

    pub fn sink(&self) -> &StoringSink {
        self.collector.sink()
    }

    pub fn observer(&self) -> &LoggingObserver {
        &self.observer
    }

    pub fn into_store(self) -> ReadingsStore {
        let (_, sink) = self.collector.into_parts();
        sink.into_store()
    }
}
