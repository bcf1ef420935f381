use std::sync::{Arc, Mutex};

use iaq_link::{
    DeliveryClient, DeliveryConfig, DeliveryReport, HandlerConfig, HandlerOutcome,
    LoggingObserver, LoopbackEndpoint, LoopbackMesh, MeshLocalPrefix, MessageInfo, Reading,
    RecordSink, RequestHandler, Sample, SendOutcome, SensorError, SensorKind, SensorNode,
    SensorSource, SensorStatus, SensorValue, TransportError,
};

const PREFIX: MeshLocalPrefix = MeshLocalPrefix([0xfd, 0xde, 0xad, 0x00, 0xbe, 0xef, 0, 0]);

#[derive(Debug, Default)]
struct Stored(Vec<(String, MessageInfo)>);

impl RecordSink for Stored {
    fn on_record(&mut self, record: &str, info: &MessageInfo) {
        self.0.push((record.to_string(), *info));
    }
}

fn collector(mesh: &LoopbackMesh) -> RequestHandler<LoopbackEndpoint, Stored> {
    RequestHandler::new(mesh.collector(), Stored::default(), HandlerConfig::default())
}

struct FixedScd41 {
    fail: bool,
}

impl SensorSource for FixedScd41 {
    fn status(&self, kind: SensorKind) -> SensorStatus {
        match kind {
            SensorKind::Scd41 => SensorStatus::Ready,
            _ => SensorStatus::NotFound,
        }
    }

    fn sample(&mut self, kind: SensorKind) -> Sample {
        if self.fail {
            return Err(SensorError { kind, code: -121 });
        }
        Ok(Reading::scd41(
            SensorValue::integer(450),
            SensorValue::new(21, 300_000),
            SensorValue::new(55, 700_000),
        ))
    }
}

#[test]
fn climate_reading_is_stored_acknowledged_and_confirmed() {
    let mesh = LoopbackMesh::new(PREFIX, 4);
    let observer = LoggingObserver::new();
    let stats = observer.stats();
    let client = DeliveryClient::new(mesh.node(), DeliveryConfig::default())
        .expect("config")
        .with_observer(Arc::new(observer));
    let mut node = SensorNode::new(FixedScd41 { fail: false }, client, &[SensorKind::Scd41]);
    let mut handler = collector(&mesh);

    let cycle = node.run_cycle();
    assert_eq!(cycle.deliveries.len(), 1);
    assert_eq!(cycle.deliveries[0].result, Ok(SendOutcome::Accepted { attempts: 1 }));
    assert_eq!(mesh.stats().submitted, 1);

    let pumped = mesh.pump(&mut handler);
    assert_eq!(pumped.handled, vec![HandlerOutcome::Acknowledged]);

    let stored = &handler.sink().0;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].0, r#"{"co2":450,"temp":"21.3","humi":"55.7"}"#);
    assert_eq!(stored[0].1.peer.ip().segments()[..4], [0xfdde, 0xad00, 0xbeef, 0]);

    assert_eq!(stats.confirmed(), 1);
    assert_eq!(stats.unconfirmed(), 0);
    assert_eq!(mesh.messages_in_use(), (0, 0));
}

#[test]
fn missing_sensors_report_before_sampling() {
    let mesh = LoopbackMesh::new(PREFIX, 4);
    let client = DeliveryClient::new(mesh.node(), DeliveryConfig::default()).expect("config");
    let mut node = SensorNode::new(FixedScd41 { fail: true }, client, &SensorKind::ALL);
    let mut handler = collector(&mesh);

    let startup = node.report_unavailable();
    assert_eq!(startup.accepted(), 2);
    node.run_cycle();
    mesh.pump(&mut handler);

    let records: Vec<&str> = handler.sink().0.iter().map(|(text, _)| text.as_str()).collect();
    assert_eq!(
        records,
        [
            r#"{"error":"CCS811 not found"}"#,
            r#"{"error":"SPS30 not found"}"#,
            r#"{"error":"SCD41 read failed: -121"}"#,
        ]
    );
    for record in records {
        serde_json::from_str::<serde_json::Value>(record).expect("valid json");
    }
}

#[test]
fn lost_confirmation_is_reported_once_and_not_resent() {
    let mesh = LoopbackMesh::new(PREFIX, 4);
    let reports = Arc::new(Mutex::new(Vec::<DeliveryReport>::new()));
    let seen = Arc::clone(&reports);
    let mut client = DeliveryClient::new(mesh.node(), DeliveryConfig::default())
        .expect("config")
        .with_observer(Arc::new(move |report: &DeliveryReport| {
            seen.lock().expect("lock").push(*report);
        }));
    let mut handler = collector(&mesh);

    mesh.lose_next_requests(1);
    assert!(client.send_payload(b"{}").expect("send").is_accepted());
    mesh.pump(&mut handler);
    mesh.pump(&mut handler);

    let reports = reports.lock().expect("lock");
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].result, Err(TransportError::ResponseTimeout));
    assert_eq!(mesh.stats().submitted, 1);
    assert!(handler.sink().0.is_empty());
}

#[test]
fn busy_mesh_exhausts_retry_budget() {
    let mesh = LoopbackMesh::new(PREFIX, 2);
    let mut client = DeliveryClient::new(mesh.node(), DeliveryConfig::default()).expect("config");

    mesh.refuse_next_submissions(usize::MAX);
    let outcome = client.send_payload(b"{}").expect("send");
    assert_eq!(outcome, SendOutcome::Exhausted { attempts: 5 });
    assert_eq!(mesh.stats().refused, 5);
    assert_eq!(mesh.messages_in_use(), (0, 0));
}

#[test]
fn collector_address_follows_prefix_changes() {
    let mesh = LoopbackMesh::new(PREFIX, 4);
    let mut client = DeliveryClient::new(mesh.node(), DeliveryConfig::default()).expect("config");
    let mut handler = collector(&mesh);

    client.send_payload(b"{}").expect("send");
    let renumbered = MeshLocalPrefix([0xfd, 0x0d, 0x0d, 0x0d, 0, 0, 0, 0x42]);
    mesh.set_mesh_local_prefix(renumbered);
    client.send_payload(b"{}").expect("send");
    let pumped = mesh.pump(&mut handler);

    // the first request was addressed under the old prefix
    assert_eq!(pumped.undeliverable, 1);
    assert_eq!(pumped.handled, vec![HandlerOutcome::Acknowledged]);
    assert_eq!(mesh.collector_addr().ip().segments()[..4], [0xfd0d, 0x0d0d, 0, 0x42]);
}

#[test]
fn non_confirmable_delivery_is_stored_without_ack() {
    let mesh = LoopbackMesh::new(PREFIX, 4);
    let config = DeliveryConfig { confirmable: false, ..DeliveryConfig::default() };
    let mut client = DeliveryClient::new(mesh.node(), config).expect("config");
    let mut handler = collector(&mesh);

    client.send_payload(br#"{"eco2":400,"tvoc":0}"#).expect("send");
    let pumped = mesh.pump(&mut handler);
    assert_eq!(pumped.handled, vec![HandlerOutcome::Stored]);
    assert_eq!(pumped.confirmed, 0);
    assert_eq!(handler.sink().0.len(), 1);
}
