//! Deterministic stand-in for the node's sensor drivers.

use std::collections::HashMap;

use iaq_link::{
    Reading, Sample, SensorError, SensorKind, SensorSource, SensorStatus, SensorValue,
};

use crate::config::SensorConfig;

/// Driver error code reported for injected failures (`-EIO`).
pub const SIMULATED_READ_ERROR: i32 = -5;

pub struct SimulatedSensors {
    sensors: Vec<SensorConfig>,
    samples: HashMap<SensorKind, u32>,
}

impl SimulatedSensors {
    pub fn new(sensors: Vec<SensorConfig>) -> Self {
        Self { sensors, samples: HashMap::new() }
    }

    fn config(&self, kind: SensorKind) -> Option<&SensorConfig> {
        self.sensors.iter().find(|sensor| sensor.kind == kind)
    }
}

impl SensorSource for SimulatedSensors {
    fn status(&self, kind: SensorKind) -> SensorStatus {
        self.config(kind).map_or(SensorStatus::NotFound, |sensor| sensor.status)
    }

    fn sample(&mut self, kind: SensorKind) -> Sample {
        let fail_every = self.config(kind).and_then(|sensor| sensor.fail_every);
        let count = self.samples.entry(kind).or_insert(0);
        *count += 1;
        let step = *count;
        if fail_every.is_some_and(|every| every > 0 && step % every == 0) {
            return Err(SensorError { kind, code: SIMULATED_READ_ERROR });
        }
        Ok(simulated_reading(kind, f64::from(step)))
    }
}

/// Slowly drifting indoor values, a pure function of the sample index.
fn simulated_reading(kind: SensorKind, t: f64) -> Reading {
    let v = SensorValue::from_f64;
    match kind {
        SensorKind::Scd41 => Reading::scd41(
            SensorValue::integer(450 + (60.0 * (t / 10.0).sin()) as i32),
            v(21.0 + 1.5 * (t / 7.0).sin()),
            v(50.0 + 6.0 * (t / 9.0).cos()),
        ),
        SensorKind::Ccs811 => Reading::ccs811(
            SensorValue::integer(400 + (t as i32 * 13) % 120),
            SensorValue::integer(5 + (t as i32 * 7) % 40),
        ),
        SensorKind::Sps30 => {
            let pm2_5 = 4.0 + 2.5 * (t / 5.0).sin();
            Reading::sps30(v(pm2_5), v(pm2_5 * 1.6 + 3.0), v(0.55 + 0.05 * (t / 3.0).cos()))
        }
    }
}
