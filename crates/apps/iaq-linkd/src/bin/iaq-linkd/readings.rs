use anyhow::Context;
use iaq_collector::{Observation, ReadingsStore, StoredReading};
use std::path::Path;

pub(super) fn run(db: &Path, limit: usize) -> anyhow::Result<()> {
    let store = ReadingsStore::open(db)
        .with_context(|| format!("opening reading store {}", db.display()))?;
    let readings = store.recent(limit).context("listing readings")?;
    if readings.is_empty() {
        println!("no readings stored in {}", db.display());
        return Ok(());
    }
    for reading in readings.iter().rev() {
        println!("{}", summarize(reading));
    }
    Ok(())
}

fn summarize(reading: &StoredReading) -> String {
    let detail = match &reading.observation {
        Observation::Climate { co2, temperature, humidity } => {
            let comfort = match (reading.humidex, reading.comfort) {
                (Some(humidex), Some(level)) => format!(" humidex={humidex:.1} ({level})"),
                _ => String::new(),
            };
            format!("co2={co2:.0}ppm temp={temperature:.1}C humi={humidity:.1}%{comfort}")
        }
        Observation::Voc { eco2, tvoc } => format!("eco2={eco2:.0}ppm tvoc={tvoc:.0}ppb"),
        Observation::Particulate { pm2_5, pm10, typical_size } => {
            format!("pm2.5={pm2_5:.2} pm10={pm10:.2} typ={typical_size:.3}um")
        }
        Observation::Fault { message } => format!("fault: {message}"),
    };
    format!("#{:<5} {} {:<32} {detail}", reading.id, reading.received_at, reading.peer)
}
