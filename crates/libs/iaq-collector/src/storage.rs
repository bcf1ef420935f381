use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};

use crate::comfort::{assess, ComfortLevel};
use crate::decode::{DecodeError, Observation};

/// A received record as persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredReading {
    pub id: i64,
    pub received_at: i64,
    pub peer: String,
    pub observation: Observation,
    pub comfort: Option<ComfortLevel>,
    pub humidex: Option<f64>,
    pub raw: String,
}

/// A record about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReading<'a> {
    pub received_at: i64,
    pub peer: &'a str,
    pub observation: &'a Observation,
    pub raw: &'a str,
}

pub struct ReadingsStore {
    conn: Connection,
}

impl ReadingsStore {
    pub fn in_memory() -> rusqlite::Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    pub fn open(path: &std::path::Path) -> rusqlite::Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Insert one reading and return its row id. Climate readings also
    /// store their humidex and comfort level.
    pub fn insert(&self, reading: &NewReading<'_>) -> rusqlite::Result<i64> {
        let mut columns = Columns::default();
        let kind = match reading.observation {
            Observation::Climate { co2, temperature, humidity } => {
                let comfort = assess(*temperature, *humidity);
                columns.co2 = Some(*co2);
                columns.temperature = Some(*temperature);
                columns.humidity = Some(*humidity);
                columns.humidex = Some(comfort.humidex);
                columns.comfort = Some(comfort.level.label());
                KIND_CLIMATE
            }
            Observation::Voc { eco2, tvoc } => {
                columns.eco2 = Some(*eco2);
                columns.tvoc = Some(*tvoc);
                KIND_VOC
            }
            Observation::Particulate { pm2_5, pm10, typical_size } => {
                columns.pm_2_5 = Some(*pm2_5);
                columns.pm_10_0 = Some(*pm10);
                columns.typical_particle_size = Some(*typical_size);
                KIND_PARTICULATE
            }
            Observation::Fault { message } => {
                columns.error = Some(message.as_str());
                KIND_FAULT
            }
        };
        self.conn.execute(
            "INSERT INTO sensor_readings (received_at, peer, kind, co2, temperature, humidity, humidex, comfort, eco2, tvoc, pm_2_5, pm_10_0, typical_particle_size, error, raw) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                reading.received_at,
                reading.peer,
                kind,
                columns.co2,
                columns.temperature,
                columns.humidity,
                columns.humidex,
                columns.comfort,
                columns.eco2,
                columns.tvoc,
                columns.pm_2_5,
                columns.pm_10_0,
                columns.typical_particle_size,
                columns.error,
                reading.raw,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Most recent readings first.
    pub fn recent(&self, limit: usize) -> rusqlite::Result<Vec<StoredReading>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, received_at, peer, kind, co2, temperature, humidity, humidex, comfort, eco2, tvoc, pm_2_5, pm_10_0, typical_particle_size, error, raw FROM sensor_readings ORDER BY id DESC LIMIT ?1",
        )?;
        let mut rows = stmt.query(params![limit as i64])?;
        let mut readings = Vec::new();
        while let Some(row) = rows.next()? {
            readings.push(read_row(row)?);
        }
        Ok(readings)
    }

    pub fn count(&self) -> rusqlite::Result<u64> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM sensor_readings", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn init_schema(&self) -> rusqlite::Result<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS sensor_readings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                received_at INTEGER NOT NULL,
                peer TEXT NOT NULL,
                kind TEXT NOT NULL,
                co2 REAL,
                temperature REAL,
                humidity REAL,
                humidex REAL,
                comfort TEXT,
                eco2 REAL,
                tvoc REAL,
                pm_2_5 REAL,
                pm_10_0 REAL,
                typical_particle_size REAL,
                error TEXT,
                raw TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_sensor_readings_received_at
                ON sensor_readings(received_at);",
        )?;
        Ok(())
    }
}

const KIND_CLIMATE: &str = "climate";
const KIND_VOC: &str = "voc";
const KIND_PARTICULATE: &str = "particulate";
const KIND_FAULT: &str = "fault";

#[derive(Default)]
struct Columns<'a> {
    co2: Option<f64>,
    temperature: Option<f64>,
    humidity: Option<f64>,
    humidex: Option<f64>,
    comfort: Option<&'static str>,
    eco2: Option<f64>,
    tvoc: Option<f64>,
    pm_2_5: Option<f64>,
    pm_10_0: Option<f64>,
    typical_particle_size: Option<f64>,
    error: Option<&'a str>,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredReading> {
    let kind: String = row.get(3)?;
    let number = |index: usize| -> rusqlite::Result<f64> {
        row.get::<_, Option<f64>>(index)?.ok_or(rusqlite::Error::InvalidColumnType(
            index,
            "NULL measurement".to_string(),
            Type::Null,
        ))
    };
    let observation = match kind.as_str() {
        KIND_CLIMATE => {
            Observation::Climate { co2: number(4)?, temperature: number(5)?, humidity: number(6)? }
        }
        KIND_VOC => Observation::Voc { eco2: number(9)?, tvoc: number(10)? },
        KIND_PARTICULATE => Observation::Particulate {
            pm2_5: number(11)?,
            pm10: number(12)?,
            typical_size: number(13)?,
        },
        KIND_FAULT => {
            let message: Option<String> = row.get(14)?;
            Observation::Fault { message: message.unwrap_or_default() }
        }
        _ => {
            return Err(rusqlite::Error::FromSqlConversionFailure(
                3,
                Type::Text,
                Box::new(DecodeError::UnknownShape),
            ))
        }
    };
    let comfort: Option<String> = row.get(8)?;
    Ok(StoredReading {
        id: row.get(0)?,
        received_at: row.get(1)?,
        peer: row.get(2)?,
        observation,
        comfort: comfort.as_deref().and_then(ComfortLevel::from_label),
        humidex: row.get(7)?,
        raw: row.get(15)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading<'a>(observation: &'a Observation, raw: &'a str, at: i64) -> NewReading<'a> {
        NewReading { received_at: at, peer: "[fdde:ad00:beef:0:200::10]:5683", observation, raw }
    }

    #[test]
    fn stores_and_lists_newest_first() {
        let store = ReadingsStore::in_memory().expect("store");
        let climate = Observation::Climate { co2: 450.0, temperature: 21.3, humidity: 55.7 };
        let voc = Observation::Voc { eco2: 612.0, tvoc: 31.0 };
        store.insert(&reading(&climate, "climate-raw", 100)).expect("insert");
        store.insert(&reading(&voc, "voc-raw", 101)).expect("insert");

        assert_eq!(store.count().expect("count"), 2);
        let recent = store.recent(10).expect("recent");
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].observation, voc);
        assert_eq!(recent[0].comfort, None);
        assert_eq!(recent[1].observation, climate);
        assert_eq!(recent[1].humidex, Some(23.6));
        assert_eq!(recent[1].comfort, Some(ComfortLevel::LittleDiscomfort));
        assert_eq!(recent[1].raw, "climate-raw");
        assert_eq!(recent[1].received_at, 100);
    }

    #[test]
    fn recent_honours_limit() {
        let store = ReadingsStore::in_memory().expect("store");
        let pm = Observation::Particulate { pm2_5: 3.05, pm10: 12.99, typical_size: 0.61 };
        for at in 0..5 {
            store.insert(&reading(&pm, "pm", at)).expect("insert");
        }
        let recent = store.recent(2).expect("recent");
        assert_eq!(recent.iter().map(|r| r.received_at).collect::<Vec<_>>(), vec![4, 3]);
    }

    #[test]
    fn faults_keep_their_message() {
        let store = ReadingsStore::in_memory().expect("store");
        let fault = Observation::Fault { message: "SCD41 not ready".into() };
        let raw = r#"{"error":"SCD41 not ready"}"#;
        store.insert(&reading(&fault, raw, 7)).expect("insert");
        let stored = &store.recent(1).expect("recent")[0];
        assert_eq!(stored.observation, fault);
        assert_eq!(stored.raw, raw);
    }
}
