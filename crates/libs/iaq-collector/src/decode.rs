//! Typed view of received records.

use iaq_link::SensorKind;
use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("record is not JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record matches no known sensor shape")]
    UnknownShape,

    #[error("field `{field}` is not a number: {value:?}")]
    NotNumeric { field: &'static str, value: String },
}

/// One decoded record.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// SCD41: ppm, °C, %RH.
    Climate { co2: f64, temperature: f64, humidity: f64 },
    /// CCS811: ppm, ppb.
    Voc { eco2: f64, tvoc: f64 },
    /// SPS30: µg/m³, µg/m³, µm.
    Particulate { pm2_5: f64, pm10: f64, typical_size: f64 },
    /// Error record sent in place of a reading.
    Fault { message: String },
}

impl Observation {
    /// Sensor the record came from. Faults name it as the first word of
    /// their message when known.
    pub fn kind(&self) -> Option<SensorKind> {
        match self {
            Observation::Climate { .. } => Some(SensorKind::Scd41),
            Observation::Voc { .. } => Some(SensorKind::Ccs811),
            Observation::Particulate { .. } => Some(SensorKind::Sps30),
            Observation::Fault { message } => {
                let first = message.split_whitespace().next()?;
                SensorKind::ALL.into_iter().find(|kind| kind.label() == first)
            }
        }
    }

    pub fn is_fault(&self) -> bool {
        matches!(self, Observation::Fault { .. })
    }
}

/// Numbers arrive either bare (integer fields) or as decimal strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

impl Numeric {
    fn value(self, field: &'static str) -> Result<f64, DecodeError> {
        match self {
            Numeric::Number(value) => Ok(value),
            Numeric::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or(DecodeError::NotNumeric { field, value: text }),
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ClimateFields {
    co2: Numeric,
    temp: Numeric,
    humi: Numeric,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct VocFields {
    eco2: Numeric,
    tvoc: Numeric,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct ParticulateFields {
    pm25: Numeric,
    pm10: Numeric,
    typ: Numeric,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct FaultFields {
    error: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Shape {
    Climate(ClimateFields),
    Voc(VocFields),
    Particulate(ParticulateFields),
    Fault(FaultFields),
}

/// Parse a record into an [`Observation`]. Field sets must match exactly.
pub fn decode_record(text: &str) -> Result<Observation, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let shape = Shape::deserialize(value).map_err(|_| DecodeError::UnknownShape)?;
    Ok(match shape {
        Shape::Climate(fields) => Observation::Climate {
            co2: fields.co2.value("co2")?,
            temperature: fields.temp.value("temp")?,
            humidity: fields.humi.value("humi")?,
        },
        Shape::Voc(fields) => Observation::Voc {
            eco2: fields.eco2.value("eco2")?,
            tvoc: fields.tvoc.value("tvoc")?,
        },
        Shape::Particulate(fields) => Observation::Particulate {
            pm2_5: fields.pm25.value("pm25")?,
            pm10: fields.pm10.value("pm10")?,
            typical_size: fields.typ.value("typ")?,
        },
        Shape::Fault(fields) => Observation::Fault { message: fields.error },
    })
}
