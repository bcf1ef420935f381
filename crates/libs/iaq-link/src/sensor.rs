//! Sensor kinds, readings and the sampling collaborator.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Maximum number of fields any sensor kind reports.
pub const MAX_FIELDS: usize = 3;

/// Sensor kinds fitted to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorKind {
    /// CO₂ / temperature / relative humidity.
    Scd41,
    /// Equivalent CO₂ / total VOC.
    Ccs811,
    /// Particulate matter.
    Sps30,
}

impl SensorKind {
    pub const ALL: [SensorKind; 3] = [SensorKind::Scd41, SensorKind::Ccs811, SensorKind::Sps30];

    /// Label used inside error records.
    pub fn label(self) -> &'static str {
        match self {
            SensorKind::Scd41 => "SCD41",
            SensorKind::Ccs811 => "CCS811",
            SensorKind::Sps30 => "SPS30",
        }
    }

    /// Wire field table for this kind. Keys are part of the collector contract.
    pub fn fields(self) -> &'static [Field] {
        match self {
            SensorKind::Scd41 => &SCD41_FIELDS,
            SensorKind::Ccs811 => &CCS811_FIELDS,
            SensorKind::Sps30 => &SPS30_FIELDS,
        }
    }
}

impl fmt::Display for SensorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// How a field value is rendered into a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldFormat {
    /// Bare JSON integer of the whole part.
    Integer,
    /// Quoted decimal string with a fixed number of fractional digits.
    Decimal { digits: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub key: &'static str,
    pub format: FieldFormat,
}

const fn integer(key: &'static str) -> Field {
    Field { key, format: FieldFormat::Integer }
}

const fn decimal(key: &'static str, digits: u8) -> Field {
    Field { key, format: FieldFormat::Decimal { digits } }
}

static SCD41_FIELDS: [Field; 3] = [integer("co2"), decimal("temp", 1), decimal("humi", 1)];
static CCS811_FIELDS: [Field; 2] = [integer("eco2"), integer("tvoc")];
static SPS30_FIELDS: [Field; 3] = [decimal("pm25", 2), decimal("pm10", 2), decimal("typ", 6)];

/// Fixed-point sensor value: `whole + micros × 10⁻⁶`.
///
/// The parts are summed, so -1.5 may be written `(-1, -500_000)` or
/// `(-2, 500_000)`, and `micros` may exceed one unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SensorValue {
    pub whole: i32,
    pub micros: i32,
}

impl SensorValue {
    pub const MICROS_PER_UNIT: i32 = 1_000_000;

    pub const fn new(whole: i32, micros: i32) -> Self {
        Self { whole, micros }
    }

    pub const fn integer(whole: i32) -> Self {
        Self { whole, micros: 0 }
    }

    /// Nearest fixed-point value. Out-of-range inputs saturate.
    pub fn from_f64(value: f64) -> Self {
        let total = (value * f64::from(Self::MICROS_PER_UNIT)).round() as i64;
        let per_unit = i64::from(Self::MICROS_PER_UNIT);
        let whole = (total / per_unit).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32;
        Self { whole, micros: (total % per_unit) as i32 }
    }

    /// The value in micro-units.
    pub fn total_micros(&self) -> i64 {
        i64::from(self.whole) * i64::from(Self::MICROS_PER_UNIT) + i64::from(self.micros)
    }

    pub fn as_f64(&self) -> f64 {
        self.total_micros() as f64 / f64::from(Self::MICROS_PER_UNIT)
    }

    pub fn is_negative(&self) -> bool {
        self.total_micros() < 0
    }
}

/// One sampling of one sensor. Field count always matches the kind's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reading {
    kind: SensorKind,
    values: heapless::Vec<SensorValue, MAX_FIELDS>,
}

impl Reading {
    pub fn scd41(co2: SensorValue, temp: SensorValue, humi: SensorValue) -> Self {
        Self::from_array(SensorKind::Scd41, [co2, temp, humi])
    }

    pub fn ccs811(eco2: SensorValue, tvoc: SensorValue) -> Self {
        Self::from_array(SensorKind::Ccs811, [eco2, tvoc])
    }

    pub fn sps30(pm25: SensorValue, pm10: SensorValue, typical_size: SensorValue) -> Self {
        Self::from_array(SensorKind::Sps30, [pm25, pm10, typical_size])
    }

    /// Build from a raw value slice; `None` when the count does not match `kind`.
    pub fn from_values(kind: SensorKind, values: &[SensorValue]) -> Option<Self> {
        if values.len() != kind.fields().len() {
            return None;
        }
        let values = heapless::Vec::from_slice(values).ok()?;
        Some(Self { kind, values })
    }

    fn from_array<const K: usize>(kind: SensorKind, values: [SensorValue; K]) -> Self {
        let mut stored = heapless::Vec::new();
        for value in values.into_iter().take(MAX_FIELDS) {
            let _ = stored.push(value);
        }
        Self { kind, values: stored }
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn values(&self) -> &[SensorValue] {
        &self.values
    }

    /// Field descriptors paired with their values, in wire order.
    pub fn fields(&self) -> impl Iterator<Item = (&'static Field, SensorValue)> + '_ {
        self.kind.fields().iter().zip(self.values.iter().copied())
    }
}

/// A failed sample, carrying the driver's error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{kind} read failed: {code}")]
pub struct SensorError {
    pub kind: SensorKind,
    pub code: i32,
}

/// Result of one sampling call.
pub type Sample = Result<Reading, SensorError>;

/// Device presence as seen at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorStatus {
    Ready,
    NotReady,
    NotFound,
}

/// Source of raw sensor samples.
pub trait SensorSource {
    fn status(&self, kind: SensorKind) -> SensorStatus;
    fn sample(&mut self, kind: SensorKind) -> Sample;
}
