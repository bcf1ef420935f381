//! Bounded JSON text records and the encoder that fills them.
//!
//! A [`Record`] always holds one minimal JSON object and is always shorter
//! than its capacity. Encoding never fails outright: read failures and
//! overflow produce an `{"error": ...}` record that is delivered like any
//! other reading.

use core::fmt::{self, Write};

use crate::sensor::{FieldFormat, Reading, Sample, SensorKind, SensorStatus, SensorValue};

/// Default record buffer size in bytes.
pub const RECORD_CAPACITY: usize = 256;

const TRUNCATED: &str = r#"{"error":"json_truncated"}"#;
const EMPTY: &str = "{}";

/// Bounded text buffer holding one encoded record.
///
/// The node owns exactly one of these and overwrites it for every sensor
/// kind; the Delivery Client copies the bytes out before returning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record<const N: usize = RECORD_CAPACITY> {
    text: heapless::String<N>,
}

impl<const N: usize> Record<N> {
    pub const CAPACITY: usize = N;

    pub const fn new() -> Self {
        Self { text: heapless::String::new() }
    }

    pub fn as_str(&self) -> &str {
        self.text.as_str()
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.text.as_bytes()
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Replace the contents with `write`'s output if it fits strictly below
    /// capacity. On overflow the buffer is left empty and `false` returned.
    fn write_bounded(
        &mut self,
        write: impl FnOnce(&mut heapless::String<N>) -> fmt::Result,
    ) -> bool {
        self.text.clear();
        if write(&mut self.text).is_ok() && self.text.len() < N {
            return true;
        }
        self.text.clear();
        false
    }

    fn write_literal(&mut self, literal: &str) -> bool {
        self.write_bounded(|text| text.write_str(literal))
    }

    fn write_error(&mut self, reason: fmt::Arguments<'_>) {
        if self.write_bounded(|text| write!(text, r#"{{"error":"{reason}"}}"#)) {
            return;
        }
        if !self.write_literal(TRUNCATED) {
            // Capacity of 3 or more always fits the empty object.
            self.write_literal(EMPTY);
        }
    }
}

/// What ended up in the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoded {
    Reading,
    ReadFailed { code: i32 },
    OutOfBounds,
    Unavailable(SensorStatus),
}

/// Encode one sample result into `record`, overwriting it.
pub fn encode_sample<const N: usize>(record: &mut Record<N>, sample: &Sample) -> Encoded {
    match sample {
        Ok(reading) => encode_reading(record, reading),
        Err(err) => {
            log::error!("encoder: {} sensor error: {}", err.kind, err.code);
            record.write_error(format_args!("{} read failed: {}", err.kind, err.code));
            Encoded::ReadFailed { code: err.code }
        }
    }
}

/// Encode a successful reading, falling back to the out-of-bounds error record.
pub fn encode_reading<const N: usize>(record: &mut Record<N>, reading: &Reading) -> Encoded {
    if record.write_bounded(|text| write_reading(text, reading)) {
        return Encoded::Reading;
    }
    log::error!("encoder: {} JSON out of bounds (capacity {})", reading.kind(), N);
    record.write_error(format_args!("{} JSON out of bounds", reading.kind()));
    Encoded::OutOfBounds
}

/// Encode a startup availability problem (`not found` / `not ready`).
pub fn encode_unavailable<const N: usize>(
    record: &mut Record<N>,
    kind: SensorKind,
    status: SensorStatus,
) -> Encoded {
    let reason = match status {
        SensorStatus::NotFound => "not found",
        SensorStatus::NotReady => "not ready",
        SensorStatus::Ready => "ready",
    };
    record.write_error(format_args!("{kind} {reason}"));
    Encoded::Unavailable(status)
}

/// Encode into a fresh default-capacity record.
pub fn encode(sample: &Sample) -> Record {
    let mut record = Record::new();
    encode_sample(&mut record, sample);
    record
}

fn write_reading<W: Write>(out: &mut W, reading: &Reading) -> fmt::Result {
    out.write_char('{')?;
    for (index, (field, value)) in reading.fields().enumerate() {
        if index > 0 {
            out.write_char(',')?;
        }
        write!(out, "\"{}\":", field.key)?;
        match field.format {
            FieldFormat::Integer => write_decimal(out, value, 0)?,
            FieldFormat::Decimal { digits } => {
                out.write_char('"')?;
                write_decimal(out, value, digits)?;
                out.write_char('"')?;
            }
        }
    }
    out.write_char('}')
}

/// Render `value` with `digits` truncated fractional digits.
fn write_decimal<W: Write>(out: &mut W, value: SensorValue, digits: u8) -> fmt::Result {
    let digits = u32::from(digits.min(6));
    let per_unit = SensorValue::MICROS_PER_UNIT.unsigned_abs() as u64;
    let total = value.total_micros();
    let magnitude = total.unsigned_abs();
    let whole = magnitude / per_unit;
    let fraction = (magnitude % per_unit) / 10u64.pow(6 - digits);
    if total < 0 && (whole > 0 || fraction > 0) {
        out.write_char('-')?;
    }
    write!(out, "{whole}")?;
    if digits == 0 {
        return Ok(());
    }
    write!(out, ".{:0width$}", fraction, width = digits as usize)
}
