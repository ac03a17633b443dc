//! Decoded measurement types

use serde::{Deserialize, Serialize};
use std::fmt;

/// Physical unit of a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Unit {
    Ampere,
    Volt,
    Unknown,
}

impl Unit {
    /// Wire/event representation: "A", "V" or "unknown"
    pub fn as_str(&self) -> &'static str {
        match self {
            Unit::Ampere => "A",
            Unit::Volt => "V",
            Unit::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Significant digits of a reading derived from a numeric value
pub const READING_PRECISION: usize = 6;

/// Render a value the way `printf("%g")` does
///
/// Six significant digits with trailing zeros removed. Exponents below -4 or
/// at/above the precision switch to scientific notation (`1.234e-06`), so
/// `f32` division noise such as `0.99990004` reads as `0.9999`.
pub fn format_reading(value: f32) -> String {
    let value = f64::from(value);
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    // Round first, the exponent of the rounded value picks the notation
    let scientific = format!("{:.*e}", READING_PRECISION - 1, value);
    let Some((mantissa, exponent)) = scientific.split_once('e') else {
        return scientific;
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= READING_PRECISION as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (READING_PRECISION as i32 - 1 - exponent) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(number: &str) -> &str {
    if number.contains('.') {
        number.trim_end_matches('0').trim_end_matches('.')
    } else {
        number
    }
}

/// A single decoded reading
///
/// `reading` is the value string handed to event consumers. For Holdpeak
/// frames it is [`format_reading`] of `value`; Mason readings keep the
/// characters exactly as they were received (e.g. `"01.50"`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    pub value: f32,
    pub reading: String,
    pub unit: Unit,
}

impl Measurement {
    /// Create a measurement whose reading is [`format_reading`] of `value`
    pub fn new(value: f32, unit: Unit) -> Self {
        Self {
            value,
            reading: format_reading(value),
            unit,
        }
    }

    /// Create a measurement with an explicit reading string
    pub fn with_reading(value: f32, reading: impl Into<String>, unit: Unit) -> Self {
        Self {
            value,
            reading: reading.into(),
            unit,
        }
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.reading, self.unit)
    }
}
