//! Lenient numeric form input.
//!
//! Edit forms send whatever the user typed. A field that does not hold a
//! number is coerced to zero instead of failing the whole request, so the
//! client keeps a usable form state.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Parses the numeric prefix of `raw` (`"12.5g"` -> 12.5). Unparsable input is 0.
pub fn coerce_str(raw: &str) -> f64 {
    lazy_static! {
        static ref NUMERIC_PREFIX: Regex =
            Regex::new(r"^[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?").unwrap();
    }
    NUMERIC_PREFIX
        .find(raw.trim())
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .filter(|v| v.is_finite())
        .unwrap_or(0.0)
}

pub fn coerce_value(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()).unwrap_or(0.0),
        Value::String(s) => coerce_str(s),
        _ => 0.0,
    }
}

/// Whole, non-negative count from any coerced value. Fractions are truncated.
pub fn to_count(value: f64) -> u32 {
    if value.is_finite() && value > 0.0 {
        value.trunc().min(u32::MAX as f64) as u32
    } else {
        0
    }
}

/// `deserialize_with` for optional float patch fields. Pair with `#[serde(default)]`
/// so that an absent field stays `None`.
pub fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(coerce_value(&value)))
}

/// `deserialize_with` for stored nutrient values: missing, null or
/// non-numeric values read as zero.
pub fn zero_if_invalid<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(coerce_value(&value))
}

/// `deserialize_with` for optional integer patch fields.
pub fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Some(to_count(coerce_value(&value))))
}
