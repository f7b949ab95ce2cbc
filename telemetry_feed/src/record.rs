use serde::Serialize;

/// Lowest engine speed (exclusive) a sample needs to be kept.
pub const MIN_ENGINE_SPEED_RPM: f64 = 4000.0;

/// Transmission gears the drivetrain model knows about.
pub const VALID_GEARS: std::ops::RangeInclusive<u8> = 1..=6;

/// One reading of one vehicle, as parsed from a document.
///
/// Numeric columns that fail to parse are kept as `None` instead of failing
/// the document; the filter stage drops them.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetryRecord {
    pub vehicle_id: String,
    /// Time stamp exactly as it appeared in the document.
    pub time: String,
    pub trans_gear: Option<i64>,
    pub vehicle_speed_mph: Option<f64>,
    pub engine_speed_rpm: Option<f64>,
}

/// A reading that survived filtering: every measurement is present and usable.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TelemetrySample {
    pub vehicle_id: String,
    pub time: String,
    pub trans_gear: u8,
    pub vehicle_speed_mph: f64,
    pub engine_speed_rpm: f64,
}

impl TelemetrySample {
    /// Key used for transient detection. Engine speeds are grouped by exact value.
    pub(crate) fn engine_speed_key(&self) -> u64 {
        self.engine_speed_rpm.to_bits()
    }
}

/// Parses a numeric token, mapping anything unparseable to `None`.
pub fn coerce_number(token: &str) -> Option<f64> {
    let token = token.trim();
    if token.is_empty() {
        return None;
    }
    token.parse::<f64>().ok().filter(|v| !v.is_nan())
}

/// Parses a gear token. Integral floats such as `3.0` are accepted.
pub fn coerce_gear(token: &str) -> Option<i64> {
    let token = token.trim();
    if let Ok(g) = token.parse::<i64>() {
        return Some(g);
    }
    match coerce_number(token) {
        Some(v) if v.fract() == 0.0 && v.is_finite() => Some(v as i64),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_number_maps_garbage_to_none() {
        assert_eq!(coerce_number("5012.5"), Some(5012.5));
        assert_eq!(coerce_number(" 4100 "), Some(4100.0));
        assert_eq!(coerce_number("---"), None);
        assert_eq!(coerce_number(""), None);
        assert_eq!(coerce_number("NaN"), None);
    }

    #[test]
    fn coerce_gear_accepts_integral_floats() {
        assert_eq!(coerce_gear("4"), Some(4));
        assert_eq!(coerce_gear("4.0"), Some(4));
        assert_eq!(coerce_gear("4.5"), None);
        assert_eq!(coerce_gear("N"), None);
    }
}
