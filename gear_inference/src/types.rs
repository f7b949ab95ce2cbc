use std::fmt;
use std::io::Write;

use serde::{Deserialize, Serialize};
use telemetry_feed::table::{sample_fields, BALANCED_COLUMNS};
use telemetry_feed::TelemetrySample;

/// Which reference catalog a ratio was matched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GearRange {
    First,
    Higher,
}

impl fmt::Display for GearRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GearRange::First => write!(f, "first-gear"),
            GearRange::Higher => write!(f, "higher-gear"),
        }
    }
}

/// Nearest catalog entry for a computed ratio.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RatioMatch {
    pub matched_ratio: f64,
    /// `1 - |matched - calculated| / max(catalog)`. Not clamped: ratios far
    /// outside the catalog give negative values.
    pub confidence: f64,
    pub range: GearRange,
}

impl RatioMatch {
    /// Confidence limited to `[0, 1]`, for display.
    pub fn clamped_confidence(&self) -> f64 {
        self.confidence.clamp(0.0, 1.0)
    }
}

/// Outcome of inference for one sample. Both parts are `None` when the ratio
/// is undefined.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct InferenceResult {
    pub calculated_ratio: Option<f64>,
    pub matched: Option<RatioMatch>,
}

impl InferenceResult {
    pub fn matched_ratio(&self) -> Option<f64> {
        self.matched.map(|m| m.matched_ratio)
    }

    pub fn confidence(&self) -> Option<f64> {
        self.matched.map(|m| m.confidence)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceRow {
    pub sample: TelemetrySample,
    pub result: InferenceResult,
}

/// Columns appended to the balanced table by inference.
pub const INFERENCE_COLUMNS: [&str; 3] = [
    "CalculatedGearRatio",
    "NearestMatchedGearRatio",
    "ConfidenceFactor",
];

fn optional(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

/// Writes the balanced columns plus the inference columns. Undefined values
/// are left empty.
pub fn write_inference<'a, W: Write>(
    out: W,
    rows: impl IntoIterator<Item = &'a InferenceRow>,
) -> csv::Result<usize> {
    let mut wtr = csv::Writer::from_writer(out);
    wtr.write_record(BALANCED_COLUMNS.iter().chain(INFERENCE_COLUMNS.iter()))?;

    let mut written = 0;
    for row in rows {
        let inferred = [
            optional(row.result.calculated_ratio),
            optional(row.result.matched_ratio()),
            optional(row.result.confidence()),
        ];
        wtr.write_record(sample_fields(&row.sample).iter().chain(inferred.iter()))?;
        written += 1;
    }
    wtr.flush()?;
    Ok(written)
}
