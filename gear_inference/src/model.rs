//! Gear ratio computation and nearest-catalog matching.

use std::f64::consts::PI;

use rayon::prelude::*;
use serde::Serialize;
use telemetry_feed::TelemetrySample;

use crate::config::DrivetrainConfig;
use crate::error::{InferenceError, Result};
use crate::types::{GearRange, InferenceResult, InferenceRow, RatioMatch};

const INCHES_PER_MILE: f64 = 5280.0 * 12.0;
const MINUTES_PER_HOUR: f64 = 60.0;

/// Inputs shared by every sample of one inference run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceSettings {
    pub tire_diameter_in: f64,
    /// Evaluate every sample as if this gear were engaged instead of its
    /// recorded gear.
    pub assume_gear: Option<u8>,
}

/// Validated drivetrain model. Immutable once built, so one instance can be
/// shared by every worker.
#[derive(Debug, Clone)]
pub struct RatioModel {
    config: DrivetrainConfig,
    first_max: f64,
    higher_max: f64,
}

impl RatioModel {
    /// Builds a model, rejecting empty catalogs or catalogs whose maximum is
    /// not positive.
    pub fn new(config: DrivetrainConfig) -> Result<Self> {
        config.validate()?;
        let max = |c: &[f64]| c.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let first_max = max(&config.first_gear_ratios);
        let higher_max = max(&config.higher_gear_ratios);
        Ok(Self {
            config,
            first_max,
            higher_max,
        })
    }

    pub fn config(&self) -> &DrivetrainConfig {
        &self.config
    }

    /// `1 / (final_drive[gear] * bevel)`.
    pub fn overall_ratio(&self, trans_gear: u8) -> Result<f64> {
        let final_drive = self
            .config
            .final_drive_ratios
            .get(&trans_gear)
            .ok_or(InferenceError::UnknownGear { gear: trans_gear })?;
        Ok(1.0 / (final_drive * self.config.bevel_ratio))
    }

    /// Gear ratio implied by engine speed, road speed and tire size.
    ///
    /// Returns `Ok(None)` when the denominator is zero. An unknown gear is an
    /// error.
    pub fn compute_ratio(
        &self,
        engine_speed_rpm: f64,
        vehicle_speed_mph: f64,
        tire_diameter_in: f64,
        trans_gear: u8,
    ) -> Result<Option<f64>> {
        let overall = self.overall_ratio(trans_gear)?;
        let denominator = (engine_speed_rpm / overall) * (tire_diameter_in * PI) * MINUTES_PER_HOUR;
        if denominator == 0.0 {
            return Ok(None);
        }
        Ok(Some(vehicle_speed_mph * INCHES_PER_MILE / denominator))
    }

    /// Catalog a ratio is matched against: first gear when the ratio does not
    /// exceed the largest first-gear entry.
    pub fn range_for(&self, calculated_ratio: f64) -> GearRange {
        if calculated_ratio <= self.first_max {
            GearRange::First
        } else {
            GearRange::Higher
        }
    }

    /// Nearest catalog entry and its confidence. `None` in, `None` out.
    pub fn match_ratio(&self, calculated_ratio: Option<f64>) -> Option<RatioMatch> {
        let calculated = calculated_ratio?;
        let range = self.range_for(calculated);
        let (catalog, max) = match range {
            GearRange::First => (&self.config.first_gear_ratios, self.first_max),
            GearRange::Higher => (&self.config.higher_gear_ratios, self.higher_max),
        };
        let matched_ratio = nearest(catalog, calculated)?;
        let confidence = 1.0 - (matched_ratio - calculated).abs() / max;
        Some(RatioMatch {
            matched_ratio,
            confidence,
            range,
        })
    }

    pub fn infer(&self, sample: &TelemetrySample, settings: &InferenceSettings) -> Result<InferenceResult> {
        let gear = settings.assume_gear.unwrap_or(sample.trans_gear);
        let calculated_ratio = self.compute_ratio(
            sample.engine_speed_rpm,
            sample.vehicle_speed_mph,
            settings.tire_diameter_in,
            gear,
        )?;
        Ok(InferenceResult {
            calculated_ratio,
            matched: self.match_ratio(calculated_ratio),
        })
    }

    /// Runs [`RatioModel::infer`] over all samples in parallel.
    ///
    /// Output rows keep input order. Samples that fail (unknown gear) are
    /// reported in [`InferenceBatch::rejected`] with their input index.
    pub fn infer_all(&self, samples: &[TelemetrySample], settings: &InferenceSettings) -> InferenceBatch {
        let results: Vec<Result<InferenceResult>> = samples
            .par_iter()
            .map(|s| self.infer(s, settings))
            .collect();

        let mut batch = InferenceBatch::default();
        for (index, (sample, result)) in samples.iter().zip(results).enumerate() {
            match result {
                Ok(result) => batch.rows.push(InferenceRow {
                    sample: sample.clone(),
                    result,
                }),
                Err(e) => {
                    tracing::warn!("row {} ({} @ {}): {}", index, sample.vehicle_id, sample.time, e);
                    batch.rejected.push((index, e));
                }
            }
        }
        batch
    }
}

/// First catalog entry closest to `value`. Ties go to the earlier entry.
fn nearest(catalog: &[f64], value: f64) -> Option<f64> {
    let (&first, rest) = catalog.split_first()?;
    let mut best = first;
    let mut best_distance = (first - value).abs();
    for &entry in rest {
        let distance = (entry - value).abs();
        if distance < best_distance {
            best = entry;
            best_distance = distance;
        }
    }
    Some(best)
}

/// Rows produced by [`RatioModel::infer_all`].
#[derive(Debug, Default)]
pub struct InferenceBatch {
    pub rows: Vec<InferenceRow>,
    pub rejected: Vec<(usize, InferenceError)>,
}

#[derive(Debug, Clone, Serialize)]
pub struct InferenceSummary {
    pub rows: usize,
    pub rejected_rows: usize,
    pub undefined_ratios: usize,
    pub first_gear_matches: usize,
    pub higher_gear_matches: usize,
    pub negative_confidence: usize,
    pub mean_confidence: Option<f64>,
}

impl InferenceBatch {
    pub fn summary(&self) -> InferenceSummary {
        let matches: Vec<&RatioMatch> = self.rows.iter().filter_map(|r| r.result.matched.as_ref()).collect();
        let mean_confidence = if matches.is_empty() {
            None
        } else {
            Some(matches.iter().map(|m| m.confidence).sum::<f64>() / matches.len() as f64)
        };
        InferenceSummary {
            rows: self.rows.len(),
            rejected_rows: self.rejected.len(),
            undefined_ratios: self.rows.iter().filter(|r| r.result.calculated_ratio.is_none()).count(),
            first_gear_matches: matches.iter().filter(|m| m.range == GearRange::First).count(),
            higher_gear_matches: matches.iter().filter(|m| m.range == GearRange::Higher).count(),
            negative_confidence: matches.iter().filter(|m| m.confidence < 0.0).count(),
            mean_confidence,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn model() -> RatioModel {
        RatioModel::new(DrivetrainConfig::default()).unwrap()
    }

    fn sample(gear: u8, mph: f64, rpm: f64) -> TelemetrySample {
        TelemetrySample {
            vehicle_id: "Car 60".into(),
            time: "0".into(),
            trans_gear: gear,
            vehicle_speed_mph: mph,
            engine_speed_rpm: rpm,
        }
    }

    #[test]
    fn computes_reference_ratio() {
        let m = model();
        assert_abs_diff_eq!(m.overall_ratio(1).unwrap(), 4.931_744_653_988_795, epsilon = 1e-9);

        let ratio = m.compute_ratio(5000.0, 60.0, 27.9, 1).unwrap().unwrap();
        let by_hand = 60.0 * 5280.0 * 12.0 / (5000.0 * 0.304 * 0.667 * 27.9 * PI * 60.0);
        assert_abs_diff_eq!(ratio, by_hand, epsilon = 1e-12);
        assert_abs_diff_eq!(ratio, 0.713_003_514_817, epsilon = 1e-6);
    }

    #[test]
    fn compute_is_deterministic() {
        let m = model();
        let a = m.compute_ratio(10500.0, 188.0, 26.9, 6).unwrap();
        let b = m.compute_ratio(10500.0, 188.0, 26.9, 6).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn zero_denominator_is_undefined() {
        let m = model();
        assert_eq!(m.compute_ratio(0.0, 60.0, 27.9, 2).unwrap(), None);
        assert_eq!(m.compute_ratio(9000.0, 60.0, 0.0, 2).unwrap(), None);

        let mut cfg = DrivetrainConfig::default();
        cfg.final_drive_ratios.insert(3, 0.0);
        let m = RatioModel::new(cfg).unwrap();
        assert_eq!(m.compute_ratio(9000.0, 60.0, 27.9, 3).unwrap(), None);
    }

    #[test]
    fn unknown_gear_is_rejected() {
        let m = model();
        assert!(matches!(
            m.compute_ratio(9000.0, 60.0, 27.9, 7),
            Err(InferenceError::UnknownGear { gear: 7 })
        ));
        assert!(m.compute_ratio(9000.0, 60.0, 27.9, 0).is_err());
    }

    #[test]
    fn matches_first_gear_catalog() {
        let m = model().match_ratio(Some(0.405)).unwrap();
        assert_eq!(m.range, GearRange::First);
        assert_eq!(m.matched_ratio, 0.412);
        assert_abs_diff_eq!(m.confidence, 1.0 - 0.007 / 0.471, epsilon = 1e-12);

        // 0.389 is 0.011 away, 0.412 is 0.012 away.
        let m = model().match_ratio(Some(0.40)).unwrap();
        assert_eq!(m.matched_ratio, 0.389);
        assert_abs_diff_eq!(m.confidence, 0.976_645, epsilon = 1e-6);
    }

    #[test]
    fn boundary_uses_first_gear_catalog() {
        let m = model().match_ratio(Some(0.471)).unwrap();
        assert_eq!(m.range, GearRange::First);
        assert_eq!(m.matched_ratio, 0.471);
        assert_eq!(m.confidence, 1.0);

        let m = model().match_ratio(Some(0.472)).unwrap();
        assert_eq!(m.range, GearRange::Higher);
        assert_eq!(m.matched_ratio, 0.485);
    }

    #[test]
    fn matches_higher_gear_catalog() {
        let m = model().match_ratio(Some(0.713_003_514_817)).unwrap();
        assert_eq!(m.range, GearRange::Higher);
        assert_eq!(m.matched_ratio, 0.720);
        assert_abs_diff_eq!(m.confidence, 1.0 - (0.720 - 0.713_003_514_817) / 0.935, epsilon = 1e-12);
    }

    #[test]
    fn confidence_goes_negative_far_from_catalog() {
        let m = model().match_ratio(Some(3.0)).unwrap();
        assert_eq!(m.matched_ratio, 0.935);
        assert_abs_diff_eq!(m.confidence, 1.0 - (3.0 - 0.935) / 0.935, epsilon = 1e-12);
        assert!(m.confidence < 0.0);
        assert_eq!(m.clamped_confidence(), 0.0);
    }

    #[test]
    fn tie_goes_to_first_entry() {
        let cfg = DrivetrainConfig {
            first_gear_ratios: vec![0.25, 0.75],
            ..DrivetrainConfig::default()
        };
        let m = RatioModel::new(cfg).unwrap().match_ratio(Some(0.5)).unwrap();
        assert_eq!(m.matched_ratio, 0.25);
        assert_eq!(m.confidence, 1.0 - 0.25 / 0.75);
    }

    #[test]
    fn undefined_ratio_matches_nothing() {
        assert_eq!(model().match_ratio(None), None);
    }

    #[test]
    fn empty_catalog_refuses_to_build() {
        let cfg = DrivetrainConfig {
            higher_gear_ratios: vec![],
            ..DrivetrainConfig::default()
        };
        assert!(matches!(
            RatioModel::new(cfg),
            Err(InferenceError::EmptyCatalog { catalog: GearRange::Higher })
        ));
    }

    #[test]
    fn infer_uses_recorded_or_assumed_gear() {
        let m = model();
        let s = sample(4, 150.0, 10000.0);
        let recorded = InferenceSettings {
            tire_diameter_in: 27.9,
            assume_gear: None,
        };
        let assumed = InferenceSettings {
            assume_gear: Some(1),
            ..recorded
        };
        let r = m.infer(&s, &recorded).unwrap();
        assert_eq!(r.calculated_ratio, m.compute_ratio(10000.0, 150.0, 27.9, 4).unwrap());
        let a = m.infer(&s, &assumed).unwrap();
        assert_eq!(a.calculated_ratio, m.compute_ratio(10000.0, 150.0, 27.9, 1).unwrap());
        assert_eq!(a.matched, m.match_ratio(a.calculated_ratio));
    }

    #[test]
    fn infer_all_keeps_order_and_reports_bad_rows() {
        let m = model();
        let samples = vec![
            sample(1, 60.0, 5000.0),
            sample(9, 60.0, 5000.0),
            sample(6, 190.0, 11800.0),
            sample(2, 60.0, 0.0),
        ];
        let settings = InferenceSettings {
            tire_diameter_in: 27.9,
            assume_gear: None,
        };
        let batch = m.infer_all(&samples, &settings);
        assert_eq!(batch.rows.len(), 3);
        assert_eq!(batch.rejected.len(), 1);
        assert_eq!(batch.rejected[0].0, 1);
        assert_eq!(batch.rows[0].sample.trans_gear, 1);
        assert_eq!(batch.rows[1].sample.trans_gear, 6);
        assert_eq!(batch.rows[2].result, InferenceResult::default());

        let summary = batch.summary();
        assert_eq!(summary.rows, 3);
        assert_eq!(summary.rejected_rows, 1);
        assert_eq!(summary.undefined_ratios, 1);
        assert_eq!(summary.first_gear_matches + summary.higher_gear_matches, 2);
    }
}
