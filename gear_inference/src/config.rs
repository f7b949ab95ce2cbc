//! Drivetrain constants and reference gear ratio catalogs.
//!
//! The defaults describe the car the telemetry was logged on. Every value can
//! be overridden from a JSON file; fields left out keep their default.
//!
//! ```json
//! {
//!   "bevel_ratio": 0.667,
//!   "final_drive_ratios": { "1": 0.304, "2": 0.375 },
//!   "tire_diameters": { "oval": 26.5 }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{InferenceError, Result};
use crate::types::GearRange;

pub const DEFAULT_BEVEL_RATIO: f64 = 0.667;

pub const DEFAULT_FINAL_DRIVE_RATIOS: [(u8, f64); 6] = [
    (1, 0.304),
    (2, 0.375),
    (3, 0.340),
    (4, 0.316),
    (5, 0.404),
    (6, 0.426),
];

/// Ratios reachable in first gear, ascending.
pub const FIRST_GEAR_RATIOS: [f64; 5] = [0.343, 0.389, 0.412, 0.441, 0.471];

/// Ratios reachable in gears two and up, ascending.
pub const HIGHER_GEAR_RATIOS: [f64; 45] = [
    0.485, 0.500, 0.516, 0.533, 0.548, 0.567, 0.581, 0.593, 0.613, 0.633, 0.654, 0.679, 0.704,
    0.720, 0.741, 0.750, 0.760, 0.769, 0.778, 0.786, 0.792, 0.800, 0.808, 0.815, 0.821, 0.828,
    0.833, 0.840, 0.846, 0.852, 0.857, 0.864, 0.870, 0.875, 0.880, 0.885, 0.889, 0.893, 0.897,
    0.900, 0.905, 0.909, 0.920, 0.929, 0.935,
];

pub const ROAD_AND_STREET_TIRE_DIAMETER_IN: f64 = 27.9;
pub const OVAL_TIRE_DIAMETER_IN: f64 = 26.9;

/// Track type, selecting the rear tire diameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum TirePreset {
    /// Road and street courses.
    #[default]
    Road,
    Oval,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TireDiameters {
    pub road_and_street_course: f64,
    pub oval: f64,
}

impl Default for TireDiameters {
    fn default() -> Self {
        Self {
            road_and_street_course: ROAD_AND_STREET_TIRE_DIAMETER_IN,
            oval: OVAL_TIRE_DIAMETER_IN,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrivetrainConfig {
    /// Final-drive ratio per transmission gear.
    pub final_drive_ratios: BTreeMap<u8, f64>,
    pub bevel_ratio: f64,
    pub first_gear_ratios: Vec<f64>,
    pub higher_gear_ratios: Vec<f64>,
    pub tire_diameters: TireDiameters,
}

impl Default for DrivetrainConfig {
    fn default() -> Self {
        Self {
            final_drive_ratios: DEFAULT_FINAL_DRIVE_RATIOS.into_iter().collect(),
            bevel_ratio: DEFAULT_BEVEL_RATIO,
            first_gear_ratios: FIRST_GEAR_RATIOS.to_vec(),
            higher_gear_ratios: HIGHER_GEAR_RATIOS.to_vec(),
            tire_diameters: TireDiameters::default(),
        }
    }
}

impl DrivetrainConfig {
    /// Loads a JSON override file and validates the result.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = fs::read_to_string(path).map_err(|source| InferenceError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: Self = serde_json::from_str(&data).map_err(|source| InferenceError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn tire_diameter(&self, preset: TirePreset) -> f64 {
        match preset {
            TirePreset::Road => self.tire_diameters.road_and_street_course,
            TirePreset::Oval => self.tire_diameters.oval,
        }
    }

    pub fn catalog(&self, range: GearRange) -> &[f64] {
        match range {
            GearRange::First => &self.first_gear_ratios,
            GearRange::Higher => &self.higher_gear_ratios,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.final_drive_ratios.is_empty() {
            return Err(InferenceError::invalid_config("final-drive table is empty"));
        }
        if let Some((gear, ratio)) = self.final_drive_ratios.iter().find(|(_, r)| !r.is_finite()) {
            return Err(InferenceError::invalid_config(format!(
                "final-drive ratio for gear {gear} is not finite: {ratio}"
            )));
        }
        if !self.bevel_ratio.is_finite() {
            return Err(InferenceError::invalid_config(format!(
                "bevel ratio is not finite: {}",
                self.bevel_ratio
            )));
        }
        for range in [GearRange::First, GearRange::Higher] {
            validate_catalog(range, self.catalog(range))?;
        }
        let TireDiameters {
            road_and_street_course,
            oval,
        } = self.tire_diameters;
        for (name, d) in [("road and street course", road_and_street_course), ("oval", oval)] {
            if !(d.is_finite() && d > 0.0) {
                return Err(InferenceError::invalid_config(format!(
                    "{name} tire diameter must be positive, got {d}"
                )));
            }
        }
        Ok(())
    }
}

fn validate_catalog(range: GearRange, catalog: &[f64]) -> Result<()> {
    if catalog.is_empty() {
        return Err(InferenceError::EmptyCatalog { catalog: range });
    }
    if let Some(bad) = catalog.iter().find(|r| !r.is_finite()) {
        return Err(InferenceError::invalid_config(format!(
            "{range} catalog holds non-finite ratio {bad}"
        )));
    }
    if catalog.windows(2).any(|w| w[1] < w[0]) {
        return Err(InferenceError::invalid_config(format!(
            "{range} catalog must be in ascending order"
        )));
    }
    let max = catalog.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max <= 0.0 {
        return Err(InferenceError::NonPositiveCatalogMax {
            catalog: range,
            max,
        });
    }
    Ok(())
}
