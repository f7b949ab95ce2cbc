//! Gear ratio inference for balanced engine telemetry.
//!
//! For each sample the engaged ratio is derived from engine speed, road speed,
//! tire diameter and the final drive of the recorded gear, then snapped to the
//! nearest entry of a reference catalog with a confidence factor.

pub mod config;
pub mod error;
pub mod model;
pub mod types;

pub use config::{DrivetrainConfig, TirePreset};
pub use error::{InferenceError, Result};
pub use model::{InferenceBatch, InferenceSettings, InferenceSummary, RatioModel};
pub use types::{GearRange, InferenceResult, InferenceRow, RatioMatch};
