use std::path::PathBuf;

use thiserror::Error;

use crate::types::GearRange;

/// Errors raised by the gear ratio model.
#[derive(Error, Debug)]
pub enum InferenceError {
    /// The gear has no entry in the final-drive table.
    #[error("gear {gear} has no final-drive ratio")]
    UnknownGear { gear: u8 },

    #[error("{catalog} reference catalog is empty")]
    EmptyCatalog { catalog: GearRange },

    /// Confidence is scaled by the catalog maximum, which must be positive.
    #[error("{catalog} reference catalog has non-positive maximum {max}")]
    NonPositiveCatalogMax { catalog: GearRange, max: f64 },

    #[error("invalid drivetrain configuration: {0}")]
    InvalidConfig(String),

    #[error("failed to read config {}: {source}", .path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {}: {source}", .path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl InferenceError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, InferenceError>;
