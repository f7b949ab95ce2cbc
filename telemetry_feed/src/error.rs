//! Error types for telemetry ingestion and balancing.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning raw telemetry documents into a balanced dataset.
#[derive(Error, Debug)]
pub enum FeedError {
    /// A document does not follow the expected header/column layout.
    #[error("failed to parse document {document}: {reason}")]
    Parse { document: String, reason: String },

    /// Balancing was attempted without usable data.
    ///
    /// `vehicles` lists the vehicles that ended up with zero qualifying records;
    /// it is empty when no document contributed any vehicle at all.
    #[error("no data at stage {stage}{}", describe_vehicles(.vehicles))]
    EmptyDataset {
        stage: &'static str,
        vehicles: Vec<String>,
    },

    #[error("i/o error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A balanced table file could not be read back.
    #[error("malformed table at line {line}: {reason}")]
    MalformedTable { line: usize, reason: String },
}

impl FeedError {
    pub fn parse(document: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            document: document.into(),
            reason: reason.into(),
        }
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn malformed_table(line: usize, reason: impl Into<String>) -> Self {
        Self::MalformedTable {
            line,
            reason: reason.into(),
        }
    }
}

fn describe_vehicles(vehicles: &[String]) -> String {
    if vehicles.is_empty() {
        String::new()
    } else {
        format!(" (vehicles without qualifying records: {})", vehicles.join(", "))
    }
}

pub type Result<T> = std::result::Result<T, FeedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_dataset_names_vehicles() {
        let err = FeedError::EmptyDataset {
            stage: "balance",
            vehicles: vec!["Car 7".into(), "Car 12".into()],
        };
        let msg = err.to_string();
        assert!(msg.contains("balance"));
        assert!(msg.contains("Car 7, Car 12"));
    }

    #[test]
    fn empty_dataset_without_vehicles() {
        let err = FeedError::EmptyDataset {
            stage: "filter",
            vehicles: vec![],
        };
        assert_eq!(err.to_string(), "no data at stage filter");
    }

    #[test]
    fn parse_error_mentions_document() {
        let err = FeedError::parse("car_7.txt", "missing column Time");
        assert!(err.to_string().contains("car_7.txt"));
    }
}
