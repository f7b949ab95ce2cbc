//! Ingestion, cleaning and balancing of per-vehicle engine telemetry.
//!
//! Raw logger documents go through four stages:
//!
//! 1. [`document::parse_document`] extracts records and tags them with the
//!    vehicle name from the header.
//! 2. [`filter::filter_records`] keeps samples above 4000 rpm, in gears 1-6,
//!    with the vehicle moving.
//! 3. [`filter::remove_transients`] drops engine speeds seen only once per
//!    vehicle.
//! 4. [`balance::balance`] undersamples every vehicle to the smallest count.
//!
//! [`prepare_dataset`] runs all of them.

pub mod balance;
pub mod document;
pub mod error;
pub mod filter;
pub mod record;
pub mod source;
pub mod table;

use rayon::prelude::*;
use serde::Serialize;

pub use balance::{balance, BalanceOptions, BalancedDataset, EmptyVehiclePolicy, VehiclePartition};
pub use document::{parse_document, ParsedDocument, RawDocument};
pub use error::{FeedError, Result};
pub use filter::FilterStats;
pub use record::{TelemetryRecord, TelemetrySample};

/// Records gathered from a set of documents.
#[derive(Debug, Default)]
pub struct Ingested {
    pub records: Vec<TelemetryRecord>,
    /// Vehicle names in first-seen order.
    pub vehicles: Vec<String>,
    /// Documents that could not be parsed. Their rows are not in `records`.
    pub failures: Vec<FeedError>,
}

/// Parses every document, concatenating records in document order.
///
/// A document that fails to parse is logged and reported in
/// [`Ingested::failures`]; the others are still used.
pub fn ingest(documents: &[RawDocument]) -> Ingested {
    let parsed: Vec<Result<ParsedDocument>> =
        documents.par_iter().map(parse_document).collect();

    let mut ingested = Ingested::default();
    for (doc, result) in documents.iter().zip(parsed) {
        match result {
            Ok(parsed) => {
                if !ingested.vehicles.contains(&parsed.vehicle_id) {
                    ingested.vehicles.push(parsed.vehicle_id);
                }
                ingested.records.extend(parsed.records);
            }
            Err(e) => {
                tracing::warn!("dropping document {}: {}", doc.name, e);
                ingested.failures.push(e);
            }
        }
    }
    ingested
}

/// Result of [`prepare_dataset`].
#[derive(Debug)]
pub struct PreparedFeed {
    pub dataset: BalancedDataset,
    pub vehicles: Vec<String>,
    pub stats: FilterStats,
    pub failures: Vec<FeedError>,
}

/// Counts describing one preparation run, for reporting.
#[derive(Debug, Clone, Serialize)]
pub struct FeedSummary {
    pub vehicles_seen: usize,
    pub vehicles_balanced: usize,
    pub failed_documents: Vec<String>,
    pub filter: FilterStats,
    pub per_vehicle: usize,
    pub balanced_rows: usize,
}

impl PreparedFeed {
    pub fn summary(&self) -> FeedSummary {
        FeedSummary {
            vehicles_seen: self.vehicles.len(),
            vehicles_balanced: self.dataset.partitions().len(),
            failed_documents: self.failures.iter().map(ToString::to_string).collect(),
            filter: self.stats,
            per_vehicle: self.dataset.per_vehicle(),
            balanced_rows: self.dataset.len(),
        }
    }
}

/// Runs ingestion, filtering, transient removal and balancing.
///
/// Per-document parse failures are carried in [`PreparedFeed::failures`].
/// Running out of data at any stage is an [`FeedError::EmptyDataset`].
pub fn prepare_dataset(documents: &[RawDocument], options: &BalanceOptions) -> Result<PreparedFeed> {
    let Ingested {
        records,
        vehicles,
        failures,
    } = ingest(documents);
    if records.is_empty() {
        return Err(FeedError::EmptyDataset {
            stage: "ingest",
            vehicles,
        });
    }
    tracing::info!(
        "ingested {} rows for {} vehicles from {} documents",
        records.len(),
        vehicles.len(),
        documents.len() - failures.len()
    );

    let (qualified, mut stats) = filter::filter_records(&records);
    let (samples, transients) = filter::remove_transients(qualified);
    stats.transients = transients;
    tracing::info!(
        "filter kept {} of {} rows ({} transient engine speeds removed)",
        samples.len(),
        stats.input,
        transients
    );
    if samples.is_empty() {
        return Err(FeedError::EmptyDataset {
            stage: "filter",
            vehicles,
        });
    }

    let dataset = balance::balance(samples, &vehicles, options)?;
    Ok(PreparedFeed {
        dataset,
        vehicles,
        stats,
        failures,
    })
}
