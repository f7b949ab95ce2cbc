//! Per-vehicle undersampling to the size of the smallest vehicle.
//!
//! Each vehicle is sampled without replacement by its own generator. The
//! generators are seeded from one master generator, so a seeded run yields the
//! same rows no matter how the rayon pool schedules the vehicles.

use std::collections::HashMap;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;

use crate::error::{FeedError, Result};
use crate::record::TelemetrySample;

/// What to do with a vehicle that has no qualifying records left.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EmptyVehiclePolicy {
    /// Fail balancing and name the vehicles.
    #[default]
    Reject,
    /// Leave the vehicles out of the balanced dataset.
    Skip,
}

#[derive(Debug, Clone, Default)]
pub struct BalanceOptions {
    /// Seed for the sampler. `None` draws from OS entropy.
    pub seed: Option<u64>,
    pub empty_vehicles: EmptyVehiclePolicy,
}

/// The samples kept for one vehicle.
#[derive(Debug, Clone, Serialize)]
pub struct VehiclePartition {
    pub vehicle_id: String,
    pub samples: Vec<TelemetrySample>,
}

/// Samples partitioned by vehicle, every partition holding the same count.
#[derive(Debug, Clone, Serialize)]
pub struct BalancedDataset {
    partitions: Vec<VehiclePartition>,
    per_vehicle: usize,
}

impl BalancedDataset {
    pub fn partitions(&self) -> &[VehiclePartition] {
        &self.partitions
    }

    /// Number of samples drawn for each vehicle.
    pub fn per_vehicle(&self) -> usize {
        self.per_vehicle
    }

    pub fn len(&self) -> usize {
        self.partitions.len() * self.per_vehicle
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All samples, vehicle by vehicle.
    pub fn samples(&self) -> impl Iterator<Item = &TelemetrySample> {
        self.partitions.iter().flat_map(|p| p.samples.iter())
    }

    pub fn into_samples(self) -> Vec<TelemetrySample> {
        self.partitions
            .into_iter()
            .flat_map(|p| p.samples)
            .collect()
    }
}

/// Balances `samples` using a generator built from `options.seed`.
///
/// `vehicles` lists every vehicle seen during ingestion, so that vehicles
/// whose records were all filtered out can be reported.
pub fn balance(
    samples: Vec<TelemetrySample>,
    vehicles: &[String],
    options: &BalanceOptions,
) -> Result<BalancedDataset> {
    let mut rng = match options.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    balance_with_rng(samples, vehicles, options.empty_vehicles, &mut rng)
}

/// Balances `samples`, drawing per-vehicle seeds from `rng`.
pub fn balance_with_rng<R: Rng + ?Sized>(
    samples: Vec<TelemetrySample>,
    vehicles: &[String],
    policy: EmptyVehiclePolicy,
    rng: &mut R,
) -> Result<BalancedDataset> {
    let mut groups = group_by_vehicle(samples, vehicles);

    let empty: Vec<String> = groups
        .iter()
        .filter(|(_, s)| s.is_empty())
        .map(|(id, _)| id.clone())
        .collect();

    if empty.len() == groups.len() {
        return Err(FeedError::EmptyDataset {
            stage: "balance",
            vehicles: empty,
        });
    }
    if !empty.is_empty() {
        match policy {
            EmptyVehiclePolicy::Reject => {
                return Err(FeedError::EmptyDataset {
                    stage: "balance",
                    vehicles: empty,
                })
            }
            EmptyVehiclePolicy::Skip => {
                tracing::warn!(
                    "leaving out vehicles without qualifying records: {}",
                    empty.join(", ")
                );
                groups.retain(|(_, s)| !s.is_empty());
            }
        }
    }

    let per_vehicle = groups.iter().map(|(_, s)| s.len()).min().unwrap_or(0);
    let seeds: Vec<u64> = groups.iter().map(|_| rng.gen()).collect();

    let partitions: Vec<VehiclePartition> = groups
        .into_par_iter()
        .zip(seeds)
        .map(|((vehicle_id, samples), seed)| {
            let available = samples.len();
            let mut vehicle_rng = StdRng::seed_from_u64(seed);
            let samples = draw_without_replacement(samples, per_vehicle, &mut vehicle_rng);
            tracing::debug!(
                "vehicle {}: drew {} of {} samples",
                vehicle_id,
                samples.len(),
                available
            );
            VehiclePartition {
                vehicle_id,
                samples,
            }
        })
        .collect();

    tracing::info!(
        "balanced {} vehicles at {} samples each",
        partitions.len(),
        per_vehicle
    );
    Ok(BalancedDataset {
        partitions,
        per_vehicle,
    })
}

/// Groups samples by vehicle. Listed vehicles come first, in list order, then
/// any unlisted vehicle in first-seen order.
fn group_by_vehicle(
    samples: Vec<TelemetrySample>,
    vehicles: &[String],
) -> Vec<(String, Vec<TelemetrySample>)> {
    let mut groups: Vec<(String, Vec<TelemetrySample>)> = Vec::new();
    let mut slot: HashMap<String, usize> = HashMap::new();
    for id in vehicles {
        if !slot.contains_key(id) {
            slot.insert(id.clone(), groups.len());
            groups.push((id.clone(), Vec::new()));
        }
    }
    for sample in samples {
        let idx = match slot.get(&sample.vehicle_id) {
            Some(&idx) => idx,
            None => {
                slot.insert(sample.vehicle_id.clone(), groups.len());
                groups.push((sample.vehicle_id.clone(), Vec::new()));
                groups.len() - 1
            }
        };
        groups[idx].1.push(sample);
    }
    groups
}

fn draw_without_replacement<R: Rng + ?Sized>(
    samples: Vec<TelemetrySample>,
    amount: usize,
    rng: &mut R,
) -> Vec<TelemetrySample> {
    let len = samples.len();
    let mut slots: Vec<Option<TelemetrySample>> = samples.into_iter().map(Some).collect();
    index::sample(rng, len, amount)
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect()
}
