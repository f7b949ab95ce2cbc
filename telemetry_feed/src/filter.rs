//! Qualification of raw records and removal of transient engine speeds.

use std::collections::HashMap;

use serde::Serialize;

use crate::record::{TelemetryRecord, TelemetrySample, MIN_ENGINE_SPEED_RPM, VALID_GEARS};

/// Why a record was not kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingEngineSpeed,
    ZeroEngineSpeed,
    EngineSpeedTooLow,
    GearOutOfRange,
    Stationary,
}

/// Row counts for one filtering run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterStats {
    pub input: usize,
    pub missing_engine_speed: usize,
    pub zero_engine_speed: usize,
    pub engine_speed_too_low: usize,
    pub gear_out_of_range: usize,
    pub stationary: usize,
    pub qualified: usize,
    /// Qualified rows dropped because their engine speed occurred only once.
    pub transients: usize,
}

impl FilterStats {
    fn record(&mut self, rejection: Rejection) {
        match rejection {
            Rejection::MissingEngineSpeed => self.missing_engine_speed += 1,
            Rejection::ZeroEngineSpeed => self.zero_engine_speed += 1,
            Rejection::EngineSpeedTooLow => self.engine_speed_too_low += 1,
            Rejection::GearOutOfRange => self.gear_out_of_range += 1,
            Rejection::Stationary => self.stationary += 1,
        }
    }

    pub fn rejected(&self) -> usize {
        self.input - self.qualified
    }
}

/// Checks one record against the sample invariants and converts it.
///
/// Kept records have engine speed above 4000 rpm, a gear in 1..=6 and a
/// nonzero vehicle speed. A missing vehicle speed counts as stationary.
pub fn qualify(record: &TelemetryRecord) -> Result<TelemetrySample, Rejection> {
    let rpm = record
        .engine_speed_rpm
        .ok_or(Rejection::MissingEngineSpeed)?;
    if rpm == 0.0 {
        return Err(Rejection::ZeroEngineSpeed);
    }
    if rpm <= MIN_ENGINE_SPEED_RPM {
        return Err(Rejection::EngineSpeedTooLow);
    }

    let gear = record
        .trans_gear
        .and_then(|g| u8::try_from(g).ok())
        .filter(|g| VALID_GEARS.contains(g))
        .ok_or(Rejection::GearOutOfRange)?;

    let mph = record
        .vehicle_speed_mph
        .filter(|v| *v != 0.0)
        .ok_or(Rejection::Stationary)?;

    Ok(TelemetrySample {
        vehicle_id: record.vehicle_id.clone(),
        time: record.time.clone(),
        trans_gear: gear,
        vehicle_speed_mph: mph,
        engine_speed_rpm: rpm,
    })
}

/// Keeps the records that qualify, in input order.
pub fn filter_records(records: &[TelemetryRecord]) -> (Vec<TelemetrySample>, FilterStats) {
    let mut stats = FilterStats {
        input: records.len(),
        ..FilterStats::default()
    };
    let mut kept = Vec::with_capacity(records.len());
    for record in records {
        match qualify(record) {
            Ok(sample) => kept.push(sample),
            Err(rejection) => stats.record(rejection),
        }
    }
    stats.qualified = kept.len();
    (kept, stats)
}

/// Drops samples whose engine speed occurs only once for their vehicle.
///
/// Returns the surviving samples in input order and the number removed.
pub fn remove_transients(samples: Vec<TelemetrySample>) -> (Vec<TelemetrySample>, usize) {
    let mut counts: HashMap<(&str, u64), usize> = HashMap::new();
    for s in &samples {
        *counts
            .entry((s.vehicle_id.as_str(), s.engine_speed_key()))
            .or_default() += 1;
    }
    let keep: Vec<bool> = samples
        .iter()
        .map(|s| counts[&(s.vehicle_id.as_str(), s.engine_speed_key())] > 1)
        .collect();

    let before = samples.len();
    let kept: Vec<TelemetrySample> = samples
        .into_iter()
        .zip(keep)
        .filter_map(|(s, k)| k.then_some(s))
        .collect();
    let removed = before - kept.len();
    (kept, removed)
}
