//! Run configurations and sweep enumeration.
//!
//! A sweep is the Cartesian product of the pitch list with the index-paired
//! (rpm, mass flow) list, pitch varying in the outer loop.
use crate::error::{SweepError, SweepResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// One parameter combination and its derived identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub pitch_deg: f64,
    pub rpm: u32,
    pub mass_flow: f64,
    pub run_id: String,
}

impl RunConfig {
    pub fn new(pitch_deg: f64, rpm: u32, mass_flow: f64) -> Self {
        Self {
            pitch_deg,
            rpm,
            mass_flow,
            run_id: build_run_id(pitch_deg, rpm, mass_flow),
        }
    }
}

/// Folder-safe identifier, e.g. `pitch4p00_rpm12500_mdot0p3100`.
///
/// Fixed-point formatting keeps the text stable across equal values; `.` and
/// `-` are swapped for `p` and `m` so the id is usable as a file stem.
pub fn build_run_id(pitch_deg: f64, rpm: u32, mass_flow: f64) -> String {
    let raw = format!("pitch{pitch_deg:.2}_rpm{rpm}_mdot{mass_flow:.4}");
    raw.chars()
        .map(|ch| match ch {
            '.' => 'p',
            '-' => 'm',
            other => other,
        })
        .collect()
}

/// Build the ordered sweep from parallel parameter arrays.
pub fn enumerate_sweep(
    pitch_deg: &[f64],
    rpm: &[u32],
    mass_flow: &[f64],
) -> SweepResult<Vec<RunConfig>> {
    if rpm.len() != mass_flow.len() {
        return Err(SweepError::configuration(format!(
            "rpm and mass_flow must pair by index (got {} rpm values, {} mass_flow values)",
            rpm.len(),
            mass_flow.len()
        )));
    }
    if let Some(bad) = pitch_deg.iter().find(|value| !value.is_finite()) {
        return Err(SweepError::configuration(format!(
            "pitch_deg values must be finite (got {bad})"
        )));
    }
    if let Some(bad) = mass_flow.iter().find(|value| !value.is_finite()) {
        return Err(SweepError::configuration(format!(
            "mass_flow values must be finite (got {bad})"
        )));
    }

    let mut configs = Vec::with_capacity(pitch_deg.len() * rpm.len());
    let mut seen = BTreeSet::new();
    for &pitch in pitch_deg {
        for (&speed, &mdot) in rpm.iter().zip(mass_flow) {
            let config = RunConfig::new(pitch, speed, mdot);
            if !seen.insert(config.run_id.clone()) {
                return Err(SweepError::configuration(format!(
                    "run_id {} is duplicated; parameter combinations must be unique",
                    config.run_id
                )));
            }
            configs.push(config);
        }
    }
    Ok(configs)
}
