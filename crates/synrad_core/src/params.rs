//! Run-time parameters shared by every worker, and the configuration error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors in user-supplied configuration. These halt a load rather than
/// letting the simulation run on fabricated physics.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("maximum {plane} divergence must be positive (got {value})")]
    NonPositiveDivergence { plane: &'static str, value: f64 },

    #[error("invalid photon energy window [{min}, {max}] eV")]
    InvalidEnergyWindow { min: f64, max: f64 },

    #[error("region '{region}' references structure {structure}, but only {count} exist")]
    MissingStructure {
        region: String,
        structure: usize,
        count: usize,
    },

    #[error("region '{0}' has an empty trajectory")]
    EmptyTrajectory(String),

    #[error("invalid beam parameter: {0}")]
    InvalidBeam(String),

    #[error("region '{0}' has both polarization components disabled")]
    NoPolarization(String),

    #[error("material '{name}': {reason}")]
    InvalidMaterial { name: String, reason: String },

    #[error("unknown material '{0}'")]
    UnknownMaterial(String),

    #[error("invalid simulation parameter: {0}")]
    InvalidParams(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Log-spaced energy binning used by per-facet spectrum recorders.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumRange {
    pub energy_min: f64,
    pub energy_max: f64,
    pub bins: usize,
}

impl Default for SpectrumRange {
    fn default() -> Self {
        Self {
            energy_min: 10.0,
            energy_max: 1.0e6,
            bins: 100,
        }
    }
}

impl SpectrumRange {
    /// Bin index of a photon energy, or `None` outside the range.
    pub fn bin(&self, energy: f64) -> Option<usize> {
        if !(energy >= self.energy_min && energy < self.energy_max) {
            return None;
        }
        let t = (energy / self.energy_min).ln() / (self.energy_max / self.energy_min).ln();
        Some(((t * self.bins as f64) as usize).min(self.bins - 1))
    }

    /// Lower edge of bin `i`.
    pub fn bin_start(&self, i: usize) -> f64 {
        let ratio = self.energy_max / self.energy_min;
        self.energy_min * ratio.powf(i as f64 / self.bins as f64)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.energy_min > 0.0 && self.energy_max > self.energy_min) || self.bins == 0 {
            return Err(ConfigError::InvalidParams(format!(
                "spectrum range [{}, {}] with {} bins",
                self.energy_min, self.energy_max, self.bins
            )));
        }
        Ok(())
    }
}

/// Parameters of a whole simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationParams {
    /// Split photon weight on every hit instead of drawing a single outcome.
    pub low_flux_mode: bool,
    /// Surviving weight below which a low-flux photon is absorbed outright.
    pub low_flux_cutoff: f64,
    /// Stop once this many photons have been generated across all workers.
    pub desorption_limit: Option<u64>,
    /// Wall-clock length of one worker time slice.
    pub slice_ms: u64,
    /// Bounded wait when handing a delta to the aggregator.
    pub merge_timeout_ms: u64,
    /// Bounded wait for the final merge before a worker pauses.
    pub pause_merge_timeout_ms: u64,
    /// Base RNG seed; worker `i` uses `seed + i`. `None` seeds from entropy.
    pub seed: Option<u64>,
    pub worker_count: usize,
    pub spectrum: SpectrumRange,
}

impl Default for SimulationParams {
    fn default() -> Self {
        Self {
            low_flux_mode: false,
            low_flux_cutoff: 1e-7,
            desorption_limit: None,
            slice_ms: 100,
            merge_timeout_ms: 100,
            pause_merge_timeout_ms: 5000,
            seed: None,
            worker_count: 1,
            spectrum: SpectrumRange::default(),
        }
    }
}

impl SimulationParams {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.low_flux_cutoff > 0.0 && self.low_flux_cutoff < 1.0) {
            return Err(ConfigError::InvalidParams(format!(
                "low-flux cutoff must lie in (0, 1), got {}",
                self.low_flux_cutoff
            )));
        }
        if self.slice_ms == 0 {
            return Err(ConfigError::InvalidParams("time slice must be positive".into()));
        }
        if self.worker_count == 0 {
            return Err(ConfigError::InvalidParams("at least one worker is required".into()));
        }
        self.spectrum.validate()
    }

    /// This worker's share of the global desorption limit.
    pub fn worker_limit(&self, worker: usize) -> Option<u64> {
        self.desorption_limit.map(|limit| {
            let n = self.worker_count as u64;
            let base = limit / n;
            if (worker as u64) < limit % n {
                base + 1
            } else {
                base
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SimulationParams::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_cutoff() {
        let params = SimulationParams {
            low_flux_cutoff: 0.0,
            ..Default::default()
        };
        assert!(matches!(params.validate(), Err(ConfigError::InvalidParams(_))));
    }

    #[test]
    fn test_worker_limit_shares_sum_to_limit() {
        let params = SimulationParams {
            desorption_limit: Some(10),
            worker_count: 3,
            ..Default::default()
        };
        let shares: Vec<u64> = (0..3).filter_map(|w| params.worker_limit(w)).collect();
        assert_eq!(shares, vec![4, 3, 3]);
        assert_eq!(SimulationParams::default().worker_limit(0), None);
    }

    #[test]
    fn test_spectrum_bins() {
        let range = SpectrumRange {
            energy_min: 1.0,
            energy_max: 1000.0,
            bins: 3,
        };
        assert_eq!(range.bin(0.5), None);
        assert_eq!(range.bin(1.0), Some(0));
        assert_eq!(range.bin(50.0), Some(1));
        assert_eq!(range.bin(999.0), Some(2));
        assert_eq!(range.bin(1000.0), None);
        assert!((range.bin_start(1) - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_params_from_partial_json() {
        let params: SimulationParams =
            serde_json::from_str(r#"{ "low_flux_mode": true, "worker_count": 2 }"#).unwrap();
        assert!(params.low_flux_mode);
        assert_eq!(params.worker_count, 2);
        assert_eq!(params.slice_ms, 100);
    }
}
