//! Source regions: a beam, its trajectory and the photon energy window.

use serde::{Deserialize, Serialize};

use crate::field::FieldModel;
use crate::params::{ConfigError, ConfigResult};
use crate::physics::{lorentz_gamma, photon_flux, PhysicsTables, Polarization, ELEMENTARY_CHARGE};
use crate::trajectory::{TrajectoryPoint, TrajectorySpec};

/// Which spectrum photon energies are drawn from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationMode {
    /// Energies follow the photon-count spectrum; every photon carries equal flux.
    #[default]
    Flux,
    /// Energies follow the power spectrum; every photon carries equal power.
    Power,
}

/// Twiss parameters and dispersion at a trajectory point (cm, rad).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BeamOptics {
    pub beta_x: f64,
    pub beta_y: f64,
    pub alpha_x: f64,
    pub alpha_y: f64,
    /// Horizontal dispersion (cm).
    pub eta_x: f64,
    /// Horizontal dispersion derivative (rad).
    pub eta_x_prime: f64,
}

impl Default for BeamOptics {
    fn default() -> Self {
        Self {
            beta_x: 100.0,
            beta_y: 100.0,
            alpha_x: 0.0,
            alpha_y: 0.0,
            eta_x: 0.0,
            eta_x_prime: 0.0,
        }
    }
}

/// User-facing description of a source region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegionParams {
    pub name: String,
    pub beam_energy_gev: f64,
    /// Beam current (A).
    pub current: f64,
    /// Photon energy window (eV).
    pub energy_min: f64,
    pub energy_max: f64,
    pub parallel_polarization: bool,
    pub orthogonal_polarization: bool,
    /// Largest accepted vertical divergence (rad).
    pub max_vertical_angle: f64,
    /// Largest accepted horizontal divergence (rad).
    pub max_horizontal_angle: f64,
    pub generation_mode: GenerationMode,
    /// Total emittance (cm·rad); zero is an ideal beam.
    pub emittance: f64,
    /// Vertical to horizontal emittance ratio.
    pub coupling: f64,
    /// Relative energy spread.
    pub energy_spread: f64,
    pub optics: BeamOptics,
    /// Structure the photons start in.
    pub structure: usize,
    /// Trajectory length represented by one point (cm).
    pub path_element: f64,
    pub field: FieldModel,
    pub trajectory: TrajectorySpec,
}

impl Default for RegionParams {
    fn default() -> Self {
        Self {
            name: "region".into(),
            beam_energy_gev: 3.0,
            current: 0.1,
            energy_min: 10.0,
            energy_max: 1.0e5,
            parallel_polarization: true,
            orthogonal_polarization: true,
            max_vertical_angle: std::f64::consts::FRAC_PI_2,
            max_horizontal_angle: std::f64::consts::FRAC_PI_2,
            generation_mode: GenerationMode::Flux,
            emittance: 0.0,
            coupling: 0.0,
            energy_spread: 0.0,
            optics: BeamOptics::default(),
            structure: 0,
            path_element: 1.0,
            field: FieldModel::default(),
            trajectory: TrajectorySpec::default(),
        }
    }
}

impl RegionParams {
    pub fn validate(&self) -> ConfigResult<()> {
        if !(self.max_vertical_angle > 0.0) {
            return Err(ConfigError::NonPositiveDivergence {
                plane: "vertical",
                value: self.max_vertical_angle,
            });
        }
        if !(self.max_horizontal_angle > 0.0) {
            return Err(ConfigError::NonPositiveDivergence {
                plane: "horizontal",
                value: self.max_horizontal_angle,
            });
        }
        if !(self.energy_min > 0.0 && self.energy_max > self.energy_min) {
            return Err(ConfigError::InvalidEnergyWindow {
                min: self.energy_min,
                max: self.energy_max,
            });
        }
        if self.polarization().is_none() {
            return Err(ConfigError::NoPolarization(self.name.clone()));
        }

        let beam = |what: &str, value: f64| {
            ConfigError::InvalidBeam(format!("{what} = {value} in region '{}'", self.name))
        };
        if !(self.beam_energy_gev > 0.0) {
            return Err(beam("beam energy", self.beam_energy_gev));
        }
        if !(self.current >= 0.0) {
            return Err(beam("current", self.current));
        }
        if !(self.path_element > 0.0) {
            return Err(beam("path element", self.path_element));
        }
        if !(self.emittance >= 0.0) {
            return Err(beam("emittance", self.emittance));
        }
        if !(self.coupling >= 0.0) {
            return Err(beam("coupling", self.coupling));
        }
        if !(self.energy_spread >= 0.0) {
            return Err(beam("energy spread", self.energy_spread));
        }
        if !(self.optics.beta_x > 0.0 && self.optics.beta_y > 0.0) {
            return Err(beam("beta", self.optics.beta_x.min(self.optics.beta_y)));
        }
        Ok(())
    }

    pub fn polarization(&self) -> Option<Polarization> {
        Polarization::from_flags(self.parallel_polarization, self.orthogonal_polarization)
    }
}

/// Fractions of one point's spectrum that fall in the energy window.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SpectralWindow {
    pub critical_energy: f64,
    /// Window limits in units of the critical energy.
    pub y_min: f64,
    pub y_max: f64,
    pub photon_fraction: f64,
    pub power_fraction: f64,
    /// Parallel share averaged over the window.
    pub parallel_fraction: f64,
    /// Share kept by the enabled polarization components.
    pub polarization_weight: f64,
}

/// Deterministic totals of a region inside its energy window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct RegionSummary {
    pub points: usize,
    /// Photons per second.
    pub flux: f64,
    /// Watts.
    pub power: f64,
}

/// A validated region with its trajectory.
#[derive(Debug, Clone)]
pub struct Region {
    pub params: RegionParams,
    pub points: Vec<TrajectoryPoint>,
    pub polarization: Polarization,
    pub gamma: f64,
    /// Horizontal emittance after the coupling split.
    pub emittance_x: f64,
    pub emittance_y: f64,
}

impl Region {
    pub fn build(params: RegionParams, structure_count: usize) -> ConfigResult<Self> {
        params.validate()?;
        if params.structure >= structure_count {
            return Err(ConfigError::MissingStructure {
                region: params.name.clone(),
                structure: params.structure,
                count: structure_count,
            });
        }
        let polarization = params
            .polarization()
            .ok_or_else(|| ConfigError::NoPolarization(params.name.clone()))?;

        let points = params.trajectory.build(
            &params.field,
            params.beam_energy_gev,
            params.path_element,
            &params.optics,
        )?;
        if points.is_empty() {
            return Err(ConfigError::EmptyTrajectory(params.name.clone()));
        }

        let emittance_x = params.emittance / (1.0 + params.coupling);
        let emittance_y = params.emittance * params.coupling / (1.0 + params.coupling);
        Ok(Self {
            gamma: lorentz_gamma(params.beam_energy_gev),
            params,
            points,
            polarization,
            emittance_x,
            emittance_y,
        })
    }

    pub fn has_emittance(&self) -> bool {
        self.params.emittance > 0.0
    }

    /// Window fractions for a given critical energy.
    pub fn window(&self, tables: &PhysicsTables, critical_energy: f64) -> SpectralWindow {
        if !(critical_energy > 0.0) {
            return SpectralWindow::default();
        }
        let y_min = self.params.energy_min / critical_energy;
        let y_max = self.params.energy_max / critical_energy;
        let parallel_fraction = tables.mean_parallel_fraction(y_min, y_max);
        SpectralWindow {
            critical_energy,
            y_min,
            y_max,
            photon_fraction: tables.photon_fraction(y_min, y_max),
            power_fraction: tables.power_fraction(y_min, y_max),
            parallel_fraction,
            polarization_weight: self.polarization.weight(parallel_fraction),
        }
    }

    /// Photons per second over the whole spectrum from one path element of radius `radius`.
    pub fn total_flux(&self, radius: f64) -> f64 {
        photon_flux(self.gamma, self.params.current, self.params.path_element, radius)
    }

    /// Total flux and power of the region inside its window.
    pub fn summary(&self, tables: &PhysicsTables) -> RegionSummary {
        let mean_y = tables.mean_energy_ratio();
        let mut summary = RegionSummary {
            points: self.points.len(),
            ..Default::default()
        };
        for p in &self.points {
            let window = self.window(tables, p.critical_energy);
            let flux = self.total_flux(p.radius);
            let power = flux * mean_y * p.critical_energy * ELEMENTARY_CHARGE;
            summary.flux += flux * window.photon_fraction * window.polarization_weight;
            summary.power += power * window.power_fraction * window.polarization_weight;
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;
    use std::sync::OnceLock;

    fn tables() -> &'static PhysicsTables {
        static TABLES: OnceLock<PhysicsTables> = OnceLock::new();
        TABLES.get_or_init(|| PhysicsTables::build().unwrap())
    }

    fn bend() -> RegionParams {
        RegionParams {
            field: FieldModel::Uniform { field: DVec3::Y },
            trajectory: TrajectorySpec::Integrated {
                start: DVec3::ZERO,
                direction: DVec3::Z,
                length: 10.0,
            },
            energy_min: 1e-3,
            energy_max: 1e9,
            ..Default::default()
        }
    }

    #[test]
    fn test_default_region_builds() {
        let region = Region::build(RegionParams::default(), 1).unwrap();
        assert_eq!(region.points.len(), 100);
        assert_eq!(region.polarization, Polarization::Both);
    }

    #[test]
    fn test_validation_errors() {
        let p = RegionParams {
            max_vertical_angle: 0.0,
            ..Default::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::NonPositiveDivergence { plane: "vertical", .. })));

        let p = RegionParams {
            parallel_polarization: false,
            orthogonal_polarization: false,
            ..Default::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::NoPolarization(_))));

        let p = RegionParams {
            energy_min: 100.0,
            energy_max: 10.0,
            ..Default::default()
        };
        assert!(matches!(p.validate(), Err(ConfigError::InvalidEnergyWindow { .. })));

        assert!(matches!(
            Region::build(RegionParams::default(), 0),
            Err(ConfigError::MissingStructure { structure: 0, count: 0, .. })
        ));
    }

    #[test]
    fn test_coupling_splits_emittance() {
        let p = RegionParams {
            emittance: 3e-7,
            coupling: 0.5,
            ..Default::default()
        };
        let r = Region::build(p, 1).unwrap();
        assert!((r.emittance_x - 2e-7).abs() < 1e-20);
        assert!((r.emittance_y - 1e-7).abs() < 1e-20);
        assert!((r.emittance_x + r.emittance_y - 3e-7).abs() < 1e-20);
    }

    #[test]
    fn test_summary_matches_dipole_power() {
        let region = Region::build(bend(), 1).unwrap();
        let s = region.summary(tables());
        // U0[keV] = 88.46 E⁴ / R[m] per turn; P[kW] = U0 I, spread over 2πR
        let r_m = region.points[0].radius / 100.0;
        let ring_kw = 88.46 * 3f64.powi(4) / r_m * 0.1;
        let expected = ring_kw * 1000.0 * 0.1 / (2.0 * std::f64::consts::PI * r_m);
        assert!((s.power - expected).abs() / expected < 1e-2, "{} vs {}", s.power, expected);
        assert!(s.flux > 0.0);
    }

    #[test]
    fn test_window_and_polarization_reduce_totals() {
        let full = Region::build(bend(), 1).unwrap().summary(tables());
        let narrow = Region::build(
            RegionParams {
                energy_min: 1000.0,
                energy_max: 2000.0,
                ..bend()
            },
            1,
        )
        .unwrap()
        .summary(tables());
        assert!(narrow.flux < full.flux && narrow.power < full.power);

        let ortho = Region::build(
            RegionParams {
                parallel_polarization: false,
                ..bend()
            },
            1,
        )
        .unwrap()
        .summary(tables());
        assert!(ortho.flux < 0.5 * full.flux);
    }

    #[test]
    fn test_straight_section_emits_nothing() {
        let region = Region::build(RegionParams::default(), 1).unwrap();
        let s = region.summary(tables());
        assert_eq!(s.flux, 0.0);
        assert_eq!(s.power, 0.0);
    }
}
