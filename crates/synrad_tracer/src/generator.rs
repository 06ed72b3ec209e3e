//! Photon generation at a trajectory point.
//!
//! A photon starts from the electron's position, displaced by the beam
//! emittance when the region has one. Its energy is drawn from the cumulative
//! photon or power spectrum restricted to the region's energy window, and its
//! direction from the vertical and horizontal angle tables. Degenerate points
//! (no bending field, empty window) give a zero-weight "virtual" photon
//! instead of an error.

use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use synrad_core::field::orthogonal_component;
use synrad_core::physics::{bending_radius, critical_energy, ELEMENTARY_CHARGE, INFINITE_RADIUS};
use synrad_core::{
    BeamOptics, GenerationMode, MagneticField, PhysicsTables, Region, SpectralWindow,
    TrajectoryPoint,
};
use synrad_math::{orthonormal_basis, DVec3};

/// Windows holding less than this share of the spectrum emit nothing.
const MIN_WINDOW_FRACTION: f64 = 1e-10;
/// Redraws allowed before an angle is clamped to its maximum.
const MAX_ANGLE_ATTEMPTS: usize = 1000;

/// A photon ready for tracing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Photon {
    pub position: DVec3,
    pub direction: DVec3,
    /// eV
    pub energy: f64,
    /// photons/s carried by this trace
    pub flux: f64,
    /// W carried by this trace
    pub power: f64,
    /// Parallel share of the emission at this energy.
    pub polarization_fraction: f64,
    /// ψ, rad
    pub vertical_angle: f64,
    /// χ, rad
    pub horizontal_angle: f64,
    /// Structure the photon starts in.
    pub structure: usize,
}

impl Photon {
    /// True for photons that carry no weight and are not traced.
    pub fn is_virtual(&self) -> bool {
        !(self.flux > 0.0 || self.power > 0.0)
    }
}

/// Per-worker memo of the last spectral window.
///
/// Consecutive points of a bend share their critical energy, so the window
/// fractions are recomputed only when the region or critical energy changes.
#[derive(Debug, Clone, Default)]
pub struct GeneratorCache {
    key: Option<(usize, f64)>,
    window: SpectralWindow,
    hits: u64,
    misses: u64,
}

impl GeneratorCache {
    pub fn window(
        &mut self,
        tables: &PhysicsTables,
        region_index: usize,
        region: &Region,
        critical_energy: f64,
    ) -> SpectralWindow {
        let key = (region_index, critical_energy);
        if self.key == Some(key) {
            self.hits += 1;
            return self.window;
        }
        self.misses += 1;
        self.window = region.window(tables, critical_energy);
        self.key = Some(key);
        self.window
    }

    pub fn hits(&self) -> u64 {
        self.hits
    }

    pub fn misses(&self) -> u64 {
        self.misses
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Transverse displacement of one electron from the reference orbit.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BeamOffset {
    pub x: f64,
    pub x_prime: f64,
    pub y: f64,
    pub y_prime: f64,
}

/// Transverse axes `(x̂, ŷ)` at a point moving along `direction`.
///
/// `ŷ` follows the transverse part of the field, falling back to global Y
/// and then to an arbitrary perpendicular. `x̂ = ŷ × direction`.
pub fn transverse_frame(direction: DVec3, field: DVec3) -> (DVec3, DVec3) {
    let y_axis = (field - direction * field.dot(direction))
        .try_normalize()
        .or_else(|| (DVec3::Y - direction * direction.y).try_normalize())
        .unwrap_or_else(|| orthonormal_basis(direction).1);
    (y_axis.cross(direction), y_axis)
}

/// Draw `(offset, angle)` in one plane from the Twiss ellipse.
///
/// The phase-space covariance `ε[[β, -α], [-α, γ]]` is diagonalised; a
/// Gaussian pair is drawn along its principal axes and rotated back.
pub fn sample_plane(emittance: f64, beta: f64, alpha: f64, rng: &mut dyn RngCore) -> (f64, f64) {
    if !(emittance > 0.0 && beta > 0.0) {
        return (0.0, 0.0);
    }
    let gamma = (1.0 + alpha * alpha) / beta;
    let theta = 0.5 * (-2.0 * alpha).atan2(beta - gamma);
    let mean = 0.5 * (beta + gamma);
    let root = (0.25 * (beta - gamma).powi(2) + alpha * alpha).sqrt();
    let major = (emittance * (mean + root)).sqrt();
    let minor = (emittance * (mean - root).max(0.0)).sqrt();

    let g1: f64 = rng.sample(StandardNormal);
    let g2: f64 = rng.sample(StandardNormal);
    let (a, b) = (major * g1, minor * g2);
    let (sin_t, cos_t) = theta.sin_cos();
    (a * cos_t - b * sin_t, a * sin_t + b * cos_t)
}

/// Offset of one electron including dispersion from the energy spread.
pub fn sample_offset(region: &Region, optics: &BeamOptics, rng: &mut dyn RngCore) -> BeamOffset {
    let (mut x, mut x_prime) = sample_plane(region.emittance_x, optics.beta_x, optics.alpha_x, rng);
    let (y, y_prime) = sample_plane(region.emittance_y, optics.beta_y, optics.alpha_y, rng);
    if region.params.energy_spread > 0.0 {
        let delta = region.params.energy_spread * rng.sample::<f64, _>(StandardNormal);
        x += optics.eta_x * delta;
        x_prime += optics.eta_x_prime * delta;
    }
    BeamOffset {
        x,
        x_prime,
        y,
        y_prime,
    }
}

/// Draw an angle magnitude until it is at most `max`, clamping after the last attempt.
fn draw_angle(max: f64, rng: &mut dyn RngCore, mut draw: impl FnMut(&mut dyn RngCore) -> f64) -> f64 {
    let mut angle = f64::INFINITY;
    for _ in 0..MAX_ANGLE_ATTEMPTS {
        angle = draw(rng);
        if angle <= max {
            return angle;
        }
    }
    angle.min(max)
}

fn random_sign(value: f64, rng: &mut dyn RngCore) -> f64 {
    if rng.gen::<bool>() {
        -value
    } else {
        value
    }
}

/// Turns trajectory points into photons using the shared physics tables.
pub struct PhotonGenerator<'a> {
    tables: &'a PhysicsTables,
}

impl<'a> PhotonGenerator<'a> {
    pub fn new(tables: &'a PhysicsTables) -> Self {
        Self { tables }
    }

    /// Generate one photon from `point` of region `region_index`.
    pub fn generate(
        &self,
        region_index: usize,
        region: &Region,
        point: &TrajectoryPoint,
        cache: &mut GeneratorCache,
        rng: &mut dyn RngCore,
    ) -> Photon {
        let params = &region.params;
        let mut position = point.position;
        let mut direction = point.direction;
        let mut field = point.field;
        let mut radius = point.radius;
        let mut ec = point.critical_energy;

        if region.has_emittance() || params.energy_spread > 0.0 {
            let (x_axis, y_axis) = transverse_frame(direction, field);
            let offset = sample_offset(region, &point.optics, rng);
            position += x_axis * offset.x + y_axis * offset.y;
            direction = (direction + x_axis * offset.x_prime + y_axis * offset.y_prime).normalize();
            field = params.field.field_at(position);
            radius = bending_radius(params.beam_energy_gev, orthogonal_component(field, direction));
            ec = critical_energy(region.gamma, radius);
        }

        let mut photon = Photon {
            position,
            direction,
            energy: 0.0,
            flux: 0.0,
            power: 0.0,
            polarization_fraction: 0.0,
            vertical_angle: 0.0,
            horizontal_angle: 0.0,
            structure: params.structure,
        };
        if radius >= INFINITE_RADIUS || !(ec > 0.0) {
            return photon;
        }
        let window = cache.window(self.tables, region_index, region, ec);
        if window.photon_fraction < MIN_WINDOW_FRACTION {
            return photon;
        }

        let spectrum = match params.generation_mode {
            GenerationMode::Flux => &self.tables.photon_spectrum,
            GenerationMode::Power => &self.tables.power_spectrum,
        };
        let lo = spectrum.cumulative_at(window.y_min);
        let hi = spectrum.cumulative_at(window.y_max);
        let y = spectrum
            .inverse(lo + rng.gen::<f64>() * (hi - lo))
            .clamp(window.y_min, window.y_max);
        let energy = y * ec;

        let gamma = region.gamma;
        let polarization = region.polarization;
        let tables = self.tables;
        let psi = draw_angle(params.max_vertical_angle, rng, |rng| {
            tables.sample_vertical(y, polarization, rng.gen(), rng.gen()) / gamma
        });
        let chi = draw_angle(params.max_horizontal_angle, rng, |rng| {
            tables.sample_horizontal(psi * gamma, polarization, rng.gen(), rng.gen()) / gamma
        });
        let psi = random_sign(psi, rng);
        let chi = random_sign(chi, rng);

        let (x_axis, y_axis) = transverse_frame(direction, field);
        let (sin_psi, cos_psi) = psi.sin_cos();
        let (sin_chi, cos_chi) = chi.sin_cos();
        photon.direction = (direction * (cos_psi * cos_chi)
            + x_axis * (cos_psi * sin_chi)
            + y_axis * sin_psi)
            .normalize();

        let total = region.total_flux(radius);
        let (flux, power) = match params.generation_mode {
            GenerationMode::Flux => {
                let flux = total * window.photon_fraction * window.polarization_weight;
                (flux, flux * ELEMENTARY_CHARGE * energy)
            }
            GenerationMode::Power => {
                let power = total
                    * self.tables.mean_energy_ratio()
                    * ec
                    * ELEMENTARY_CHARGE
                    * window.power_fraction
                    * window.polarization_weight;
                (power / (ELEMENTARY_CHARGE * energy), power)
            }
        };

        photon.energy = energy;
        photon.flux = flux;
        photon.power = power;
        photon.polarization_fraction = self.tables.parallel_fraction_at(y);
        photon.vertical_angle = psi;
        photon.horizontal_angle = chi;
        photon
    }
}
