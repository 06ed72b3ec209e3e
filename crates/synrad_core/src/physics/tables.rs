//! Precomputed spectral and angular distributions.
//!
//! All tables are in dimensionless units: photon energy as `y = E / E_crit`,
//! angles as `γψ`. They are built once per process and shared read-only by
//! every worker.

use std::time::Instant;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::bessel::{bessel_k13_k23, integral_k53};
use crate::distribution::{cumulative_from_samples, Distribution2D, DistributionResult, LogCumulative};

/// Lower limit of the spectral tables, in units of the critical energy.
pub const SPECTRUM_LOWER: f64 = 1e-10;
/// Upper limit of the spectral tables, in units of the critical energy.
pub const SPECTRUM_UPPER: f64 = 20.0;
/// Log-spaced quadrature steps for the spectral tables.
pub const SPECTRUM_STEPS: usize = 1000;

const VERTICAL_ENERGY_LOWER: f64 = 1e-5;
const VERTICAL_ENERGY_UPPER: f64 = SPECTRUM_UPPER;
const VERTICAL_ENERGY_COUNT: usize = 36;
const VERTICAL_STEPS: usize = 400;
/// Vertical tables stop where the Bessel argument reaches this value.
const VERTICAL_XI_CUTOFF: f64 = 40.0;

const HORIZONTAL_KEY_MAX: f64 = 10.0;
const HORIZONTAL_KEY_COUNT: usize = 41;
const HORIZONTAL_MAX: f64 = 20.0;
const HORIZONTAL_STEPS: usize = 400;

/// Small-argument expansion `∫_y^∞ K_{5/3} ≈ HEAD_COEFF y^{-2/3}`.
const HEAD_COEFF: f64 = 2.1495;

/// Which polarization components contribute to the emitted radiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Polarization {
    Both,
    Parallel,
    Orthogonal,
}

impl Polarization {
    /// Map the two enable flags; `None` when both are off.
    pub fn from_flags(parallel: bool, orthogonal: bool) -> Option<Self> {
        match (parallel, orthogonal) {
            (true, true) => Some(Polarization::Both),
            (true, false) => Some(Polarization::Parallel),
            (false, true) => Some(Polarization::Orthogonal),
            (false, false) => None,
        }
    }

    /// Share of the radiation kept, given the parallel fraction of the total.
    pub fn weight(&self, parallel_fraction: f64) -> f64 {
        match self {
            Polarization::Both => 1.0,
            Polarization::Parallel => parallel_fraction,
            Polarization::Orthogonal => 1.0 - parallel_fraction,
        }
    }
}

/// Cumulative angular distribution split into its polarization components.
#[derive(Debug, Clone)]
pub struct PolarizedCumulative {
    parallel: Distribution2D,
    orthogonal: Distribution2D,
    combined: Distribution2D,
    parallel_total: f64,
    orthogonal_total: f64,
}

impl PolarizedCumulative {
    fn from_samples(xs: &[f64], parallel: &[f64], orthogonal: &[f64]) -> DistributionResult<Self> {
        let combined: Vec<f64> = parallel.iter().zip(orthogonal).map(|(a, b)| a + b).collect();
        let (parallel, parallel_total) = cumulative_from_samples(xs, parallel)?;
        let (orthogonal, orthogonal_total) = cumulative_from_samples(xs, orthogonal)?;
        let (combined, _) = cumulative_from_samples(xs, &combined)?;
        Ok(Self {
            parallel,
            orthogonal,
            combined,
            parallel_total,
            orthogonal_total,
        })
    }

    /// The cumulative table and its total for the selected components.
    pub fn select(&self, polarization: Polarization) -> (&Distribution2D, f64) {
        match polarization {
            Polarization::Both => (&self.combined, self.parallel_total + self.orthogonal_total),
            Polarization::Parallel => (&self.parallel, self.parallel_total),
            Polarization::Orthogonal => (&self.orthogonal, self.orthogonal_total),
        }
    }

    /// Parallel share of the integrated intensity.
    pub fn parallel_fraction(&self) -> f64 {
        let total = self.parallel_total + self.orthogonal_total;
        if total > 0.0 {
            self.parallel_total / total
        } else {
            1.0
        }
    }

    /// Draw an angle from the selected components; `draw` is uniform in [0, 1).
    pub fn sample(&self, polarization: Polarization, draw: f64) -> f64 {
        let (table, total) = self.select(polarization);
        if total <= 0.0 {
            return 0.0;
        }
        table.interpolate_x(draw * total)
    }
}

/// An angular distribution tabulated for one value of its conditioning variable.
#[derive(Debug, Clone)]
pub struct AngleTable {
    /// `ln y` for vertical tables, `γψ` for horizontal tables.
    pub key: f64,
    pub cumulative: PolarizedCumulative,
}

/// All tables needed to sample synchrotron photons.
#[derive(Debug, Clone)]
pub struct PhysicsTables {
    /// Cumulative photon-count spectrum over `y`.
    pub photon_spectrum: LogCumulative,
    /// Cumulative power spectrum over `y`.
    pub power_spectrum: LogCumulative,
    /// Vertical angle `γψ` distributions, keyed by `ln y`.
    pub vertical: Vec<AngleTable>,
    /// Horizontal angle `γχ` distributions, keyed by `γψ`.
    pub horizontal: Vec<AngleTable>,
    /// `ln y` against the parallel share of the photon flux at that energy.
    pub parallel_fraction: Distribution2D,
}

impl PhysicsTables {
    /// Build every table. Angular tables are computed in parallel.
    pub fn build() -> DistributionResult<Self> {
        let start = Instant::now();

        let (photon_spectrum, power_spectrum) = rayon::join(
            || {
                LogCumulative::build(
                    integral_k53,
                    SPECTRUM_LOWER,
                    SPECTRUM_UPPER,
                    SPECTRUM_STEPS,
                    3.0 * HEAD_COEFF * SPECTRUM_LOWER.cbrt(),
                )
            },
            || {
                LogCumulative::build(
                    |y| y * integral_k53(y),
                    SPECTRUM_LOWER,
                    SPECTRUM_UPPER,
                    SPECTRUM_STEPS,
                    0.75 * HEAD_COEFF * SPECTRUM_LOWER.powf(4.0 / 3.0),
                )
            },
        );
        let photon_spectrum = photon_spectrum?;
        let power_spectrum = power_spectrum?;

        let log_step = (VERTICAL_ENERGY_UPPER / VERTICAL_ENERGY_LOWER).ln()
            / (VERTICAL_ENERGY_COUNT - 1) as f64;
        let vertical = (0..VERTICAL_ENERGY_COUNT)
            .into_par_iter()
            .map(|i| vertical_table(VERTICAL_ENERGY_LOWER.ln() + log_step * i as f64))
            .collect::<DistributionResult<Vec<_>>>()?;

        let key_step = HORIZONTAL_KEY_MAX / (HORIZONTAL_KEY_COUNT - 1) as f64;
        let horizontal = (0..HORIZONTAL_KEY_COUNT)
            .into_par_iter()
            .map(|i| horizontal_table(key_step * i as f64))
            .collect::<DistributionResult<Vec<_>>>()?;

        let parallel_fraction = Distribution2D::new(
            vertical.iter().map(|t| t.key).collect(),
            vertical.iter().map(|t| t.cumulative.parallel_fraction()).collect(),
        )?;

        log::info!(
            "Built physics tables in {:.2?} ({} vertical, {} horizontal)",
            start.elapsed(),
            vertical.len(),
            horizontal.len()
        );

        Ok(Self {
            photon_spectrum,
            power_spectrum,
            vertical,
            horizontal,
            parallel_fraction,
        })
    }

    /// Mean photon energy over the whole spectrum, in units of the critical energy.
    pub fn mean_energy_ratio(&self) -> f64 {
        self.photon_spectrum.mean_x
    }

    /// Fraction of emitted photons with `y` in `[y_lo, y_hi]`.
    pub fn photon_fraction(&self, y_lo: f64, y_hi: f64) -> f64 {
        window_fraction(&self.photon_spectrum, y_lo, y_hi)
    }

    /// Fraction of emitted power with `y` in `[y_lo, y_hi]`.
    pub fn power_fraction(&self, y_lo: f64, y_hi: f64) -> f64 {
        window_fraction(&self.power_spectrum, y_lo, y_hi)
    }

    /// Parallel share of the photon flux at `y`.
    pub fn parallel_fraction_at(&self, y: f64) -> f64 {
        let ln_y = y.max(SPECTRUM_LOWER).ln();
        let ln_y = ln_y.clamp(self.parallel_fraction.first_x(), self.parallel_fraction.last_x());
        self.parallel_fraction.interpolate_y(ln_y)
    }

    /// Parallel share averaged (in `ln y`) over a window.
    pub fn mean_parallel_fraction(&self, y_lo: f64, y_hi: f64) -> f64 {
        let lo = self.clamp_ln_key(y_lo);
        let hi = self.clamp_ln_key(y_hi);
        self.parallel_fraction.integral_mean(lo, hi)
    }

    fn clamp_ln_key(&self, y: f64) -> f64 {
        y.max(SPECTRUM_LOWER)
            .ln()
            .clamp(self.parallel_fraction.first_x(), self.parallel_fraction.last_x())
    }

    /// Draw a normalized vertical angle `γψ >= 0` for a photon of energy `y`.
    ///
    /// `pick` selects between the two tables bracketing `ln y`; `draw` inverts the CDF.
    pub fn sample_vertical(&self, y: f64, polarization: Polarization, pick: f64, draw: f64) -> f64 {
        let key = y.max(SPECTRUM_LOWER).ln();
        pick_table(&self.vertical, key, pick).cumulative.sample(polarization, draw)
    }

    /// Draw a normalized horizontal angle `γχ >= 0` given the vertical angle `γψ`.
    pub fn sample_horizontal(&self, vertical: f64, polarization: Polarization, pick: f64, draw: f64) -> f64 {
        pick_table(&self.horizontal, vertical.abs(), pick).cumulative.sample(polarization, draw)
    }
}

fn window_fraction(spectrum: &LogCumulative, y_lo: f64, y_hi: f64) -> f64 {
    if y_hi <= y_lo || spectrum.total <= 0.0 {
        return 0.0;
    }
    let lo = spectrum.cumulative_at(y_lo);
    let hi = spectrum.cumulative_at(y_hi);
    ((hi - lo) / spectrum.total).clamp(0.0, 1.0)
}

/// Pick one of the two tables bracketing `key`, with probability proportional to proximity.
fn pick_table(tables: &[AngleTable], key: f64, pick: f64) -> &AngleTable {
    let upper = tables.partition_point(|t| t.key <= key);
    if upper == 0 {
        return &tables[0];
    }
    if upper >= tables.len() {
        return &tables[tables.len() - 1];
    }
    let lower = upper - 1;
    let span = tables[upper].key - tables[lower].key;
    let frac = if span > 0.0 {
        (key - tables[lower].key) / span
    } else {
        0.0
    };
    if pick < frac {
        &tables[upper]
    } else {
        &tables[lower]
    }
}

/// Vertical distribution at `y = exp(log_y)`.
///
/// Intensity per unit `X = γψ` with `ξ = y (1 + X²)^{3/2} / 2`:
/// parallel `(1 + X²)² K²_{2/3}(ξ)`, orthogonal `(1 + X²) X² K²_{1/3}(ξ)`.
fn vertical_table(log_y: f64) -> DistributionResult<AngleTable> {
    let y = log_y.exp();
    let x_max = ((2.0 * VERTICAL_XI_CUTOFF / y).powf(2.0 / 3.0) - 1.0)
        .max(1.0)
        .sqrt();
    let dx = x_max / (VERTICAL_STEPS - 1) as f64;

    let mut xs = Vec::with_capacity(VERTICAL_STEPS);
    let mut parallel = Vec::with_capacity(VERTICAL_STEPS);
    let mut orthogonal = Vec::with_capacity(VERTICAL_STEPS);
    for i in 0..VERTICAL_STEPS {
        let x = dx * i as f64;
        let s = 1.0 + x * x;
        let xi = 0.5 * y * s.powf(1.5);
        let (k13, k23) = bessel_k13_k23(xi);
        xs.push(x);
        parallel.push(s * s * k23 * k23);
        orthogonal.push(s * x * x * k13 * k13);
    }

    Ok(AngleTable {
        key: log_y,
        cumulative: PolarizedCumulative::from_samples(&xs, &parallel, &orthogonal)?,
    })
}

/// Horizontal distribution of the instantaneous dipole pattern at vertical angle `X`.
///
/// With `s = 1 + X² + Z²`: parallel `(1 + X² - Z²)² / s⁵`, orthogonal `4X²Z² / s⁵`.
fn horizontal_table(x: f64) -> DistributionResult<AngleTable> {
    let dz = HORIZONTAL_MAX / (HORIZONTAL_STEPS - 1) as f64;
    let mut zs = Vec::with_capacity(HORIZONTAL_STEPS);
    let mut parallel = Vec::with_capacity(HORIZONTAL_STEPS);
    let mut orthogonal = Vec::with_capacity(HORIZONTAL_STEPS);
    for i in 0..HORIZONTAL_STEPS {
        let z = dz * i as f64;
        let s = 1.0 + x * x + z * z;
        let s5 = s.powi(5);
        let a = 1.0 + x * x - z * z;
        zs.push(z);
        parallel.push(a * a / s5);
        orthogonal.push(4.0 * x * x * z * z / s5);
    }

    Ok(AngleTable {
        key: x,
        cumulative: PolarizedCumulative::from_samples(&zs, &parallel, &orthogonal)?,
    })
}
