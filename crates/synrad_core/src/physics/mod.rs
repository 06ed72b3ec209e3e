//! Synchrotron radiation physics: constants, beam kinematics and the
//! precomputed spectral and angular tables.
//!
//! Units follow the rest of the crate: lengths in cm, beam energy in GeV,
//! photon energy in eV, field in T, current in A.

mod bessel;
mod tables;

pub use bessel::{bessel_k, bessel_k13_k23, integral_k53};
pub use tables::{AngleTable, PhysicsTables, Polarization, PolarizedCumulative};

/// Electron rest energy in GeV.
pub const ELECTRON_REST_ENERGY_GEV: f64 = 0.510_998_950e-3;

/// `R[cm] = E[GeV] / (BENDING_CONSTANT * B[T])`.
pub const BENDING_CONSTANT: f64 = 0.002_997_924_58;

/// `E_crit[eV] = CRITICAL_ENERGY_CONSTANT * γ³ / R[cm]` (3ħc/2 in eV·cm).
pub const CRITICAL_ENERGY_CONSTANT: f64 = 2.959_9e-5;

/// Elementary charge in C (also J per eV).
pub const ELEMENTARY_CHARGE: f64 = 1.602_176_634e-19;

/// Photons emitted per electron per radian of bend, divided by γ: `5α / (2√3)`.
pub const PHOTONS_PER_RADIAN_PER_GAMMA: f64 = 0.010_532_82;

/// Orthogonal field components below this (T) count as zero.
pub const NEGLIGIBLE_FIELD: f64 = 1e-10;

/// Bending radius assigned to a straight path (cm).
pub const INFINITE_RADIUS: f64 = 1e30;

/// Lorentz factor of an electron of the given energy.
pub fn lorentz_gamma(beam_energy_gev: f64) -> f64 {
    beam_energy_gev / ELECTRON_REST_ENERGY_GEV
}

/// Bending radius (cm) produced by the field component orthogonal to the motion.
pub fn bending_radius(beam_energy_gev: f64, b_orthogonal: f64) -> f64 {
    let b = b_orthogonal.abs();
    if b < NEGLIGIBLE_FIELD {
        INFINITE_RADIUS
    } else {
        beam_energy_gev / (BENDING_CONSTANT * b)
    }
}

/// Critical photon energy (eV) for a given Lorentz factor and radius (cm).
pub fn critical_energy(gamma: f64, radius_cm: f64) -> f64 {
    if radius_cm >= INFINITE_RADIUS {
        return 0.0;
    }
    CRITICAL_ENERGY_CONSTANT * gamma.powi(3) / radius_cm
}

/// Photons per second emitted over `path_element` cm of a bend of radius `radius_cm`,
/// integrated over the whole spectrum.
pub fn photon_flux(gamma: f64, current: f64, path_element: f64, radius_cm: f64) -> f64 {
    if radius_cm >= INFINITE_RADIUS {
        return 0.0;
    }
    PHOTONS_PER_RADIAN_PER_GAMMA * gamma * (current / ELEMENTARY_CHARGE) * (path_element / radius_cm)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bending_radius() {
        // 3 GeV in 1 T bends with a radius of ~10 m
        let r = bending_radius(3.0, 1.0);
        assert!((r - 1000.69).abs() < 0.1, "r = {r}");
        assert_eq!(bending_radius(3.0, 0.0), INFINITE_RADIUS);
        assert_eq!(bending_radius(3.0, -1.0), r);
    }

    #[test]
    fn test_critical_energy() {
        // E_c[keV] = 0.665 E[GeV]^2 B[T]
        let gamma = lorentz_gamma(3.0);
        let r = bending_radius(3.0, 1.0);
        let ec = critical_energy(gamma, r);
        assert!((ec - 5985.0).abs() / 5985.0 < 2e-3, "ec = {ec}");
        assert_eq!(critical_energy(gamma, INFINITE_RADIUS), 0.0);
    }

    #[test]
    fn test_total_power_matches_sands_formula() {
        // P[kW] = 88.46 E^4 I / rho[m] for a full turn
        let gamma = lorentz_gamma(3.0);
        let r = bending_radius(3.0, 1.0);
        let circumference = 2.0 * std::f64::consts::PI * r;
        let flux = photon_flux(gamma, 1.0, circumference, r);
        let mean_energy = 8.0 / (15.0 * 3f64.sqrt()) * critical_energy(gamma, r);
        let power_kw = flux * mean_energy * ELEMENTARY_CHARGE / 1000.0;
        let expected = 88.46 * 81.0 / (r / 100.0);
        assert!((power_kw - expected).abs() / expected < 2e-3, "{power_kw} vs {expected}");
    }

    #[test]
    fn test_straight_path_has_no_flux() {
        assert_eq!(photon_flux(5000.0, 0.5, 1.0, INFINITE_RADIUS), 0.0);
    }
}
