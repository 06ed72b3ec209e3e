//! Outcome selection and reflected direction synthesis.
//!
//! Every facet kind goes through the same two steps: [`probabilities`] gives
//! the forward/diffuse/back/transparent split at a hit, and [`reflect`]
//! builds the outgoing direction for the chosen outcome.

use std::f64::consts::{FRAC_PI_2, PI};

use rand::{Rng, RngCore};
use rand_distr::StandardNormal;
use synrad_core::geometry::{Facet, Reflection, Roughness};
use synrad_core::ScatteringProbabilities;
use synrad_math::DVec3;

/// `λ[nm] = HC_EV_NM / E[eV]`.
const HC_EV_NM: f64 = 1239.84;
/// Attempts at a surface tilt that keeps the reflection above the surface.
const MAX_TILT_ATTEMPTS: usize = 100;

/// What happens to a photon at a hard hit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Forward,
    Diffuse,
    Back,
    Transparent,
    Absorbed,
}

/// Outcome probabilities at a hit with the given photon energy and grazing angle.
pub fn probabilities(facet: &Facet, energy: f64, grazing_angle: f64) -> ScatteringProbabilities {
    let reflected = (1.0 - facet.sticking).clamp(0.0, 1.0);
    match &facet.reflection {
        Reflection::Diffuse => ScatteringProbabilities {
            diffuse: reflected,
            ..Default::default()
        },
        Reflection::Specular => ScatteringProbabilities::specular(reflected),
        Reflection::Material(material) => material.lookup(energy, grazing_angle),
    }
}

/// Pick an outcome with a uniform draw `u` in [0, 1).
pub fn choose(p: &ScatteringProbabilities, u: f64) -> Outcome {
    let mut edge = p.forward;
    if u < edge {
        return Outcome::Forward;
    }
    edge += p.diffuse;
    if u < edge {
        return Outcome::Diffuse;
    }
    edge += p.back;
    if u < edge {
        return Outcome::Back;
    }
    edge += p.transparent;
    if u < edge {
        return Outcome::Transparent;
    }
    Outcome::Absorbed
}

/// Pick among the non-absorbing outcomes, renormalized. `None` if all are zero.
pub fn choose_surviving(p: &ScatteringProbabilities, u: f64) -> Option<Outcome> {
    let total = p.reflected() + p.transparent;
    if total <= 0.0 {
        return None;
    }
    match choose(p, u * total) {
        Outcome::Absorbed => Some(Outcome::Transparent),
        outcome => Some(outcome),
    }
}

/// Cosine-weighted direction in the hemisphere around `normal`.
pub fn diffuse_direction(normal: DVec3, nu: DVec3, nv: DVec3, rng: &mut dyn RngCore) -> DVec3 {
    let theta = rng.gen::<f64>().sqrt().acos();
    let phi = 2.0 * PI * rng.gen::<f64>();
    let (sin_t, cos_t) = theta.sin_cos();
    let (sin_p, cos_p) = phi.sin_cos();
    (nu * (sin_t * cos_p) + nv * (sin_t * sin_p) + normal * cos_t).normalize()
}

pub fn mirror(direction: DVec3, normal: DVec3) -> DVec3 {
    direction - normal * (2.0 * direction.dot(normal))
}

/// Probability of a specular reflection off a rough surface (Debye-Waller).
pub fn specular_probability(roughness: &Roughness, energy: f64, grazing_angle: f64) -> f64 {
    if energy <= 0.0 {
        return 1.0;
    }
    let wavelength = HC_EV_NM / energy;
    let x = 4.0 * PI * roughness.rms * grazing_angle.sin() / wavelength;
    (-x * x).exp()
}

/// Surface normal for a forward reflection, tilted when the surface is rough.
///
/// With probability [`specular_probability`] the mean surface is used. Otherwise
/// the normal is tilted by two Gaussian angles of width `atan(σ/T)`, truncated
/// to less than π/2, redrawing until the mirrored ray leaves the surface.
fn rough_normal(
    facet: &Facet,
    roughness: &Roughness,
    direction: DVec3,
    normal: DVec3,
    energy: f64,
    grazing_angle: f64,
    rng: &mut dyn RngCore,
) -> DVec3 {
    if rng.gen::<f64>() < specular_probability(roughness, energy, grazing_angle) {
        return normal;
    }
    let sigma = if roughness.correlation_length > 0.0 {
        (roughness.rms / roughness.correlation_length).atan()
    } else {
        0.0
    };
    if sigma <= 0.0 {
        return normal;
    }

    for _ in 0..MAX_TILT_ATTEMPTS {
        let a = sigma * rng.sample::<f64, _>(StandardNormal);
        let b = sigma * rng.sample::<f64, _>(StandardNormal);
        if a.abs() >= FRAC_PI_2 || b.abs() >= FRAC_PI_2 {
            continue;
        }
        let tilted = (normal + facet.nu * a.tan() + facet.nv * b.tan()).normalize();
        if direction.dot(tilted) >= 0.0 {
            continue;
        }
        if mirror(direction, tilted).dot(normal) > 0.0 {
            return tilted;
        }
    }
    normal
}

/// Outgoing direction for `outcome`.
///
/// `normal` is the facet normal on the side the photon arrives from.
pub fn reflect(
    facet: &Facet,
    outcome: Outcome,
    direction: DVec3,
    normal: DVec3,
    energy: f64,
    grazing_angle: f64,
    rng: &mut dyn RngCore,
) -> DVec3 {
    match outcome {
        Outcome::Forward => {
            let n = match &facet.roughness {
                Some(r) => rough_normal(facet, r, direction, normal, energy, grazing_angle, rng),
                None => normal,
            };
            mirror(direction, n).normalize()
        }
        Outcome::Diffuse => diffuse_direction(normal, facet.nu, facet.nv, rng),
        Outcome::Back => -direction,
        Outcome::Transparent | Outcome::Absorbed => direction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{material_facet_geometry, single_facet_geometry};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use synrad_core::geometry::ReflectionDescriptor;
    use synrad_core::{FacetDescriptor, MaterialDescriptor};

    #[test]
    fn test_choose_partitions() {
        let p = ScatteringProbabilities {
            forward: 0.1,
            diffuse: 0.2,
            back: 0.3,
            transparent: 0.1,
        };
        assert_eq!(choose(&p, 0.05), Outcome::Forward);
        assert_eq!(choose(&p, 0.25), Outcome::Diffuse);
        assert_eq!(choose(&p, 0.55), Outcome::Back);
        assert_eq!(choose(&p, 0.65), Outcome::Transparent);
        assert_eq!(choose(&p, 0.75), Outcome::Absorbed);
        assert_eq!(choose_surviving(&p, 0.99), Some(Outcome::Transparent));
        assert_eq!(choose_surviving(&ScatteringProbabilities::default(), 0.5), None);
    }

    #[test]
    fn test_probabilities_by_kind() {
        let g = single_facet_geometry(FacetDescriptor {
            sticking: 0.3,
            ..Default::default()
        });
        let p = probabilities(&g.facets[0], 100.0, 0.1);
        assert!((p.diffuse - 0.7).abs() < 1e-12);
        assert!((p.absorption() - 0.3).abs() < 1e-12);

        let g = single_facet_geometry(FacetDescriptor {
            sticking: 0.4,
            reflection: ReflectionDescriptor::Specular,
            ..Default::default()
        });
        let p = probabilities(&g.facets[0], 100.0, 0.1);
        assert!((p.forward - 0.6).abs() < 1e-12);
        assert_eq!(p.diffuse, 0.0);
        assert!((p.absorption() - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_material_probabilities_follow_the_table() {
        let forward = |forward| ScatteringProbabilities {
            forward,
            ..Default::default()
        };
        let g = material_facet_geometry(&MaterialDescriptor {
            name: "mirror".into(),
            energies: vec![10.0, 1000.0],
            angles: vec![0.0, 0.1],
            table: vec![vec![forward(0.8), forward(0.4)], vec![forward(0.6), forward(0.2)]],
        });
        let facet = &g.facets[0];

        let p = probabilities(facet, 10.0, 0.05);
        assert!((p.forward - 0.6).abs() < 1e-12);
        let p = probabilities(facet, 505.0, 0.0);
        assert!((p.forward - 0.7).abs() < 1e-12);
        let p = probabilities(facet, 1000.0, 0.1);
        assert!((p.forward - 0.2).abs() < 1e-12);
        assert!((p.absorption() - 0.8).abs() < 1e-12);
        // Past the table edges the last entries hold
        let p = probabilities(facet, 1.0e5, 1.0);
        assert!((p.forward - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_mirror() {
        let d = DVec3::new(1.0, 0.0, 1.0).normalize();
        let r = mirror(d, -DVec3::Z);
        assert!((r - DVec3::new(1.0, 0.0, -1.0).normalize()).length() < 1e-12);
    }

    #[test]
    fn test_diffuse_is_cosine_weighted() {
        let mut rng = StdRng::seed_from_u64(11);
        let n = DVec3::Z;
        let samples = 50_000;
        let mut mean_cos = 0.0;
        for _ in 0..samples {
            let d = diffuse_direction(n, DVec3::X, DVec3::Y, &mut rng);
            assert!(d.dot(n) >= 0.0);
            mean_cos += d.dot(n);
        }
        mean_cos /= samples as f64;
        // E[cos θ] = 2/3 for a cosine-weighted hemisphere
        assert!((mean_cos - 2.0 / 3.0).abs() < 0.01, "mean cos = {mean_cos}");
    }

    #[test]
    fn test_specular_probability_limits() {
        let r = Roughness {
            rms: 1.0,
            correlation_length: 1000.0,
        };
        assert!((specular_probability(&r, 100.0, 0.0) - 1.0).abs() < 1e-12);
        let soft = specular_probability(&r, 10.0, 0.01);
        let hard = specular_probability(&r, 10_000.0, 0.01);
        assert!(soft > hard);
    }

    #[test]
    fn test_rough_reflection_stays_above_surface() {
        let g = single_facet_geometry(FacetDescriptor {
            reflection: synrad_core::geometry::ReflectionDescriptor::Specular,
            roughness: Some(Roughness {
                rms: 50.0,
                correlation_length: 100.0,
            }),
            ..Default::default()
        });
        let facet = &g.facets[0];
        let normal = facet.normal;
        let d = (DVec3::new(1.0, 0.0, 0.0) - normal * 0.05).normalize();
        let grazing = (-d.dot(normal)).asin();
        let mut rng = StdRng::seed_from_u64(12);
        let mut tilted = 0;
        for _ in 0..2000 {
            let r = reflect(facet, Outcome::Forward, d, normal, 10_000.0, grazing, &mut rng);
            assert!(r.dot(normal) > 0.0);
            assert!((r.length() - 1.0).abs() < 1e-9);
            if (r - mirror(d, normal)).length() > 1e-9 {
                tilted += 1;
            }
        }
        assert!(tilted > 0);
    }
}
