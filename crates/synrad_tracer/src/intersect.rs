//! Ray/facet intersection and nearest-hit search.

use rand::{Rng, RngCore};
use synrad_core::geometry::{Facet, Geometry};
use synrad_math::{DVec2, DVec3, Ray};

use crate::spatial::SpatialIndex;

/// Hits closer than this (cm) are ignored.
const MIN_DISTANCE: f64 = 1e-9;

/// Where a ray meets a facet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FacetHit {
    pub facet: usize,
    pub distance: f64,
    /// Normalized local coordinates.
    pub uv: DVec2,
    pub position: DVec3,
}

/// Result of following a ray through one structure.
#[derive(Debug, Clone, PartialEq)]
pub enum Intersection {
    /// The ray stops on `hit`; `transparent` lists passes before it, nearest first.
    Hit {
        hit: FacetHit,
        transparent: Vec<FacetHit>,
    },
    /// Nothing blocks the ray.
    Leak { transparent: Vec<FacetHit> },
}

/// Solve `origin + u·U + v·V = ray.origin + t·d` by Cramer's rule.
///
/// Accepts only points inside the facet outline in front of the ray. Does
/// not cull back faces.
pub fn ray_facet(facet: &Facet, ray: &Ray) -> Option<FacetHit> {
    let a = facet.u;
    let b = facet.v;
    let c = -ray.direction;
    let w = ray.origin - facet.origin;

    let bc = b.cross(c);
    let det = a.dot(bc);
    if det.abs() < 1e-14 * a.length() * b.length() {
        return None;
    }
    let inv = 1.0 / det;
    let distance = a.dot(b.cross(w)) * inv;
    if distance <= MIN_DISTANCE {
        return None;
    }
    let u = w.dot(bc) * inv;
    let v = a.dot(w.cross(c)) * inv;
    if !(0.0..=1.0).contains(&u) || !(0.0..=1.0).contains(&v) {
        return None;
    }
    let uv = DVec2::new(u, v);
    if !facet.contains_local(uv) {
        return None;
    }
    Some(FacetHit {
        facet: facet.id,
        distance,
        uv,
        position: ray.at(distance),
    })
}

/// Finds the next facet a photon reaches.
pub struct Intersector<'a> {
    geometry: &'a Geometry,
    indices: &'a [SpatialIndex],
}

impl<'a> Intersector<'a> {
    pub fn new(geometry: &'a Geometry, indices: &'a [SpatialIndex]) -> Self {
        Self { geometry, indices }
    }

    /// Follow `ray` inside `structure`, ignoring `last_hit`.
    ///
    /// Semi-transparent facets are drawn hard with probability equal to their
    /// opacity. Link facets are always hard and never culled.
    pub fn intersect(
        &self,
        ray: &Ray,
        structure: usize,
        last_hit: Option<usize>,
        rng: &mut dyn RngCore,
    ) -> Intersection {
        let mut hard: Option<FacetHit> = None;
        let mut transparent = Vec::new();

        if let Some(index) = self.indices.get(structure) {
            index.visit(ray, f64::INFINITY, |f| {
                if Some(f) == last_hit {
                    return None;
                }
                let facet = &self.geometry.facets[f];
                let link = facet.is_link();
                if !link && !facet.two_sided && ray.direction.dot(facet.normal) > 0.0 {
                    return None;
                }
                let hit = ray_facet(facet, ray)?;
                if hard.map_or(false, |h| hit.distance >= h.distance) {
                    return None;
                }
                let blocks = link
                    || facet.opacity >= 1.0
                    || (facet.opacity > 0.0 && rng.gen::<f64>() < facet.opacity);
                if blocks {
                    hard = Some(hit);
                    Some(hit.distance)
                } else {
                    transparent.push(hit);
                    None
                }
            });
        }

        if let Some(h) = hard {
            transparent.retain(|t| t.distance < h.distance);
        }
        transparent.sort_by(|a, b| a.distance.total_cmp(&b.distance));

        match hard {
            Some(hit) => Intersection::Hit { hit, transparent },
            None => Intersection::Leak { transparent },
        }
    }
}
