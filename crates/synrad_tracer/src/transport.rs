//! Photon transport: the bounce loop from generation to absorption or leak.
//!
//! A photon is `InFlight` until it is absorbed or escapes. Reflections,
//! transparent passes and link crossings all loop back with a new position
//! and direction. In low-flux mode the photon is never discarded by a single
//! draw: each hit absorbs its share of the remaining weight and the photon
//! goes on with the rest until that drops below the cutoff.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use rand::{Rng, RngCore};
use synrad_core::geometry::ProfileKind;
use synrad_core::results::{HitEntry, HitKind, LeakEntry, PROFILE_BINS};
use synrad_core::{Facet, HitCounter, Link, ResultBuffer, SimulationParams};
use synrad_math::{DVec3, Ray};

use crate::generator::{GeneratorCache, Photon, PhotonGenerator};
use crate::intersect::{FacetHit, Intersection};
use crate::model::Model;
use crate::reflection::{self, Outcome};

/// Default number of reflections after which a trace is abandoned.
pub const MAX_BOUNCES: usize = 100_000;

/// Link and teleport crossings allowed per reflection before a trace is
/// abandoned; bounds photons caught between facing links.
const LINK_PASSES_PER_BOUNCE: usize = 16;

/// How a trace ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraceEnd {
    Absorbed,
    Leaked,
    /// Zero-weight photon; counted as desorbed but not traced.
    Virtual,
    /// Reflection or link-crossing limit reached.
    Abandoned,
}

/// Direction leaving `to` for a photon that entered `from` along `direction`.
///
/// Components along the source `(nu, nv)` are kept in the destination frame;
/// the normal component is flipped so the photon leaves the destination
/// facet on the side its normal points to when it entered against `from`'s.
pub fn teleport_direction(from: &Facet, to: &Facet, direction: DVec3) -> DVec3 {
    let a = direction.dot(from.nu);
    let b = direction.dot(from.nv);
    let c = direction.dot(from.normal);
    (to.nu * a + to.nv * b - to.normal * c).normalize()
}

/// One recorded contact with a facet.
struct Contact<'a> {
    facet: &'a Facet,
    hit: &'a FacetHit,
    direction: DVec3,
    /// Weight still carried when the facet was reached.
    ratio: f64,
    /// Share of the original weight absorbed here.
    absorbed: f64,
    kind: HitKind,
}

/// Generates and traces photons against a shared [`Model`].
pub struct Tracer {
    model: Arc<Model>,
    params: SimulationParams,
    cache: GeneratorCache,
    max_bounces: usize,
}

impl Tracer {
    pub fn new(model: Arc<Model>, params: SimulationParams) -> Self {
        Self {
            model,
            params,
            cache: GeneratorCache::default(),
            max_bounces: MAX_BOUNCES,
        }
    }

    /// Reflections after which a trace ends as [`TraceEnd::Abandoned`].
    pub fn set_max_bounces(&mut self, max_bounces: usize) {
        self.max_bounces = max_bounces.max(1);
    }

    pub fn model(&self) -> &Arc<Model> {
        &self.model
    }

    pub fn params(&self) -> &SimulationParams {
        &self.params
    }

    pub fn set_params(&mut self, params: SimulationParams) {
        self.params = params;
    }

    pub fn cache(&self) -> &GeneratorCache {
        &self.cache
    }

    /// Generate a photon at a uniformly chosen trajectory point and trace it.
    ///
    /// Returns `None` when the model has no trajectory points.
    pub fn trace_next(&mut self, buffer: &mut ResultBuffer, rng: &mut dyn RngCore) -> Option<TraceEnd> {
        let model = Arc::clone(&self.model);
        if model.points_total == 0 {
            return None;
        }
        let (region_index, region, point) = model.locate_point(rng.gen_range(0..model.points_total))?;
        let photon =
            PhotonGenerator::new(&model.tables).generate(region_index, region, point, &mut self.cache, rng);

        let header = buffer.header_mut();
        header.counter.nb_desorbed += 1;
        header.generated_flux += photon.flux;
        header.generated_power += photon.power;
        buffer.hits.push(HitEntry {
            position: photon.position,
            kind: HitKind::Desorption,
        });

        if photon.is_virtual() {
            return Some(TraceEnd::Virtual);
        }
        Some(self.trace(&photon, buffer, rng))
    }

    /// Follow `photon` until it is absorbed, leaks, or hits the bounce limit.
    ///
    /// Only reflections count as bounces; transparent passes and link
    /// crossings have their own, looser limit.
    pub fn trace(&self, photon: &Photon, buffer: &mut ResultBuffer, rng: &mut dyn RngCore) -> TraceEnd {
        let geometry = &self.model.geometry;
        let intersector = self.model.intersector();
        let low_flux = self.params.low_flux_mode;

        let mut position = photon.position;
        let mut direction = photon.direction;
        let mut structure = photon.structure;
        let mut last_hit: Option<usize> = None;
        let mut ratio = 1.0;
        let mut bounces = 0;
        let mut link_passes = 0;
        let max_link_passes = self.max_bounces.saturating_mul(LINK_PASSES_PER_BOUNCE);

        loop {
            let ray = Ray::new(position, direction);
            let (hit, transparent) = match intersector.intersect(&ray, structure, last_hit, rng) {
                Intersection::Leak { transparent } => {
                    self.record_passes(buffer, photon, &transparent, direction, ratio);
                    let header = buffer.header_mut();
                    header.counter.nb_leaked += 1;
                    buffer.leaks.push(LeakEntry { position, direction });
                    return TraceEnd::Leaked;
                }
                Intersection::Hit { hit, transparent } => (hit, transparent),
            };
            self.record_passes(buffer, photon, &transparent, direction, ratio);

            let facet = &geometry.facets[hit.facet];
            if facet.is_link() {
                link_passes += 1;
                if link_passes > max_link_passes {
                    return TraceEnd::Abandoned;
                }
            }
            match facet.link {
                Link::Superstructure { structure: next } => {
                    self.record(buffer, photon, &Contact {
                        facet,
                        hit: &hit,
                        direction,
                        ratio,
                        absorbed: 0.0,
                        kind: HitKind::Link,
                    });
                    structure = next;
                    position = hit.position;
                    last_hit = Some(hit.facet);
                    continue;
                }
                Link::Teleport { facet: destination } => {
                    self.record(buffer, photon, &Contact {
                        facet,
                        hit: &hit,
                        direction,
                        ratio,
                        absorbed: 0.0,
                        kind: HitKind::Teleport,
                    });
                    let Some(to) = geometry.facet(destination) else {
                        buffer.header_mut().counter.nb_leaked += 1;
                        buffer.leaks.push(LeakEntry {
                            position: hit.position,
                            direction,
                        });
                        return TraceEnd::Leaked;
                    };
                    direction = teleport_direction(facet, to, direction);
                    position = to.point_at(hit.uv);
                    structure = to.structure.unwrap_or(structure);
                    last_hit = Some(to.id);
                    continue;
                }
                Link::None => {}
            }

            // Normal on the side the photon arrives from
            let normal = if direction.dot(facet.normal) < 0.0 {
                facet.normal
            } else {
                -facet.normal
            };
            let cos_incidence = (-direction.dot(normal)).clamp(0.0, 1.0);
            let grazing = FRAC_PI_2 - cos_incidence.acos();
            let probabilities = reflection::probabilities(facet, photon.energy, grazing);

            let mut contact = Contact {
                facet,
                hit: &hit,
                direction,
                ratio,
                absorbed: 0.0,
                kind: HitKind::Reflection,
            };
            let outcome = if low_flux {
                let share = probabilities.absorption().clamp(0.0, 1.0);
                let surviving = ratio * (1.0 - share);
                let outcome = if surviving < self.params.low_flux_cutoff {
                    None
                } else {
                    reflection::choose_surviving(&probabilities, rng.gen())
                };
                match outcome {
                    Some(outcome) => {
                        contact.absorbed = ratio * share;
                        if outcome == Outcome::Transparent {
                            contact.kind = HitKind::Transparent;
                        }
                        self.record(buffer, photon, &contact);
                        ratio = surviving;
                        outcome
                    }
                    None => {
                        contact.absorbed = ratio;
                        contact.kind = HitKind::Absorption;
                        self.record(buffer, photon, &contact);
                        return TraceEnd::Absorbed;
                    }
                }
            } else {
                let outcome = reflection::choose(&probabilities, rng.gen());
                match outcome {
                    Outcome::Absorbed => {
                        contact.absorbed = ratio;
                        contact.kind = HitKind::Absorption;
                        self.record(buffer, photon, &contact);
                        return TraceEnd::Absorbed;
                    }
                    Outcome::Transparent => contact.kind = HitKind::Transparent,
                    _ => {}
                }
                self.record(buffer, photon, &contact);
                outcome
            };

            direction = reflection::reflect(facet, outcome, direction, normal, photon.energy, grazing, rng);
            position = hit.position;
            last_hit = Some(hit.facet);

            bounces += 1;
            if bounces >= self.max_bounces {
                return TraceEnd::Abandoned;
            }
        }
    }

    fn record_passes(
        &self,
        buffer: &mut ResultBuffer,
        photon: &Photon,
        passes: &[FacetHit],
        direction: DVec3,
        ratio: f64,
    ) {
        for pass in passes {
            self.record(buffer, photon, &Contact {
                facet: &self.model.geometry.facets[pass.facet],
                hit: pass,
                direction,
                ratio,
                absorbed: 0.0,
                kind: HitKind::Transparent,
            });
        }
    }

    /// Update the facet and global counters and every enabled facet recorder.
    fn record(&self, buffer: &mut ResultBuffer, photon: &Photon, contact: &Contact<'_>) {
        let facet = contact.facet;
        let id = facet.id;
        let absorption = contact.kind == HitKind::Absorption;
        let flux = photon.flux * contact.absorbed;
        let power = photon.power * contact.absorbed;

        tally(&mut buffer.header_mut().counter, contact.ratio, contact.absorbed, flux, power, absorption);
        tally(buffer.counter_mut(id), contact.ratio, contact.absorbed, flux, power, absorption);

        let bin = match facet.profile {
            ProfileKind::None => None,
            ProfileKind::U => Some(contact.hit.uv.x),
            ProfileKind::V => Some(contact.hit.uv.y),
            ProfileKind::Angle => {
                let theta = contact.direction.dot(facet.normal).abs().min(1.0).acos();
                Some(theta / FRAC_PI_2)
            }
        }
        .map(|t| ((t * PROFILE_BINS as f64) as usize).min(PROFILE_BINS - 1));
        if let Some(bin) = bin {
            let cell = &mut buffer.profile_mut(id)[bin];
            cell.count += contact.ratio;
            cell.flux += flux;
            cell.power += power;
        }

        if let Some(mesh) = &facet.texture {
            let index = mesh.cell_index(contact.hit.uv);
            let reciprocal_area = mesh.reciprocal_area[index];
            let cell = &mut buffer.texture_mut(id)[index];
            cell.count += contact.ratio;
            cell.flux += flux * reciprocal_area;
            cell.power += power * reciprocal_area;
            if facet.count_direction {
                let cell = &mut buffer.direction_mut(id)[index];
                let weighted = contact.direction * contact.ratio;
                cell.dir[0] += weighted.x;
                cell.dir[1] += weighted.y;
                cell.dir[2] += weighted.z;
                cell.count += contact.ratio;
            }
        }

        if facet.record_spectrum {
            if let Some(bin) = self.model.spectrum.bin(photon.energy) {
                let cell = &mut buffer.spectrum_mut(id)[bin];
                cell.flux += flux;
                cell.power += power;
            }
        }

        buffer.hits.push(HitEntry {
            position: contact.hit.position,
            kind: contact.kind,
        });
    }
}

fn tally(
    counter: &mut HitCounter,
    ratio: f64,
    absorbed: f64,
    flux: f64,
    power: f64,
    absorption: bool,
) {
    counter.nb_mc_hit += 1;
    counter.nb_hit_equiv += ratio;
    if absorption {
        counter.nb_abs += 1;
    }
    counter.nb_abs_equiv += absorbed;
    counter.flux_abs += flux;
    counter.power_abs += power;
}
