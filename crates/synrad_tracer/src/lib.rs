//! SynRad Tracer - Monte-Carlo transport of synchrotron radiation photons.
//!
//! This crate provides:
//!
//! - **Generation**: [`PhotonGenerator`] turns trajectory points into photons
//! - **Intersection**: per-structure [`SpatialIndex`] trees and the [`Intersector`]
//! - **Transport**: the bounce loop in [`Tracer`], regular and low-flux
//! - **Runtime**: worker threads, the result aggregator and the [`Simulation`]
//!   orchestrator that drives them with load/start/pause/reset commands
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use synrad_core::{PhysicsTables, Scenario};
//! use synrad_tracer::Simulation;
//!
//! let loaded = Scenario::load("chamber.json")?.build()?;
//! let params = loaded.params.clone();
//! let tables = Arc::new(PhysicsTables::build()?);
//! let mut sim = Simulation::new(params)?;
//! sim.load(loaded, tables)?;
//! sim.start()?;
//! std::thread::sleep(std::time::Duration::from_secs(10));
//! sim.pause()?;
//! println!("{}", sim.status_string());
//! ```

pub mod aggregator;
pub mod control;
pub mod error;
pub mod generator;
pub mod intersect;
pub mod model;
pub mod reflection;
pub mod simulation;
pub mod spatial;
pub mod transport;
pub mod worker;

pub use control::{Command, WorkerState};
pub use error::{SimulationError, SimulationResult};
pub use generator::{GeneratorCache, Photon, PhotonGenerator};
pub use intersect::{FacetHit, Intersection, Intersector};
pub use model::Model;
pub use simulation::Simulation;
pub use spatial::SpatialIndex;
pub use transport::{TraceEnd, Tracer};

#[cfg(test)]
pub(crate) mod test_util {
    use std::sync::{Arc, OnceLock};

    use synrad_core::geometry::ReflectionDescriptor;
    use synrad_core::{
        FacetDescriptor, FieldModel, Geometry, Link, Material, MaterialDescriptor, PhysicsTables,
        Region, RegionParams, SpectrumRange, TrajectorySpec,
    };
    use synrad_math::DVec3;

    use crate::model::Model;

    pub fn tables_arc() -> Arc<PhysicsTables> {
        Arc::clone(shared_tables())
    }

    pub fn tables() -> &'static PhysicsTables {
        shared_tables().as_ref()
    }

    fn shared_tables() -> &'static Arc<PhysicsTables> {
        static TABLES: OnceLock<Arc<PhysicsTables>> = OnceLock::new();
        TABLES.get_or_init(|| {
            let _ = env_logger::builder().is_test(true).try_init();
            Arc::new(PhysicsTables::build().unwrap())
        })
    }

    /// Corners `c - u - v, c + u - v, c + u + v, c - u + v`; the normal is along `u × v`.
    fn quad(vertices: &mut Vec<DVec3>, center: DVec3, u: DVec3, v: DVec3) -> Vec<usize> {
        let base = vertices.len();
        vertices.extend([center - u - v, center + u - v, center + u + v, center - u + v]);
        (base..base + 4).collect()
    }

    fn build(vertices: Vec<DVec3>, descriptors: Vec<FacetDescriptor>) -> Geometry {
        let structures = descriptors
            .iter()
            .flat_map(|d| {
                let linked = match d.link {
                    Link::Superstructure { structure } => Some(structure),
                    _ => None,
                };
                d.structure.into_iter().chain(linked)
            })
            .max()
            .map_or(1, |s| s + 1);
        Geometry::new(vertices, &descriptors, &[], structures).unwrap()
    }

    /// `n` unit squares stacked at `z = 0, 1, ...`, facing -z.
    ///
    /// Local u runs along +y and v along +x.
    pub fn strip_geometry_with(n: usize, mut f: impl FnMut(usize, &mut FacetDescriptor)) -> Geometry {
        let mut vertices = Vec::new();
        let mut descriptors = Vec::new();
        for i in 0..n {
            let center = DVec3::new(0.5, 0.5, i as f64);
            let mut desc = FacetDescriptor {
                indices: quad(&mut vertices, center, DVec3::Y * 0.5, DVec3::X * 0.5),
                ..Default::default()
            };
            f(i, &mut desc);
            descriptors.push(desc);
        }
        build(vertices, descriptors)
    }

    pub fn strip_geometry(n: usize) -> Geometry {
        strip_geometry_with(n, |_, _| {})
    }

    /// The unit square at z = 0 facing -z.
    pub fn single_facet_geometry(desc: FacetDescriptor) -> Geometry {
        strip_geometry_with(1, |_, d| {
            *d = FacetDescriptor {
                indices: d.indices.clone(),
                ..desc.clone()
            }
        })
    }

    /// The unit square at z = 0 facing -z, reflecting through `material`.
    pub fn material_facet_geometry(material: &MaterialDescriptor) -> Geometry {
        let mut vertices = Vec::new();
        let desc = FacetDescriptor {
            indices: quad(&mut vertices, DVec3::new(0.5, 0.5, 0.0), DVec3::Y * 0.5, DVec3::X * 0.5),
            reflection: ReflectionDescriptor::Material {
                name: material.name.clone(),
            },
            ..Default::default()
        };
        let material = Arc::new(Material::from_descriptor(material).unwrap());
        Geometry::new(vertices, &[desc], &[material], 1).unwrap()
    }

    /// A 2000 cm square at z = 50 facing the source.
    pub fn absorber_geometry(sticking: f64) -> Geometry {
        let mut vertices = Vec::new();
        let desc = FacetDescriptor {
            indices: quad(
                &mut vertices,
                DVec3::new(0.0, 0.0, 50.0),
                DVec3::Y * 1000.0,
                DVec3::X * 1000.0,
            ),
            sticking,
            ..Default::default()
        };
        build(vertices, vec![desc])
    }

    /// Closed cube of half-size `half` around the origin, normals pointing inward.
    pub fn box_geometry(half: f64, sticking: f64) -> Geometry {
        let faces = [
            (DVec3::Z, DVec3::X, DVec3::Y),
            (-DVec3::Z, DVec3::Y, DVec3::X),
            (DVec3::X, DVec3::Y, DVec3::Z),
            (-DVec3::X, DVec3::Z, DVec3::Y),
            (DVec3::Y, DVec3::Z, DVec3::X),
            (-DVec3::Y, DVec3::X, DVec3::Z),
        ];
        let mut vertices = Vec::new();
        let descriptors = faces
            .iter()
            .map(|&(inward, u, v)| FacetDescriptor {
                indices: quad(&mut vertices, -inward * half, u * half, v * half),
                sticking,
                ..Default::default()
            })
            .collect();
        build(vertices, descriptors)
    }

    /// 10 cm of a 3 GeV beam in a 1 T dipole, starting at the origin along +z.
    pub fn bend_region(f: impl FnOnce(&mut RegionParams)) -> Region {
        let mut params = RegionParams {
            beam_energy_gev: 3.0,
            field: FieldModel::Uniform { field: DVec3::Y },
            trajectory: TrajectorySpec::Integrated {
                start: DVec3::ZERO,
                direction: DVec3::Z,
                length: 10.0,
            },
            ..Default::default()
        };
        f(&mut params);
        Region::build(params, 1).unwrap()
    }

    pub fn model(geometry: Geometry, regions: Vec<Region>) -> Arc<Model> {
        Arc::new(Model::new(geometry, regions, tables_arc(), SpectrumRange::default()).unwrap())
    }
}
