//! Static chamber geometry: vertices, facets and superstructure bookkeeping.

mod facet;
pub mod polygon;

pub use facet::{
    Facet, FacetDescriptor, Link, ProfileKind, Reflection, ReflectionDescriptor, Roughness,
    TextureMesh, TextureSize,
};

use std::sync::Arc;

use glam::DVec3;
use synrad_math::Aabb;
use thiserror::Error;

use crate::material::Material;

/// Errors raised while building or checking geometry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("facet {facet} has {count} vertices, at least 3 are required")]
    TooFewVertices { facet: usize, count: usize },

    #[error("facet {facet} references vertex {index}, but only {count} exist")]
    VertexOutOfRange { facet: usize, index: usize, count: usize },

    #[error("facet {facet} is degenerate (zero area or collinear vertices)")]
    Degenerate { facet: usize },

    #[error("facet {facet} belongs to structure {structure}, but only {count} exist")]
    BadStructure { facet: usize, structure: usize, count: usize },

    #[error("facet {facet} teleports to facet {destination}, which does not exist")]
    MissingTeleportDestination { facet: usize, destination: usize },

    #[error("facet {facet} links to structure {structure}, but only {count} exist")]
    BadLinkStructure { facet: usize, structure: usize, count: usize },

    #[error("facet {facet} uses unknown material '{name}'")]
    UnknownMaterial { facet: usize, name: String },

    #[error("geometry must have at least one structure")]
    NoStructures,
}

pub type GeometryResult<T> = Result<T, GeometryError>;

/// The immutable facet set shared by all workers.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub vertices: Vec<DVec3>,
    pub facets: Vec<Facet>,
    pub structure_count: usize,
    bounds: Aabb,
}

impl Geometry {
    /// Build facets from descriptors, resolving material names.
    ///
    /// Link targets are not checked here; see [`Geometry::check_links`].
    pub fn new(
        vertices: Vec<DVec3>,
        descriptors: &[FacetDescriptor],
        materials: &[Arc<Material>],
        structure_count: usize,
    ) -> GeometryResult<Self> {
        if structure_count == 0 {
            return Err(GeometryError::NoStructures);
        }

        let mut facets = Vec::with_capacity(descriptors.len());
        for (id, desc) in descriptors.iter().enumerate() {
            if let Some(structure) = desc.structure.filter(|&s| s >= structure_count) {
                return Err(GeometryError::BadStructure {
                    facet: id,
                    structure,
                    count: structure_count,
                });
            }
            let reflection = match &desc.reflection {
                ReflectionDescriptor::Diffuse => Reflection::Diffuse,
                ReflectionDescriptor::Specular => Reflection::Specular,
                ReflectionDescriptor::Material { name } => materials
                    .iter()
                    .find(|m| &m.name == name)
                    .map(|m| Reflection::Material(Arc::clone(m)))
                    .ok_or_else(|| GeometryError::UnknownMaterial {
                        facet: id,
                        name: name.clone(),
                    })?,
            };
            facets.push(Facet::new(id, desc, &vertices, reflection)?);
        }

        let bounds = facets
            .iter()
            .fold(Aabb::EMPTY, |acc, f| Aabb::surrounding(&acc, &f.bounds));

        log::debug!(
            "Built geometry: {} vertices, {} facets, {} structures",
            vertices.len(),
            facets.len(),
            structure_count
        );

        Ok(Self {
            vertices,
            facets,
            structure_count,
            bounds,
        })
    }

    /// Verify that every link points at something that exists.
    pub fn check_links(&self) -> GeometryResult<()> {
        for f in &self.facets {
            match f.link {
                Link::None => {}
                Link::Teleport { facet: destination } => {
                    if destination >= self.facets.len() || destination == f.id {
                        return Err(GeometryError::MissingTeleportDestination {
                            facet: f.id,
                            destination,
                        });
                    }
                }
                Link::Superstructure { structure } => {
                    if structure >= self.structure_count {
                        return Err(GeometryError::BadLinkStructure {
                            facet: f.id,
                            structure,
                            count: self.structure_count,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    pub fn facet(&self, id: usize) -> Option<&Facet> {
        self.facets.get(id)
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    /// Facets visible from inside `structure`.
    pub fn structure_facets(&self, structure: usize) -> impl Iterator<Item = &Facet> {
        self.facets.iter().filter(move |f| f.in_structure(structure))
    }
}
