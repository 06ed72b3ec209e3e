//! Planar polygonal facets and their local (u, v) frame.

use std::sync::Arc;

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};
use synrad_math::Aabb;

use super::polygon;
use super::{GeometryError, GeometryResult};
use crate::material::Material;

/// Extents below this (cm) make a facet degenerate.
const MIN_EXTENT: f64 = 1e-10;

/// How a facet reflects photons that are not absorbed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReflectionDescriptor {
    #[default]
    Diffuse,
    Specular,
    Material { name: String },
}

/// Resolved reflection behaviour.
#[derive(Debug, Clone, PartialEq)]
pub enum Reflection {
    Diffuse,
    Specular,
    Material(Arc<Material>),
}

/// Surface roughness for material reflection, both lengths in nm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Roughness {
    /// RMS height deviation.
    pub rms: f64,
    /// Autocorrelation length.
    pub correlation_length: f64,
}

/// What happens to a photon crossing a link facet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Link {
    #[default]
    None,
    /// Continue from the same point inside another structure.
    Superstructure { structure: usize },
    /// Reappear on another facet at the same local coordinates.
    Teleport { facet: usize },
}

/// Histogram recorded along a facet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProfileKind {
    #[default]
    None,
    U,
    V,
    /// Incidence angle from the normal, 0 to π/2.
    Angle,
}

/// Texture resolution in cells along u and v.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextureSize {
    pub width: usize,
    pub height: usize,
}

/// Serialized facet description.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FacetDescriptor {
    /// Indices into the vertex list, in outline order.
    pub indices: Vec<usize>,
    pub sticking: f64,
    pub opacity: f64,
    pub reflection: ReflectionDescriptor,
    pub roughness: Option<Roughness>,
    pub two_sided: bool,
    /// Owning structure; `None` puts the facet in every structure.
    pub structure: Option<usize>,
    pub link: Link,
    pub profile: ProfileKind,
    pub texture: Option<TextureSize>,
    pub count_direction: bool,
    pub record_spectrum: bool,
}

impl Default for FacetDescriptor {
    fn default() -> Self {
        Self {
            indices: Vec::new(),
            sticking: 0.0,
            opacity: 1.0,
            reflection: ReflectionDescriptor::Diffuse,
            roughness: None,
            two_sided: false,
            structure: None,
            link: Link::None,
            profile: ProfileKind::None,
            texture: None,
            count_direction: false,
            record_spectrum: false,
        }
    }
}

/// Texture grid over a facet's (u, v) rectangle.
///
/// Cells crossed by the outline are partial; their reciprocal area uses the
/// clipped polygon area. Cells fully outside have a reciprocal area of zero.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureMesh {
    pub width: usize,
    pub height: usize,
    pub reciprocal_area: Vec<f64>,
    pub full: Vec<bool>,
}

impl TextureMesh {
    pub fn new(outline: &[DVec2], size: TextureSize, u_len: f64, v_len: f64) -> Self {
        let (width, height) = (size.width.max(1), size.height.max(1));
        let cell = DVec2::new(1.0 / width as f64, 1.0 / height as f64);
        let cell_area = cell.x * cell.y;
        let scale = u_len * v_len;

        let mut reciprocal_area = Vec::with_capacity(width * height);
        let mut full = Vec::with_capacity(width * height);
        for j in 0..height {
            for i in 0..width {
                let min = DVec2::new(i as f64, j as f64) * cell;
                let clipped = polygon::clip_to_rect(outline, min, min + cell);
                let a = polygon::area(&clipped);
                if a > cell_area * 1e-9 {
                    reciprocal_area.push(1.0 / (a * scale));
                } else {
                    reciprocal_area.push(0.0);
                }
                full.push((a - cell_area).abs() <= cell_area * 1e-9);
            }
        }
        Self {
            width,
            height,
            reciprocal_area,
            full,
        }
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    /// Cell holding normalized coordinates (u, v).
    pub fn cell_index(&self, uv: DVec2) -> usize {
        let i = ((uv.x * self.width as f64) as usize).min(self.width - 1);
        let j = ((uv.y * self.height as f64) as usize).min(self.height - 1);
        j * self.width + i
    }
}

/// A facet ready for tracing.
///
/// `origin + u·U + v·V` spans the bounding rectangle of the outline for
/// (u, v) in [0, 1]². `U` and `V` are orthogonal but not unit length.
#[derive(Debug, Clone)]
pub struct Facet {
    pub id: usize,
    pub indices: Vec<usize>,
    pub vertices: Vec<DVec3>,
    /// Outline in normalized (u, v) coordinates.
    pub outline: Vec<DVec2>,
    pub origin: DVec3,
    pub u: DVec3,
    pub v: DVec3,
    pub nu: DVec3,
    pub nv: DVec3,
    pub normal: DVec3,
    pub area: f64,
    pub bounds: Aabb,
    pub centroid: DVec3,

    pub sticking: f64,
    pub opacity: f64,
    pub reflection: Reflection,
    pub roughness: Option<Roughness>,
    pub two_sided: bool,
    pub structure: Option<usize>,
    pub link: Link,
    pub profile: ProfileKind,
    pub texture: Option<TextureMesh>,
    pub count_direction: bool,
    pub record_spectrum: bool,
}

impl Facet {
    pub fn new(
        id: usize,
        desc: &FacetDescriptor,
        vertices: &[DVec3],
        reflection: Reflection,
    ) -> GeometryResult<Self> {
        if desc.indices.len() < 3 {
            return Err(GeometryError::TooFewVertices {
                facet: id,
                count: desc.indices.len(),
            });
        }
        let loop3 = desc
            .indices
            .iter()
            .map(|&index| {
                vertices.get(index).copied().ok_or(GeometryError::VertexOutOfRange {
                    facet: id,
                    index,
                    count: vertices.len(),
                })
            })
            .collect::<GeometryResult<Vec<DVec3>>>()?;

        // Newell's method
        let newell = loop3
            .iter()
            .enumerate()
            .fold(DVec3::ZERO, |acc, (i, a)| acc + a.cross(loop3[(i + 1) % loop3.len()]));
        let normal = newell
            .try_normalize()
            .ok_or(GeometryError::Degenerate { facet: id })?;
        let nu = (loop3[1] - loop3[0])
            .try_normalize()
            .ok_or(GeometryError::Degenerate { facet: id })?;
        let nv = normal.cross(nu);

        let projected: Vec<DVec2> = loop3
            .iter()
            .map(|p| {
                let d = *p - loop3[0];
                DVec2::new(d.dot(nu), d.dot(nv))
            })
            .collect();
        let min = projected.iter().fold(DVec2::splat(f64::INFINITY), |m, p| m.min(*p));
        let max = projected.iter().fold(DVec2::splat(f64::NEG_INFINITY), |m, p| m.max(*p));
        let extent = max - min;
        if extent.x < MIN_EXTENT || extent.y < MIN_EXTENT {
            return Err(GeometryError::Degenerate { facet: id });
        }

        let outline: Vec<DVec2> = projected.iter().map(|p| (*p - min) / extent).collect();
        let area = polygon::area(&outline) * extent.x * extent.y;
        let texture = desc
            .texture
            .map(|size| TextureMesh::new(&outline, size, extent.x, extent.y));
        let centroid = loop3.iter().copied().sum::<DVec3>() / loop3.len() as f64;

        Ok(Self {
            id,
            indices: desc.indices.clone(),
            bounds: Aabb::enclosing(loop3.iter().copied()),
            vertices: loop3,
            outline,
            origin: vertices[desc.indices[0]] + nu * min.x + nv * min.y,
            u: nu * extent.x,
            v: nv * extent.y,
            nu,
            nv,
            normal,
            area,
            centroid,
            sticking: desc.sticking,
            opacity: desc.opacity,
            reflection,
            roughness: desc.roughness,
            two_sided: desc.two_sided,
            structure: desc.structure,
            link: desc.link,
            profile: desc.profile,
            texture,
            count_direction: desc.count_direction,
            record_spectrum: desc.record_spectrum,
        })
    }

    /// Point at normalized local coordinates.
    pub fn point_at(&self, uv: DVec2) -> DVec3 {
        self.origin + self.u * uv.x + self.v * uv.y
    }

    /// Normalized local coordinates of a point on the facet plane.
    pub fn local_coordinates(&self, p: DVec3) -> DVec2 {
        let d = p - self.origin;
        DVec2::new(d.dot(self.u) / self.u.length_squared(), d.dot(self.v) / self.v.length_squared())
    }

    pub fn contains_local(&self, uv: DVec2) -> bool {
        polygon::contains_point(&self.outline, uv)
    }

    /// True when the facet belongs to `structure`.
    pub fn in_structure(&self, structure: usize) -> bool {
        self.structure.map_or(true, |s| s == structure)
    }

    pub fn is_link(&self) -> bool {
        self.link != Link::None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_vertices() -> Vec<DVec3> {
        vec![
            DVec3::new(0.0, 0.0, 0.0),
            DVec3::new(0.0, 1.0, 0.0),
            DVec3::new(1.0, 1.0, 0.0),
            DVec3::new(1.0, 0.0, 0.0),
        ]
    }

    fn square(desc: FacetDescriptor) -> Facet {
        Facet::new(0, &desc, &square_vertices(), Reflection::Diffuse).unwrap()
    }

    #[test]
    fn test_square_frame() {
        let f = square(FacetDescriptor {
            indices: vec![0, 1, 2, 3],
            ..Default::default()
        });
        assert!((f.normal - DVec3::new(0.0, 0.0, -1.0)).length() < 1e-12);
        assert!((f.nu.cross(f.nv) - f.normal).length() < 1e-12);
        assert!((f.area - 1.0).abs() < 1e-12);
        assert_eq!(f.origin, DVec3::ZERO);
        let uv = f.local_coordinates(DVec3::new(0.25, 0.75, 0.0));
        assert!((f.point_at(uv) - DVec3::new(0.25, 0.75, 0.0)).length() < 1e-12);
        assert!(f.contains_local(uv));
        assert!(!f.contains_local(DVec2::new(1.5, 0.5)));
    }

    #[test]
    fn test_triangle_outline_is_normalized() {
        let verts = vec![DVec3::new(0.0, 0.0, 5.0), DVec3::new(4.0, 0.0, 5.0), DVec3::new(0.0, 2.0, 5.0)];
        let desc = FacetDescriptor {
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        let f = Facet::new(3, &desc, &verts, Reflection::Specular).unwrap();
        assert!((f.area - 4.0).abs() < 1e-12);
        for p in &f.outline {
            assert!(p.x >= -1e-12 && p.x <= 1.0 + 1e-12);
            assert!(p.y >= -1e-12 && p.y <= 1.0 + 1e-12);
        }
        assert!((f.normal - DVec3::Z).length() < 1e-12);
    }

    #[test]
    fn test_construction_errors() {
        let verts = square_vertices();
        let short = FacetDescriptor {
            indices: vec![0, 1],
            ..Default::default()
        };
        assert!(matches!(
            Facet::new(0, &short, &verts, Reflection::Diffuse),
            Err(GeometryError::TooFewVertices { .. })
        ));
        let out_of_range = FacetDescriptor {
            indices: vec![0, 1, 9],
            ..Default::default()
        };
        assert!(matches!(
            Facet::new(0, &out_of_range, &verts, Reflection::Diffuse),
            Err(GeometryError::VertexOutOfRange { index: 9, .. })
        ));
        let collinear = vec![DVec3::ZERO, DVec3::X, DVec3::X * 2.0];
        let desc = FacetDescriptor {
            indices: vec![0, 1, 2],
            ..Default::default()
        };
        assert!(matches!(
            Facet::new(0, &desc, &collinear, Reflection::Diffuse),
            Err(GeometryError::Degenerate { .. })
        ));
    }

    #[test]
    fn test_texture_partial_cells() {
        let verts = vec![DVec3::ZERO, DVec3::new(2.0, 0.0, 0.0), DVec3::new(0.0, 2.0, 0.0)];
        let desc = FacetDescriptor {
            indices: vec![0, 1, 2],
            texture: Some(TextureSize { width: 2, height: 2 }),
            ..Default::default()
        };
        let f = Facet::new(0, &desc, &verts, Reflection::Diffuse).unwrap();
        let mesh = f.texture.as_ref().unwrap();
        assert_eq!(mesh.cell_count(), 4);
        assert_eq!(mesh.full.iter().filter(|&&b| b).count(), 1);
        // Cell diagonally opposite the right angle lies outside the triangle
        assert_eq!(mesh.reciprocal_area.iter().filter(|&&r| r == 0.0).count(), 1);
        // Full cells are 1 cm², the two half cells 0.5 cm²
        let mut recips: Vec<f64> = mesh.reciprocal_area.iter().copied().filter(|&r| r > 0.0).collect();
        recips.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert!((recips[0] - 1.0).abs() < 1e-9);
        assert!((recips[1] - 2.0).abs() < 1e-9 && (recips[2] - 2.0).abs() < 1e-9);
        assert_eq!(mesh.cell_index(DVec2::new(1.0, 1.0)), 3);
    }

    #[test]
    fn test_descriptor_json_defaults() {
        let desc: FacetDescriptor = serde_json::from_str(
            r#"{ "indices": [0, 1, 2], "sticking": 0.5,
                 "link": { "type": "teleport", "facet": 4 },
                 "reflection": { "type": "material", "name": "copper" } }"#,
        )
        .unwrap();
        assert_eq!(desc.opacity, 1.0);
        assert_eq!(desc.link, Link::Teleport { facet: 4 });
        assert_eq!(desc.reflection, ReflectionDescriptor::Material { name: "copper".into() });
        assert_eq!(desc.structure, None);
    }
}
