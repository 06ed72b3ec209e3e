//! Magnetic field models used for trajectory integration and for recomputing
//! the field at beam-offset photon origins.

use glam::DVec3;
use serde::{Deserialize, Serialize};

/// Anything that can report a magnetic field (Tesla) at a position (cm).
pub trait MagneticField: Send + Sync {
    fn field_at(&self, position: DVec3) -> DVec3;
}

/// Field models available to a region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FieldModel {
    /// The same field everywhere.
    Uniform { field: DVec3 },
    /// Quadrupole with its axis along z through `center`: `Bx = g·y`, `By = g·x`.
    Quadrupole {
        center: DVec3,
        /// Gradient in T/cm.
        gradient: f64,
        /// Dipole component added on top of the gradient.
        #[serde(default)]
        dipole: DVec3,
    },
}

impl Default for FieldModel {
    fn default() -> Self {
        FieldModel::Uniform { field: DVec3::ZERO }
    }
}

impl MagneticField for FieldModel {
    fn field_at(&self, position: DVec3) -> DVec3 {
        match self {
            FieldModel::Uniform { field } => *field,
            FieldModel::Quadrupole {
                center,
                gradient,
                dipole,
            } => {
                let r = position - *center;
                *dipole + DVec3::new(gradient * r.y, gradient * r.x, 0.0)
            }
        }
    }
}

/// Field component perpendicular to `direction` (which must be normalized).
pub fn orthogonal_component(field: DVec3, direction: DVec3) -> f64 {
    direction.cross(field).length()
}
