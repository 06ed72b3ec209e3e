//! Electron trajectories: explicit point lists or a Boris-style integration
//! through a field model.

use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::field::{orthogonal_component, MagneticField};
use crate::params::{ConfigError, ConfigResult};
use crate::physics::{bending_radius, critical_energy, lorentz_gamma, BENDING_CONSTANT};
use crate::region::BeamOptics;

/// One sample of the beam path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrajectoryPoint {
    pub position: DVec3,
    /// Unit direction of travel.
    pub direction: DVec3,
    /// Field at the point (T).
    pub field: DVec3,
    /// Local bending radius (cm).
    pub radius: f64,
    /// Critical energy on the ideal orbit (eV).
    pub critical_energy: f64,
    pub optics: BeamOptics,
}

/// An explicitly listed trajectory point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointDescriptor {
    pub position: DVec3,
    pub direction: DVec3,
    /// Overrides the region's beam optics at this point.
    #[serde(default)]
    pub optics: Option<BeamOptics>,
}

/// How a region's trajectory is obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TrajectorySpec {
    Points { points: Vec<PointDescriptor> },
    /// Integrate from `start` for `length` cm in steps of the region's path element.
    Integrated {
        start: DVec3,
        direction: DVec3,
        length: f64,
    },
}

impl Default for TrajectorySpec {
    fn default() -> Self {
        TrajectorySpec::Integrated {
            start: DVec3::ZERO,
            direction: DVec3::Z,
            length: 100.0,
        }
    }
}

impl TrajectorySpec {
    pub fn build(
        &self,
        field: &dyn MagneticField,
        beam_energy_gev: f64,
        path_element: f64,
        optics: &BeamOptics,
    ) -> ConfigResult<Vec<TrajectoryPoint>> {
        let gamma = lorentz_gamma(beam_energy_gev);
        let point = |position: DVec3, direction: DVec3, optics: BeamOptics| {
            let b = field.field_at(position);
            let radius = bending_radius(beam_energy_gev, orthogonal_component(b, direction));
            TrajectoryPoint {
                position,
                direction,
                field: b,
                radius,
                critical_energy: critical_energy(gamma, radius),
                optics,
            }
        };

        match self {
            TrajectorySpec::Points { points } => points
                .iter()
                .enumerate()
                .map(|(i, p)| -> ConfigResult<TrajectoryPoint> {
                    let direction = p.direction.try_normalize().ok_or_else(|| {
                        ConfigError::InvalidBeam(format!("trajectory point {i} has a zero direction"))
                    })?;
                    Ok(point(p.position, direction, p.optics.unwrap_or(*optics)))
                })
                .collect(),
            TrajectorySpec::Integrated {
                start,
                direction,
                length,
            } => {
                let mut dir = direction.try_normalize().ok_or_else(|| {
                    ConfigError::InvalidBeam("trajectory start direction is zero".into())
                })?;
                if !(*length > 0.0) {
                    return Err(ConfigError::InvalidBeam(format!(
                        "trajectory length must be positive (got {length})"
                    )));
                }
                let steps = (length / path_element).ceil() as usize;
                let k = BENDING_CONSTANT / beam_energy_gev;
                let mut pos = *start;
                let mut points = Vec::with_capacity(steps);
                for _ in 0..steps {
                    points.push(point(pos, dir, *optics));
                    (pos, dir) = boris_step(pos, dir, field.field_at(pos), k, path_element);
                }
                Ok(points)
            }
        }
    }
}

/// Advance an electron by `ds` cm through field `b`.
///
/// `k = e / p` in 1/(T·cm). The direction follows `dd/ds = -k d × b`, applied
/// as an exact-norm rotation; the position uses the mean of the two directions.
pub fn boris_step(position: DVec3, direction: DVec3, b: DVec3, k: f64, ds: f64) -> (DVec3, DVec3) {
    let t = b * (-k * ds * 0.5);
    let s = t * (2.0 / (1.0 + t.length_squared()));
    let d_prime = direction + direction.cross(t);
    let next = (direction + d_prime.cross(s)).normalize();
    (position + (direction + next) * (0.5 * ds), next)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::FieldModel;

    #[test]
    fn test_straight_line_without_field() {
        let spec = TrajectorySpec::Integrated {
            start: DVec3::ZERO,
            direction: DVec3::new(0.0, 0.0, 2.0),
            length: 10.0,
        };
        let pts = spec
            .build(&FieldModel::default(), 3.0, 1.0, &BeamOptics::default())
            .unwrap();
        assert_eq!(pts.len(), 10);
        assert!((pts[9].position - DVec3::new(0.0, 0.0, 9.0)).length() < 1e-12);
        assert!(pts.iter().all(|p| p.critical_energy == 0.0));
    }

    #[test]
    fn test_circle_in_uniform_field() {
        let field = FieldModel::Uniform { field: DVec3::Y };
        let energy = 3.0;
        let radius = bending_radius(energy, 1.0);
        let quarter = 0.5 * std::f64::consts::PI * radius;
        let spec = TrajectorySpec::Integrated {
            start: DVec3::ZERO,
            direction: DVec3::Z,
            length: quarter,
        };
        let pts = spec.build(&field, energy, 1.0, &BeamOptics::default()).unwrap();
        for p in &pts {
            assert!((p.radius - radius).abs() < 1e-9);
            assert!((p.direction.length() - 1.0).abs() < 1e-12);
        }
        // After a quarter turn the direction is along ±x and the distance from
        // the centre of the orbit is still the radius.
        let last = pts[pts.len() - 1];
        assert!(last.direction.x.abs() > 0.999);
        let centre = DVec3::new(radius * last.direction.x.signum(), 0.0, 0.0);
        assert!(((last.position - centre).length() - radius).abs() / radius < 1e-4);
    }

    #[test]
    fn test_electron_bends_towards_plus_x_in_plus_y_field() {
        // d/ds d = -k d × B; for d = z, B = y: -(z × y) = +x
        let (_, d) = boris_step(DVec3::ZERO, DVec3::Z, DVec3::Y, 0.01, 1.0);
        assert!(d.x > 0.0);
    }

    #[test]
    fn test_explicit_points() {
        let spec = TrajectorySpec::Points {
            points: vec![
                PointDescriptor {
                    position: DVec3::ZERO,
                    direction: DVec3::new(0.0, 0.0, 5.0),
                    optics: None,
                },
                PointDescriptor {
                    position: DVec3::Z,
                    direction: DVec3::ZERO,
                    optics: None,
                },
            ],
        };
        let err = spec
            .build(&FieldModel::default(), 1.0, 1.0, &BeamOptics::default())
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidBeam(_)));
    }
}
