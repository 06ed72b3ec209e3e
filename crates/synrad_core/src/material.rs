//! Tabulated surface materials.
//!
//! A material maps (photon energy, grazing angle) to the probabilities of
//! forward (specular) reflection, diffuse reflection, back reflection and
//! transmission. Whatever remains is absorbed.

use serde::{Deserialize, Serialize};

use crate::params::{ConfigError, ConfigResult};

/// Outcome probabilities at one hit. Absorption is the remainder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScatteringProbabilities {
    pub forward: f64,
    pub diffuse: f64,
    pub back: f64,
    pub transparent: f64,
}

impl ScatteringProbabilities {
    /// Pure specular reflectivity with no other scattering channel.
    pub fn specular(reflectivity: f64) -> Self {
        Self {
            forward: reflectivity,
            ..Default::default()
        }
    }

    pub fn reflected(&self) -> f64 {
        self.forward + self.diffuse + self.back
    }

    pub fn absorption(&self) -> f64 {
        (1.0 - self.reflected() - self.transparent).max(0.0)
    }

    fn lerp(&self, other: &Self, t: f64) -> Self {
        Self {
            forward: self.forward + (other.forward - self.forward) * t,
            diffuse: self.diffuse + (other.diffuse - self.diffuse) * t,
            back: self.back + (other.back - self.back) * t,
            transparent: self.transparent + (other.transparent - self.transparent) * t,
        }
    }
}

/// Serialized form of a material table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaterialDescriptor {
    pub name: String,
    /// Photon energies in eV, increasing.
    pub energies: Vec<f64>,
    /// Grazing angles in radians, increasing.
    pub angles: Vec<f64>,
    /// `table[energy][angle]`.
    pub table: Vec<Vec<ScatteringProbabilities>>,
}

/// A validated material, shared between facets.
#[derive(Debug, Clone, PartialEq)]
pub struct Material {
    pub name: String,
    energies: Vec<f64>,
    angles: Vec<f64>,
    table: Vec<ScatteringProbabilities>,
}

impl Material {
    pub fn from_descriptor(desc: &MaterialDescriptor) -> ConfigResult<Self> {
        let invalid = |reason: String| ConfigError::InvalidMaterial {
            name: desc.name.clone(),
            reason,
        };

        if desc.energies.is_empty() || desc.angles.is_empty() {
            return Err(invalid("table has no energies or no angles".into()));
        }
        if !is_increasing(&desc.energies) || !is_increasing(&desc.angles) {
            return Err(invalid("energies and angles must be strictly increasing".into()));
        }
        if desc.table.len() != desc.energies.len() {
            return Err(invalid(format!(
                "{} rows for {} energies",
                desc.table.len(),
                desc.energies.len()
            )));
        }

        let mut table = Vec::with_capacity(desc.energies.len() * desc.angles.len());
        for (i, row) in desc.table.iter().enumerate() {
            if row.len() != desc.angles.len() {
                return Err(invalid(format!(
                    "row {i} has {} entries for {} angles",
                    row.len(),
                    desc.angles.len()
                )));
            }
            for p in row {
                let channels = [p.forward, p.diffuse, p.back, p.transparent];
                if channels.iter().any(|c| !(0.0..=1.0).contains(c))
                    || p.reflected() + p.transparent > 1.0 + 1e-9
                {
                    return Err(invalid(format!("row {i} has probabilities outside [0, 1]")));
                }
                table.push(*p);
            }
        }

        Ok(Self {
            name: desc.name.clone(),
            energies: desc.energies.clone(),
            angles: desc.angles.clone(),
            table,
        })
    }

    /// Bilinear lookup, clamped to the table edges.
    pub fn lookup(&self, energy: f64, grazing_angle: f64) -> ScatteringProbabilities {
        let (ie, te) = bracket(&self.energies, energy);
        let (ia, ta) = bracket(&self.angles, grazing_angle);
        let at = |i: usize, j: usize| self.table[i * self.angles.len() + j];

        let ie1 = (ie + 1).min(self.energies.len() - 1);
        let ia1 = (ia + 1).min(self.angles.len() - 1);
        let low = at(ie, ia).lerp(&at(ie, ia1), ta);
        let high = at(ie1, ia).lerp(&at(ie1, ia1), ta);
        low.lerp(&high, te)
    }
}

fn is_increasing(values: &[f64]) -> bool {
    values.iter().all(|v| v.is_finite()) && values.windows(2).all(|w| w[1] > w[0])
}

/// Lower index and interpolation weight for `x` in sorted `xs`, clamped.
fn bracket(xs: &[f64], x: f64) -> (usize, f64) {
    if xs.len() == 1 || x <= xs[0] {
        return (0, 0.0);
    }
    if x >= xs[xs.len() - 1] {
        return (xs.len() - 1, 0.0);
    }
    let i = xs.partition_point(|&v| v <= x) - 1;
    (i, (x - xs[i]) / (xs[i + 1] - xs[i]))
}
