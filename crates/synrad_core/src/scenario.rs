//! JSON scenario files: geometry, materials, regions and run parameters.

use std::path::Path;
use std::sync::Arc;

use glam::DVec3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::{FacetDescriptor, Geometry, GeometryError};
use crate::material::{Material, MaterialDescriptor};
use crate::params::{ConfigError, SimulationParams};
use crate::region::{Region, RegionParams};

/// Errors that can occur while loading a scenario.
#[derive(Error, Debug)]
pub enum ScenarioError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Geometry error: {0}")]
    Geometry(#[from] GeometryError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Scenario defines no source region")]
    NoRegions,
}

pub type ScenarioResult<T> = Result<T, ScenarioError>;

/// Everything needed to run a simulation, as stored on disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub vertices: Vec<DVec3>,
    pub structures: usize,
    pub facets: Vec<FacetDescriptor>,
    pub materials: Vec<MaterialDescriptor>,
    pub regions: Vec<RegionParams>,
    pub params: SimulationParams,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            vertices: Vec::new(),
            structures: 1,
            facets: Vec::new(),
            materials: Vec::new(),
            regions: Vec::new(),
            params: SimulationParams::default(),
        }
    }
}

/// A scenario with validated geometry and regions.
#[derive(Debug, Clone)]
pub struct LoadedScenario {
    pub geometry: Geometry,
    pub regions: Vec<Region>,
    pub params: SimulationParams,
}

impl Scenario {
    pub fn from_json_str(json: &str) -> ScenarioResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> ScenarioResult<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let scenario = Self::from_json_str(&text)?;
        log::info!(
            "Loaded scenario {}: {} facets, {} regions",
            path.as_ref().display(),
            scenario.facets.len(),
            scenario.regions.len()
        );
        Ok(scenario)
    }

    pub fn to_json_string(&self) -> ScenarioResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Validate everything and build geometry and regions.
    ///
    /// Link targets are left for the workers to check on load.
    pub fn build(&self) -> ScenarioResult<LoadedScenario> {
        self.params.validate()?;
        if self.regions.is_empty() {
            return Err(ScenarioError::NoRegions);
        }

        let materials = self
            .materials
            .iter()
            .map(|m| Material::from_descriptor(m).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;
        let geometry = Geometry::new(self.vertices.clone(), &self.facets, &materials, self.structures)?;
        let regions = self
            .regions
            .iter()
            .map(|r| Region::build(r.clone(), self.structures))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(LoadedScenario {
            geometry,
            regions,
            params: self.params.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TUBE: &str = r#"{
        "vertices": [[-1, -1, 0], [1, -1, 0], [1, 1, 0], [-1, 1, 0]],
        "facets": [ { "indices": [0, 1, 2, 3], "sticking": 1.0 } ],
        "materials": [ {
            "name": "mirror",
            "energies": [10.0, 1000.0],
            "angles": [0.0, 0.1],
            "table": [[{ "forward": 0.5 }, { "forward": 0.2 }],
                      [{ "forward": 0.4 }, { "forward": 0.1 }]]
        } ],
        "regions": [ { "name": "bend", "field": { "type": "uniform", "field": [0, 1, 0] } } ],
        "params": { "low_flux_mode": true, "seed": 7 }
    }"#;

    #[test]
    fn test_parse_and_build() {
        let scenario = Scenario::from_json_str(TUBE).unwrap();
        assert_eq!(scenario.structures, 1);
        assert_eq!(scenario.params.seed, Some(7));
        let loaded = scenario.build().unwrap();
        assert_eq!(loaded.geometry.facets.len(), 1);
        assert_eq!(loaded.regions[0].params.name, "bend");
        assert!(loaded.params.low_flux_mode);
    }

    #[test]
    fn test_json_round_trip() {
        let scenario = Scenario::from_json_str(TUBE).unwrap();
        let again = Scenario::from_json_str(&scenario.to_json_string().unwrap()).unwrap();
        assert_eq!(scenario, again);
    }

    #[test]
    fn test_errors() {
        assert!(matches!(Scenario::from_json_str("{ nope"), Err(ScenarioError::Json(_))));
        assert!(matches!(Scenario::default().build(), Err(ScenarioError::NoRegions)));

        let mut scenario = Scenario::from_json_str(TUBE).unwrap();
        scenario.regions[0].structure = 4;
        assert!(matches!(
            scenario.build(),
            Err(ScenarioError::Config(ConfigError::MissingStructure { .. }))
        ));

        let mut scenario = Scenario::from_json_str(TUBE).unwrap();
        scenario.facets[0].indices = vec![0, 1, 8];
        assert!(matches!(scenario.build(), Err(ScenarioError::Geometry(_))));

        assert!(matches!(Scenario::load("/nonexistent/scenario.json"), Err(ScenarioError::Io(_))));
    }
}
