//! SynRad Core - physics tables, geometry and result schema for
//! synchrotron radiation ray tracing.
//!
//! This crate provides:
//!
//! - **Tabulated functions**: [`Distribution2D`] with forward and inverse lookup
//! - **Physics**: Bessel quadrature, spectral and angular tables ([`PhysicsTables`])
//! - **Geometry**: facets with local frames, materials, superstructure links
//! - **Sources**: regions, trajectories and magnetic field models
//! - **Results**: the shared result-buffer layout and its record types
//! - **Scenarios**: JSON loading of all of the above
//!
//! # Example
//!
//! ```ignore
//! use synrad_core::{PhysicsTables, Scenario};
//!
//! let loaded = Scenario::load("chamber.json")?.build()?;
//! let tables = PhysicsTables::build()?;
//! for region in &loaded.regions {
//!     let summary = region.summary(&tables);
//!     println!("{}: {:.3e} ph/s, {:.2} W", region.params.name, summary.flux, summary.power);
//! }
//! ```

pub mod distribution;
pub mod field;
pub mod geometry;
pub mod material;
pub mod params;
pub mod physics;
pub mod region;
pub mod results;
pub mod scenario;
pub mod trajectory;

// Re-export commonly used types
pub use distribution::{Distribution2D, DistributionError, DistributionResult, LogCumulative};
pub use field::{FieldModel, MagneticField};
pub use geometry::{Facet, FacetDescriptor, Geometry, GeometryError, GeometryResult, Link, Reflection};
pub use material::{Material, MaterialDescriptor, ScatteringProbabilities};
pub use params::{ConfigError, ConfigResult, SimulationParams, SpectrumRange};
pub use physics::{PhysicsTables, Polarization};
pub use region::{BeamOptics, GenerationMode, Region, RegionParams, RegionSummary, SpectralWindow};
pub use results::{Accumulate, BufferLayout, HitCounter, ResultBuffer};
pub use scenario::{LoadedScenario, Scenario, ScenarioError, ScenarioResult};
pub use trajectory::{TrajectoryPoint, TrajectorySpec};
