//! Immutable simulation model shared by every worker.

use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use synrad_core::{
    BufferLayout, Geometry, LoadedScenario, PhysicsTables, Region, ResultBuffer, SpectrumRange,
    TrajectoryPoint,
};

use crate::error::SimulationResult;
use crate::intersect::Intersector;
use crate::spatial::SpatialIndex;

/// Geometry, sources, tables, spatial indices and the result layout.
///
/// Built once per load and shared read-only behind an `Arc`.
#[derive(Debug)]
pub struct Model {
    pub geometry: Geometry,
    pub regions: Vec<Region>,
    pub tables: Arc<PhysicsTables>,
    /// One index per structure.
    pub indices: Vec<SpatialIndex>,
    pub layout: Arc<BufferLayout>,
    pub spectrum: SpectrumRange,
    /// Trajectory points over all regions.
    pub points_total: u64,
}

impl Model {
    pub fn new(
        geometry: Geometry,
        regions: Vec<Region>,
        tables: Arc<PhysicsTables>,
        spectrum: SpectrumRange,
    ) -> SimulationResult<Self> {
        spectrum.validate()?;

        let start = Instant::now();
        let indices: Vec<SpatialIndex> = (0..geometry.structure_count)
            .into_par_iter()
            .map(|s| SpatialIndex::build(&geometry, s))
            .collect();
        log::info!(
            "Built {} spatial indices over {} facets in {:.2?}",
            indices.len(),
            geometry.facets.len(),
            start.elapsed()
        );

        let layout = Arc::new(BufferLayout::for_geometry(&geometry, &spectrum));
        log::debug!(
            "Result layout: {} facets, {} bytes",
            layout.facet_count(),
            layout.byte_len()
        );
        let points_total = regions.iter().map(|r| r.points.len() as u64).sum();

        Ok(Self {
            geometry,
            regions,
            tables,
            indices,
            layout,
            spectrum,
            points_total,
        })
    }

    pub fn from_scenario(loaded: LoadedScenario, tables: Arc<PhysicsTables>) -> SimulationResult<Self> {
        let spectrum = loaded.params.spectrum;
        Self::new(loaded.geometry, loaded.regions, tables, spectrum)
    }

    /// The `index`-th trajectory point counting across regions in order.
    pub fn locate_point(&self, mut index: u64) -> Option<(usize, &Region, &TrajectoryPoint)> {
        for (i, region) in self.regions.iter().enumerate() {
            let len = region.points.len() as u64;
            if index < len {
                return Some((i, region, &region.points[index as usize]));
            }
            index -= len;
        }
        None
    }

    pub fn intersector(&self) -> Intersector<'_> {
        Intersector::new(&self.geometry, &self.indices)
    }

    /// A zeroed buffer in this model's layout.
    pub fn new_buffer(&self) -> ResultBuffer {
        let mut buffer = ResultBuffer::new(Arc::clone(&self.layout));
        self.reset_buffer(&mut buffer);
        buffer
    }

    /// Zero `buffer`, keeping the model's point count in its header.
    pub fn reset_buffer(&self, buffer: &mut ResultBuffer) {
        buffer.clear();
        buffer.header_mut().points_total = self.points_total;
    }
}
