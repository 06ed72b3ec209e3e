//! Result buffers: one canonical copy owned by the aggregator and one
//! private copy per worker, all addressed through the same [`BufferLayout`].

mod cache;
mod layout;
mod records;

pub use cache::{HitEntry, HitKind, LeakEntry, RingCache, CACHE_SIZE};
pub use layout::{BufferLayout, FacetSection, FacetSizes, Span, PROFILE_BINS};
pub use records::{
    Accumulate, CellTally, DirectionCell, GlobalHeader, HitCounter, MinMax, SpectrumBin,
    TextureLimits,
};

use std::sync::Arc;

use bytemuck::Pod;

use layout::words_of;

/// Typed views over a flat `u64` store plus the leak and hit caches.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultBuffer {
    layout: Arc<BufferLayout>,
    words: Vec<u64>,
    pub leaks: RingCache<LeakEntry>,
    pub hits: RingCache<HitEntry>,
}

impl ResultBuffer {
    pub fn new(layout: Arc<BufferLayout>) -> Self {
        let words = vec![0; layout.words];
        Self {
            layout,
            words,
            leaks: RingCache::default(),
            hits: RingCache::default(),
        }
    }

    pub fn layout(&self) -> &Arc<BufferLayout> {
        &self.layout
    }

    fn view<T: Pod>(&self, span: Span) -> &[T] {
        let end = span.offset + span.len * words_of::<T>();
        bytemuck::cast_slice(&self.words[span.offset..end])
    }

    fn view_mut<T: Pod>(&mut self, span: Span) -> &mut [T] {
        let end = span.offset + span.len * words_of::<T>();
        bytemuck::cast_slice_mut(&mut self.words[span.offset..end])
    }

    pub fn header(&self) -> &GlobalHeader {
        &self.view::<GlobalHeader>(self.layout.header)[0]
    }

    pub fn header_mut(&mut self) -> &mut GlobalHeader {
        let span = self.layout.header;
        &mut self.view_mut::<GlobalHeader>(span)[0]
    }

    pub fn counter(&self, facet: usize) -> &HitCounter {
        &self.view::<HitCounter>(self.layout.facets[facet].counter)[0]
    }

    pub fn counter_mut(&mut self, facet: usize) -> &mut HitCounter {
        let span = self.layout.facets[facet].counter;
        &mut self.view_mut::<HitCounter>(span)[0]
    }

    pub fn profile(&self, facet: usize) -> &[CellTally] {
        self.view(self.layout.facets[facet].profile)
    }

    pub fn profile_mut(&mut self, facet: usize) -> &mut [CellTally] {
        let span = self.layout.facets[facet].profile;
        self.view_mut(span)
    }

    pub fn texture(&self, facet: usize) -> &[CellTally] {
        self.view(self.layout.facets[facet].texture)
    }

    pub fn texture_mut(&mut self, facet: usize) -> &mut [CellTally] {
        let span = self.layout.facets[facet].texture;
        self.view_mut(span)
    }

    pub fn direction(&self, facet: usize) -> &[DirectionCell] {
        self.view(self.layout.facets[facet].direction)
    }

    pub fn direction_mut(&mut self, facet: usize) -> &mut [DirectionCell] {
        let span = self.layout.facets[facet].direction;
        self.view_mut(span)
    }

    pub fn spectrum(&self, facet: usize) -> &[SpectrumBin] {
        self.view(self.layout.facets[facet].spectrum)
    }

    pub fn spectrum_mut(&mut self, facet: usize) -> &mut [SpectrumBin] {
        let span = self.layout.facets[facet].spectrum;
        self.view_mut(span)
    }

    pub fn facet_count(&self) -> usize {
        self.layout.facet_count()
    }

    /// Zero every counter and empty both caches.
    pub fn clear(&mut self) {
        self.words.fill(0);
        self.leaks.clear();
        self.hits.clear();
    }

    /// True when nothing has been recorded since the last clear.
    pub fn is_clear(&self) -> bool {
        self.words.iter().all(|&w| w == 0) && self.leaks.is_empty() && self.hits.is_empty()
    }

    /// Recompute texture display limits from every facet's cells.
    pub fn update_limits(&mut self) {
        let mut limits = TextureLimits::default();
        for f in 0..self.facet_count() {
            for cell in self.texture(f) {
                limits.include(cell);
            }
        }
        self.header_mut().limits = limits;
    }

    /// Factor turning accumulated per-point weights into absolute flux and power.
    pub fn normalisation(&self) -> f64 {
        let header = self.header();
        if header.counter.nb_desorbed == 0 {
            return 0.0;
        }
        header.points_total as f64 / header.counter.nb_desorbed as f64
    }
}

impl Accumulate for ResultBuffer {
    /// Add a worker delta. Both buffers must share a layout.
    fn accumulate(&mut self, delta: &Self) {
        debug_assert_eq!(*self.layout, *delta.layout);
        let layout = Arc::clone(&self.layout);

        self.header_mut().accumulate(delta.header());
        for section in &layout.facets {
            self.view_mut::<HitCounter>(section.counter)
                .accumulate(delta.view::<HitCounter>(section.counter));
            self.view_mut::<CellTally>(section.profile)
                .accumulate(delta.view::<CellTally>(section.profile));
            self.view_mut::<CellTally>(section.texture)
                .accumulate(delta.view::<CellTally>(section.texture));
            self.view_mut::<DirectionCell>(section.direction)
                .accumulate(delta.view::<DirectionCell>(section.direction));
            self.view_mut::<SpectrumBin>(section.spectrum)
                .accumulate(delta.view::<SpectrumBin>(section.spectrum));
        }
        self.leaks.extend_from(&delta.leaks);
        self.hits.extend_from(&delta.hits);
        self.update_limits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::DVec3;

    fn layout() -> Arc<BufferLayout> {
        Arc::new(BufferLayout::new(&[
            FacetSizes {
                profile_bins: 4,
                texture_cells: 2,
                direction_cells: 2,
                spectrum_bins: 3,
            },
            FacetSizes::default(),
        ]))
    }

    #[test]
    fn test_sections_do_not_alias() {
        let mut buf = ResultBuffer::new(layout());
        buf.counter_mut(0).nb_mc_hit = 7;
        buf.counter_mut(1).flux_abs = 2.5;
        buf.profile_mut(0)[3].count = 1.0;
        buf.texture_mut(0)[1].flux = 4.0;
        buf.spectrum_mut(0)[2].power = 9.0;
        buf.header_mut().counter.nb_desorbed = 3;

        assert_eq!(buf.counter(0).nb_mc_hit, 7);
        assert_eq!(buf.counter(0).flux_abs, 0.0);
        assert_eq!(buf.counter(1).flux_abs, 2.5);
        assert_eq!(buf.profile(0)[3].count, 1.0);
        assert_eq!(buf.texture(0)[0], CellTally::default());
        assert_eq!(buf.texture(0)[1].flux, 4.0);
        assert_eq!(buf.spectrum(0)[2].power, 9.0);
        assert!(buf.profile(1).is_empty());
        assert_eq!(buf.header().counter.nb_desorbed, 3);
    }

    #[test]
    fn test_merge_sums_and_tracks_limits() {
        let layout = layout();
        let mut total = ResultBuffer::new(Arc::clone(&layout));
        let mut delta = ResultBuffer::new(layout);
        delta.counter_mut(0).nb_abs = 2;
        delta.texture_mut(0)[0] = CellTally {
            count: 1.0,
            flux: 10.0,
            power: 0.5,
        };
        delta.texture_mut(0)[1] = CellTally {
            count: 3.0,
            flux: 20.0,
            power: 0.0,
        };
        delta.leaks.push(LeakEntry {
            position: DVec3::ONE,
            direction: DVec3::Z,
        });

        total.accumulate(&delta);
        total.accumulate(&delta);
        assert_eq!(total.counter(0).nb_abs, 4);
        assert_eq!(total.texture(0)[1].count, 6.0);
        assert_eq!(total.leaks.len(), 2);

        let limits = total.header().limits;
        assert_eq!(limits.count, MinMax { min: 2.0, max: 6.0 });
        assert_eq!(limits.flux, MinMax { min: 20.0, max: 40.0 });
        assert_eq!(limits.power, MinMax { min: 1.0, max: 1.0 });
    }

    #[test]
    fn test_clear_and_normalisation() {
        let mut buf = ResultBuffer::new(layout());
        assert!(buf.is_clear());
        assert_eq!(buf.normalisation(), 0.0);
        buf.header_mut().counter.nb_desorbed = 50;
        buf.header_mut().points_total = 200;
        assert_eq!(buf.normalisation(), 4.0);
        buf.hits.push(HitEntry {
            position: DVec3::ZERO,
            kind: HitKind::Absorption,
        });
        buf.clear();
        assert!(buf.is_clear());
    }
}
